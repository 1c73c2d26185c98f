//! `HandoffServer` — the axum HTTP boundary.
//!
//! Observers receive questions and run outcomes over `GET /events` (SSE with
//! heartbeats) and answer over `POST /respond`. Runs start via
//! `POST /agent/start`; late subscribers can poll `GET /requests/pending`.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use axum::extract::{Query, State};
use axum::response::Json;
use axum::response::sse::{Event, Sse};
use axum::routing::{get, post};
use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use handoff_core::{RequestId, SessionId, TaskId};
use handoff_runtime::{EventFanout, PendingQuestion, RequestBroker, TaskSupervisor};

use crate::config::ServerConfig;
use crate::health::{self, HealthResponse};
use crate::shutdown::ShutdownCoordinator;

/// Shared state accessible from axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Pending-request broker.
    pub broker: Arc<RequestBroker>,
    /// Event fan-out for the SSE stream.
    pub fanout: Arc<EventFanout>,
    /// Run supervisor.
    pub supervisor: Arc<TaskSupervisor>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// When the server started.
    pub start_time: Instant,
    /// SSE heartbeat interval.
    pub heartbeat: Duration,
}

/// The main handoff server.
pub struct HandoffServer {
    config: ServerConfig,
    state: AppState,
}

impl HandoffServer {
    /// Create a new server around an already-wired coordination layer.
    #[must_use]
    pub fn new(
        config: ServerConfig,
        broker: Arc<RequestBroker>,
        fanout: Arc<EventFanout>,
        supervisor: Arc<TaskSupervisor>,
    ) -> Self {
        let heartbeat = Duration::from_secs(config.heartbeat_interval_secs.max(1));
        let state = AppState {
            broker,
            fanout,
            supervisor,
            shutdown: Arc::new(ShutdownCoordinator::new()),
            start_time: Instant::now(),
            heartbeat,
        };
        Self { config, state }
    }

    /// Build the axum router with all routes.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/agent/start", post(start_run_handler))
            .route("/respond", post(respond_handler))
            .route("/events", get(events_handler))
            .route("/requests/pending", get(pending_handler))
            .route("/health", get(health_handler))
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
            .with_state(self.state.clone())
    }

    /// Bind and serve. Returns the bound address and the serving task, which
    /// exits when the shutdown coordinator fires.
    pub async fn listen(&self) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        let local_addr = listener.local_addr()?;
        let app = self.router();
        let token = self.state.shutdown.token();

        let handle = tokio::spawn(async move {
            let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
                token.cancelled().await;
            });
            if let Err(e) = serve.await {
                warn!(error = %e, "server task exited with error");
            }
        });
        info!(addr = %local_addr, "server listening");
        Ok((local_addr, handle))
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.state.shutdown
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Request / response bodies
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct StartRunRequest {
    input: String,
    #[serde(default)]
    session_id: Option<SessionId>,
}

#[derive(Debug, Serialize)]
struct StartRunResponse {
    status: &'static str,
    task_id: TaskId,
    session_id: SessionId,
}

#[derive(Debug, Deserialize)]
struct RespondRequest {
    request_id: RequestId,
    #[serde(default)]
    session_id: Option<SessionId>,
    answer: String,
}

#[derive(Debug, Serialize)]
struct RespondResponse {
    status: &'static str,
    resolved: bool,
}

#[derive(Debug, Deserialize)]
struct PendingQuery {
    #[serde(default)]
    session_id: Option<SessionId>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// POST /agent/start — start a run, superseding any active one.
async fn start_run_handler(
    State(state): State<AppState>,
    Json(body): Json<StartRunRequest>,
) -> Json<StartRunResponse> {
    let session_id = body.session_id.unwrap_or_default();
    let task_id = state.supervisor.start(body.input, session_id.clone());
    Json(StartRunResponse {
        status: "started",
        task_id,
        session_id,
    })
}

/// POST /respond — submit an answer.
///
/// Always acknowledged with HTTP 200: late, duplicate, and unknown request
/// ids are harmless no-ops (`resolved: false`).
async fn respond_handler(
    State(state): State<AppState>,
    Json(body): Json<RespondRequest>,
) -> Json<RespondResponse> {
    let resolved = match body.session_id {
        Some(session_id) => state
            .broker
            .resolve(&session_id, &body.request_id, body.answer),
        None => state.broker.resolve_any(&body.request_id, body.answer),
    };
    if !resolved {
        debug!(request_id = %body.request_id, "answer for unknown or resolved request ignored");
    }
    Json(RespondResponse {
        status: "received",
        resolved,
    })
}

/// GET /events — SSE stream of coordination events.
///
/// Quiet intervals produce a content-free `{}` heartbeat so the transport
/// never looks dead. Disconnected observers are pruned by the fanout, and the
/// stream ends as soon as shutdown is signalled so drains finish promptly.
async fn events_handler(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut sub = state.fanout.subscribe();
    let heartbeat = state.heartbeat;
    let shutdown = state.shutdown.token();
    debug!(observer_id = sub.id(), "observer connected");

    let stream = async_stream::stream! {
        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                received = tokio::time::timeout(heartbeat, sub.recv()) => match received {
                    Ok(Some(event)) => match Event::default().json_data(&event) {
                        Ok(sse_event) => yield Ok(sse_event),
                        Err(e) => warn!(error = %e, "failed to serialize event"),
                    },
                    // Unsubscribed and drained: the stream is done
                    Ok(None) => break,
                    // Nothing within the heartbeat window: keep-alive
                    Err(_) => yield Ok(Event::default().data("{}")),
                },
            }
        }
    };
    Sse::new(stream)
}

/// GET /requests/pending — poll questions never delivered to any observer.
async fn pending_handler(
    State(state): State<AppState>,
    Query(query): Query<PendingQuery>,
) -> Json<Vec<PendingQuestion>> {
    Json(state.broker.undelivered(query.session_id.as_ref()))
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(
        state.start_time,
        state.fanout.observer_count(),
        state.broker.pending_count(),
        state.supervisor.has_active_run(),
    ))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
