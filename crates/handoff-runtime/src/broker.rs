//! Request broker — bridges suspended workers and out-of-band answers.
//!
//! [`RequestBroker::ask`] allocates a pending request, announces it to
//! observers through the fanout, and suspends until someone writes the answer
//! slot. [`RequestBroker::resolve`] is the out-of-band write: unknown, late,
//! and duplicate resolutions are harmless no-ops. The worker's control flow is
//! identical whether the answer arrives in microseconds or minutes.

use std::sync::Arc;

use handoff_core::{HandoffEvent, RequestId, SessionId};
use parking_lot::Mutex;
use tracing::debug;

use crate::errors::RuntimeError;
use crate::fanout::EventFanout;
use crate::sessions::{PendingQuestion, SessionRegistry};

/// Creates, announces, and resolves pending human-input requests.
pub struct RequestBroker {
    registry: Mutex<SessionRegistry>,
    fanout: Arc<EventFanout>,
}

impl RequestBroker {
    /// Create a broker publishing questions through `fanout`.
    #[must_use]
    pub fn new(fanout: Arc<EventFanout>) -> Self {
        Self {
            registry: Mutex::new(SessionRegistry::new()),
            fanout,
        }
    }

    /// Ask a question under a session and suspend until it is answered.
    ///
    /// Emits a `human_input` event; if at least one observer was subscribed
    /// at publish time the request is marked delivered, otherwise it stays
    /// visible to the pending-request poll. Returns the answer text, or
    /// [`RuntimeError::AskCancelled`] if the session was torn down first.
    pub async fn ask(
        &self,
        session_id: &SessionId,
        question: &str,
    ) -> Result<String, RuntimeError> {
        let request_id = RequestId::new();
        let answer_rx = self
            .registry
            .lock()
            .register(session_id, &request_id, question);

        let observers = self.fanout.publish(HandoffEvent::human_input(
            session_id.clone(),
            request_id.clone(),
            question,
        ));
        if observers > 0 {
            self.registry.lock().mark_delivered(session_id, &request_id);
        }
        debug!(%session_id, %request_id, observers, "question published, waiting for answer");

        match answer_rx.await {
            Ok(answer) => Ok(answer),
            Err(_) => Err(RuntimeError::AskCancelled { request_id }),
        }
    }

    /// Resolve a pending request. Returns `true` if a suspended asker was
    /// woken; unknown or already-resolved ids return `false`.
    pub fn resolve(&self, session_id: &SessionId, request_id: &RequestId, answer: String) -> bool {
        let resolved = self.registry.lock().resolve(session_id, request_id, answer);
        debug!(%session_id, %request_id, resolved, "resolve");
        resolved
    }

    /// Resolve a pending request by id alone, scanning all sessions. Backs
    /// the answer-submission operation that carries no session id.
    pub fn resolve_any(&self, request_id: &RequestId, answer: String) -> bool {
        let resolved = self.registry.lock().resolve_any(request_id, answer);
        debug!(%request_id, resolved, "resolve_any");
        resolved
    }

    /// Drop one session's pending requests, cancelling their askers.
    /// Returns the number of requests dropped.
    pub fn teardown_session(&self, session_id: &SessionId) -> usize {
        let dropped = self.registry.lock().teardown(session_id);
        if dropped > 0 {
            debug!(%session_id, dropped, "session torn down");
        }
        dropped
    }

    /// Drop every pending request across all sessions.
    pub fn teardown_all(&self) -> usize {
        let dropped = self.registry.lock().teardown_all();
        if dropped > 0 {
            debug!(dropped, "all sessions torn down");
        }
        dropped
    }

    /// Pending requests not yet seen by any observer, marked delivered on
    /// return. `session` narrows to one session.
    pub fn undelivered(&self, session: Option<&SessionId>) -> Vec<PendingQuestion> {
        self.registry.lock().undelivered(session)
    }

    /// Total pending requests across all sessions.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.registry.lock().pending_count()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
