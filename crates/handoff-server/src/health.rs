//! `/health` endpoint.

use serde::Serialize;
use std::time::Instant;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` when the server is running.
    pub status: String,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Currently connected event-stream observers.
    pub observers: usize,
    /// Pending human-input requests across all sessions.
    pub pending_requests: usize,
    /// Whether a worker run is currently active.
    pub active_run: bool,
}

/// Build a health response from live counters.
pub fn health_check(
    start_time: Instant,
    observers: usize,
    pending_requests: usize,
    active_run: bool,
) -> HealthResponse {
    HealthResponse {
        status: "ok".into(),
        uptime_secs: start_time.elapsed().as_secs(),
        observers,
        pending_requests,
        active_run,
    }
}
