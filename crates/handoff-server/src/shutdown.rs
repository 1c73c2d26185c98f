//! Shutdown signalling and task drain.
//!
//! One `CancellationToken` fans out to everything that must stop together:
//! the axum accept loop, the event broadcaster, and every open SSE stream.
//! [`ShutdownCoordinator::graceful_shutdown`] signals the token, waits for the
//! tasks to drain, and aborts whatever is still running once the deadline
//! passes, so a wedged observer stream cannot hold the process open.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Owns the shutdown token shared by the server, broadcaster, and streams.
pub struct ShutdownCoordinator {
    token: CancellationToken,
}

impl ShutdownCoordinator {
    /// Create a coordinator with an unsignalled token.
    #[must_use]
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// A clone of the token for a task that should stop on shutdown.
    #[must_use]
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Signal shutdown. Sticky and idempotent.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Whether shutdown has been signalled.
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Signal shutdown and wait for `handles` to finish.
    ///
    /// Tasks still running after `timeout` are aborted rather than waited on;
    /// an SSE stream mid-heartbeat or a stuck worker never delays process
    /// exit past the deadline.
    pub async fn graceful_shutdown(&self, mut handles: Vec<JoinHandle<()>>, timeout: Duration) {
        self.shutdown();
        info!(
            task_count = handles.len(),
            timeout_secs = timeout.as_secs(),
            "draining tasks"
        );

        let drained =
            tokio::time::timeout(timeout, futures::future::join_all(handles.iter_mut())).await;
        if drained.is_err() {
            let stuck = handles.iter().filter(|h| !h.is_finished()).count();
            warn!(stuck, "drain deadline passed, aborting remaining tasks");
            for handle in &handles {
                handle.abort();
            }
        }
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
