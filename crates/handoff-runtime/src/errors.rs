//! Runtime error types.

use handoff_core::RequestId;
use thiserror::Error;

/// Errors surfaced by the coordination layer.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// An `ask` was cancelled before an answer arrived (session teardown or
    /// run cancellation dropped its answer slot).
    #[error("input request {request_id} cancelled before an answer arrived")]
    AskCancelled {
        /// The request whose slot was dropped.
        request_id: RequestId,
    },

    /// The run was already cancelled when the worker tried to ask. No request
    /// is registered and no event is published.
    #[error("run cancelled, refusing to ask")]
    RunCancelled,

    /// The worker signalled a failure. The message is forwarded verbatim in
    /// the terminal `task_result` event.
    #[error("{message}")]
    Worker {
        /// Human-readable failure message.
        message: String,
    },
}

impl RuntimeError {
    /// Create a worker failure from a message.
    #[must_use]
    pub fn worker(message: impl Into<String>) -> Self {
        Self::Worker {
            message: message.into(),
        }
    }
}
