//! Wire events streamed to observers.
//!
//! Two event kinds flow from workers to observers:
//!
//! - **`HumanInput`**: a worker is suspended waiting for an operator to answer
//!   a question.
//! - **`TaskResult`**: a run reached a terminal outcome (complete or error).
//!   Cancelled runs publish nothing.
//!
//! Events are immutable once constructed and delivered in FIFO producer order.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::{RequestId, SessionId, TaskId};

/// Terminal outcome of a run, as seen by observers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// The worker finished and produced a payload.
    Complete,
    /// The worker signalled a failure.
    Error,
}

/// An event delivered to every connected observer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum HandoffEvent {
    /// A worker needs an operator's answer to continue.
    #[serde(rename = "human_input")]
    HumanInput {
        /// Session the request belongs to.
        session_id: SessionId,
        /// Identifier to pass back when answering.
        request_id: RequestId,
        /// The question text, verbatim from the worker.
        question: String,
    },

    /// A run finished (successfully or not).
    #[serde(rename = "task_result")]
    TaskResult {
        /// The run that finished.
        task_id: TaskId,
        /// Terminal outcome.
        status: TaskStatus,
        /// Opaque success payload (present when `status` is `complete`).
        #[serde(skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
        /// Human-readable failure message (present when `status` is `error`).
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

impl HandoffEvent {
    /// Build a `human_input` event.
    #[must_use]
    pub fn human_input(
        session_id: SessionId,
        request_id: RequestId,
        question: impl Into<String>,
    ) -> Self {
        Self::HumanInput {
            session_id,
            request_id,
            question: question.into(),
        }
    }

    /// Build a successful `task_result` event.
    #[must_use]
    pub fn task_complete(task_id: TaskId, payload: Value) -> Self {
        Self::TaskResult {
            task_id,
            status: TaskStatus::Complete,
            payload: Some(payload),
            error: None,
        }
    }

    /// Build a failed `task_result` event.
    #[must_use]
    pub fn task_error(task_id: TaskId, error: impl Into<String>) -> Self {
        Self::TaskResult {
            task_id,
            status: TaskStatus::Error,
            payload: None,
            error: Some(error.into()),
        }
    }

    /// The wire `type` tag of this event.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::HumanInput { .. } => "human_input",
            Self::TaskResult { .. } => "task_result",
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
