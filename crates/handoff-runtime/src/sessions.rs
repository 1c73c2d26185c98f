//! Session-scoped pending-request registry.
//!
//! A two-level map (`session_id → request_id → pending request`) keeps
//! concurrent conversations isolated: a request created under one session is
//! never resolvable through another session's id space.
//!
//! The registry is a plain data structure; the [`RequestBroker`] wraps it in a
//! mutex and owns all locking.
//!
//! [`RequestBroker`]: crate::broker::RequestBroker

use std::collections::HashMap;

use handoff_core::{RequestId, SessionId};
use serde::Serialize;
use tokio::sync::oneshot;

/// A pending question as exposed to the poll endpoint.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PendingQuestion {
    /// Session the request belongs to.
    pub session_id: SessionId,
    /// Identifier to pass back when answering.
    pub request_id: RequestId,
    /// The question text.
    pub question: String,
}

/// One outstanding question plus its write-once answer slot.
struct PendingRequest {
    question: String,
    /// Dropping the sender cancels the suspended asker.
    answer_tx: oneshot::Sender<String>,
    /// Whether at least one observer has seen the question (via the event
    /// stream or the poll endpoint).
    delivered: bool,
}

/// Pending requests partitioned by session.
pub struct SessionRegistry {
    sessions: HashMap<SessionId, HashMap<RequestId, PendingRequest>>,
}

impl SessionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            sessions: HashMap::new(),
        }
    }

    /// Register a pending request, returning the receiver half of its answer
    /// slot. The session is created lazily on first use. Registering the same
    /// id twice replaces the old slot (its asker is cancelled).
    pub fn register(
        &mut self,
        session_id: &SessionId,
        request_id: &RequestId,
        question: &str,
    ) -> oneshot::Receiver<String> {
        let (tx, rx) = oneshot::channel();
        let _ = self.sessions.entry(session_id.clone()).or_default().insert(
            request_id.clone(),
            PendingRequest {
                question: question.to_owned(),
                answer_tx: tx,
                delivered: false,
            },
        );
        rx
    }

    /// Mark a pending request as delivered to at least one observer.
    pub fn mark_delivered(&mut self, session_id: &SessionId, request_id: &RequestId) {
        if let Some(pending) = self
            .sessions
            .get_mut(session_id)
            .and_then(|reqs| reqs.get_mut(request_id))
        {
            pending.delivered = true;
        }
    }

    /// Write the answer slot of a pending request and remove it.
    ///
    /// Returns `true` if the request existed and its asker was woken. Unknown
    /// or already-resolved ids return `false` — late and duplicate answers are
    /// harmless no-ops.
    pub fn resolve(
        &mut self,
        session_id: &SessionId,
        request_id: &RequestId,
        answer: String,
    ) -> bool {
        let Some(requests) = self.sessions.get_mut(session_id) else {
            return false;
        };
        let Some(pending) = requests.remove(request_id) else {
            return false;
        };
        if requests.is_empty() {
            let _ = self.sessions.remove(session_id);
        }
        pending.answer_tx.send(answer).is_ok()
    }

    /// Resolve a request by id alone, scanning all sessions.
    ///
    /// Request ids are UUIDs, so cross-session collisions do not occur in
    /// practice; this backs the answer-submission path that carries no
    /// session id.
    pub fn resolve_any(&mut self, request_id: &RequestId, answer: String) -> bool {
        let owner = self
            .sessions
            .iter()
            .find(|(_, reqs)| reqs.contains_key(request_id))
            .map(|(sid, _)| sid.clone());
        match owner {
            Some(session_id) => self.resolve(&session_id, request_id, answer),
            None => false,
        }
    }

    /// Drop a session and all of its pending requests.
    ///
    /// Returns the number of requests dropped. Dropping a slot's sender wakes
    /// its suspended asker with a cancellation.
    pub fn teardown(&mut self, session_id: &SessionId) -> usize {
        self.sessions
            .remove(session_id)
            .map_or(0, |requests| requests.len())
    }

    /// Drop every session and all pending requests.
    pub fn teardown_all(&mut self) -> usize {
        let dropped = self.pending_count();
        self.sessions.clear();
        dropped
    }

    /// Return pending requests not yet seen by any observer, marking them
    /// delivered. `session` narrows the result to one session.
    pub fn undelivered(&mut self, session: Option<&SessionId>) -> Vec<PendingQuestion> {
        let mut out = Vec::new();
        for (session_id, requests) in &mut self.sessions {
            if session.is_some_and(|wanted| wanted != session_id) {
                continue;
            }
            for (request_id, pending) in requests.iter_mut() {
                if !pending.delivered {
                    pending.delivered = true;
                    out.push(PendingQuestion {
                        session_id: session_id.clone(),
                        request_id: request_id.clone(),
                        question: pending.question.clone(),
                    });
                }
            }
        }
        out
    }

    /// Whether a request is still pending.
    #[must_use]
    pub fn has_pending(&self, session_id: &SessionId, request_id: &RequestId) -> bool {
        self.sessions
            .get(session_id)
            .is_some_and(|reqs| reqs.contains_key(request_id))
    }

    /// Total pending requests across all sessions.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.sessions.values().map(HashMap::len).sum()
    }

    /// Number of sessions with at least one pending request.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
