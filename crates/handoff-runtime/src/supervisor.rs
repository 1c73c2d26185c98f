//! Task supervisor — runs workers as cancellable units of work.
//!
//! At most one run is active per supervisor. Starting a new run cancels the
//! previous one: the superseded run transitions to `Cancelled`, publishes no
//! terminal event, and its pending requests are dropped according to the
//! configured [`RestartPolicy`]. Every other terminal path publishes exactly
//! one `task_result` event, and the active-run slot is cleared unconditionally
//! whatever way the worker ends.

use std::collections::HashMap;
use std::sync::Arc;

use handoff_core::{HandoffEvent, SessionId, TaskId};
use metrics::{counter, gauge};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::broker::RequestBroker;
use crate::fanout::EventFanout;
use crate::worker::{InputChannel, Worker};

/// Lifecycle state of one run. Terminal states are final.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// Accepted but not yet executing.
    Pending,
    /// The worker is executing.
    Running,
    /// The worker returned a payload.
    Completed,
    /// The worker signalled an error (or panicked).
    Failed,
    /// Superseded by a newer run or shut down. No terminal event published.
    Cancelled,
}

impl RunState {
    /// Whether this state admits no further transitions.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// What happens to pending requests when a new run supersedes the active one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestartPolicy {
    /// Drop every pending request in every session (one global conversation).
    ClearAllSessions,
    /// Drop only the superseded run's session.
    ClearOwnSession,
}

/// The currently executing run.
struct ActiveRun {
    task_id: TaskId,
    session_id: SessionId,
    cancel: CancellationToken,
}

/// Starts, tracks, supersedes, and cleans up worker runs.
pub struct TaskSupervisor {
    broker: Arc<RequestBroker>,
    fanout: Arc<EventFanout>,
    worker: Arc<dyn Worker>,
    policy: RestartPolicy,
    active: Mutex<Option<ActiveRun>>,
    states: Mutex<HashMap<TaskId, RunState>>,
}

impl TaskSupervisor {
    /// Create a supervisor driving `worker`.
    #[must_use]
    pub fn new(
        broker: Arc<RequestBroker>,
        fanout: Arc<EventFanout>,
        worker: Arc<dyn Worker>,
        policy: RestartPolicy,
    ) -> Self {
        Self {
            broker,
            fanout,
            worker,
            policy,
            active: Mutex::new(None),
            states: Mutex::new(HashMap::new()),
        }
    }

    /// Start a new run, cancelling any active one first.
    ///
    /// The swap of the active-run slot happens under one lock acquisition, so
    /// concurrent starts serialize: whichever installs last supersedes the
    /// other, and no run is ever dropped with its token uncancelled.
    #[instrument(skip(self, input), fields(session_id = %session_id))]
    pub fn start(self: &Arc<Self>, input: String, session_id: SessionId) -> TaskId {
        let task_id = TaskId::new();
        let cancel = CancellationToken::new();
        self.set_state(&task_id, RunState::Pending);
        let previous = self.active.lock().replace(ActiveRun {
            task_id: task_id.clone(),
            session_id: session_id.clone(),
            cancel: cancel.clone(),
        });
        if let Some(run) = previous {
            self.supersede(run);
        }
        counter!("handoff_runs_started_total").increment(1);
        gauge!("handoff_runs_active").set(1.0);
        info!(%task_id, "run started");

        let supervisor = Arc::clone(self);
        let spawned_task_id = task_id.clone();
        drop(tokio::spawn(async move {
            supervisor
                .drive(spawned_task_id, session_id, input, cancel)
                .await;
        }));
        task_id
    }

    /// Cancel the active run, if any. Idempotent; returns `true` if a run was
    /// cancelled. The cancelled run publishes no terminal event, and pending
    /// requests are dropped per the restart policy so no `ask` hangs.
    #[instrument(skip(self))]
    pub fn cancel_active(&self) -> bool {
        let Some(run) = self.active.lock().take() else {
            return false;
        };
        self.supersede(run);
        gauge!("handoff_runs_active").set(0.0);
        true
    }

    /// Cancel a run that has lost the active slot and release its pending
    /// requests per the restart policy.
    fn supersede(&self, run: ActiveRun) {
        warn!(task_id = %run.task_id, "cancelling active run");
        run.cancel.cancel();
        self.set_state(&run.task_id, RunState::Cancelled);
        let dropped = match self.policy {
            RestartPolicy::ClearAllSessions => self.broker.teardown_all(),
            RestartPolicy::ClearOwnSession => self.broker.teardown_session(&run.session_id),
        };
        if dropped > 0 {
            debug!(task_id = %run.task_id, dropped, "released pending requests");
        }
    }

    /// The state of a run, if known to this supervisor.
    #[must_use]
    pub fn run_state(&self, task_id: &TaskId) -> Option<RunState> {
        self.states.lock().get(task_id).copied()
    }

    /// The currently active run's id, if any.
    #[must_use]
    pub fn active_task(&self) -> Option<TaskId> {
        self.active.lock().as_ref().map(|run| run.task_id.clone())
    }

    /// Whether a run is currently active.
    #[must_use]
    pub fn has_active_run(&self) -> bool {
        self.active.lock().is_some()
    }

    /// The configured restart policy.
    #[must_use]
    pub fn policy(&self) -> RestartPolicy {
        self.policy
    }

    /// Execute the worker and publish the terminal event.
    async fn drive(
        &self,
        task_id: TaskId,
        session_id: SessionId,
        input: String,
        cancel: CancellationToken,
    ) {
        self.set_state(&task_id, RunState::Running);

        let channel = InputChannel::new(session_id, Arc::clone(&self.broker), cancel.clone());
        let worker = Arc::clone(&self.worker);
        let mut inner = tokio::spawn(async move { worker.run(&input, &channel).await });

        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                // Superseded: kill the worker and stay silent
                inner.abort();
                self.set_state(&task_id, RunState::Cancelled);
            }
            joined = &mut inner => {
                if cancel.is_cancelled() {
                    self.set_state(&task_id, RunState::Cancelled);
                } else {
                    match joined {
                        Ok(Ok(payload)) => {
                            self.set_state(&task_id, RunState::Completed);
                            let _ = self
                                .fanout
                                .publish(HandoffEvent::task_complete(task_id.clone(), payload));
                            info!(%task_id, "run completed");
                        }
                        Ok(Err(err)) => {
                            self.set_state(&task_id, RunState::Failed);
                            warn!(%task_id, error = %err, "run failed");
                            let _ = self
                                .fanout
                                .publish(HandoffEvent::task_error(task_id.clone(), err.to_string()));
                        }
                        Err(join_err) => {
                            self.set_state(&task_id, RunState::Failed);
                            let message = format!("worker task failed: {join_err}");
                            warn!(%task_id, error = %message, "run aborted unexpectedly");
                            let _ = self
                                .fanout
                                .publish(HandoffEvent::task_error(task_id.clone(), message));
                        }
                    }
                }
            }
        }

        // Cleanup runs on every terminal path
        self.finish(&task_id);
    }

    /// Record a state transition. Terminal states are final.
    ///
    /// Only the most recent terminal state is retained: recording a terminal
    /// transition evicts every earlier finished run, so the map never grows
    /// past the active run plus one.
    fn set_state(&self, task_id: &TaskId, state: RunState) {
        let mut states = self.states.lock();
        let entry = states.entry(task_id.clone()).or_insert(RunState::Pending);
        if entry.is_terminal() && *entry != state {
            debug!(%task_id, current = ?entry, rejected = ?state, "ignoring transition out of terminal state");
            return;
        }
        *entry = state;
        if state.is_terminal() {
            states.retain(|id, recorded| id == task_id || !recorded.is_terminal());
        }
    }

    /// Remove the run from the active slot if it still owns it.
    fn finish(&self, task_id: &TaskId) {
        let mut active = self.active.lock();
        if active.as_ref().is_some_and(|run| run.task_id == *task_id) {
            *active = None;
            gauge!("handoff_runs_active").set(0.0);
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
