//! End-to-end coordination scenarios: worker, broker, fanout, and supervisor
//! wired together the way the server wires them.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use handoff_core::{HandoffEvent, RequestId, SessionId, TaskStatus};
use handoff_runtime::{
    EventFanout, InputChannel, RequestBroker, RestartPolicy, RunState, RuntimeError, Subscription,
    TaskSupervisor, Worker,
};

/// A worker that asks one clarifying question before finishing.
struct OrderWorker;

#[async_trait]
impl Worker for OrderWorker {
    async fn run(&self, input: &str, channel: &InputChannel) -> Result<Value, RuntimeError> {
        if input.trim().is_empty() {
            return Err(RuntimeError::worker("bad input"));
        }
        let size = channel.ask("size?").await?;
        Ok(json!({ "item": input, "size": size }))
    }
}

struct Harness {
    supervisor: Arc<TaskSupervisor>,
    broker: Arc<RequestBroker>,
    fanout: Arc<EventFanout>,
    cancel: CancellationToken,
}

impl Harness {
    fn new(policy: RestartPolicy) -> Self {
        let fanout = Arc::new(EventFanout::new());
        let broker = Arc::new(RequestBroker::new(fanout.clone()));
        let supervisor = Arc::new(TaskSupervisor::new(
            broker.clone(),
            fanout.clone(),
            Arc::new(OrderWorker),
            policy,
        ));
        let cancel = CancellationToken::new();
        let _broadcaster = fanout.spawn_broadcaster(cancel.clone());
        Self {
            supervisor,
            broker,
            fanout,
            cancel,
        }
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn next_event(sub: &mut Subscription) -> HandoffEvent {
    tokio::time::timeout(Duration::from_secs(2), sub.recv())
        .await
        .expect("timed out waiting for event")
        .expect("subscription closed")
}

fn expect_question(event: HandoffEvent) -> (SessionId, RequestId, String) {
    match event {
        HandoffEvent::HumanInput {
            session_id,
            request_id,
            question,
        } => (session_id, request_id, question),
        HandoffEvent::TaskResult { .. } => panic!("expected human_input, got task_result"),
    }
}

#[tokio::test]
async fn full_flow_question_answer_result() {
    let h = Harness::new(RestartPolicy::ClearAllSessions);
    let mut sub = h.fanout.subscribe();

    let task_id = h
        .supervisor
        .start("pizza".into(), SessionId::from("s1"));

    // The worker's question reaches the observer
    let (session_id, request_id, question) = expect_question(next_event(&mut sub).await);
    assert_eq!(session_id.as_str(), "s1");
    assert_eq!(question, "size?");

    // The observer answers out-of-band; the worker resumes and finishes
    assert!(h.broker.resolve_any(&request_id, "large".into()));

    match next_event(&mut sub).await {
        HandoffEvent::TaskResult {
            task_id: event_task_id,
            status,
            payload,
            ..
        } => {
            assert_eq!(event_task_id, task_id);
            assert_eq!(status, TaskStatus::Complete);
            let payload = payload.unwrap();
            assert_eq!(payload["item"], "pizza");
            assert_eq!(payload["size"], "large");
        }
        HandoffEvent::HumanInput { .. } => panic!("expected task_result"),
    }

    // A late duplicate answer is acknowledged as a no-op
    assert!(!h.broker.resolve_any(&request_id, "small".into()));
}

#[tokio::test]
async fn restart_cancels_first_run_and_releases_its_ask() {
    let h = Harness::new(RestartPolicy::ClearAllSessions);
    let mut sub = h.fanout.subscribe();

    let first = h.supervisor.start("one".into(), SessionId::from("s1"));
    let (_, first_request, _) = expect_question(next_event(&mut sub).await);

    // Second start supersedes the first run
    let second = h.supervisor.start("two".into(), SessionId::from("s2"));
    assert_eq!(h.supervisor.run_state(&first), Some(RunState::Cancelled));

    // The first run's ask was released: its request id is gone
    assert!(!h.broker.resolve_any(&first_request, "too late".into()));

    // Exactly one terminal event is observed, and it belongs to the second run
    let (_, second_request, _) = expect_question(next_event(&mut sub).await);
    assert!(h.broker.resolve_any(&second_request, "medium".into()));

    match next_event(&mut sub).await {
        HandoffEvent::TaskResult {
            task_id, status, ..
        } => {
            assert_eq!(task_id, second);
            assert_eq!(status, TaskStatus::Complete);
        }
        HandoffEvent::HumanInput { .. } => panic!("expected task_result"),
    }

    // Nothing further: the first run never publishes a terminal event
    let nothing = tokio::time::timeout(Duration::from_millis(200), sub.recv()).await;
    assert!(nothing.is_err());
}

#[tokio::test]
async fn clear_own_session_spares_unrelated_pending_requests() {
    let h = Harness::new(RestartPolicy::ClearOwnSession);
    let mut sub = h.fanout.subscribe();

    // An unrelated conversation with its own pending question
    let unrelated = {
        let broker = h.broker.clone();
        tokio::spawn(async move { broker.ask(&SessionId::from("other"), "still there?").await })
    };
    let (_, unrelated_request, _) = expect_question(next_event(&mut sub).await);

    // Run in s1 asks, then gets superseded
    let _first = h.supervisor.start("one".into(), SessionId::from("s1"));
    let _ = expect_question(next_event(&mut sub).await);
    let _second = h.supervisor.start("two".into(), SessionId::from("s1"));

    // Only s1 was torn down; the unrelated ask still resolves
    assert!(h.broker.resolve_any(&unrelated_request, "yes".into()));
    assert_eq!(unrelated.await.unwrap().unwrap(), "yes");
}

#[tokio::test]
async fn clear_all_sessions_drops_unrelated_pending_requests() {
    let h = Harness::new(RestartPolicy::ClearAllSessions);
    let mut sub = h.fanout.subscribe();

    let unrelated = {
        let broker = h.broker.clone();
        tokio::spawn(async move { broker.ask(&SessionId::from("other"), "still there?").await })
    };
    let _ = expect_question(next_event(&mut sub).await);

    let _first = h.supervisor.start("one".into(), SessionId::from("s1"));
    let _ = expect_question(next_event(&mut sub).await);
    let _second = h.supervisor.start("two".into(), SessionId::from("s1"));

    // Every pending request everywhere is dropped, including other sessions
    let err = unrelated.await.unwrap().unwrap_err();
    assert!(matches!(err, RuntimeError::AskCancelled { .. }));
}

#[tokio::test]
async fn failing_worker_produces_error_event_and_clears_index() {
    let h = Harness::new(RestartPolicy::ClearAllSessions);
    let mut sub = h.fanout.subscribe();

    let task_id = h.supervisor.start(String::new(), SessionId::from("s1"));

    match next_event(&mut sub).await {
        HandoffEvent::TaskResult {
            task_id: event_task_id,
            status,
            error,
            ..
        } => {
            assert_eq!(event_task_id, task_id);
            assert_eq!(status, TaskStatus::Error);
            assert_eq!(error.as_deref(), Some("bad input"));
        }
        HandoffEvent::HumanInput { .. } => panic!("expected task_result"),
    }

    assert_eq!(h.supervisor.run_state(&task_id), Some(RunState::Failed));
    assert!(!h.supervisor.has_active_run());
}

#[tokio::test]
async fn observer_disconnect_does_not_stop_delivery_to_others() {
    let h = Harness::new(RestartPolicy::ClearAllSessions);
    let doomed = h.fanout.subscribe();
    let mut watching = h.fanout.subscribe();

    drop(doomed);

    let _task_id = h.supervisor.start("pizza".into(), SessionId::from("s1"));
    let (_, request_id, _) = expect_question(next_event(&mut watching).await);
    assert!(h.broker.resolve_any(&request_id, "small".into()));

    match next_event(&mut watching).await {
        HandoffEvent::TaskResult { status, .. } => assert_eq!(status, TaskStatus::Complete),
        HandoffEvent::HumanInput { .. } => panic!("expected task_result"),
    }
}
