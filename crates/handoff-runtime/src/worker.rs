//! The worker contract and its injected input capability.

use std::sync::Arc;

use async_trait::async_trait;
use handoff_core::SessionId;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::broker::RequestBroker;
use crate::errors::RuntimeError;

/// An autonomous unit of work that may pause for human input.
///
/// The worker sees exactly one side effect: `input.ask(question)` suspends
/// until an operator answers. Everything else about how questions travel to
/// observers is opaque to it.
#[async_trait]
pub trait Worker: Send + Sync {
    /// Run to completion, returning an opaque success payload.
    async fn run(&self, input: &str, channel: &InputChannel) -> Result<Value, RuntimeError>;
}

/// The single capability handed to a worker: ask a question, get an answer.
///
/// Bound to one session so concurrent runs never see each other's requests,
/// and to the run's cancellation token so a superseded worker cannot register
/// new requests or publish stale questions while its abort is in flight.
#[derive(Clone)]
pub struct InputChannel {
    session_id: SessionId,
    broker: Arc<RequestBroker>,
    cancel: CancellationToken,
}

impl InputChannel {
    /// Bind a channel to a session and its run's cancellation token.
    #[must_use]
    pub fn new(session_id: SessionId, broker: Arc<RequestBroker>, cancel: CancellationToken) -> Self {
        Self {
            session_id,
            broker,
            cancel,
        }
    }

    /// Ask the operator a question and suspend until they answer.
    ///
    /// Fails fast with [`RuntimeError::RunCancelled`] once the run has been
    /// superseded, without registering a request or emitting an event.
    pub async fn ask(&self, question: &str) -> Result<String, RuntimeError> {
        if self.cancel.is_cancelled() {
            return Err(RuntimeError::RunCancelled);
        }
        self.broker.ask(&self.session_id, question).await
    }

    /// The session this channel is bound to.
    #[must_use]
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fanout::EventFanout;
    use handoff_core::{HandoffEvent, RequestId};
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn channel_asks_under_its_session() {
        let fanout = Arc::new(EventFanout::new());
        let broker = Arc::new(RequestBroker::new(fanout.clone()));
        let cancel = CancellationToken::new();
        let _broadcaster = fanout.spawn_broadcaster(cancel.clone());
        let mut sub = fanout.subscribe();

        let channel = InputChannel::new(
            SessionId::from("sess-x"),
            broker.clone(),
            CancellationToken::new(),
        );
        assert_eq!(channel.session_id().as_str(), "sess-x");

        let asker = tokio::spawn(async move { channel.ask("topping?").await });

        let event = tokio::time::timeout(Duration::from_secs(1), sub.recv())
            .await
            .unwrap()
            .unwrap();
        let request_id: RequestId = match event {
            HandoffEvent::HumanInput {
                session_id,
                request_id,
                question,
            } => {
                assert_eq!(session_id.as_str(), "sess-x");
                assert_eq!(question, "topping?");
                request_id
            }
            HandoffEvent::TaskResult { .. } => panic!("expected human_input"),
        };

        assert!(broker.resolve(&SessionId::from("sess-x"), &request_id, "olives".into()));
        assert_eq!(asker.await.unwrap().unwrap(), "olives");
        cancel.cancel();
    }

    #[tokio::test]
    async fn cancelled_channel_refuses_to_ask() {
        let fanout = Arc::new(EventFanout::new());
        let broker = Arc::new(RequestBroker::new(fanout.clone()));
        let run_cancel = CancellationToken::new();
        let channel = InputChannel::new(SessionId::from("sess-y"), broker.clone(), run_cancel.clone());

        run_cancel.cancel();
        let err = channel.ask("too late?").await.unwrap_err();
        assert!(matches!(err, RuntimeError::RunCancelled));

        // Nothing was registered, so there is nothing to deliver or leak
        assert_eq!(broker.pending_count(), 0);
        assert!(broker.undelivered(None).is_empty());
    }
}
