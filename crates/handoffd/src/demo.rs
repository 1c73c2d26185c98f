//! A demonstration worker exercising the full handoff loop.
//!
//! Takes an order item as input, pauses to ask the operator for a size, and
//! produces the completed order as its payload.

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::info;

use handoff_runtime::{InputChannel, RuntimeError, Worker};

/// Processes a single order, asking the operator one clarifying question.
pub struct DemoWorker;

#[async_trait]
impl Worker for DemoWorker {
    async fn run(&self, input: &str, channel: &InputChannel) -> Result<Value, RuntimeError> {
        let item = input.trim();
        if item.is_empty() {
            return Err(RuntimeError::worker("bad input"));
        }

        info!(item, "processing order");
        let size = channel.ask(&format!("What size {item}?")).await?;
        info!(item, size, "order complete");

        Ok(json!({
            "item": item,
            "size": size,
            "status": "ordered",
        }))
    }
}
