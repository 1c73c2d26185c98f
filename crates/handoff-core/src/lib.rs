//! # handoff-core
//!
//! Foundation types for the handoff coordination service.
//!
//! This crate provides the shared vocabulary the runtime and server crates
//! depend on:
//!
//! - **Branded IDs**: `SessionId`, `RequestId`, `TaskId` as newtypes for type safety
//! - **Wire events**: `HandoffEvent` — the tagged events streamed to observers
//! - **Logging**: `init_subscriber` for the `tracing` bootstrap

#![deny(unsafe_code)]

pub mod events;
pub mod ids;
pub mod logging;

pub use events::{HandoffEvent, TaskStatus};
pub use ids::{RequestId, SessionId, TaskId};
