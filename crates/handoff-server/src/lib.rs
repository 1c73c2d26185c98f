//! # handoff-server
//!
//! The HTTP boundary of the handoff service (axum):
//!
//! - `POST /agent/start` — start a run (cancels the previous one)
//! - `GET /events` — SSE stream of questions and results, with heartbeats
//! - `POST /respond` — submit an answer; always acknowledged
//! - `GET /requests/pending` — poll undelivered questions (late subscribers)
//! - `GET /health` — liveness and counters

#![deny(unsafe_code)]

pub mod config;
pub mod health;
pub mod server;
pub mod shutdown;

pub use config::ServerConfig;
pub use server::{AppState, HandoffServer};
pub use shutdown::ShutdownCoordinator;
