//! # handoff-runtime
//!
//! The coordination layer between autonomous workers and human observers.
//!
//! A worker suspends on [`InputChannel::ask`] until an operator answers via
//! the [`RequestBroker`]; questions and run outcomes reach observers through
//! the [`EventFanout`]; the [`TaskSupervisor`] runs workers as cancellable
//! units of work, cancelling the previous run whenever a new one starts.
//!
//! [`InputChannel::ask`]: worker::InputChannel::ask
//! [`RequestBroker`]: broker::RequestBroker
//! [`EventFanout`]: fanout::EventFanout
//! [`TaskSupervisor`]: supervisor::TaskSupervisor

#![deny(unsafe_code)]

pub mod broker;
pub mod errors;
pub mod fanout;
pub mod sessions;
pub mod supervisor;
pub mod worker;

pub use broker::RequestBroker;
pub use errors::RuntimeError;
pub use fanout::{EventFanout, Subscription};
pub use sessions::PendingQuestion;
pub use supervisor::{RestartPolicy, RunState, TaskSupervisor};
pub use worker::{InputChannel, Worker};
