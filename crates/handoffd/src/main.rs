//! # handoffd
//!
//! Handoff coordination server binary. Wires the broker, event fan-out, and
//! run supervisor together behind the HTTP boundary, with a demonstration
//! worker driving the human-in-the-loop flow.

#![deny(unsafe_code)]

mod demo;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};

use handoff_runtime::{EventFanout, RequestBroker, RestartPolicy, TaskSupervisor, Worker};
use handoff_server::{HandoffServer, ServerConfig};

/// Handoff coordination server.
#[derive(Parser, Debug)]
#[command(name = "handoffd", about = "Human-in-the-loop coordination server")]
struct Cli {
    /// Host to bind (overrides the config file).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (overrides the config file; 0 for auto-assign).
    #[arg(long)]
    port: Option<u16>,

    /// Path to a JSON config file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// What a superseding run does to pending requests.
    #[arg(long, value_enum, default_value_t = PolicyArg::ClearAllSessions)]
    restart_policy: PolicyArg,

    /// Default log level (RUST_LOG takes precedence).
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum PolicyArg {
    /// Cancel pending requests in every session.
    ClearAllSessions,
    /// Cancel only the superseded run's own session.
    ClearOwnSession,
}

impl From<PolicyArg> for RestartPolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::ClearAllSessions => RestartPolicy::ClearAllSessions,
            PolicyArg::ClearOwnSession => RestartPolicy::ClearOwnSession,
        }
    }
}

impl Cli {
    fn server_config(&self) -> ServerConfig {
        let mut config = match &self.config {
            Some(path) => ServerConfig::load_or_default(path),
            None => ServerConfig::default(),
        };
        if let Some(host) = &self.host {
            config.host.clone_from(host);
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    handoff_core::logging::init_subscriber(&args.log_level);

    let config = args.server_config();

    // Coordination layer
    let fanout = Arc::new(EventFanout::new());
    let broker = Arc::new(RequestBroker::new(fanout.clone()));
    let worker: Arc<dyn Worker> = Arc::new(demo::DemoWorker);
    let supervisor = Arc::new(TaskSupervisor::new(
        broker.clone(),
        fanout.clone(),
        worker,
        args.restart_policy.into(),
    ));

    // HTTP boundary
    let shutdown_timeout = Duration::from_secs(config.shutdown_timeout_secs);
    let server = HandoffServer::new(config, broker, fanout.clone(), supervisor);

    // The broadcaster shares the server's shutdown token so both drain together
    let broadcaster = fanout.spawn_broadcaster(server.shutdown().token());
    let (addr, server_handle) = server.listen().await.context("Failed to bind server")?;

    tracing::info!("handoffd listening on http://{addr}");

    // Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    server
        .shutdown()
        .graceful_shutdown(vec![broadcaster, server_handle], shutdown_timeout)
        .await;

    tracing::info!("Shutdown complete");
    Ok(())
}
