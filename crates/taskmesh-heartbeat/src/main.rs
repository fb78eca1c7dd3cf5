// SPDX-License-Identifier: MIT OR Apache-2.0
//! `taskmesh-heartbeat` binary entry point.

use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use taskmesh_core::clock::SystemClock;
use taskmesh_fs::{AgentsRoot, SystemPaths};
use taskmesh_heartbeat::config::{Args, HeartbeatConfig};
use taskmesh_heartbeat::{tick, DefaultCommandHandler, HeartbeatContext};
use taskmesh_schema::SchemaRegistry;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = if args.debug {
        EnvFilter::new("taskmesh=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("taskmesh=info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut config = HeartbeatConfig::load(&args.agent_root.join("heartbeat_config.json"))?;
    if let Some(poll_interval) = args.poll_interval_seconds {
        config.poll_interval_seconds = poll_interval;
    }
    let schemas_dir = args
        .schemas_dir
        .clone()
        .or_else(|| config.schema_validation.schemas_base_dir.clone());
    let schema_validation_enabled = config.schema_validation.enabled && schemas_dir.is_some();
    let schemas = match &schemas_dir {
        Some(dir) if schema_validation_enabled => SchemaRegistry::load(dir)?,
        _ => SchemaRegistry::load("/nonexistent")?,
    };

    let agent_id = config.agent_id.clone();
    let handler = DefaultCommandHandler;
    let poll_interval = config.poll_interval_seconds;
    let ctx = HeartbeatContext {
        agent: AgentsRoot::new(&args.agents_root).agent(&agent_id),
        agents_root: AgentsRoot::new(&args.agents_root),
        system: SystemPaths::new(&args.system_runtime),
        schemas,
        schema_validation_enabled,
        config,
        handler: &handler,
        clock: &SystemClock,
    };

    let mut shutdown = std::pin::pin!(shutdown_signal());
    loop {
        let summary = tick(&ctx)?;
        tracing::info!(
            agent = %agent_id,
            claimed = summary.claimed,
            resumed = summary.resumed,
            "heartbeat tick complete"
        );
        if args.once {
            break;
        }
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(poll_interval)) => {}
            _ = &mut shutdown => {
                tracing::info!(agent = %agent_id, "shutdown signal received, draining current tick and exiting");
                break;
            }
        }
    }
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
