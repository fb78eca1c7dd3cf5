// SPDX-License-Identifier: MIT OR Apache-2.0
//! `taskmesh-router` binary entry point.

use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use taskmesh_core::clock::SystemClock;
use taskmesh_fs::{AgentsRoot, SystemPaths};
use taskmesh_router::config::Args;
use taskmesh_router::{tick, RouterContext};
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

    let schemas = match &args.schemas_dir {
        Some(dir) => SchemaRegistry::load(dir)?,
        None => SchemaRegistry::load("/nonexistent")?,
    };

    let ctx = RouterContext {
        agents_root: AgentsRoot::new(&args.agents_root),
        system: SystemPaths::new(&args.system_runtime),
        schemas,
        schema_validation_enabled: args.schemas_dir.is_some(),
        clock: &SystemClock,
    };

    let mut shutdown = std::pin::pin!(shutdown_signal());
    loop {
        let summary = tick(&ctx)?;
        tracing::info!(
            delivered = summary.delivered,
            skipped_duplicate = summary.skipped_duplicate,
            skipped_superseded = summary.skipped_superseded,
            deadlettered = summary.deadlettered,
            "router tick complete"
        );
        if args.once {
            break;
        }
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(args.poll_interval_seconds)) => {}
            _ = &mut shutdown => {
                tracing::info!("shutdown signal received, draining current tick and exiting");
                break;
            }
        }
    }
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
