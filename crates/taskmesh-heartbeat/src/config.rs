// SPDX-License-Identifier: MIT OR Apache-2.0
//! `heartbeat_config.json` and CLI flags.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use serde::{Deserialize, Serialize};

/// `plans.scan_mode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanMode {
    /// Process every plan with traffic in this agent's inbox/outbox.
    Auto,
    /// Only process plans named in `plans.allowlist`.
    AllowlistOnly,
}

/// `heartbeat_config.json`'s `plans` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlansConfig {
    /// How to decide which plans to process.
    pub scan_mode: ScanMode,
    /// The plan ids to process when `scan_mode == allowlist_only`.
    #[serde(default)]
    pub allowlist: Vec<String>,
}

/// `heartbeat_config.json`'s `schema_validation` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaValidationConfig {
    /// Whether to validate envelopes/commands against schemas.
    pub enabled: bool,
    /// Override for the schemas base directory; relative paths resolve
    /// against the config file's own directory.
    #[serde(default)]
    pub schemas_base_dir: Option<PathBuf>,
}

/// `agents/<id>/heartbeat_config.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatConfig {
    /// Always `"1.0"`.
    #[serde(default = "default_schema_version")]
    pub schema_version: String,
    /// This agent's id; must match the directory this config lives in.
    pub agent_id: String,
    /// Seconds to sleep between ticks.
    pub poll_interval_seconds: u64,
    /// Cap on newly claimed inbox envelopes per tick.
    #[serde(default = "default_max_new_messages")]
    pub max_new_messages_per_tick: u32,
    /// Cap on `.pending/` entries re-walked per tick.
    #[serde(default = "default_max_resume_messages")]
    pub max_resume_messages_per_tick: u32,
    /// Which plans this agent processes.
    pub plans: PlansConfig,
    /// Schema validation settings.
    pub schema_validation: SchemaValidationConfig,
}

fn default_schema_version() -> String {
    "1.0".to_string()
}

fn default_max_new_messages() -> u32 {
    50
}

fn default_max_resume_messages() -> u32 {
    10
}

impl HeartbeatConfig {
    /// Load and parse a config file, resolving a relative
    /// `schema_validation.schemas_base_dir` against the config file's own
    /// directory: the override is meant to be portable with the config
    /// file, not the process's current working directory.
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).with_context(|| format!("reading {path:?}"))?;
        let mut config: Self =
            serde_json::from_slice(&bytes).with_context(|| format!("parsing {path:?}"))?;
        if let Some(base_dir) = &config.schema_validation.schemas_base_dir {
            if base_dir.is_relative() {
                if let Some(config_dir) = path.parent() {
                    config.schema_validation.schemas_base_dir = Some(config_dir.join(base_dir));
                }
            }
        }
        Ok(config)
    }
}

/// `taskmesh-heartbeat` command-line flags.
#[derive(Debug, Parser)]
#[command(name = "taskmesh-heartbeat", about = "Per-agent message consumer")]
pub struct Args {
    /// The agent's own root directory (containing `inbox/`, `outbox/`,
    /// `workspace/`, `heartbeat_config.json`).
    #[arg(long)]
    pub agent_root: PathBuf,

    /// Directory containing one subdirectory per agent.
    #[arg(long, default_value = "./agents")]
    pub agents_root: PathBuf,

    /// The shared `system_runtime/` directory (alerts, deadletters,
    /// human requests, plan manifests).
    #[arg(long, default_value = "./system_runtime")]
    pub system_runtime: PathBuf,

    /// Directory of `*.schema.json` files; overrides
    /// `schema_validation.schemas_base_dir` if given.
    #[arg(long)]
    pub schemas_dir: Option<PathBuf>,

    /// Seconds to sleep between ticks; overrides
    /// `poll_interval_seconds` if given.
    #[arg(long)]
    pub poll_interval_seconds: Option<u64>,

    /// Run exactly one tick and exit.
    #[arg(long)]
    pub once: bool,

    /// Emit `taskmesh=debug` logs instead of `taskmesh=info`.
    #[arg(long)]
    pub debug: bool,
}
