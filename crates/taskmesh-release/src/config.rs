// SPDX-License-Identifier: MIT OR Apache-2.0
//! Release coordinator CLI configuration.

use std::path::PathBuf;

use clap::Parser;

/// `taskmesh-release` command-line flags.
#[derive(Debug, Parser)]
#[command(name = "taskmesh-release", about = "Filesystem release gate evaluator")]
pub struct Args {
    /// Directory containing one subdirectory per agent (`agents/`).
    #[arg(long, default_value = "./agents")]
    pub agents_root: PathBuf,

    /// The shared control-plane directory (`system_runtime/`).
    #[arg(long, default_value = "./system_runtime")]
    pub system_runtime: PathBuf,

    /// Directory of `*.schema.json` files, or omit to skip validation.
    #[arg(long)]
    pub schemas_dir: Option<PathBuf>,

    /// Seconds to sleep between ticks.
    #[arg(long, default_value_t = 10)]
    pub poll_interval_seconds: u64,

    /// Run exactly one tick and exit, instead of looping forever.
    #[arg(long)]
    pub once: bool,

    /// Emit `taskmesh=debug` logs instead of `taskmesh=info`.
    #[arg(long)]
    pub debug: bool,
}
