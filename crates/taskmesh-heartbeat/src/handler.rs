// SPDX-License-Identifier: MIT OR Apache-2.0
//! The pluggable command handler capability.
//!
//! The handler itself — arbitrary user code that turns a prompt into
//! artifacts — is out of scope here; this module only defines the
//! narrow interface the heartbeat calls through, plus a no-op default so
//! the crate runs out of the box without one.

use std::path::{Path, PathBuf};

use anyhow::Result;
use taskmesh_core::{Command, Envelope};

/// What a handler is given to do its work.
pub struct HandlerContext<'a> {
    /// This agent's id.
    pub agent_id: &'a str,
    /// The plan being worked on.
    pub plan_id: &'a str,
    /// The task this command belongs to.
    pub task_id: &'a str,
    /// `agents/<id>/workspace/<plan>/tasks/<task_id>/`, the agent's
    /// private scratch directory for this task.
    pub task_workspace: &'a Path,
    /// `agents/<id>/workspace/<plan>/inputs/`, where ingested artifacts
    /// live.
    pub inputs_dir: &'a Path,
}

/// One file a handler produced.
#[derive(Debug, Clone)]
pub struct ProducedFile {
    /// Path the file should be written to, relative to the outbox.
    pub path: String,
    /// Raw file bytes. Stripped before anything derived from this ends
    /// up in an ack.
    pub content: Vec<u8>,
    /// MIME type, if known.
    pub content_type: Option<String>,
}

/// One output a handler produced, to be written as an artifact envelope.
#[derive(Debug, Clone)]
pub struct ProducedArtifact {
    /// Must match one of the command's `produces[].output_name` entries.
    pub output_name: String,
    /// The files this output carries.
    pub files: Vec<ProducedFile>,
}

/// What a handler returns from a successful run.
#[derive(Debug, Clone, Default)]
pub struct CommandDetails {
    /// Artifacts to write to the outbox.
    pub artifacts: Vec<ProducedArtifact>,
    /// A numeric score, required when `command.score_required` is set.
    pub score: Option<f64>,
    /// Free-form summary, stored in the ack's `result`.
    pub summary: Option<String>,
}

/// The result of a handler invocation.
#[derive(Debug, Clone)]
pub struct CommandOutcome {
    /// Whether the command succeeded.
    pub ok: bool,
    /// Present on success; absent (or ignored) on failure.
    pub details: Option<CommandDetails>,
    /// Failure detail, for a `FAILED` ack's `result`.
    pub error: Option<String>,
}

impl CommandOutcome {
    /// A successful outcome with no artifacts.
    #[must_use]
    pub fn ok() -> Self {
        Self {
            ok: true,
            details: Some(CommandDetails::default()),
            error: None,
        }
    }
}

/// The narrow capability interface a command handler implements.
pub trait CommandHandler: Send + Sync {
    /// Execute `command`, embedded in `envelope`, with `ctx` describing
    /// where this task's workspace lives.
    fn handle_command(
        &self,
        envelope: &Envelope,
        command: &Command,
        ctx: &HandlerContext<'_>,
    ) -> Result<CommandOutcome>;
}

/// A handler that does nothing and always succeeds, so the crate is
/// runnable without an external plugin wired in.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultCommandHandler;

impl CommandHandler for DefaultCommandHandler {
    fn handle_command(
        &self,
        _envelope: &Envelope,
        _command: &Command,
        _ctx: &HandlerContext<'_>,
    ) -> Result<CommandOutcome> {
        Ok(CommandOutcome::ok())
    }
}

/// Resolve a task's private scratch directory, creating it if absent.
pub fn ensure_task_workspace(workspace_root: &Path, task_id: &str) -> Result<PathBuf> {
    let dir = workspace_root.join("tasks").join(task_id);
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}
