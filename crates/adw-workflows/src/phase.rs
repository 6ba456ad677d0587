//! Phase model and shared phase plumbing

use std::path::PathBuf;
use std::time::Instant;
use tracing::{error, info};

use adw_core::{Error, LogLevel, PhaseStatus, Result};
use adw_state::{DataSource, InlineIssue, ModelSet, RunState};

use crate::context::PhaseContext;
use crate::phases;

/// One atomic pipeline step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Plan,
    Patch,
    Build,
    Test,
    Review,
    Document,
    Ship,
}

impl Phase {
    pub fn name(self) -> &'static str {
        match self {
            Phase::Plan => "plan",
            Phase::Patch => "patch",
            Phase::Build => "build",
            Phase::Test => "test",
            Phase::Review => "review",
            Phase::Document => "document",
            Phase::Ship => "ship",
        }
    }

    /// Namespace for the phase's agent output directory.
    pub fn agent_name(self) -> &'static str {
        match self {
            Phase::Plan => "planner",
            Phase::Patch => "patcher",
            Phase::Build => "implementor",
            Phase::Test => "tester",
            Phase::Review => "reviewer",
            Phase::Document => "documenter",
            Phase::Ship => "shipper",
        }
    }

    /// Entry phases may create the run; dependent phases require one.
    pub fn is_entry(self) -> bool {
        matches!(self, Phase::Plan | Phase::Patch)
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "plan" => Some(Phase::Plan),
            "patch" => Some(Phase::Patch),
            "build" => Some(Phase::Build),
            "test" => Some(Phase::Test),
            "review" => Some(Phase::Review),
            "document" => Some(Phase::Document),
            "ship" => Some(Phase::Ship),
            _ => None,
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Caller-supplied knobs for a phase or pipeline run
#[derive(Debug, Clone, Default)]
pub struct PhaseOptions {
    pub issue_number: Option<String>,
    pub model_set: ModelSet,
    pub data_source: DataSource,
    /// Inline issue for board-mode runs
    pub board_issue: Option<InlineIssue>,
    /// Skip browser end-to-end coverage (review/test)
    pub skip_e2e: bool,
    /// Skip the review blocker-resolution sub-loop
    pub skip_resolution: bool,
}

/// Outcome of one phase execution
#[derive(Debug)]
pub struct PhaseResult {
    pub phase: Phase,
    pub run_id: String,
    pub success: bool,
    pub error: Option<Error>,
    pub duration_ms: u64,
}

/// Run one phase with the standard envelope: `started` status, body,
/// terminal `completed`/`failed` status, system log entries.
pub async fn run_phase(
    ctx: &PhaseContext,
    phase: Phase,
    run_id: &str,
    opts: &PhaseOptions,
) -> PhaseResult {
    let start = Instant::now();
    let name = phase.name();

    info!(run_id = %run_id, phase = %name, "Phase started");
    ctx.emit_status(run_id, name, PhaseStatus::Started, 0, None);
    ctx.system_log(run_id, name, LogLevel::Info, format!("{name} phase started"));

    let outcome = match phase {
        Phase::Plan => phases::plan::run(ctx, run_id, opts).await,
        Phase::Patch => phases::patch::run(ctx, run_id, opts).await,
        Phase::Build => phases::build::run(ctx, run_id, opts).await,
        Phase::Test => phases::test::run(ctx, run_id, opts).await,
        Phase::Review => phases::review::run(ctx, run_id, opts).await,
        Phase::Document => phases::document::run(ctx, run_id, opts).await,
        Phase::Ship => phases::ship::run(ctx, run_id, opts).await,
    };

    let duration_ms = start.elapsed().as_millis() as u64;
    match outcome {
        Ok(()) => {
            ctx.emit_status(run_id, name, PhaseStatus::Completed, 100, None);
            ctx.system_log(
                run_id,
                name,
                LogLevel::Success,
                format!("{name} phase completed in {duration_ms}ms"),
            );
            info!(run_id = %run_id, phase = %name, duration_ms = duration_ms, "Phase completed");
            PhaseResult {
                phase,
                run_id: run_id.to_string(),
                success: true,
                error: None,
                duration_ms,
            }
        }
        Err(e) => {
            ctx.emit_status(run_id, name, PhaseStatus::Failed, 100, Some(&e.to_string()));
            ctx.system_log(
                run_id,
                name,
                LogLevel::Error,
                format!("{name} phase failed: {e}"),
            );
            error!(run_id = %run_id, phase = %name, error = %e, "Phase failed");
            PhaseResult {
                phase,
                run_id: run_id.to_string(),
                success: false,
                error: Some(e),
                duration_ms,
            }
        }
    }
}

/// Dependent-phase precondition: state exists, a worktree is
/// recorded, and the three-way consistency check passes.
pub async fn ensure_worktree(ctx: &PhaseContext, run_id: &str) -> Result<(RunState, PathBuf)> {
    let state = ctx.store.load(run_id).await.map_err(adw_core::Error::from)?;
    let path = state
        .worktree_path
        .clone()
        .ok_or_else(|| Error::NoWorktree(run_id.to_string()))?;
    ctx.worktrees.validate(run_id, &path).await?;
    Ok((state, path))
}

/// Commit-and-push helper used at the end of most phase bodies.
/// A clean tree commits nothing but still succeeds.
pub async fn commit_and_push(
    ctx: &PhaseContext,
    run_id: &str,
    phase: Phase,
    state: &RunState,
    worktree: &std::path::Path,
    message: &str,
) -> Result<()> {
    let committed = ctx
        .git
        .commit(message, worktree)
        .await
        .map_err(adw_core::Error::from)?;
    if !committed {
        ctx.system_log(
            run_id,
            phase.name(),
            LogLevel::Warn,
            "no changes to commit",
        );
        return Ok(());
    }
    if let Some(branch) = &state.branch_name {
        ctx.git
            .push(branch, worktree)
            .await
            .map_err(adw_core::Error::from)?;
    }
    Ok(())
}

/// Filesystem-safe slug from an issue title: lowercase alphanumerics
/// joined by single dashes, bounded length.
pub fn slugify(title: &str) -> String {
    let mut slug = String::new();
    let mut last_dash = true;
    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
        if slug.len() >= 48 {
            break;
        }
    }
    slug.trim_matches('-').to_string()
}
