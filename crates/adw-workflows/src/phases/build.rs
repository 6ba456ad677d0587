//! Build phase
//!
//! Dependent phase: runs the implementation agent against the stored
//! plan file and commits the resulting source changes.

use adw_agents::AgentRequest;
use adw_core::{Error, LogLevel, PhaseStatus, Result};

use crate::context::PhaseContext;
use crate::phase::{commit_and_push, ensure_worktree, Phase, PhaseOptions};

pub async fn run(ctx: &PhaseContext, run_id: &str, _opts: &PhaseOptions) -> Result<()> {
    let phase = Phase::Build;
    let name = phase.name();

    let (state, worktree) = ensure_worktree(ctx, run_id).await?;
    let plan_file = state
        .plan_file
        .clone()
        .ok_or_else(|| Error::internal(format!("run {run_id} has no plan_file; run plan first")))?;

    ctx.emit_status(run_id, name, PhaseStatus::Running, 20, Some("implementing"));
    let request = AgentRequest::new(phase.agent_name(), run_id, name, "/implement")
        .with_args([plan_file.as_str(), run_id])
        .with_model_set(state.model_set)
        .with_working_dir(&worktree);
    ctx.agents.execute_with_retry(&request).await?;

    ctx.emit_status(run_id, name, PhaseStatus::Running, 80, Some("committing"));
    commit_and_push(
        ctx,
        run_id,
        phase,
        &state,
        &worktree,
        &format!("build: implement {plan_file} ({run_id})"),
    )
    .await?;

    ctx.store
        .save_snapshot(run_id, "build")
        .await
        .map_err(adw_core::Error::from)?;

    if let Some(source) = state.issue_source() {
        if let Err(e) = ctx
            .forge
            .post_comment(&source, run_id, "Implementation complete")
            .await
        {
            ctx.system_log(
                run_id,
                name,
                LogLevel::Warn,
                format!("comment post failed: {e}"),
            );
        }
    }

    Ok(())
}
