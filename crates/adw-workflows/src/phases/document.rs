//! Document phase
//!
//! Generates feature documentation in the docs directory and commits
//! it alongside the implementation.

use adw_agents::AgentRequest;
use adw_core::{PhaseStatus, Result};

use crate::context::PhaseContext;
use crate::phase::{commit_and_push, ensure_worktree, Phase, PhaseOptions};

pub async fn run(ctx: &PhaseContext, run_id: &str, _opts: &PhaseOptions) -> Result<()> {
    let phase = Phase::Document;
    let name = phase.name();

    let (state, worktree) = ensure_worktree(ctx, run_id).await?;

    ctx.emit_status(run_id, name, PhaseStatus::Running, 20, Some("documenting"));
    let mut args = vec![ctx.config.docs_dir.clone(), run_id.to_string()];
    if let Some(plan_file) = &state.plan_file {
        args.insert(0, plan_file.clone());
    }
    let request = AgentRequest::new(phase.agent_name(), run_id, name, "/document")
        .with_args(args)
        .with_model_set(state.model_set)
        .with_working_dir(&worktree);
    ctx.agents.execute_with_retry(&request).await?;

    ctx.emit_status(run_id, name, PhaseStatus::Running, 80, Some("committing docs"));
    commit_and_push(
        ctx,
        run_id,
        phase,
        &state,
        &worktree,
        &format!("docs: document changes ({run_id})"),
    )
    .await?;

    ctx.store
        .save_snapshot(run_id, "document")
        .await
        .map_err(adw_core::Error::from)?;
    Ok(())
}
