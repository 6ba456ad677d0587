//! Patch phase
//!
//! Entry phase for follow-up work: produces a patch plan against an
//! issue (or a review change request), on its own branch and
//! worktree, and records the patch chain in state.

use adw_agents::AgentRequest;
use adw_core::{Error, LogLevel, PhaseStatus, Result};

use crate::context::PhaseContext;
use crate::phase::{commit_and_push, slugify, Phase, PhaseOptions};
use crate::phases::entry;

pub async fn run(ctx: &PhaseContext, run_id: &str, opts: &PhaseOptions) -> Result<()> {
    let phase = Phase::Patch;
    let name = phase.name();

    let state = entry::init_state(ctx, run_id, opts).await?;
    let issue_label = entry::issue_label(&state);

    ctx.emit_status(run_id, name, PhaseStatus::Running, 10, Some("fetching issue"));
    let (issue, issue_file) = entry::fetch_and_record_issue(ctx, name, &state).await?;
    let issue_arg = issue_file.to_string_lossy().to_string();

    // Patch runs reuse their worktree when re-invoked for the same
    // run id; first contact provisions one.
    let (worktree, branch_name) = match (&state.worktree_path, &state.branch_name) {
        (Some(path), Some(branch)) => {
            ctx.worktrees.validate(run_id, path).await?;
            (path.clone(), branch.clone())
        }
        _ => {
            ctx.emit_status(
                run_id,
                name,
                PhaseStatus::Running,
                25,
                Some("creating worktree"),
            );
            let branch = format!(
                "patch-issue-{issue_label}-run-{run_id}-{}",
                slugify(&issue.title)
            );
            let (ports, path) = entry::provision_worktree(ctx, run_id, name, &branch).await?;
            ctx.store
                .update(run_id, |s| {
                    s.branch_name = Some(branch.clone());
                    s.worktree_path = Some(path.clone());
                    s.ws_port = Some(ports.ws);
                    s.fe_port = Some(ports.fe);
                })
                .await
                .map_err(adw_core::Error::from)?;
            ctx.store
                .save_snapshot(run_id, "patch:worktree")
                .await
                .map_err(adw_core::Error::from)?;
            (path, branch)
        }
    };

    ctx.emit_status(run_id, name, PhaseStatus::Running, 50, Some("patching"));
    let patch_file = format!(
        "{}/patch-issue-{}-run-{}-{}.md",
        ctx.config.specs_dir,
        issue_label,
        run_id,
        slugify(&issue.title)
    );
    let request = AgentRequest::new(phase.agent_name(), run_id, name, "/patch")
        .with_args([issue_arg.as_str(), patch_file.as_str(), run_id])
        .with_model_set(state.model_set)
        .with_working_dir(&worktree);
    ctx.agents.execute_with_retry(&request).await?;

    if !worktree.join(&patch_file).is_file() {
        return Err(Error::AgentExecutionError(format!(
            "patch agent did not create {patch_file}"
        )));
    }

    ctx.emit_status(run_id, name, PhaseStatus::Running, 85, Some("committing"));
    let state = ctx.store.load(run_id).await.map_err(adw_core::Error::from)?;
    commit_and_push(
        ctx,
        run_id,
        phase,
        &state,
        &worktree,
        &format!("patch: {patch_file} ({run_id})"),
    )
    .await?;

    ctx.store
        .update(run_id, |s| s.push_patch(patch_file.clone(), None))
        .await
        .map_err(adw_core::Error::from)?;
    ctx.store
        .save_snapshot(run_id, "patch")
        .await
        .map_err(adw_core::Error::from)?;

    ctx.system_log(
        run_id,
        name,
        LogLevel::Success,
        format!("patch recorded on {branch_name}"),
    );
    Ok(())
}
