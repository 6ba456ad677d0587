//! Ship phase
//!
//! The terminal phase: verifies the run record is complete, approves
//! and squash-merges the PR, removes the worktree, and marks the run
//! completed. Validation failures happen before any VCS or forge
//! operation.

use adw_core::{BusEvent, Error, LogLevel, PhaseStatus, Result};
use adw_state::DataSource;

use crate::context::PhaseContext;
use crate::phase::{Phase, PhaseOptions};

pub async fn run(ctx: &PhaseContext, run_id: &str, _opts: &PhaseOptions) -> Result<()> {
    let phase = Phase::Ship;
    let name = phase.name();

    let state = ctx.store.load(run_id).await.map_err(adw_core::Error::from)?;

    // Completeness gate: every required field, checked before any
    // side effect.
    let missing = state.missing_ship_fields();
    if !missing.is_empty() {
        return Err(Error::ShipValidationFailed(
            missing.into_iter().map(String::from).collect(),
        ));
    }
    let worktree = state.worktree_path.clone().expect("checked above");
    let branch = state.branch_name.clone().expect("checked above");
    ctx.worktrees.validate(run_id, &worktree).await?;

    if state.data_source == DataSource::Forge {
        ctx.emit_status(run_id, name, PhaseStatus::Running, 20, Some("locating PR"));
        let number = match ctx
            .forge
            .pr_find_for_branch(&branch)
            .await
            .map_err(adw_core::Error::from)?
        {
            Some(n) => n,
            None => {
                ctx.forge
                    .pr_create(
                        state.data_source,
                        &branch,
                        &branch,
                        &format!("Automated changes for run `{run_id}`"),
                    )
                    .await
                    .map_err(adw_core::Error::from)?;
                ctx.forge
                    .pr_find_for_branch(&branch)
                    .await
                    .map_err(adw_core::Error::from)?
                    .ok_or_else(|| {
                        adw_core::Error::ForgeApiError(format!("no PR found for {branch}"))
                    })?
            }
        };

        ctx.emit_status(run_id, name, PhaseStatus::Running, 50, Some("merging PR"));
        ctx.forge
            .pr_approve(number)
            .await
            .map_err(adw_core::Error::from)?;
        ctx.forge
            .pr_merge(number)
            .await
            .map_err(adw_core::Error::from)?;
    } else {
        ctx.system_log(
            run_id,
            name,
            LogLevel::Info,
            "board mode: forge PR operations suppressed",
        );
    }

    ctx.emit_status(
        run_id,
        name,
        PhaseStatus::Running,
        80,
        Some("removing worktree"),
    );
    ctx.worktrees.remove(run_id).await?;
    ctx.system_log(run_id, name, LogLevel::Info, "worktree removed");

    // completed=true, worktree gone, ports freed: the three outcomes
    // ship guarantees together.
    ctx.store
        .update(run_id, |s| {
            s.completed = true;
            s.worktree_path = None;
            s.ws_port = None;
            s.fe_port = None;
        })
        .await
        .map_err(adw_core::Error::from)?;
    ctx.store
        .save_snapshot(run_id, "ship")
        .await
        .map_err(adw_core::Error::from)?;

    ctx.bus.publish(BusEvent::WorktreeDeleted {
        run_id: run_id.to_string(),
    });
    Ok(())
}
