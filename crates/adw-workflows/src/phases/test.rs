//! Test phase
//!
//! Runs the test agent; agent-reported failures feed a bounded
//! resolve-and-rerun loop before the phase gives up.

use adw_agents::AgentRequest;
use adw_core::{Error, LogLevel, PhaseStatus, Result};

use crate::context::PhaseContext;
use crate::phase::{commit_and_push, ensure_worktree, Phase, PhaseOptions};

/// Resolution attempts after the first failing test run
const MAX_RESOLVE_ATTEMPTS: usize = 3;

pub async fn run(ctx: &PhaseContext, run_id: &str, opts: &PhaseOptions) -> Result<()> {
    let phase = Phase::Test;
    let name = phase.name();

    let (state, worktree) = ensure_worktree(ctx, run_id).await?;

    let mut test_args = vec![run_id.to_string()];
    if opts.skip_e2e {
        test_args.push("--skip-e2e".to_string());
    }
    let test_request = AgentRequest::new(phase.agent_name(), run_id, name, "/test")
        .with_args(test_args)
        .with_model_set(state.model_set)
        .with_working_dir(&worktree);

    let mut resolve_attempt = 0;
    loop {
        ctx.emit_status(
            run_id,
            name,
            PhaseStatus::Running,
            20 + (resolve_attempt as u8) * 20,
            Some("running tests"),
        );
        match ctx.agents.execute_with_retry(&test_request).await {
            Ok(_) => break,
            Err(Error::AgentReportedError(failures)) if resolve_attempt < MAX_RESOLVE_ATTEMPTS => {
                resolve_attempt += 1;
                ctx.system_log(
                    run_id,
                    name,
                    LogLevel::Warn,
                    format!("test failures reported; resolution attempt {resolve_attempt}"),
                );

                // Failures can be long; hand the resolver a file.
                let failures_path = ctx
                    .config
                    .run_dir(run_id)
                    .join(phase.agent_name())
                    .join(format!("failures-{resolve_attempt}.txt"));
                if let Some(parent) = failures_path.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                tokio::fs::write(&failures_path, &failures).await?;

                let resolve_request =
                    AgentRequest::new(phase.agent_name(), run_id, name, "/resolve_failed_test")
                        .with_args([
                            failures_path.to_string_lossy().into_owned(),
                            run_id.to_string(),
                        ])
                        .with_model_set(state.model_set)
                        .with_working_dir(&worktree);
                ctx.agents.execute_with_retry(&resolve_request).await?;
            }
            Err(e) => return Err(e),
        }
    }

    ctx.emit_status(
        run_id,
        name,
        PhaseStatus::Running,
        90,
        Some("committing test artifacts"),
    );
    commit_and_push(
        ctx,
        run_id,
        phase,
        &state,
        &worktree,
        &format!("test: record results ({run_id})"),
    )
    .await?;

    ctx.store
        .save_snapshot(run_id, "test")
        .await
        .map_err(adw_core::Error::from)?;
    Ok(())
}
