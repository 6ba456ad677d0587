//! Review phase
//!
//! Starts the app under review on the run's allocated ports, drives
//! the browser-based review agent under a finite timeout, uploads
//! collected screenshots, and edits the PR body with their URLs.
//! Blocker issues from the agent feed an optional patch sub-loop.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::{Child, Command};
use tracing::warn;

use adw_agents::AgentRequest;
use adw_core::{LogLevel, PhaseStatus, Result};
use adw_state::{DataSource, RunState};

use crate::context::PhaseContext;
use crate::phase::{commit_and_push, ensure_worktree, Phase, PhaseOptions};

/// The review agent drives a browser; it must not run unbounded.
const REVIEW_TIMEOUT: Duration = Duration::from_secs(20 * 60);

#[derive(Debug, Deserialize, Default)]
struct ReviewOutcome {
    #[serde(default)]
    blockers: Vec<String>,
}

pub async fn run(ctx: &PhaseContext, run_id: &str, opts: &PhaseOptions) -> Result<()> {
    let phase = Phase::Review;
    let name = phase.name();

    let (state, worktree) = ensure_worktree(ctx, run_id).await?;

    if opts.skip_e2e {
        ctx.system_log(
            run_id,
            name,
            LogLevel::Warn,
            "skip-e2e set; review agent not run",
        );
        ctx.store
            .save_snapshot(run_id, "review")
            .await
            .map_err(adw_core::Error::from)?;
        return Ok(());
    }

    ctx.emit_status(
        run_id,
        name,
        PhaseStatus::Running,
        15,
        Some("starting app services"),
    );
    let mut app = start_app_server(ctx, run_id, &state, &worktree).await?;

    ctx.emit_status(run_id, name, PhaseStatus::Running, 30, Some("reviewing"));
    let mut review_args = vec![run_id.to_string()];
    if let Some(plan_file) = &state.plan_file {
        review_args.push(plan_file.clone());
    }
    let request = AgentRequest::new(phase.agent_name(), run_id, name, "/review")
        .with_args(review_args)
        .with_model_set(state.model_set)
        .with_working_dir(&worktree)
        .with_timeout(REVIEW_TIMEOUT);
    let review_result = ctx.agents.execute_with_retry(&request).await;

    // The app server dies with the phase regardless of the outcome.
    if let Some((child, pid)) = app.take() {
        stop_app_server(ctx, run_id, child, pid).await;
    }
    let response = review_result?;

    ctx.emit_status(
        run_id,
        name,
        PhaseStatus::Running,
        60,
        Some("uploading screenshots"),
    );
    let screenshots = collect_screenshots(ctx, run_id);
    let mut screenshot_lines = Vec::new();
    for path in &screenshots {
        match ctx.uploader.upload(path).await {
            Ok(url) => screenshot_lines.push(format!("![screenshot]({url})")),
            Err(e) => {
                // Non-fatal: record the local path instead.
                ctx.system_log(
                    run_id,
                    name,
                    LogLevel::Warn,
                    format!("upload failed for {}: {e}", path.display()),
                );
                screenshot_lines.push(format!("`{}` (local)", path.display()));
            }
        }
    }

    if state.data_source == DataSource::Forge {
        if let Some(branch) = &state.branch_name {
            if let Err(e) =
                publish_review_to_pr(ctx, &state, branch, &screenshot_lines).await
            {
                ctx.system_log(
                    run_id,
                    name,
                    LogLevel::Warn,
                    format!("PR update failed: {e}"),
                );
            }
        }
    }

    // Blocker resolution sub-loop.
    let outcome: ReviewOutcome =
        serde_json::from_str(response.output.trim()).unwrap_or_default();
    if !outcome.blockers.is_empty() && !opts.skip_resolution {
        ctx.emit_status(
            run_id,
            name,
            PhaseStatus::Running,
            75,
            Some("resolving review blockers"),
        );
        ctx.system_log(
            run_id,
            name,
            LogLevel::Warn,
            format!("review found {} blocker(s)", outcome.blockers.len()),
        );

        let blockers_path = ctx
            .config
            .run_dir(run_id)
            .join(phase.agent_name())
            .join("blockers.txt");
        if let Some(parent) = blockers_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&blockers_path, outcome.blockers.join("\n")).await?;

        let resolve = AgentRequest::new(phase.agent_name(), run_id, name, "/patch")
            .with_args([
                blockers_path.to_string_lossy().into_owned(),
                run_id.to_string(),
            ])
            .with_model_set(state.model_set)
            .with_working_dir(&worktree);
        ctx.agents.execute_with_retry(&resolve).await?;
    }

    ctx.emit_status(run_id, name, PhaseStatus::Running, 90, Some("committing"));
    commit_and_push(
        ctx,
        run_id,
        phase,
        &state,
        &worktree,
        &format!("review: record findings ({run_id})"),
    )
    .await?;

    ctx.store
        .save_snapshot(run_id, "review")
        .await
        .map_err(adw_core::Error::from)?;
    Ok(())
}

/// Launch the app under review with the run's ports in its
/// environment. Configured via `ADW_APP_SERVER_CMD`; skipped when
/// unset (the review agent may start services itself).
async fn start_app_server(
    ctx: &PhaseContext,
    run_id: &str,
    state: &RunState,
    worktree: &Path,
) -> Result<Option<(Child, Option<u32>)>> {
    let Some(cmd_line) = &ctx.config.app_server_cmd else {
        return Ok(None);
    };
    let argv = shell_words::split(cmd_line)
        .map_err(|e| adw_core::Error::config(format!("ADW_APP_SERVER_CMD unparsable: {e}")))?;
    let Some((program, args)) = argv.split_first() else {
        return Ok(None);
    };

    let mut command = Command::new(program);
    command.args(args).current_dir(worktree).kill_on_drop(true);
    if let (Some(ws), Some(fe)) = (state.ws_port, state.fe_port) {
        command
            .env("WS_PORT", ws.to_string())
            .env("FE_PORT", fe.to_string())
            .env("BACKEND_URL", format!("http://localhost:{ws}"));
    }

    // A busy port here is fatal to the phase, not an allocator retry.
    let child = command
        .spawn()
        .map_err(|e| adw_core::Error::internal(format!("app server failed to start: {e}")))?;
    let pid = child.id();
    if let Some(pid) = pid {
        ctx.procs.register(run_id, pid);
    }
    ctx.system_log(
        run_id,
        "review",
        LogLevel::Info,
        format!("app server started: {cmd_line}"),
    );
    Ok(Some((child, pid)))
}

async fn stop_app_server(ctx: &PhaseContext, run_id: &str, mut child: Child, pid: Option<u32>) {
    if let Err(e) = child.kill().await {
        warn!(run_id = %run_id, error = %e, "App server kill failed");
    }
    if let Some(pid) = pid {
        ctx.procs.deregister(run_id, pid);
    }
    ctx.system_log(run_id, "review", LogLevel::Info, "app server stopped");
}

/// Screenshots the review agent dropped under the run's reviewer dir.
fn collect_screenshots(ctx: &PhaseContext, run_id: &str) -> Vec<PathBuf> {
    let pattern = ctx
        .config
        .run_dir(run_id)
        .join("reviewer")
        .join("img")
        .join("*.png");
    let mut paths: Vec<PathBuf> = glob::glob(&pattern.to_string_lossy())
        .map(|entries| entries.flatten().collect())
        .unwrap_or_default();
    paths.sort();
    paths
}

/// Find (or open) the PR for the branch and rewrite its body with the
/// screenshot gallery.
async fn publish_review_to_pr(
    ctx: &PhaseContext,
    state: &RunState,
    branch: &str,
    screenshot_lines: &[String],
) -> Result<()> {
    let number = match ctx
        .forge
        .pr_find_for_branch(branch)
        .await
        .map_err(adw_core::Error::from)?
    {
        Some(n) => n,
        None => {
            ctx.forge
                .pr_create(state.data_source, branch, branch, "Automated review pending")
                .await
                .map_err(adw_core::Error::from)?;
            ctx.forge
                .pr_find_for_branch(branch)
                .await
                .map_err(adw_core::Error::from)?
                .ok_or_else(|| adw_core::Error::ForgeApiError("PR not visible after create".into()))?
        }
    };

    let mut body = format!("Automated review for run `{}`.\n", state.run_id);
    if !screenshot_lines.is_empty() {
        body.push_str("\n## Review screenshots\n\n");
        body.push_str(&screenshot_lines.join("\n"));
        body.push('\n');
    }
    ctx.forge
        .pr_edit_body(number, &body)
        .await
        .map_err(adw_core::Error::from)?;
    Ok(())
}
