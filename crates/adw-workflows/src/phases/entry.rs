//! Shared entry-phase plumbing
//!
//! Plan and patch may be called with or without an existing run: they
//! create state on first contact, record the issue locally for agent
//! consumption, and provision ports + worktree once a branch name is
//! known.

use std::path::PathBuf;
use tracing::info;

use adw_core::{Error, LogLevel, PortPair, Result};
use adw_forge::Issue;
use adw_state::{RunState, StateStoreError};

use crate::context::PhaseContext;
use crate::phase::PhaseOptions;

/// Load the run's state or create it from the options.
pub(crate) async fn init_state(
    ctx: &PhaseContext,
    run_id: &str,
    opts: &PhaseOptions,
) -> Result<RunState> {
    match ctx.store.load(run_id).await {
        Ok(mut state) => {
            if state.issue_number.is_none() && opts.issue_number.is_some() {
                state = ctx
                    .store
                    .update(run_id, |s| s.issue_number = opts.issue_number.clone())
                    .await
                    .map_err(adw_core::Error::from)?;
            }
            Ok(state)
        }
        Err(StateStoreError::NotFound(_)) => {
            let mut state = RunState::new(run_id, opts.model_set, opts.data_source);
            state.issue_number = opts.issue_number.clone();
            state.issue_payload = opts.board_issue.clone();
            let state = ctx
                .store
                .create(state)
                .await
                .map_err(adw_core::Error::from)?;
            info!(run_id = %run_id, "Created run");
            Ok(state)
        }
        Err(e) => Err(e.into()),
    }
}

/// Fetch the issue (forge or inline) and record it under the run's
/// state directory so agents in any working directory can read it.
pub(crate) async fn fetch_and_record_issue(
    ctx: &PhaseContext,
    phase: &str,
    state: &RunState,
) -> Result<(Issue, PathBuf)> {
    let source = state.issue_source().ok_or_else(|| {
        Error::config(format!(
            "run {} has no issue source (issue_number or board payload required)",
            state.run_id
        ))
    })?;

    let issue = ctx
        .forge
        .fetch_issue(&source)
        .await
        .map_err(adw_core::Error::from)?;

    let run_dir = ctx.config.run_dir(&state.run_id);
    tokio::fs::create_dir_all(&run_dir).await?;
    let issue_file = run_dir.join("issue.md");
    tokio::fs::write(&issue_file, issue.as_prompt_context()).await?;
    let issue_file = tokio::fs::canonicalize(&issue_file).await?;

    ctx.system_log(
        &state.run_id,
        phase,
        LogLevel::Info,
        format!("fetched issue: {}", issue.title),
    );
    Ok((issue, issue_file))
}

/// Allocate the run's port pair and create its worktree on `branch`.
/// State is updated by the caller; a creation failure leaves state
/// untouched.
pub(crate) async fn provision_worktree(
    ctx: &PhaseContext,
    run_id: &str,
    phase: &str,
    branch: &str,
) -> Result<(PortPair, PathBuf)> {
    let ports = ctx.ports.allocate(run_id)?;
    let path = ctx.worktrees.create(run_id, branch, &ports).await?;
    ctx.system_log(
        run_id,
        phase,
        LogLevel::Info,
        format!(
            "worktree created at {} (ws={}, fe={})",
            path.display(),
            ports.ws,
            ports.fe
        ),
    );
    Ok((ports, path))
}

/// The issue token used in branch names and plan paths. Board-mode
/// runs have no forge number.
pub(crate) fn issue_label(state: &RunState) -> String {
    state
        .issue_number
        .clone()
        .unwrap_or_else(|| "board".to_string())
}
