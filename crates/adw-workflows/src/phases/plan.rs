//! Plan phase
//!
//! Entry phase: classify the issue, name the branch, provision the
//! worktree, then run the class-specific planning agent and persist
//! the plan file path.

use adw_agents::AgentRequest;
use adw_core::{Error, LogLevel, PhaseStatus, Result};
use adw_state::IssueClass;

use crate::context::PhaseContext;
use crate::phase::{commit_and_push, slugify, Phase, PhaseOptions};
use crate::phases::entry;

pub async fn run(ctx: &PhaseContext, run_id: &str, opts: &PhaseOptions) -> Result<()> {
    let phase = Phase::Plan;
    let name = phase.name();

    let state = entry::init_state(ctx, run_id, opts).await?;
    let issue_label = entry::issue_label(&state);

    ctx.emit_status(run_id, name, PhaseStatus::Running, 10, Some("fetching issue"));
    let (issue, issue_file) = entry::fetch_and_record_issue(ctx, name, &state).await?;
    let issue_arg = issue_file.to_string_lossy().to_string();

    // Classification drives the planning command and branch prefix.
    ctx.emit_status(
        run_id,
        name,
        PhaseStatus::Running,
        20,
        Some("classifying issue"),
    );
    let classify = AgentRequest::new(phase.agent_name(), run_id, name, "/classify_issue")
        .with_args([issue_arg.as_str(), run_id])
        .with_model_set(state.model_set);
    let response = ctx.agents.execute_with_retry(&classify).await?;
    let issue_class = IssueClass::parse(&response.output).ok_or_else(|| {
        Error::AgentExecutionError(format!(
            "classifier returned unrecognized class: {:?}",
            response.output.trim()
        ))
    })?;
    ctx.system_log(
        run_id,
        name,
        LogLevel::Info,
        format!("issue classified as {issue_class}"),
    );

    ctx.emit_status(
        run_id,
        name,
        PhaseStatus::Running,
        30,
        Some("generating branch name"),
    );
    let branch_req = AgentRequest::new(phase.agent_name(), run_id, name, "/generate_branch_name")
        .with_args([
            issue_class.to_string(),
            issue_label.clone(),
            run_id.to_string(),
            issue_arg.clone(),
        ])
        .with_model_set(state.model_set);
    let branch_response = ctx.agents.execute_with_retry(&branch_req).await?;
    let branch_name = accept_branch_name(
        &branch_response.output,
        issue_class,
        &issue_label,
        run_id,
        &issue.title,
    );

    ctx.emit_status(
        run_id,
        name,
        PhaseStatus::Running,
        45,
        Some("creating worktree"),
    );
    let (ports, worktree) = entry::provision_worktree(ctx, run_id, name, &branch_name).await?;

    let state = ctx
        .store
        .update(run_id, |s| {
            s.issue_class = Some(issue_class);
            s.branch_name = Some(branch_name.clone());
            s.worktree_path = Some(worktree.clone());
            s.ws_port = Some(ports.ws);
            s.fe_port = Some(ports.fe);
        })
        .await
        .map_err(adw_core::Error::from)?;
    ctx.store
        .save_snapshot(run_id, "plan:worktree")
        .await
        .map_err(adw_core::Error::from)?;

    ctx.emit_status(run_id, name, PhaseStatus::Running, 60, Some("planning"));
    let plan_file = format!(
        "{}/issue-{}-run-{}-{}.md",
        ctx.config.specs_dir,
        issue_label,
        run_id,
        slugify(&issue.title)
    );
    let plan_req = AgentRequest::new(
        phase.agent_name(),
        run_id,
        name,
        issue_class.plan_command(),
    )
    .with_args([issue_arg.as_str(), plan_file.as_str(), run_id])
    .with_model_set(state.model_set)
    .with_working_dir(&worktree);
    ctx.agents.execute_with_retry(&plan_req).await?;

    if !worktree.join(&plan_file).is_file() {
        return Err(Error::AgentExecutionError(format!(
            "planning agent did not create {plan_file}"
        )));
    }

    ctx.emit_status(
        run_id,
        name,
        PhaseStatus::Running,
        85,
        Some("committing plan"),
    );
    commit_and_push(
        ctx,
        run_id,
        phase,
        &state,
        &worktree,
        &format!("plan: spec for issue {issue_label} ({run_id})"),
    )
    .await?;

    ctx.store
        .update(run_id, |s| s.plan_file = Some(plan_file.clone()))
        .await
        .map_err(adw_core::Error::from)?;
    ctx.store
        .save_snapshot(run_id, "plan")
        .await
        .map_err(adw_core::Error::from)?;

    // Progress comments are best-effort in plan/build.
    if let Some(source) = ctx.store.load(run_id).await.ok().and_then(|s| s.issue_source()) {
        if let Err(e) = ctx
            .forge
            .post_comment(
                &source,
                run_id,
                &format!("Plan complete on `{branch_name}`: `{plan_file}`"),
            )
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

/// Accept the agent's branch name only when it already has the
/// required shape; otherwise fall back to the deterministic form.
fn accept_branch_name(
    agent_output: &str,
    class: IssueClass,
    issue_label: &str,
    run_id: &str,
    title: &str,
) -> String {
    let expected_prefix = format!("{}-issue-{issue_label}-run-{run_id}-", class.branch_prefix());
    let candidate = agent_output.trim().lines().last().unwrap_or("").trim();
    let well_formed = candidate.starts_with(&expected_prefix)
        && candidate.len() > expected_prefix.len()
        && candidate.len() <= 120
        && candidate
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    if well_formed {
        candidate.to_string()
    } else {
        format!("{expected_prefix}{}", slugify(title))
    }
}
