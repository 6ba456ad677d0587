//! Forge CLI shim
//!
//! Issues, comments and pull requests go through the local `gh`
//! binary; errors surface as exit codes plus captured stderr. In
//! board mode (`data_source=board`) write operations are logged
//! no-ops while reads are served from the run's inline payload, so
//! phase logic never branches on the data source itself.

pub mod issue;

use std::process::Stdio;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, error, info};

use adw_core::Config;
use adw_state::{DataSource, IssueSource};

pub use issue::Issue;

#[derive(Error, Debug)]
pub enum ForgeError {
    #[error("gh executable not found or not runnable")]
    NotAvailable,
    #[error("gh {args} failed ({code}): {stderr}")]
    CommandFailed {
        args: String,
        code: i32,
        stderr: String,
    },
    #[error("forge response parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ForgeError>;

impl From<ForgeError> for adw_core::Error {
    fn from(err: ForgeError) -> Self {
        adw_core::Error::ForgeApiError(err.to_string())
    }
}

/// Client over the `gh` CLI
#[derive(Debug, Clone, Default)]
pub struct ForgeClient {
    repo: Option<String>,
    token: Option<String>,
}

impl ForgeClient {
    pub fn new(config: &Config) -> Self {
        Self {
            repo: config.forge_repo_url.clone(),
            token: config.forge_token.clone(),
        }
    }

    async fn gh<I, S>(&self, args: I) -> Result<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut full_args: Vec<String> =
            args.into_iter().map(|s| s.as_ref().to_string()).collect();
        if let Some(repo) = &self.repo {
            full_args.push("-R".to_string());
            full_args.push(repo.clone());
        }
        debug!(args = ?full_args, "Executing gh command");

        let mut cmd = Command::new("gh");
        cmd.args(&full_args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(token) = &self.token {
            cmd.env("GH_TOKEN", token);
        }

        let output = cmd.output().await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ForgeError::NotAvailable
            } else {
                ForgeError::Io(e)
            }
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        let code = output.status.code().unwrap_or(-1);

        if !output.status.success() {
            error!(args = ?full_args, code = code, stderr = %stderr.trim(), "gh command failed");
            return Err(ForgeError::CommandFailed {
                args: full_args.join(" "),
                code,
                stderr: stderr.trim().to_string(),
            });
        }

        Ok(stdout)
    }

    /// Fetch the issue a run works against. Board runs synthesize the
    /// issue from the inline payload without touching the forge.
    pub async fn fetch_issue(&self, source: &IssueSource) -> Result<Issue> {
        match source {
            IssueSource::Forge { issue_number } => {
                let out = self
                    .gh([
                        "issue",
                        "view",
                        issue_number.as_str(),
                        "--json",
                        "number,title,body,labels",
                    ])
                    .await?;
                Issue::from_gh_json(&out)
            }
            IssueSource::Board(inline) => Ok(Issue::from_inline(inline)),
        }
    }

    /// Post a progress comment on the issue. Suppressed in board mode.
    /// The run marker lets board consumers correlate comments to runs.
    pub async fn post_comment(
        &self,
        source: &IssueSource,
        run_id: &str,
        text: &str,
    ) -> Result<()> {
        match source {
            IssueSource::Forge { issue_number } => {
                let body = format!("<!-- adw:{run_id} -->\n{text}");
                self.gh([
                    "issue",
                    "comment",
                    issue_number.as_str(),
                    "--body",
                    body.as_str(),
                ])
                .await?;
                info!(issue = %issue_number, run_id = %run_id, "Posted issue comment");
                Ok(())
            }
            IssueSource::Board(_) => {
                debug!(run_id = %run_id, "Board mode: comment suppressed");
                Ok(())
            }
        }
    }

    /// Open a PR for a branch. Suppressed in board mode.
    pub async fn pr_create(
        &self,
        data_source: DataSource,
        branch: &str,
        title: &str,
        body: &str,
    ) -> Result<()> {
        if data_source == DataSource::Board {
            debug!(branch = %branch, "Board mode: PR creation suppressed");
            return Ok(());
        }
        self.gh([
            "pr", "create", "--head", branch, "--title", title, "--body", body,
        ])
        .await?;
        info!(branch = %branch, "Created pull request");
        Ok(())
    }

    /// PR number for a branch, if one is open.
    pub async fn pr_find_for_branch(&self, branch: &str) -> Result<Option<u64>> {
        let out = self
            .gh([
                "pr", "list", "--head", branch, "--state", "open", "--json", "number",
            ])
            .await?;
        let rows: Vec<serde_json::Value> = serde_json::from_str(out.trim())?;
        Ok(rows
            .first()
            .and_then(|row| row.get("number"))
            .and_then(|n| n.as_u64()))
    }

    pub async fn pr_approve(&self, number: u64) -> Result<()> {
        let number_arg = number.to_string();
        self.gh(["pr", "review", number_arg.as_str(), "--approve"])
            .await?;
        info!(pr = number, "Approved pull request");
        Ok(())
    }

    pub async fn pr_merge(&self, number: u64) -> Result<()> {
        let number_arg = number.to_string();
        self.gh(["pr", "merge", number_arg.as_str(), "--squash"])
            .await?;
        info!(pr = number, "Merged pull request");
        Ok(())
    }

    pub async fn pr_edit_body(&self, number: u64, body: &str) -> Result<()> {
        let number_arg = number.to_string();
        self.gh(["pr", "edit", number_arg.as_str(), "--body", body])
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adw_state::InlineIssue;

    #[tokio::test]
    async fn test_board_fetch_never_shells_out() {
        // No `gh` needed: board reads come from the payload.
        let client = ForgeClient::default();
        let source = IssueSource::Board(InlineIssue {
            title: "Add CSV export button".into(),
            body: "Details".into(),
            labels: vec!["feature".into()],
            attachments: vec![],
        });
        let issue = client.fetch_issue(&source).await.unwrap();
        assert_eq!(issue.title, "Add CSV export button");
        assert_eq!(issue.labels, vec!["feature"]);
    }

    #[tokio::test]
    async fn test_board_comment_is_noop() {
        let client = ForgeClient::default();
        let source = IssueSource::Board(InlineIssue {
            title: "t".into(),
            body: "b".into(),
            labels: vec![],
            attachments: vec![],
        });
        client
            .post_comment(&source, "a1b2c3d4", "progress")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_board_pr_create_is_noop() {
        let client = ForgeClient::default();
        client
            .pr_create(DataSource::Board, "feat-x", "title", "body")
            .await
            .unwrap();
    }
}
