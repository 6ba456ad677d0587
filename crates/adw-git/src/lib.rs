//! Git CLI shim
//!
//! All version-control operations run the `git` binary as a
//! subprocess with captured stdio. The CLI's working-tree safety
//! semantics (refusing to clobber uncommitted changes, native
//! worktree bookkeeping) are exactly what the per-run isolation
//! model relies on, so nothing here links a git library.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, error, info};

#[derive(Error, Debug)]
pub enum GitError {
    #[error("git executable not found or not runnable")]
    NotAvailable,
    #[error("git {args} failed ({code}): {stderr}")]
    CommandFailed {
        args: String,
        code: i32,
        stderr: String,
    },
    #[error("merge conflict in: {}", .0.join(", "))]
    MergeConflict(Vec<String>),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, GitError>;

impl From<GitError> for adw_core::Error {
    fn from(err: GitError) -> Self {
        match err {
            GitError::MergeConflict(files) => adw_core::Error::MergeConflict(files),
            other => adw_core::Error::Internal(other.to_string()),
        }
    }
}

/// Merge strategy for integrating a run's branch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeStrategy {
    Squash,
    Merge,
    Rebase,
}

/// One entry from `git worktree list --porcelain`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorktreeEntry {
    pub path: PathBuf,
    pub head: String,
    pub branch: Option<String>,
}

/// Stateless git runner; the working directory is passed per call
/// because every run operates on its own worktree.
#[derive(Debug, Clone, Default)]
pub struct GitCli;

impl GitCli {
    pub fn new() -> Self {
        Self
    }

    async fn git<I, S>(&self, cwd: &Path, args: I) -> Result<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let args: Vec<String> = args.into_iter().map(|s| s.as_ref().to_string()).collect();
        debug!(args = ?args, dir = %cwd.display(), "Executing git command");

        let output = Command::new("git")
            .args(&args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    GitError::NotAvailable
                } else {
                    GitError::Io(e)
                }
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        let code = output.status.code().unwrap_or(-1);

        if !output.status.success() {
            error!(args = ?args, code = code, stderr = %stderr.trim(), "Git command failed");
            return Err(GitError::CommandFailed {
                args: args.join(" "),
                code,
                stderr: stderr.trim().to_string(),
            });
        }

        Ok(stdout)
    }

    /// Create and check out a new branch in `cwd`.
    pub async fn branch_create(&self, branch: &str, cwd: &Path) -> Result<()> {
        self.git(cwd, ["checkout", "-b", branch]).await?;
        info!(branch = %branch, dir = %cwd.display(), "Created branch");
        Ok(())
    }

    pub async fn checkout(&self, branch: &str, cwd: &Path) -> Result<()> {
        self.git(cwd, ["checkout", branch]).await?;
        Ok(())
    }

    pub async fn current_branch(&self, cwd: &Path) -> Result<String> {
        let out = self.git(cwd, ["rev-parse", "--abbrev-ref", "HEAD"]).await?;
        Ok(out.trim().to_string())
    }

    /// Repository root of `cwd`.
    pub async fn rev_parse_root(&self, cwd: &Path) -> Result<PathBuf> {
        let out = self.git(cwd, ["rev-parse", "--show-toplevel"]).await?;
        Ok(PathBuf::from(out.trim()))
    }

    /// Whether `cwd` has staged or unstaged changes.
    pub async fn is_dirty(&self, cwd: &Path) -> Result<bool> {
        let out = self.git(cwd, ["status", "--porcelain"]).await?;
        Ok(!out.trim().is_empty())
    }

    /// Stage everything and commit. Returns false when the tree was
    /// clean and no commit was made.
    pub async fn commit(&self, message: &str, cwd: &Path) -> Result<bool> {
        if !self.is_dirty(cwd).await? {
            debug!(dir = %cwd.display(), "Nothing to commit");
            return Ok(false);
        }
        self.git(cwd, ["add", "-A"]).await?;
        self.git(cwd, ["commit", "-m", message]).await?;
        info!(dir = %cwd.display(), "Committed changes");
        Ok(true)
    }

    pub async fn push(&self, branch: &str, cwd: &Path) -> Result<()> {
        self.git(cwd, ["push", "-u", "origin", branch]).await?;
        info!(branch = %branch, "Pushed branch");
        Ok(())
    }

    /// Merge `branch` into the branch checked out in `cwd`.
    ///
    /// Conflicts are detected, the merge is aborted, and the
    /// conflicting paths are surfaced so a resolution agent can be
    /// pointed at them.
    pub async fn merge(&self, branch: &str, strategy: MergeStrategy, cwd: &Path) -> Result<()> {
        let result = match strategy {
            MergeStrategy::Squash => {
                match self.git(cwd, ["merge", "--squash", branch]).await {
                    Ok(_) => {
                        let msg = format!("Squash merge {branch}");
                        self.git(cwd, ["commit", "-m", msg.as_str()])
                            .await
                            .map(|_| ())
                    }
                    Err(e) => Err(e),
                }
            }
            MergeStrategy::Merge => self
                .git(cwd, ["merge", "--no-ff", branch])
                .await
                .map(|_| ()),
            MergeStrategy::Rebase => self.git(cwd, ["rebase", branch]).await.map(|_| ()),
        };

        match result {
            Ok(()) => Ok(()),
            Err(e @ GitError::CommandFailed { .. }) => {
                let conflicts = self.conflicting_files(cwd).await.unwrap_or_default();
                if conflicts.is_empty() {
                    return Err(e);
                }
                // Leave the tree usable again before surfacing.
                let abort = match strategy {
                    MergeStrategy::Rebase => ["rebase", "--abort"],
                    _ => ["merge", "--abort"],
                };
                let _ = self.git(cwd, abort).await;
                Err(GitError::MergeConflict(conflicts))
            }
            Err(e) => Err(e),
        }
    }

    /// Paths currently in conflict (unmerged in the index).
    pub async fn conflicting_files(&self, cwd: &Path) -> Result<Vec<String>> {
        let out = self
            .git(cwd, ["diff", "--name-only", "--diff-filter=U"])
            .await?;
        Ok(parse_name_list(&out))
    }

    /// `git worktree add -b <branch> <path> <base>` from the primary repo.
    pub async fn worktree_add(
        &self,
        repo: &Path,
        worktree_path: &Path,
        branch: &str,
        base: &str,
    ) -> Result<()> {
        let path_str = worktree_path.to_string_lossy().to_string();
        self.git(repo, ["worktree", "add", "-b", branch, path_str.as_str(), base])
            .await?;
        info!(branch = %branch, path = %path_str, "Added worktree");
        Ok(())
    }

    pub async fn worktree_list(&self, repo: &Path) -> Result<Vec<WorktreeEntry>> {
        let out = self.git(repo, ["worktree", "list", "--porcelain"]).await?;
        Ok(parse_worktree_porcelain(&out))
    }

    /// Force-remove a worktree registration. "Not a worktree" and
    /// "does not exist" are swallowed so removal stays idempotent.
    pub async fn worktree_remove(&self, repo: &Path, worktree_path: &Path) -> Result<()> {
        let path_str = worktree_path.to_string_lossy().to_string();
        match self
            .git(repo, ["worktree", "remove", "--force", path_str.as_str()])
            .await
        {
            Ok(_) => Ok(()),
            Err(GitError::CommandFailed { stderr, .. })
                if stderr.contains("is not a working tree")
                    || stderr.contains("No such file or directory") =>
            {
                debug!(path = %path_str, "Worktree already gone");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    pub async fn worktree_prune(&self, repo: &Path) -> Result<()> {
        self.git(repo, ["worktree", "prune"]).await?;
        Ok(())
    }
}

fn parse_name_list(out: &str) -> Vec<String> {
    out.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect()
}

/// Parse `git worktree list --porcelain` output: stanzas separated by
/// blank lines, each starting with a `worktree <path>` line.
fn parse_worktree_porcelain(out: &str) -> Vec<WorktreeEntry> {
    let mut entries = Vec::new();
    let mut path: Option<PathBuf> = None;
    let mut head = String::new();
    let mut branch: Option<String> = None;

    let mut flush = |path: &mut Option<PathBuf>, head: &mut String, branch: &mut Option<String>| {
        if let Some(p) = path.take() {
            entries.push(WorktreeEntry {
                path: p,
                head: std::mem::take(head),
                branch: branch.take(),
            });
        }
    };

    for line in out.lines() {
        let line = line.trim_end();
        if line.is_empty() {
            flush(&mut path, &mut head, &mut branch);
        } else if let Some(p) = line.strip_prefix("worktree ") {
            flush(&mut path, &mut head, &mut branch);
            path = Some(PathBuf::from(p));
        } else if let Some(h) = line.strip_prefix("HEAD ") {
            head = h.to_string();
        } else if let Some(b) = line.strip_prefix("branch ") {
            branch = Some(b.trim_start_matches("refs/heads/").to_string());
        }
        // "bare", "detached", "locked" markers are irrelevant here.
    }
    flush(&mut path, &mut head, &mut branch);

    entries
}
