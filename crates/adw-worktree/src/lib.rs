//! Worktree Manager
//!
//! Creates, validates and destroys the isolated working copies runs
//! execute in. A worktree is exclusively owned by the run that
//! created it. Validation is a three-way check: the recorded path
//! must exist on disk AND appear in git's own worktree bookkeeping.

use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use adw_core::{Error, PortPair, Result};
use adw_git::GitCli;

/// Branch new worktrees fork from
pub const BASE_BRANCH: &str = "main";
/// Env file carrying the run's allocated ports
pub const PORTS_ENV_FILE: &str = ".ports.env";

pub struct WorktreeManager {
    repo_root: PathBuf,
    trees_dir: PathBuf,
    git: GitCli,
}

impl WorktreeManager {
    pub fn new(repo_root: impl Into<PathBuf>, trees_dir: impl Into<PathBuf>) -> Self {
        Self {
            repo_root: repo_root.into(),
            trees_dir: trees_dir.into(),
            git: GitCli::new(),
        }
    }

    pub fn tree_path(&self, run_id: &str) -> PathBuf {
        self.trees_dir.join(run_id)
    }

    /// Create the run's worktree on a new branch from main, copy the
    /// primary repo's `.env`, and write `.ports.env`. State is not
    /// touched here; the caller persists the returned absolute path.
    pub async fn create(
        &self,
        run_id: &str,
        branch_name: &str,
        ports: &PortPair,
    ) -> Result<PathBuf> {
        let path = self.tree_path(run_id);
        if path.exists() {
            return Err(Error::WorktreeCreateFailed(format!(
                "{} already exists",
                path.display()
            )));
        }
        tokio::fs::create_dir_all(&self.trees_dir).await?;

        self.git
            .worktree_add(&self.repo_root, &path, branch_name, BASE_BRANCH)
            .await
            .map_err(|e| Error::WorktreeCreateFailed(e.to_string()))?;

        // Abs path goes into state; relative paths would break once a
        // dependent phase runs from a different cwd.
        let abs = tokio::fs::canonicalize(&path).await?;

        let primary_env = self.repo_root.join(".env");
        if primary_env.is_file() {
            tokio::fs::copy(&primary_env, abs.join(".env")).await?;
            debug!(run_id = %run_id, "Copied primary .env into worktree");
        }

        let ports_env = format!(
            "WS_PORT={}\nFE_PORT={}\nBACKEND_URL=http://localhost:{}\n",
            ports.ws, ports.fe, ports.ws
        );
        tokio::fs::write(abs.join(PORTS_ENV_FILE), ports_env).await?;

        info!(
            run_id = %run_id,
            branch = %branch_name,
            path = %abs.display(),
            ws_port = ports.ws,
            fe_port = ports.fe,
            "Created worktree"
        );
        Ok(abs)
    }

    /// Three-way consistency check: recorded path, filesystem, and
    /// git worktree metadata must agree.
    pub async fn validate(&self, run_id: &str, recorded_path: &Path) -> Result<()> {
        if !recorded_path.is_dir() {
            return Err(Error::WorktreeMissing(run_id.to_string()));
        }

        let canonical = tokio::fs::canonicalize(recorded_path).await.map_err(|e| {
            Error::WorktreeInconsistent {
                run_id: run_id.to_string(),
                detail: format!("cannot canonicalize {}: {e}", recorded_path.display()),
            }
        })?;

        let known = self
            .git
            .worktree_list(&self.repo_root)
            .await
            .map_err(adw_core::Error::from)?;
        let registered = known.iter().any(|entry| {
            std::fs::canonicalize(&entry.path)
                .map(|p| p == canonical)
                .unwrap_or(false)
        });
        if !registered {
            return Err(Error::WorktreeInconsistent {
                run_id: run_id.to_string(),
                detail: format!("{} not registered with git", canonical.display()),
            });
        }
        Ok(())
    }

    /// Remove the worktree registration and directory. Idempotent:
    /// "already gone" outcomes are swallowed.
    pub async fn remove(&self, run_id: &str) -> Result<()> {
        let path = self.tree_path(run_id);

        if let Err(e) = self.git.worktree_remove(&self.repo_root, &path).await {
            warn!(run_id = %run_id, error = %e, "git worktree remove failed; continuing");
        }

        match tokio::fs::remove_dir_all(&path).await {
            Ok(()) => info!(run_id = %run_id, "Removed worktree directory"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(run_id = %run_id, "Worktree directory already gone")
            }
            Err(e) => return Err(e.into()),
        }

        // Clear any stale registration left by manual deletion.
        let _ = self.git.worktree_prune(&self.repo_root).await;
        Ok(())
    }

    /// Drop stale worktree registrations (after manual `rm -rf`).
    pub async fn prune(&self) -> Result<()> {
        self.git
            .worktree_prune(&self.repo_root)
            .await
            .map_err(adw_core::Error::from)
    }
}
