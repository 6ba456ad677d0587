//! Environment Configuration Loader
//!
//! All components share one configuration surface, resolved from the
//! process environment (optionally seeded from a `.env` file). Call
//! `load_environment()` early in main() before building a `Config`.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Paths to check for an environment file (in order of priority)
pub const ENV_FILE_PATHS: &[&str] = &[".env"];

/// Resolved orchestrator configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the headless AI CLI binary
    pub agent_cli_path: String,
    /// Target forge repository (owner/repo or URL)
    pub forge_repo_url: Option<String>,
    /// Forge credential, exported to forge subprocesses when set
    pub forge_token: Option<String>,
    /// WebSocket hub port
    pub hub_port: u16,
    /// Verbose logging
    pub debug: bool,
    /// Root of the per-run state store
    pub statestore_dir: PathBuf,
    /// Root of the per-run worktrees
    pub trees_dir: PathBuf,
    /// Directory plans are written to (relative to the worktree)
    pub specs_dir: String,
    /// Directory documentation is written to (relative to the worktree)
    pub docs_dir: String,
    /// Parallelism window; widens the port ranges in lockstep
    pub max_runs: u16,
    /// Command used by the review phase to launch the app under review
    pub app_server_cmd: Option<String>,
    /// Object-store PUT endpoint for review artifacts
    pub artifact_store_url: Option<String>,
    /// Public base URL for uploaded artifacts (defaults to the store URL)
    pub artifact_public_url: Option<String>,
}

impl Config {
    /// Build a Config from the current process environment.
    pub fn from_env() -> Result<Self> {
        let max_runs = get_config_int("ADW_MAX_RUNS", 15);
        if !(1..=100).contains(&max_runs) {
            return Err(Error::config(format!(
                "ADW_MAX_RUNS must be in 1..=100, got {max_runs}"
            )));
        }

        Ok(Self {
            agent_cli_path: get_config("AGENT_CLI_PATH", "claude"),
            forge_repo_url: get_config_opt("FORGE_REPO_URL"),
            forge_token: get_config_opt("FORGE_TOKEN"),
            hub_port: get_config_int("HUB_PORT", 8500) as u16,
            debug: get_config_bool("DEBUG", false),
            statestore_dir: PathBuf::from(get_config("STATESTORE_DIR", "agents")),
            trees_dir: PathBuf::from(get_config("TREES_DIR", "trees")),
            specs_dir: get_config("ADW_SPECS_DIR", "specs"),
            docs_dir: get_config("ADW_DOCS_DIR", "docs"),
            max_runs: max_runs as u16,
            app_server_cmd: get_config_opt("ADW_APP_SERVER_CMD"),
            artifact_store_url: get_config_opt("ARTIFACT_STORE_URL"),
            artifact_public_url: get_config_opt("ARTIFACT_PUBLIC_URL"),
        })
    }

    /// State directory for one run
    pub fn run_dir(&self, run_id: &str) -> PathBuf {
        self.statestore_dir.join(run_id)
    }

    /// Worktree directory for one run
    pub fn tree_dir(&self, run_id: &str) -> PathBuf {
        self.trees_dir.join(run_id)
    }
}

/// Load environment variables from the first `.env`-style file found.
///
/// Existing environment variables are never overridden. Returns the
/// path that was loaded, or None if no file was found.
pub fn load_environment() -> Option<String> {
    if let Ok(custom_path) = std::env::var("ADW_ENV_FILE") {
        if let Some(path) = try_load_env_file(&custom_path) {
            return Some(path);
        }
    }

    for path in ENV_FILE_PATHS {
        if let Some(loaded_path) = try_load_env_file(path) {
            return Some(loaded_path);
        }
    }

    debug!("No environment file found, using existing environment");
    None
}

/// Try to load an environment file from the given path.
fn try_load_env_file(path: &str) -> Option<String> {
    let path_obj = Path::new(path);

    if !path_obj.exists() {
        return None;
    }

    match fs::read_to_string(path_obj) {
        Ok(content) => {
            let mut loaded_count = 0;
            let mut skipped_count = 0;

            for line in content.lines() {
                let line = line.trim();

                if line.is_empty() || line.starts_with('#') {
                    continue;
                }

                if let Some((key, value)) = parse_env_line(line) {
                    if std::env::var(&key).is_err() {
                        std::env::set_var(&key, &value);
                        loaded_count += 1;
                    } else {
                        skipped_count += 1;
                        debug!("Skipped (already set): {}", key);
                    }
                }
            }

            info!(
                "Loaded {} environment variables from {} ({} skipped - already set)",
                loaded_count, path, skipped_count
            );

            Some(path.to_string())
        }
        Err(e) => {
            warn!("Failed to read environment file {}: {}", path, e);
            None
        }
    }
}

/// Parse a single environment line into key-value pair.
pub fn parse_env_line(line: &str) -> Option<(String, String)> {
    // Handle: KEY=VALUE, KEY="VALUE", KEY='VALUE'
    let mut parts = line.splitn(2, '=');
    let key = parts.next()?.trim();
    let value = parts.next()?.trim();

    if key.is_empty() {
        return None;
    }

    let value = value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
        .unwrap_or(value);

    Some((key.to_string(), value.to_string()))
}

/// Get a configuration value with a default.
pub fn get_config(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Get an optional configuration value.
pub fn get_config_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

/// Get a boolean configuration value.
pub fn get_config_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes" | "on"))
        .unwrap_or(default)
}

/// Get an integer configuration value.
pub fn get_config_int(key: &str, default: i64) -> i64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
