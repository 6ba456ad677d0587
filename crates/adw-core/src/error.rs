//! Error types for the ADW orchestrator

use thiserror::Error;

/// Main error type for orchestrator operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("worktree missing for run {0}")]
    WorktreeMissing(String),

    #[error("worktree inconsistent for run {run_id}: {detail}")]
    WorktreeInconsistent { run_id: String, detail: String },

    #[error("worktree create failed: {0}")]
    WorktreeCreateFailed(String),

    #[error("no worktree recorded for run {0}")]
    NoWorktree(String),

    #[error("no port pair available for run {0}")]
    NoPortsAvailable(String),

    #[error("state not found for run {0}")]
    StateNotFound(String),

    #[error("state schema invalid: {0}")]
    StateSchemaInvalid(String),

    #[error("agent cli error: {0}")]
    AgentCliError(String),

    #[error("agent timed out after {0}s")]
    AgentTimeout(u64),

    #[error("agent execution error: {0}")]
    AgentExecutionError(String),

    #[error("agent reported error: {0}")]
    AgentReportedError(String),

    #[error("merge conflict in: {}", .0.join(", "))]
    MergeConflict(Vec<String>),

    #[error("forge api error: {0}")]
    ForgeApiError(String),

    #[error("upload failed: {0}")]
    UploadFailed(String),

    #[error("ShipValidationFailed: {}", .0.join(", "))]
    ShipValidationFailed(Vec<String>),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Error::Internal(msg.into())
    }

    /// Validation failures map to CLI exit code 3 instead of the
    /// generic phase-failure code.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::ShipValidationFailed(_)
                | Error::WorktreeMissing(_)
                | Error::WorktreeInconsistent { .. }
                | Error::NoWorktree(_)
                | Error::StateNotFound(_)
                | Error::StateSchemaInvalid(_)
        )
    }

    /// Whether a retry at the agent level could succeed. Everything
    /// outside the agent-runner taxonomy is non-retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::AgentCliError(_)
                | Error::AgentTimeout(_)
                | Error::AgentExecutionError(_)
                | Error::AgentReportedError(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ship_validation_lists_fields() {
        let err = Error::ShipValidationFailed(vec!["plan_file".into(), "ws_port".into()]);
        assert_eq!(err.to_string(), "ShipValidationFailed: plan_file, ws_port");
        assert!(err.is_validation());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_agent_errors_are_retryable() {
        assert!(Error::AgentTimeout(30).is_retryable());
        assert!(Error::AgentCliError("exit 1".into()).is_retryable());
        assert!(!Error::NoPortsAvailable("abc".into()).is_retryable());
    }
}
