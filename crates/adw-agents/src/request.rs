//! Agent request/response model

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use adw_state::ModelSet;

/// How an agent invocation ended, from the caller's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryCode {
    /// Success; never retried
    None,
    /// Child exited non-zero
    CliError,
    /// Child killed by the phase timeout
    Timeout,
    /// Child exited 0 but the terminal result record is missing or malformed
    ExecutionError,
    /// Terminal result record carries an error field
    AgentReportedError,
}

impl RetryCode {
    pub fn is_retryable(self) -> bool {
        !matches!(self, RetryCode::None)
    }
}

/// One agent invocation
#[derive(Debug, Clone)]
pub struct AgentRequest {
    /// Namespace for the output directory (`planner`, `implementor`, …)
    pub agent_name: String,
    pub run_id: String,
    pub phase: String,
    /// Slash command, e.g. `/feature`
    pub slash_command: String,
    /// Positional arguments appended to the slash command
    pub args: Vec<String>,
    /// Working directory; the primary repo when no worktree exists yet
    pub working_dir: Option<PathBuf>,
    /// Explicit model override; wins over the static table
    pub model: Option<String>,
    pub model_set: ModelSet,
    /// Finite only where a phase must bound the agent (review)
    pub timeout: Option<Duration>,
}

impl AgentRequest {
    pub fn new(
        agent_name: impl Into<String>,
        run_id: impl Into<String>,
        phase: impl Into<String>,
        slash_command: impl Into<String>,
    ) -> Self {
        Self {
            agent_name: agent_name.into(),
            run_id: run_id.into(),
            phase: phase.into(),
            slash_command: slash_command.into(),
            args: Vec::new(),
            working_dir: None,
            model: None,
            model_set: ModelSet::Base,
            timeout: None,
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn with_model_set(mut self, model_set: ModelSet) -> Self {
        self.model_set = model_set;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// The full prompt handed to the CLI.
    pub fn prompt(&self) -> String {
        if self.args.is_empty() {
            self.slash_command.clone()
        } else {
            format!("{} {}", self.slash_command, self.args.join(" "))
        }
    }
}

/// Outcome of an agent invocation (or of its final retry)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResponse {
    /// Final result text on success; error description otherwise
    pub output: String,
    pub success: bool,
    pub retry_code: RetryCode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_cost_usd: Option<f64>,
}

impl AgentResponse {
    pub fn success(output: impl Into<String>, total_cost_usd: Option<f64>) -> Self {
        Self {
            output: output.into(),
            success: true,
            retry_code: RetryCode::None,
            total_cost_usd,
        }
    }

    pub fn failure(retry_code: RetryCode, output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            success: false,
            retry_code,
            total_cost_usd: None,
        }
    }
}
