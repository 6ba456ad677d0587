//! Agent Runner
//!
//! Owns the child-process lifecycle for one agent invocation: output
//! directory and prompt audit file, spawn with the worktree's env
//! overlay, NDJSON tailing, timeout, exit classification, and the
//! bounded retry schedule.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

use adw_core::{Config, Error, ProcessRegistry, Result};
use adw_logs::LogStream;

use crate::models::model_for;
use crate::ndjson;
use crate::request::{AgentRequest, AgentResponse, RetryCode};
use crate::tailer::LogTailer;

/// Attempts per invocation, including the first
pub const MAX_ATTEMPTS: usize = 3;
/// Delay before retry N (1-indexed); the last entry repeats
pub const RETRY_DELAYS: [Duration; 3] = [
    Duration::from_secs(1),
    Duration::from_secs(3),
    Duration::from_secs(5),
];

pub struct AgentRunner {
    cli_path: String,
    statestore_dir: PathBuf,
    logs: Arc<LogStream>,
    procs: Arc<ProcessRegistry>,
}

impl AgentRunner {
    pub fn new(config: &Config, logs: Arc<LogStream>, procs: Arc<ProcessRegistry>) -> Self {
        Self {
            cli_path: config.agent_cli_path.clone(),
            statestore_dir: config.statestore_dir.clone(),
            logs,
            procs,
        }
    }

    fn agent_dir(&self, request: &AgentRequest) -> PathBuf {
        self.statestore_dir
            .join(&request.run_id)
            .join(&request.agent_name)
    }

    /// Output file for a request. Retries append to the same file.
    pub fn output_path(&self, request: &AgentRequest) -> PathBuf {
        self.agent_dir(request).join("output.jsonl")
    }

    /// Run a request through the retry schedule. Returns the last
    /// response on success; maps the last failure onto the error
    /// taxonomy with its message preserved.
    pub async fn execute_with_retry(&self, request: &AgentRequest) -> Result<AgentResponse> {
        let mut last = None;
        for attempt in 1..=MAX_ATTEMPTS {
            if attempt > 1 {
                let delay = RETRY_DELAYS[(attempt - 2).min(RETRY_DELAYS.len() - 1)];
                warn!(
                    run_id = %request.run_id,
                    agent = %request.agent_name,
                    attempt = attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Retrying agent invocation"
                );
                tokio::time::sleep(delay).await;
            }

            let response = self.execute(request).await?;
            if response.success {
                return Ok(response);
            }
            if !response.retry_code.is_retryable() {
                last = Some(response);
                break;
            }
            last = Some(response);
        }

        let response = last.expect("at least one attempt ran");
        Err(match response.retry_code {
            RetryCode::CliError => Error::AgentCliError(response.output),
            RetryCode::Timeout => {
                Error::AgentTimeout(request.timeout.map(|t| t.as_secs()).unwrap_or(0))
            }
            RetryCode::ExecutionError => Error::AgentExecutionError(response.output),
            RetryCode::AgentReportedError => Error::AgentReportedError(response.output),
            RetryCode::None => Error::internal("non-retryable success marked failed"),
        })
    }

    /// One attempt: spawn, tail, wait, classify. Only infrastructure
    /// failures (unable to create the output dir) surface as `Err`;
    /// every child outcome becomes an `AgentResponse`.
    pub async fn execute(&self, request: &AgentRequest) -> Result<AgentResponse> {
        let agent_dir = self.agent_dir(request);
        tokio::fs::create_dir_all(&agent_dir).await?;
        let output_path = self.output_path(request);

        self.write_prompt_audit(request, &agent_dir).await?;

        let model = request
            .model
            .clone()
            .unwrap_or_else(|| model_for(&request.slash_command, request.model_set).to_string());
        let prompt = request.prompt();

        info!(
            run_id = %request.run_id,
            agent = %request.agent_name,
            command = %request.slash_command,
            model = %model,
            "Spawning agent CLI"
        );

        let mut cmd = Command::new(&self.cli_path);
        cmd.arg("-p")
            .arg(&prompt)
            .arg("--model")
            .arg(&model)
            .arg("--output-file")
            .arg(&output_path)
            .arg("--output-format")
            .arg("stream-json")
            .arg("--verbose")
            .arg("--dangerously-skip-permissions")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        if let Some(dir) = &request.working_dir {
            cmd.current_dir(dir);
            for (key, value) in worktree_env(dir) {
                cmd.env(key, value);
            }
        }

        let mut child = match cmd.spawn() {
            Ok(c) => c,
            Err(e) => {
                return Ok(AgentResponse::failure(
                    RetryCode::CliError,
                    format!("failed to spawn {}: {e}", self.cli_path),
                ))
            }
        };

        let pid = child.id();
        if let Some(pid) = pid {
            self.procs.register(&request.run_id, pid);
        }

        // Lifecycle chatter on stdout is debug-only; the real stream
        // is the output file.
        if let Some(stdout) = child.stdout.take() {
            let run_id = request.run_id.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(run_id = %run_id, "agent stdout: {line}");
                }
            });
        }
        let stderr_task = child.stderr.take().map(|mut stderr| {
            tokio::spawn(async move {
                let mut buf = String::new();
                let _ = stderr.read_to_string(&mut buf).await;
                buf
            })
        });

        let tailer = LogTailer::spawn(
            output_path.clone(),
            request.run_id.clone(),
            request.phase.clone(),
            self.logs.clone(),
        );

        let wait_result = match request.timeout {
            Some(timeout) => match tokio::time::timeout(timeout, child.wait()).await {
                Ok(status) => Some(status),
                Err(_) => {
                    warn!(
                        run_id = %request.run_id,
                        agent = %request.agent_name,
                        timeout_s = timeout.as_secs(),
                        "Agent timed out; killing child"
                    );
                    let _ = child.kill().await;
                    None
                }
            },
            None => Some(child.wait().await),
        };

        if let Some(pid) = pid {
            self.procs.deregister(&request.run_id, pid);
        }
        tailer.finish().await;

        let stderr_text = match stderr_task {
            Some(task) => task.await.unwrap_or_default(),
            None => String::new(),
        };

        let status = match wait_result {
            None => {
                return Ok(AgentResponse::failure(
                    RetryCode::Timeout,
                    format!(
                        "agent timed out after {}s",
                        request.timeout.map(|t| t.as_secs()).unwrap_or(0)
                    ),
                ))
            }
            Some(Err(e)) => {
                return Ok(AgentResponse::failure(
                    RetryCode::CliError,
                    format!("failed to wait for agent: {e}"),
                ))
            }
            Some(Ok(status)) => status,
        };

        if !status.success() {
            let code = status.code().unwrap_or(-1);
            return Ok(AgentResponse::failure(
                RetryCode::CliError,
                format!("agent exited with {code}: {}", stderr_text.trim()),
            ));
        }

        // Exit 0: the terminal result record decides.
        let content = tokio::fs::read_to_string(&output_path)
            .await
            .unwrap_or_default();
        match ndjson::final_result(&content) {
            None => Ok(AgentResponse::failure(
                RetryCode::ExecutionError,
                "agent exited cleanly but produced no terminal result record".to_string(),
            )),
            Some(record) => match record.error {
                Some(error) => Ok(AgentResponse::failure(
                    RetryCode::AgentReportedError,
                    error,
                )),
                None => Ok(AgentResponse::success(
                    record.result.unwrap_or_default(),
                    record.total_cost_usd,
                )),
            },
        }
    }

    /// Record the exact prompt and arguments next to the output, for
    /// auditing what each session was asked to do.
    async fn write_prompt_audit(&self, request: &AgentRequest, agent_dir: &Path) -> Result<()> {
        let prompts_dir = agent_dir.join("prompts");
        tokio::fs::create_dir_all(&prompts_dir).await?;

        let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%S%.3f");
        let command_slug = request.slash_command.trim_start_matches('/');
        let path = prompts_dir.join(format!("{stamp}_{command_slug}.txt"));

        let body = format!(
            "command: {}\nargs: {}\nmodel_set: {:?}\nworking_dir: {}\n\n{}\n",
            request.slash_command,
            request.args.join(" "),
            request.model_set,
            request
                .working_dir
                .as_deref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "<repo root>".to_string()),
            request.prompt(),
        );
        tokio::fs::write(&path, body).await?;
        Ok(())
    }
}

/// Environment overlay from the worktree's env files. `.ports.env`
/// wins over `.env` so allocated ports always reach the child.
fn worktree_env(dir: &Path) -> Vec<(String, String)> {
    let mut vars = Vec::new();
    for file in [".env", ".ports.env"] {
        let path = dir.join(file);
        if let Ok(content) = std::fs::read_to_string(&path) {
            for line in content.lines() {
                let line = line.trim();
                if line.is_empty() || line.starts_with('#') {
                    continue;
                }
                if let Some((key, value)) = adw_core::config::parse_env_line(line) {
                    vars.retain(|(k, _): &(String, String)| k != &key);
                    vars.push((key, value));
                }
            }
        }
    }
    vars
}
