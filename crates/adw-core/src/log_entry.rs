//! Shared log-entry model
//!
//! Produced by the agent tailer and by system events (phase start/end,
//! worktree lifecycle); consumed by the log buffers and the hub.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Severity of a log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Info,
    Success,
    Warn,
    Error,
    Debug,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LogLevel::Info => "info",
            LogLevel::Success => "success",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Debug => "debug",
        };
        f.write_str(s)
    }
}

/// One streamed log record, partitioned by run id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub run_id: String,
    pub phase: String,
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_step: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress_percent: Option<u8>,
    /// Original NDJSON line from the agent, for deep inspection
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<Value>,
}

impl LogEntry {
    pub fn new(
        run_id: impl Into<String>,
        phase: impl Into<String>,
        level: LogLevel,
        message: impl Into<String>,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            phase: phase.into(),
            timestamp: Utc::now(),
            level,
            message: message.into(),
            current_step: None,
            progress_percent: None,
            raw: None,
        }
    }

    pub fn with_step(mut self, step: impl Into<String>) -> Self {
        self.current_step = Some(step.into());
        self
    }

    pub fn with_progress(mut self, percent: u8) -> Self {
        self.progress_percent = Some(percent.min(100));
        self
    }

    pub fn with_raw(mut self, raw: Value) -> Self {
        self.raw = Some(raw);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_serializes_snake_case() {
        assert_eq!(serde_json::to_string(&LogLevel::Warn).unwrap(), "\"warn\"");
        assert_eq!(
            serde_json::to_string(&LogLevel::Success).unwrap(),
            "\"success\""
        );
    }

    #[test]
    fn test_progress_clamped_to_100() {
        let entry = LogEntry::new("a1b2c3d4", "build", LogLevel::Info, "step").with_progress(250);
        assert_eq!(entry.progress_percent, Some(100));
    }

    #[test]
    fn test_optional_fields_omitted() {
        let entry = LogEntry::new("a1b2c3d4", "plan", LogLevel::Info, "hello");
        let json = serde_json::to_value(&entry).unwrap();
        assert!(json.get("current_step").is_none());
        assert!(json.get("raw").is_none());
    }
}
