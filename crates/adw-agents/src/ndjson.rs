//! NDJSON agent-log parsing
//!
//! Each line of the agent's output file is one JSON object. Known
//! record types get structure; everything else passes through as a
//! debug-level log entry with the raw object attached.

use serde::Deserialize;
use serde_json::Value;

use adw_core::{LogEntry, LogLevel};

/// Terminal record of a session; exactly one per successful session
/// (retries append further sessions, the last one wins).
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ResultRecord {
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub total_cost_usd: Option<f64>,
}

/// Classified NDJSON record
#[derive(Debug, Clone, PartialEq)]
pub enum RecordKind {
    Message,
    ToolUse { name: String },
    ToolResult,
    Result(ResultRecord),
    Other(String),
}

/// Parse one NDJSON line. Lines that are not JSON objects (or have no
/// `type` field) are skipped entirely; the CLI occasionally emits
/// plain-text lifecycle chatter on the same stream.
pub fn parse_line(line: &str) -> Option<(RecordKind, Value)> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let raw: Value = serde_json::from_str(line).ok()?;
    let record_type = raw.get("type")?.as_str()?.to_string();

    let kind = match record_type.as_str() {
        "message" => RecordKind::Message,
        "tool_use" => RecordKind::ToolUse {
            name: raw
                .get("name")
                .and_then(|n| n.as_str())
                .unwrap_or("unknown")
                .to_string(),
        },
        "tool_result" => RecordKind::ToolResult,
        "result" => {
            let record: ResultRecord = serde_json::from_value(raw.clone()).ok()?;
            RecordKind::Result(record)
        }
        other => RecordKind::Other(other.to_string()),
    };
    Some((kind, raw))
}

/// Map a parsed record to a log entry for the run's stream.
pub fn to_log_entry(run_id: &str, phase: &str, kind: &RecordKind, raw: Value) -> LogEntry {
    match kind {
        RecordKind::Message => {
            let text = summarize_message(&raw);
            LogEntry::new(run_id, phase, LogLevel::Info, text).with_raw(raw)
        }
        RecordKind::ToolUse { name } => {
            LogEntry::new(run_id, phase, LogLevel::Info, format!("tool: {name}"))
                .with_step(name.clone())
                .with_raw(raw)
        }
        RecordKind::ToolResult => {
            LogEntry::new(run_id, phase, LogLevel::Debug, "tool result").with_raw(raw)
        }
        RecordKind::Result(record) => match &record.error {
            Some(err) => {
                LogEntry::new(run_id, phase, LogLevel::Error, err.clone()).with_raw(raw)
            }
            None => LogEntry::new(
                run_id,
                phase,
                LogLevel::Success,
                record.result.clone().unwrap_or_else(|| "done".to_string()),
            )
            .with_raw(raw),
        },
        RecordKind::Other(t) => {
            LogEntry::new(run_id, phase, LogLevel::Debug, format!("agent event: {t}")).with_raw(raw)
        }
    }
}

/// Short human-readable text for a `message` record.
fn summarize_message(raw: &Value) -> String {
    match raw.get("content") {
        Some(Value::String(s)) => truncate(s, 200),
        Some(Value::Array(parts)) => {
            let text: Vec<&str> = parts
                .iter()
                .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
                .collect();
            if text.is_empty() {
                "agent message".to_string()
            } else {
                truncate(&text.join(" "), 200)
            }
        }
        _ => "agent message".to_string(),
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max).collect();
        format!("{cut}…")
    }
}

/// Scan a whole output file for the last terminal result record.
pub fn final_result(content: &str) -> Option<ResultRecord> {
    content
        .lines()
        .rev()
        .find_map(|line| match parse_line(line) {
            Some((RecordKind::Result(record), _)) => Some(record),
            _ => None,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_result_record() {
        let line = r#"{"type":"result","result":"Implemented the feature","total_cost_usd":0.42}"#;
        let (kind, _) = parse_line(line).unwrap();
        match kind {
            RecordKind::Result(r) => {
                assert_eq!(r.result.as_deref(), Some("Implemented the feature"));
                assert_eq!(r.total_cost_usd, Some(0.42));
                assert!(r.error.is_none());
            }
            other => panic!("unexpected kind: {other:?}"),
        }
    }

    #[test]
    fn test_parse_tool_use() {
        let line = r#"{"type":"tool_use","name":"bash","input":{"command":"ls"}}"#;
        let (kind, _) = parse_line(line).unwrap();
        assert_eq!(
            kind,
            RecordKind::ToolUse {
                name: "bash".into()
            }
        );
    }

    #[test]
    fn test_unknown_type_passes_through() {
        let line = r#"{"type":"system_init","session":"x"}"#;
        let (kind, raw) = parse_line(line).unwrap();
        assert_eq!(kind, RecordKind::Other("system_init".into()));
        let entry = to_log_entry("a1b2c3d4", "build", &kind, raw);
        assert_eq!(entry.level, adw_core::LogLevel::Debug);
    }

    #[test]
    fn test_non_json_lines_skipped() {
        assert!(parse_line("starting up...").is_none());
        assert!(parse_line("").is_none());
        assert!(parse_line(r#"{"no_type": true}"#).is_none());
    }

    #[test]
    fn test_final_result_takes_last_session() {
        let content = "\
{\"type\":\"result\",\"error\":\"first attempt failed\"}\n\
{\"type\":\"message\",\"content\":\"retrying\"}\n\
{\"type\":\"result\",\"result\":\"second attempt ok\"}\n";
        let record = final_result(content).unwrap();
        assert_eq!(record.result.as_deref(), Some("second attempt ok"));
        assert!(record.error.is_none());
    }

    #[test]
    fn test_result_with_error_maps_to_error_entry() {
        let line = r#"{"type":"result","error":"tests failed"}"#;
        let (kind, raw) = parse_line(line).unwrap();
        let entry = to_log_entry("a1b2c3d4", "test", &kind, raw);
        assert_eq!(entry.level, adw_core::LogLevel::Error);
        assert_eq!(entry.message, "tests failed");
    }

    #[test]
    fn test_message_summary_from_content_array() {
        let line = r#"{"type":"message","content":[{"text":"Reading files"},{"text":"now"}]}"#;
        let (kind, raw) = parse_line(line).unwrap();
        let entry = to_log_entry("a1b2c3d4", "plan", &kind, raw);
        assert_eq!(entry.message, "Reading files now");
    }
}
