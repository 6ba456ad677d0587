//! WebSocket message envelopes
//!
//! Text frames carrying `{type, data}` JSON. Server→client broadcasts
//! reuse the bus event serialization; the handshake messages (pong,
//! trigger_response, error) are built here.

use serde::Deserialize;
use serde_json::json;

use adw_state::{InlineIssue, ModelSet};

/// Client→server messages
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ClientMessage {
    Ping,
    TriggerWorkflow(TriggerData),
    /// Full run teardown: worktree, processes, state, logs.
    DeleteAdw {
        run_id: String,
    },
}

/// Payload of `trigger_workflow`
#[derive(Debug, Clone, Deserialize)]
pub struct TriggerData {
    pub workflow_type: String,
    #[serde(default)]
    pub run_id: Option<String>,
    #[serde(default)]
    pub issue_number: Option<String>,
    #[serde(default)]
    pub model_set: Option<ModelSet>,
    #[serde(default)]
    pub trigger_reason: Option<String>,
    #[serde(default)]
    pub board_data: Option<InlineIssue>,
}

pub fn pong() -> String {
    json!({
        "type": "pong",
        "data": { "timestamp": chrono::Utc::now().to_rfc3339() }
    })
    .to_string()
}

pub fn trigger_response(success: bool, run_id: Option<&str>, message: &str) -> String {
    json!({
        "type": "trigger_response",
        "data": { "success": success, "run_id": run_id, "message": message }
    })
    .to_string()
}

pub fn error(message: &str) -> String {
    json!({
        "type": "error",
        "data": { "message": message }
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ping() {
        let msg: ClientMessage = serde_json::from_str(r#"{"type":"ping"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::Ping));
    }

    #[test]
    fn test_parse_trigger_workflow() {
        let msg: ClientMessage = serde_json::from_str(
            r#"{
                "type": "trigger_workflow",
                "data": {
                    "workflow_type": "plan",
                    "issue_number": "789",
                    "model_set": "base",
                    "trigger_reason": "test"
                }
            }"#,
        )
        .unwrap();
        match msg {
            ClientMessage::TriggerWorkflow(data) => {
                assert_eq!(data.workflow_type, "plan");
                assert_eq!(data.issue_number.as_deref(), Some("789"));
                assert_eq!(data.model_set, Some(ModelSet::Base));
                assert!(data.run_id.is_none());
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_parse_delete_adw() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"delete_adw","data":{"run_id":"a1b2c3d4"}}"#).unwrap();
        match msg {
            ClientMessage::DeleteAdw { run_id } => assert_eq!(run_id, "a1b2c3d4"),
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_trigger_response_shape() {
        let text = trigger_response(true, Some("a1b2c3d4"), "started");
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["type"], "trigger_response");
        assert_eq!(value["data"]["run_id"], "a1b2c3d4");
        assert_eq!(value["data"]["success"], true);
    }
}
