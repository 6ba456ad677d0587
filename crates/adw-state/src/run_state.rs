//! The durable per-run record
//!
//! `RunState` is the single document that links phases across process
//! boundaries. Unknown fields are rejected on load so a schema drift
//! between binaries is caught at the door instead of silently
//! round-tripping.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Classification assigned by the plan phase; drives which planning
/// slash command runs and the branch-name prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueClass {
    Bug,
    Feature,
    Chore,
}

impl IssueClass {
    /// Branch-name prefix for this class.
    pub fn branch_prefix(self) -> &'static str {
        match self {
            IssueClass::Feature => "feat",
            IssueClass::Bug => "bug",
            IssueClass::Chore => "chore",
        }
    }

    /// Planning slash command for this class.
    pub fn plan_command(self) -> &'static str {
        match self {
            IssueClass::Feature => "/feature",
            IssueClass::Bug => "/bug",
            IssueClass::Chore => "/chore",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "bug" => Some(IssueClass::Bug),
            "feature" => Some(IssueClass::Feature),
            "chore" => Some(IssueClass::Chore),
            _ => None,
        }
    }
}

impl std::fmt::Display for IssueClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            IssueClass::Bug => "bug",
            IssueClass::Feature => "feature",
            IssueClass::Chore => "chore",
        };
        f.write_str(s)
    }
}

/// Which model tier each slash command binds to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ModelSet {
    #[default]
    Base,
    Heavy,
}

/// Whether forge comments/PRs are produced, or issue data comes from
/// an inline board payload with forge writes suppressed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    #[default]
    Forge,
    Board,
}

/// Inline issue body carried by board-mode runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InlineIssue {
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub attachments: Vec<String>,
}

/// Where issue data comes from for a run
#[derive(Debug, Clone, PartialEq)]
pub enum IssueSource {
    Forge { issue_number: String },
    Board(InlineIssue),
}

/// One applied patch in a patch chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchRecord {
    pub patch_file: String,
    #[serde(default)]
    pub source_run: Option<String>,
    pub created_at: DateTime<Utc>,
}

fn default_version() -> u32 {
    1
}

/// The persistent per-run record. See the module docs for ownership.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunState {
    #[serde(default = "default_version")]
    pub version: u32,
    pub run_id: String,
    pub issue_number: Option<String>,
    pub branch_name: Option<String>,
    pub plan_file: Option<String>,
    pub issue_class: Option<IssueClass>,
    pub worktree_path: Option<PathBuf>,
    pub ws_port: Option<u16>,
    pub fe_port: Option<u16>,
    pub model_set: ModelSet,
    pub data_source: DataSource,
    pub issue_payload: Option<InlineIssue>,
    #[serde(default)]
    pub linked_runs: Vec<String>,
    pub patch_file: Option<String>,
    #[serde(default)]
    pub patch_history: Vec<PatchRecord>,
    #[serde(default)]
    pub completed: bool,
}

impl RunState {
    pub fn new(run_id: impl Into<String>, model_set: ModelSet, data_source: DataSource) -> Self {
        Self {
            version: default_version(),
            run_id: run_id.into(),
            issue_number: None,
            branch_name: None,
            plan_file: None,
            issue_class: None,
            worktree_path: None,
            ws_port: None,
            fe_port: None,
            model_set,
            data_source,
            issue_payload: None,
            linked_runs: Vec::new(),
            patch_file: None,
            patch_history: Vec::new(),
            completed: false,
        }
    }

    /// Typed view over (data_source, issue_number, issue_payload).
    pub fn issue_source(&self) -> Option<IssueSource> {
        match self.data_source {
            DataSource::Forge => self
                .issue_number
                .clone()
                .map(|issue_number| IssueSource::Forge { issue_number }),
            DataSource::Board => self.issue_payload.clone().map(IssueSource::Board),
        }
    }

    /// Invariant checks that hold for every persisted record.
    pub fn validate(&self) -> Result<(), String> {
        if !adw_core::is_valid_run_id(&self.run_id) {
            return Err(format!("run_id has invalid shape: {:?}", self.run_id));
        }
        if self.ws_port.is_some() != self.fe_port.is_some() {
            return Err("ws_port and fe_port must be set together".to_string());
        }
        if let (Some(ws), Some(fe)) = (self.ws_port, self.fe_port) {
            let ws_offset = i32::from(ws) - i32::from(adw_core::ports::WS_PORT_BASE);
            let fe_offset = i32::from(fe) - i32::from(adw_core::ports::FE_PORT_BASE);
            if ws_offset < 0 || ws_offset != fe_offset {
                return Err(format!("port pair offsets disagree: ws={ws} fe={fe}"));
            }
        }
        Ok(())
    }

    /// Fields the ship phase requires to be non-null, in stable order.
    /// Returns the names of the missing ones.
    pub fn missing_ship_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.issue_number.is_none() {
            missing.push("issue_number");
        }
        if self.branch_name.is_none() {
            missing.push("branch_name");
        }
        if self.plan_file.is_none() {
            missing.push("plan_file");
        }
        if self.issue_class.is_none() {
            missing.push("issue_class");
        }
        if self.worktree_path.is_none() {
            missing.push("worktree_path");
        }
        if self.ws_port.is_none() {
            missing.push("ws_port");
        }
        if self.fe_port.is_none() {
            missing.push("fe_port");
        }
        missing
    }

    /// Record a patch application, keeping `linked_runs` append-only.
    pub fn push_patch(&mut self, patch_file: impl Into<String>, source_run: Option<String>) {
        let patch_file = patch_file.into();
        if let Some(run) = &source_run {
            if !self.linked_runs.contains(run) {
                self.linked_runs.push(run.clone());
            }
        }
        self.patch_file = Some(patch_file.clone());
        self.patch_history.push(PatchRecord {
            patch_file,
            source_run,
            created_at: Utc::now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ship_fields_all_missing_on_fresh_state() {
        let state = RunState::new("a1b2c3d4", ModelSet::Base, DataSource::Forge);
        assert_eq!(
            state.missing_ship_fields(),
            vec![
                "issue_number",
                "branch_name",
                "plan_file",
                "issue_class",
                "worktree_path",
                "ws_port",
                "fe_port"
            ]
        );
    }

    #[test]
    fn test_port_pair_must_be_set_together() {
        let mut state = RunState::new("a1b2c3d4", ModelSet::Base, DataSource::Forge);
        assert!(state.validate().is_ok());
        state.ws_port = Some(8503);
        assert!(state.validate().is_err());
        state.fe_port = Some(9203);
        assert!(state.validate().is_ok());
        state.fe_port = Some(9204);
        assert!(state.validate().is_err());
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let json = r#"{
            "run_id": "a1b2c3d4",
            "issue_number": null,
            "branch_name": null,
            "plan_file": null,
            "issue_class": null,
            "worktree_path": null,
            "ws_port": null,
            "fe_port": null,
            "model_set": "base",
            "data_source": "forge",
            "issue_payload": null,
            "patch_file": null,
            "completed": false,
            "bogus_field": 1
        }"#;
        assert!(serde_json::from_str::<RunState>(json).is_err());
    }

    #[test]
    fn test_issue_source_forge_vs_board() {
        let mut state = RunState::new("a1b2c3d4", ModelSet::Base, DataSource::Forge);
        state.issue_number = Some("456".into());
        assert_eq!(
            state.issue_source(),
            Some(IssueSource::Forge {
                issue_number: "456".into()
            })
        );

        let mut board = RunState::new("b2c3d4e5", ModelSet::Heavy, DataSource::Board);
        board.issue_payload = Some(InlineIssue {
            title: "Add CSV export button".into(),
            body: "…".into(),
            labels: vec!["feature".into()],
            attachments: vec![],
        });
        assert!(matches!(board.issue_source(), Some(IssueSource::Board(_))));
    }

    #[test]
    fn test_push_patch_appends_history_and_links() {
        let mut state = RunState::new("a1b2c3d4", ModelSet::Base, DataSource::Forge);
        state.push_patch("specs/patch-1.md", Some("b2c3d4e5".into()));
        state.push_patch("specs/patch-2.md", Some("b2c3d4e5".into()));
        assert_eq!(state.patch_history.len(), 2);
        assert_eq!(state.linked_runs, vec!["b2c3d4e5"]);
        assert_eq!(state.patch_file.as_deref(), Some("specs/patch-2.md"));
    }

    #[test]
    fn test_class_prefix_and_command() {
        assert_eq!(IssueClass::Feature.branch_prefix(), "feat");
        assert_eq!(IssueClass::Bug.plan_command(), "/bug");
        assert_eq!(IssueClass::parse("Feature"), Some(IssueClass::Feature));
        assert_eq!(IssueClass::parse("unknown"), None);
    }
}
