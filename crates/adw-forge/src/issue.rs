//! Issue model and `gh --json` parsing

use serde::Deserialize;

use adw_state::InlineIssue;

use crate::{ForgeError, Result};

/// A forge issue, whether fetched or synthesized from a board payload
#[derive(Debug, Clone, PartialEq)]
pub struct Issue {
    pub number: Option<u64>,
    pub title: String,
    pub body: String,
    pub labels: Vec<String>,
}

#[derive(Deserialize)]
struct GhIssue {
    number: u64,
    title: String,
    #[serde(default)]
    body: String,
    #[serde(default)]
    labels: Vec<GhLabel>,
}

#[derive(Deserialize)]
struct GhLabel {
    name: String,
}

impl Issue {
    /// Parse `gh issue view --json number,title,body,labels` output.
    pub fn from_gh_json(out: &str) -> Result<Self> {
        let raw: GhIssue = serde_json::from_str(out.trim()).map_err(ForgeError::Parse)?;
        Ok(Self {
            number: Some(raw.number),
            title: raw.title,
            body: raw.body,
            labels: raw.labels.into_iter().map(|l| l.name).collect(),
        })
    }

    pub fn from_inline(inline: &InlineIssue) -> Self {
        Self {
            number: None,
            title: inline.title.clone(),
            body: inline.body.clone(),
            labels: inline.labels.clone(),
        }
    }

    /// Text handed to planning agents: title + body + labels.
    pub fn as_prompt_context(&self) -> String {
        let mut out = format!("# {}\n\n{}", self.title, self.body);
        if !self.labels.is_empty() {
            out.push_str(&format!("\n\nLabels: {}", self.labels.join(", ")));
        }
        out
    }
}
