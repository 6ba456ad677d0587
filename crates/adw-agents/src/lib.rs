//! ADW Agents - Headless AI CLI execution harness
//!
//! Spawns the agent CLI in a run's worktree, streams its append-only
//! NDJSON output into the log stream, parses the terminal result
//! record, and classifies every exit condition into a retry code.
//! Retry scheduling lives here too; callers never retry phases.

pub mod models;
pub mod ndjson;
pub mod request;
pub mod runner;
pub mod tailer;

pub use models::model_for;
pub use ndjson::{parse_line, RecordKind, ResultRecord};
pub use request::{AgentRequest, AgentResponse, RetryCode};
pub use runner::AgentRunner;
