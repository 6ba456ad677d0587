//! ADW State Store - Per-run durable state
//!
//! One JSON file per run under `<statestore>/<run_id>/state.json`,
//! mutated only by the phase currently executing for that run. Writes
//! are atomic (temp file + fsync + rename) and serialized per run;
//! snapshots broadcast a `state_change` event with the changed field
//! names and the full record.

pub mod error;
pub mod run_state;
pub mod store;

pub use error::{Result, StateStoreError};
pub use run_state::{
    DataSource, InlineIssue, IssueClass, IssueSource, ModelSet, PatchRecord, RunState,
};
pub use store::StateStore;
