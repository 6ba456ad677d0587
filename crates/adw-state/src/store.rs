//! File-backed store operations
//!
//! Concurrency model: one writer per run id. A keyed async mutex
//! serializes create/update/snapshot for the same run; distinct runs
//! never contend. The state file is replaced atomically so readers
//! never observe partially written JSON.

use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use adw_core::{BusEvent, EventBus};

use crate::error::{Result, StateStoreError};
use crate::run_state::RunState;

const STATE_FILE: &str = "state.json";

pub struct StateStore {
    root: PathBuf,
    bus: Option<EventBus>,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    /// Field names changed by `update` since the last snapshot, per run.
    pending_changes: Mutex<HashMap<String, BTreeSet<String>>>,
}

impl StateStore {
    pub fn new(root: impl Into<PathBuf>, bus: Option<EventBus>) -> Self {
        Self {
            root: root.into(),
            bus,
            locks: Mutex::new(HashMap::new()),
            pending_changes: Mutex::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn run_dir(&self, run_id: &str) -> PathBuf {
        self.root.join(run_id)
    }

    fn state_path(&self, run_id: &str) -> PathBuf {
        self.run_dir(run_id).join(STATE_FILE)
    }

    async fn lock_for(&self, run_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(run_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Create the run directory and the initial state record.
    pub async fn create(&self, state: RunState) -> Result<RunState> {
        state
            .validate()
            .map_err(StateStoreError::SchemaInvalid)?;

        let lock = self.lock_for(&state.run_id).await;
        let _guard = lock.lock().await;

        let path = self.state_path(&state.run_id);
        if path.exists() {
            return Err(StateStoreError::AlreadyExists(state.run_id.clone()));
        }

        fs::create_dir_all(self.run_dir(&state.run_id))?;
        write_atomic(&path, &state)?;
        info!(run_id = %state.run_id, "Created state record");
        Ok(state)
    }

    /// Load a run's state, rejecting records with unknown fields.
    pub async fn load(&self, run_id: &str) -> Result<RunState> {
        let path = self.state_path(run_id);
        let content = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StateStoreError::NotFound(run_id.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        let state: RunState = serde_json::from_str(&content)
            .map_err(|e| StateStoreError::SchemaInvalid(format!("{run_id}: {e}")))?;
        Ok(state)
    }

    /// Merge-update under the run's write lock. Changed top-level
    /// fields are remembered until the next `save_snapshot`.
    pub async fn update<F>(&self, run_id: &str, patch: F) -> Result<RunState>
    where
        F: FnOnce(&mut RunState),
    {
        let lock = self.lock_for(run_id).await;
        let _guard = lock.lock().await;

        let before = self.load(run_id).await?;
        let mut after = before.clone();
        patch(&mut after);
        after.run_id = before.run_id.clone(); // primary key is immutable

        after
            .validate()
            .map_err(StateStoreError::SchemaInvalid)?;

        let changed = changed_fields(&before, &after)?;
        if !changed.is_empty() {
            write_atomic(&self.state_path(run_id), &after)?;
            let mut pending = self.pending_changes.lock().await;
            pending
                .entry(run_id.to_string())
                .or_default()
                .extend(changed.iter().cloned());
            debug!(run_id = %run_id, changed = ?changed, "Updated state");
        }
        Ok(after)
    }

    /// Persist the current record and broadcast a `state_change` event
    /// carrying the fields changed since the previous snapshot plus a
    /// full snapshot of the record.
    pub async fn save_snapshot(&self, run_id: &str, phase_marker: &str) -> Result<RunState> {
        let lock = self.lock_for(run_id).await;
        let _guard = lock.lock().await;

        let state = self.load(run_id).await?;
        write_atomic(&self.state_path(run_id), &state)?;

        let changed: Vec<String> = {
            let mut pending = self.pending_changes.lock().await;
            pending
                .remove(run_id)
                .map(|set| set.into_iter().collect())
                .unwrap_or_default()
        };

        if let Some(bus) = &self.bus {
            bus.publish(BusEvent::StateChange {
                run_id: run_id.to_string(),
                phase_marker: phase_marker.to_string(),
                changed_fields: changed,
                snapshot: serde_json::to_value(&state)?,
            });
        }
        Ok(state)
    }

    /// Run ids that have a state record on disk.
    pub async fn list_runs(&self) -> Result<Vec<String>> {
        let mut runs = Vec::new();
        let entries = match fs::read_dir(&self.root) {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(runs),
            Err(e) => return Err(e.into()),
        };
        for entry in entries {
            let entry = entry?;
            if entry.path().join(STATE_FILE).is_file() {
                if let Some(name) = entry.file_name().to_str() {
                    runs.push(name.to_string());
                }
            }
        }
        runs.sort();
        Ok(runs)
    }

    /// Remove a run's whole state directory (state, agent logs,
    /// prompts). Idempotent.
    pub async fn delete_run(&self, run_id: &str) -> Result<()> {
        let lock = self.lock_for(run_id).await;
        let _guard = lock.lock().await;

        match fs::remove_dir_all(self.run_dir(run_id)) {
            Ok(()) => {
                info!(run_id = %run_id, "Deleted state directory");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Write `state` to `path` atomically: temp file in the same
/// directory, fsync, rename over the target.
fn write_atomic(path: &Path, state: &RunState) -> Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| StateStoreError::SchemaInvalid("state path has no parent".into()))?;
    let tmp = dir.join(format!(".{STATE_FILE}.tmp"));

    let json = serde_json::to_string_pretty(state)?;
    {
        use std::io::Write;
        let mut file = fs::File::create(&tmp)?;
        file.write_all(json.as_bytes())?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Top-level field names whose JSON value differs between two records.
fn changed_fields(before: &RunState, after: &RunState) -> Result<Vec<String>> {
    let a = serde_json::to_value(before)?;
    let b = serde_json::to_value(after)?;
    let (a, b) = match (a, b) {
        (serde_json::Value::Object(a), serde_json::Value::Object(b)) => (a, b),
        _ => return Ok(Vec::new()),
    };
    let mut changed = Vec::new();
    for (key, value) in &b {
        if a.get(key) != Some(value) {
            changed.push(key.clone());
        }
    }
    Ok(changed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::run_state::{DataSource, ModelSet};
    use adw_core::EventBus;

    fn fresh(run_id: &str) -> RunState {
        RunState::new(run_id, ModelSet::Base, DataSource::Forge)
    }

    #[tokio::test]
    async fn test_create_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path(), None);

        let created = store.create(fresh("a1b2c3d4")).await.unwrap();
        let loaded = store.load("a1b2c3d4").await.unwrap();
        assert_eq!(created, loaded);
    }

    #[tokio::test]
    async fn test_create_twice_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path(), None);
        store.create(fresh("a1b2c3d4")).await.unwrap();
        assert!(matches!(
            store.create(fresh("a1b2c3d4")).await,
            Err(StateStoreError::AlreadyExists(_))
        ));
    }

    #[tokio::test]
    async fn test_load_missing_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path(), None);
        assert!(matches!(
            store.load("zzzzzzzz").await,
            Err(StateStoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_update_persists_and_load_agrees() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path(), None);
        store.create(fresh("a1b2c3d4")).await.unwrap();

        let updated = store
            .update("a1b2c3d4", |s| {
                s.issue_number = Some("456".into());
                s.branch_name = Some("feat-issue-456-run-a1b2c3d4-csv".into());
            })
            .await
            .unwrap();
        let loaded = store.load("a1b2c3d4").await.unwrap();
        assert_eq!(updated, loaded);
        assert_eq!(loaded.issue_number.as_deref(), Some("456"));
    }

    #[tokio::test]
    async fn test_update_cannot_change_run_id() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path(), None);
        store.create(fresh("a1b2c3d4")).await.unwrap();

        let state = store
            .update("a1b2c3d4", |s| s.run_id = "hijacked1".into())
            .await
            .unwrap();
        assert_eq!(state.run_id, "a1b2c3d4");
    }

    #[tokio::test]
    async fn test_update_rejects_port_pair_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path(), None);
        store.create(fresh("a1b2c3d4")).await.unwrap();

        let result = store.update("a1b2c3d4", |s| s.ws_port = Some(8503)).await;
        assert!(matches!(result, Err(StateStoreError::SchemaInvalid(_))));
        // The bad write must not have landed.
        let loaded = store.load("a1b2c3d4").await.unwrap();
        assert_eq!(loaded.ws_port, None);
    }

    #[tokio::test]
    async fn test_snapshot_emits_changed_fields_and_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        let store = StateStore::new(dir.path(), Some(bus));

        store.create(fresh("a1b2c3d4")).await.unwrap();
        store
            .update("a1b2c3d4", |s| s.issue_number = Some("456".into()))
            .await
            .unwrap();
        store.save_snapshot("a1b2c3d4", "plan").await.unwrap();

        match rx.recv().await.unwrap() {
            BusEvent::StateChange {
                run_id,
                phase_marker,
                changed_fields,
                snapshot,
            } => {
                assert_eq!(run_id, "a1b2c3d4");
                assert_eq!(phase_marker, "plan");
                assert_eq!(changed_fields, vec!["issue_number"]);
                assert_eq!(snapshot["issue_number"], "456");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_snapshot_drains_pending_changes() {
        let dir = tempfile::tempdir().unwrap();
        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        let store = StateStore::new(dir.path(), Some(bus));

        store.create(fresh("a1b2c3d4")).await.unwrap();
        store
            .update("a1b2c3d4", |s| s.issue_number = Some("456".into()))
            .await
            .unwrap();
        store.save_snapshot("a1b2c3d4", "plan").await.unwrap();
        store.save_snapshot("a1b2c3d4", "plan").await.unwrap();

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        match (first, second) {
            (
                BusEvent::StateChange {
                    changed_fields: f1, ..
                },
                BusEvent::StateChange {
                    changed_fields: f2, ..
                },
            ) => {
                assert_eq!(f1, vec!["issue_number"]);
                assert!(f2.is_empty());
            }
            other => panic!("unexpected events: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_list_and_delete_runs() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path(), None);
        store.create(fresh("a1b2c3d4")).await.unwrap();
        store.create(fresh("b2c3d4e5")).await.unwrap();

        assert_eq!(store.list_runs().await.unwrap(), vec!["a1b2c3d4", "b2c3d4e5"]);

        store.delete_run("a1b2c3d4").await.unwrap();
        store.delete_run("a1b2c3d4").await.unwrap(); // idempotent
        assert_eq!(store.list_runs().await.unwrap(), vec!["b2c3d4e5"]);
    }

    #[tokio::test]
    async fn test_partial_file_never_visible() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path(), None);
        store.create(fresh("a1b2c3d4")).await.unwrap();

        // Many sequential updates; after each, the on-disk file must
        // parse cleanly (rename is atomic).
        for i in 0..20 {
            store
                .update("a1b2c3d4", |s| s.issue_number = Some(format!("{i}")))
                .await
                .unwrap();
            let raw = fs::read_to_string(store.state_path("a1b2c3d4")).unwrap();
            assert!(serde_json::from_str::<RunState>(&raw).is_ok());
        }
    }
}
