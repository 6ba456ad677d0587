//! The notification hub
//!
//! Owns the session registry and the fan-out task that bridges the
//! in-process event bus to every connected WebSocket session. Also
//! the landing point for trigger requests and run teardown.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use adw_core::{BusEvent, LogLevel};
use adw_workflows::{lookup_pipeline, run_pipeline, PhaseContext, PhaseOptions};

use crate::messages::{self, ClientMessage, TriggerData};
use crate::session::{fingerprint, Session};

pub struct Hub {
    pub ctx: PhaseContext,
    sessions: RwLock<HashMap<Uuid, Arc<Session>>>,
}

impl Hub {
    pub fn new(ctx: PhaseContext) -> Arc<Self> {
        Arc::new(Self {
            ctx,
            sessions: RwLock::new(HashMap::new()),
        })
    }

    /// Start the bus→sessions fan-out task.
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        let hub = self.clone();
        tokio::spawn(async move {
            let mut rx = hub.ctx.bus.subscribe();
            loop {
                match rx.recv().await {
                    Ok(event) => hub.broadcast(&event).await,
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        warn!(missed = n, "Hub fan-out lagged behind the bus");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    /// Fan one event out to every session, with per-session dedup.
    pub async fn broadcast(&self, event: &BusEvent) {
        let text = match serde_json::to_string(event) {
            Ok(t) => t,
            Err(e) => {
                error!(error = %e, "Unserializable bus event");
                return;
            }
        };
        let bucket = chrono::Utc::now().timestamp();
        let fp = fingerprint(event, bucket);

        let sessions = self.sessions.read().await;
        for session in sessions.values() {
            if session.dedup_seen(fp) {
                continue;
            }
            session.enqueue(text.clone());
        }
    }

    pub async fn register(&self) -> Arc<Session> {
        let session = Arc::new(Session::new());
        self.sessions
            .write()
            .await
            .insert(session.id, session.clone());
        info!(session = %session.id, "WebSocket session connected");
        session
    }

    pub async fn unregister(&self, id: Uuid) {
        if let Some(session) = self.sessions.write().await.remove(&id) {
            session.close();
            info!(session = %id, "WebSocket session disconnected");
        }
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Handle one client text frame. Responses go to the originating
    /// session only; run broadcasts go to everyone.
    pub async fn handle_client_message(self: &Arc<Self>, session: &Arc<Session>, text: &str) {
        let message: ClientMessage = match serde_json::from_str(text) {
            Ok(m) => m,
            Err(e) => {
                session.enqueue(messages::error(&format!("unparsable message: {e}")));
                return;
            }
        };

        match message {
            ClientMessage::Ping => session.enqueue(messages::pong()),
            ClientMessage::TriggerWorkflow(data) => self.trigger(session, data).await,
            ClientMessage::DeleteAdw { run_id } => {
                match self.teardown_run(&run_id).await {
                    Ok(()) => info!(run_id = %run_id, "Run deleted"),
                    Err(e) => {
                        error!(run_id = %run_id, error = %e, "Run teardown failed");
                        session.enqueue(messages::error(&format!("delete failed: {e}")));
                    }
                }
            }
        }
    }

    /// Validate a trigger and spawn the pipeline. The run executes to
    /// completion regardless of what happens to the session.
    async fn trigger(self: &Arc<Self>, session: &Arc<Session>, data: TriggerData) {
        let Some(spec) = lookup_pipeline(&data.workflow_type) else {
            session.enqueue(messages::trigger_response(
                false,
                None,
                &format!("unknown workflow_type: {}", data.workflow_type),
            ));
            return;
        };

        let run_id = match adw_workflows::pipeline::resolve_run_id(spec, data.run_id.as_deref()) {
            Ok(id) => id,
            Err(e) => {
                session.enqueue(messages::trigger_response(false, None, &e.to_string()));
                return;
            }
        };

        // Dependent pipelines need an existing run with a worktree.
        if !spec.entry {
            let state = match self.ctx.store.load(&run_id).await {
                Ok(s) => s,
                Err(e) => {
                    session.enqueue(messages::trigger_response(
                        false,
                        Some(&run_id),
                        &e.to_string(),
                    ));
                    return;
                }
            };
            let Some(path) = state.worktree_path else {
                session.enqueue(messages::trigger_response(
                    false,
                    Some(&run_id),
                    "run has no worktree",
                ));
                return;
            };
            if let Err(e) = self.ctx.worktrees.validate(&run_id, &path).await {
                session.enqueue(messages::trigger_response(
                    false,
                    Some(&run_id),
                    &e.to_string(),
                ));
                return;
            }
        }

        let opts = PhaseOptions {
            issue_number: data.issue_number.clone(),
            model_set: data.model_set.unwrap_or_default(),
            data_source: if data.board_data.is_some() {
                adw_state::DataSource::Board
            } else {
                adw_state::DataSource::Forge
            },
            board_issue: data.board_data.clone(),
            skip_e2e: false,
            skip_resolution: false,
        };

        info!(
            workflow = %spec.name,
            run_id = %run_id,
            reason = %data.trigger_reason.as_deref().unwrap_or("unspecified"),
            "Workflow triggered via WebSocket"
        );
        session.enqueue(messages::trigger_response(true, Some(&run_id), "accepted"));

        let ctx = self.ctx.clone();
        let name = spec.name;
        let spawn_run_id = run_id.clone();
        tokio::spawn(async move {
            match run_pipeline(&ctx, name, Some(&spawn_run_id), &opts).await {
                Ok(outcome) if outcome.success => {
                    info!(run_id = %outcome.run_id, pipeline = name, "Triggered pipeline succeeded")
                }
                Ok(outcome) => warn!(
                    run_id = %outcome.run_id,
                    pipeline = name,
                    failed_phase = ?outcome.failed_phase(),
                    "Triggered pipeline failed"
                ),
                Err(e) => error!(pipeline = name, error = %e, "Triggered pipeline aborted"),
            }
        });
    }

    /// Full teardown of a run: child processes, worktree, state
    /// directory, log buffer. The only broadcast afterwards is the
    /// terminal `worktree_deleted`.
    pub async fn teardown_run(&self, run_id: &str) -> adw_core::Result<()> {
        let killed = self.ctx.procs.kill_run(run_id);
        if killed > 0 {
            self.ctx.system_log(
                run_id,
                "delete",
                LogLevel::Warn,
                format!("terminated {killed} child process(es)"),
            );
        }

        self.ctx.worktrees.remove(run_id).await?;
        self.ctx
            .store
            .delete_run(run_id)
            .await
            .map_err(adw_core::Error::from)?;
        self.ctx.logs.drop_run(run_id);

        self.ctx.bus.publish(BusEvent::WorktreeDeleted {
            run_id: run_id.to_string(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adw_core::{Config, PhaseStatus};

    fn test_ctx(dir: &std::path::Path) -> PhaseContext {
        let mut config = Config::from_env().unwrap();
        config.statestore_dir = dir.join("agents");
        config.trees_dir = dir.join("trees");
        PhaseContext::new(config)
    }

    #[tokio::test]
    async fn test_broadcast_reaches_all_sessions() {
        let dir = tempfile::tempdir().unwrap();
        let hub = Hub::new(test_ctx(dir.path()));
        let a = hub.register().await;
        let b = hub.register().await;

        let event = BusEvent::status_update("a1b2c3d4", "build", PhaseStatus::Running, 40);
        hub.broadcast(&event).await;

        for session in [&a, &b] {
            let text = session.next().await.unwrap();
            let value: serde_json::Value = serde_json::from_str(&text).unwrap();
            assert_eq!(value["type"], "status_update");
            assert_eq!(value["data"]["run_id"], "a1b2c3d4");
        }
    }

    #[tokio::test]
    async fn test_duplicate_broadcast_delivered_once() {
        let dir = tempfile::tempdir().unwrap();
        let hub = Hub::new(test_ctx(dir.path()));
        let session = hub.register().await;

        // Retry with a distinct event if the pair straddles a
        // one-second fingerprint bucket.
        for attempt in 0..3u8 {
            let event =
                BusEvent::status_update("a1b2c3d4", "build", PhaseStatus::Running, 40 + attempt);
            let before = chrono::Utc::now().timestamp();
            hub.broadcast(&event).await;
            hub.broadcast(&event).await;
            let after = chrono::Utc::now().timestamp();
            if before == after {
                break;
            }
            while session.queued() > 0 {
                session.next().await;
            }
        }

        assert_eq!(session.queued(), 1);
    }

    #[tokio::test]
    async fn test_unknown_workflow_type_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let hub = Hub::new(test_ctx(dir.path()));
        let session = hub.register().await;

        hub.handle_client_message(
            &session,
            r#"{"type":"trigger_workflow","data":{"workflow_type":"deploy"}}"#,
        )
        .await;

        let text = session.next().await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["type"], "trigger_response");
        assert_eq!(value["data"]["success"], false);
    }

    #[tokio::test]
    async fn test_dependent_trigger_without_run_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let hub = Hub::new(test_ctx(dir.path()));
        let session = hub.register().await;

        hub.handle_client_message(
            &session,
            r#"{"type":"trigger_workflow","data":{"workflow_type":"build"}}"#,
        )
        .await;

        let text = session.next().await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["data"]["success"], false);
    }

    #[tokio::test]
    async fn test_ping_pong() {
        let dir = tempfile::tempdir().unwrap();
        let hub = Hub::new(test_ctx(dir.path()));
        let session = hub.register().await;

        hub.handle_client_message(&session, r#"{"type":"ping"}"#).await;
        let text = session.next().await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["type"], "pong");
        assert!(value["data"]["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_malformed_frame_gets_error() {
        let dir = tempfile::tempdir().unwrap();
        let hub = Hub::new(test_ctx(dir.path()));
        let session = hub.register().await;

        hub.handle_client_message(&session, "not json").await;
        let text = session.next().await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["type"], "error");
    }
}
