//! Phase execution context
//!
//! The composition root owns every process-wide handle (state store,
//! worktree manager, shims, log stream, event bus) and passes one
//! `PhaseContext` into phase functions. No module-level singletons.

use std::sync::Arc;

use adw_agents::AgentRunner;
use adw_artifacts::ArtifactUploader;
use adw_core::{
    BusEvent, Config, EventBus, LogEntry, LogLevel, PhaseStatus, PortAllocator, ProcessRegistry,
};
use adw_forge::ForgeClient;
use adw_git::GitCli;
use adw_logs::LogStream;
use adw_state::StateStore;
use adw_worktree::WorktreeManager;

#[derive(Clone)]
pub struct PhaseContext {
    pub config: Config,
    pub bus: EventBus,
    pub store: Arc<StateStore>,
    pub worktrees: Arc<WorktreeManager>,
    pub ports: PortAllocator,
    pub git: GitCli,
    pub forge: ForgeClient,
    pub agents: Arc<AgentRunner>,
    pub logs: Arc<LogStream>,
    pub procs: Arc<ProcessRegistry>,
    pub uploader: Arc<ArtifactUploader>,
}

impl PhaseContext {
    /// Wire up the full handle bundle from configuration. The repo
    /// root is the directory the orchestrator runs from.
    pub fn new(config: Config) -> Self {
        let bus = EventBus::default();
        let logs = Arc::new(LogStream::with_defaults(Some(bus.clone())));
        let procs = Arc::new(ProcessRegistry::new());
        let store = Arc::new(StateStore::new(
            config.statestore_dir.clone(),
            Some(bus.clone()),
        ));
        let worktrees = Arc::new(WorktreeManager::new(".", config.trees_dir.clone()));
        let ports = PortAllocator::new(config.max_runs);
        let forge = ForgeClient::new(&config);
        let agents = Arc::new(AgentRunner::new(&config, logs.clone(), procs.clone()));
        let uploader = Arc::new(ArtifactUploader::new(&config));

        Self {
            config,
            bus,
            store,
            worktrees,
            ports,
            git: GitCli::new(),
            forge,
            agents,
            logs,
            procs,
            uploader,
        }
    }

    /// Emit a `status_update` broadcast for a phase sub-step.
    pub fn emit_status(
        &self,
        run_id: &str,
        phase: &str,
        status: PhaseStatus,
        progress: u8,
        message: Option<&str>,
    ) {
        let mut event = BusEvent::status_update(run_id, phase, status, progress);
        if let Some(msg) = message {
            event = event.with_message(msg);
        }
        self.bus.publish(event);
    }

    /// Append a system event to the run's log stream (phase start/end,
    /// worktree lifecycle, warnings).
    pub fn system_log(&self, run_id: &str, phase: &str, level: LogLevel, message: impl Into<String>) {
        self.logs
            .append(LogEntry::new(run_id, phase, level, message));
    }
}
