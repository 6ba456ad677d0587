//! Run-keyed routing over log buffers

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::broadcast;
use tracing::debug;

use adw_core::{BusEvent, EventBus, LogEntry};

use crate::buffer::{LogBuffer, LogFilter, DEFAULT_CAPACITY};

/// Routes entries to per-run buffers and mirrors them onto the event
/// bus as `workflow_log` broadcasts.
pub struct LogStream {
    capacity: usize,
    bus: Option<EventBus>,
    buffers: RwLock<HashMap<String, Arc<Mutex<LogBuffer>>>>,
}

impl LogStream {
    pub fn new(capacity: usize, bus: Option<EventBus>) -> Self {
        Self {
            capacity,
            bus,
            buffers: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_defaults(bus: Option<EventBus>) -> Self {
        Self::new(DEFAULT_CAPACITY, bus)
    }

    fn buffer_for(&self, run_id: &str) -> Arc<Mutex<LogBuffer>> {
        if let Some(buffer) = self.buffers.read().expect("log stream poisoned").get(run_id) {
            return buffer.clone();
        }
        let mut buffers = self.buffers.write().expect("log stream poisoned");
        buffers
            .entry(run_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(LogBuffer::new(self.capacity))))
            .clone()
    }

    /// Append an entry to its run's buffer and broadcast it.
    pub fn append(&self, entry: LogEntry) {
        let buffer = self.buffer_for(&entry.run_id);
        buffer
            .lock()
            .expect("log buffer poisoned")
            .append(entry.clone());
        if let Some(bus) = &self.bus {
            bus.publish(BusEvent::WorkflowLog(entry));
        }
    }

    /// Live tail of one run's entries.
    pub fn subscribe(&self, run_id: &str) -> broadcast::Receiver<LogEntry> {
        let buffer = self.buffer_for(run_id);
        let rx = buffer.lock().expect("log buffer poisoned").subscribe();
        rx
    }

    /// One-shot filtered query.
    pub fn snapshot(&self, run_id: &str, filter: Option<&LogFilter>) -> Vec<LogEntry> {
        let buffers = self.buffers.read().expect("log stream poisoned");
        match buffers.get(run_id) {
            Some(buffer) => buffer.lock().expect("log buffer poisoned").snapshot(filter),
            None => Vec::new(),
        }
    }

    /// Drop a run's buffer at teardown.
    pub fn drop_run(&self, run_id: &str) {
        let mut buffers = self.buffers.write().expect("log stream poisoned");
        if buffers.remove(run_id).is_some() {
            debug!(run_id = %run_id, "Dropped log buffer");
        }
    }

    pub fn run_count(&self) -> usize {
        self.buffers.read().expect("log stream poisoned").len()
    }
}
