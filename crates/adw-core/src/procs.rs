//! Per-run child-process registry
//!
//! The agent runner registers every child it spawns under the owning
//! run id; run teardown signals whatever is still alive. The registry
//! holds pids, not handles, so ownership of the child stays with the
//! task that spawned it.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use tracing::{debug, warn};

#[derive(Debug, Default)]
pub struct ProcessRegistry {
    inner: Mutex<HashMap<String, HashSet<u32>>>,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, run_id: &str, pid: u32) {
        let mut inner = self.inner.lock().expect("process registry poisoned");
        inner.entry(run_id.to_string()).or_default().insert(pid);
        debug!(run_id = %run_id, pid = pid, "Registered child process");
    }

    pub fn deregister(&self, run_id: &str, pid: u32) {
        let mut inner = self.inner.lock().expect("process registry poisoned");
        if let Some(pids) = inner.get_mut(run_id) {
            pids.remove(&pid);
            if pids.is_empty() {
                inner.remove(run_id);
            }
        }
    }

    /// Pids currently registered for a run.
    pub fn pids(&self, run_id: &str) -> Vec<u32> {
        let inner = self.inner.lock().expect("process registry poisoned");
        inner
            .get(run_id)
            .map(|pids| pids.iter().copied().collect())
            .unwrap_or_default()
    }

    /// SIGTERM every process still registered for a run. Returns how
    /// many were signaled. Already-dead pids are ignored.
    pub fn kill_run(&self, run_id: &str) -> usize {
        let pids = {
            let mut inner = self.inner.lock().expect("process registry poisoned");
            inner.remove(run_id).unwrap_or_default()
        };

        let mut signaled = 0;
        for pid in pids {
            let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
            if rc == 0 {
                signaled += 1;
            } else {
                warn!(run_id = %run_id, pid = pid, "Process already gone at teardown");
            }
        }
        signaled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_deregister_roundtrip() {
        let registry = ProcessRegistry::new();
        registry.register("a1b2c3d4", 4242);
        registry.register("a1b2c3d4", 4243);
        assert_eq!(registry.pids("a1b2c3d4").len(), 2);

        registry.deregister("a1b2c3d4", 4242);
        assert_eq!(registry.pids("a1b2c3d4"), vec![4243]);
    }

    #[test]
    fn test_kill_unknown_run_is_noop() {
        let registry = ProcessRegistry::new();
        assert_eq!(registry.kill_run("zzzzzzzz"), 0);
    }

    #[test]
    fn test_kill_clears_registry() {
        let registry = ProcessRegistry::new();
        // A pid that certainly is not ours to signal; kill_run must
        // still clear the bookkeeping.
        registry.register("a1b2c3d4", u32::MAX - 1);
        registry.kill_run("a1b2c3d4");
        assert!(registry.pids("a1b2c3d4").is_empty());
    }
}
