//! Connected-session bookkeeping
//!
//! Each session owns a bounded outbound queue drained by its sender
//! task. Publishers enqueue without blocking; a slow consumer loses
//! the oldest pending messages and gets a single warning. A 64-deep
//! fingerprint window suppresses near-identical broadcasts that
//! multiple backend emitters produce for the same state transition.

use std::collections::hash_map::DefaultHasher;
use std::collections::VecDeque;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tokio::sync::Notify;
use uuid::Uuid;
use tracing::warn;

use adw_core::BusEvent;

/// Outbound queue bound per session
pub const OUTBOUND_QUEUE_CAP: usize = 256;
/// Remembered fingerprints per session
pub const DEDUP_WINDOW: usize = 64;

pub struct Session {
    pub id: Uuid,
    queue: Mutex<VecDeque<String>>,
    notify: Notify,
    fingerprints: Mutex<VecDeque<u64>>,
    closed: AtomicBool,
    overflow_warned: AtomicBool,
}

impl Session {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            queue: Mutex::new(VecDeque::with_capacity(OUTBOUND_QUEUE_CAP)),
            notify: Notify::new(),
            fingerprints: Mutex::new(VecDeque::with_capacity(DEDUP_WINDOW)),
            closed: AtomicBool::new(false),
            overflow_warned: AtomicBool::new(false),
        }
    }

    /// Queue a message for delivery. Never blocks; drops the oldest
    /// pending message on overflow and warns once per session.
    pub fn enqueue(&self, message: String) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        {
            let mut queue = self.queue.lock().expect("session queue poisoned");
            if queue.len() >= OUTBOUND_QUEUE_CAP {
                queue.pop_front();
                if !self.overflow_warned.swap(true, Ordering::AcqRel) {
                    warn!(session = %self.id, "Session outbound queue full; dropping oldest");
                }
            }
            queue.push_back(message);
        }
        self.notify.notify_one();
    }

    /// Next message to send, waiting if the queue is empty. Returns
    /// None once the session is closed and drained.
    pub async fn next(&self) -> Option<String> {
        loop {
            {
                let mut queue = self.queue.lock().expect("session queue poisoned");
                if let Some(message) = queue.pop_front() {
                    return Some(message);
                }
            }
            if self.closed.load(Ordering::Acquire) {
                return None;
            }
            self.notify.notified().await;
        }
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Record a fingerprint; true when it was already in the window
    /// (the message should be suppressed).
    pub fn dedup_seen(&self, fingerprint: u64) -> bool {
        let mut window = self.fingerprints.lock().expect("dedup window poisoned");
        if window.contains(&fingerprint) {
            return true;
        }
        if window.len() >= DEDUP_WINDOW {
            window.pop_front();
        }
        window.push_back(fingerprint);
        false
    }

    pub fn queued(&self) -> usize {
        self.queue.lock().expect("session queue poisoned").len()
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// Content fingerprint: event type + run id + key fields + a
/// one-second timestamp bucket.
pub fn fingerprint(event: &BusEvent, bucket_secs: i64) -> u64 {
    let mut hasher = DefaultHasher::new();
    bucket_secs.hash(&mut hasher);
    event.run_id().hash(&mut hasher);
    match event {
        BusEvent::StatusUpdate {
            phase,
            status,
            progress,
            message,
            ..
        } => {
            0u8.hash(&mut hasher);
            phase.hash(&mut hasher);
            format!("{status:?}").hash(&mut hasher);
            progress.hash(&mut hasher);
            message.hash(&mut hasher);
        }
        BusEvent::WorkflowLog(entry) => {
            1u8.hash(&mut hasher);
            entry.phase.hash(&mut hasher);
            entry.message.hash(&mut hasher);
            format!("{:?}", entry.level).hash(&mut hasher);
            entry.timestamp.timestamp_millis().hash(&mut hasher);
        }
        BusEvent::StateChange {
            phase_marker,
            changed_fields,
            ..
        } => {
            2u8.hash(&mut hasher);
            phase_marker.hash(&mut hasher);
            changed_fields.hash(&mut hasher);
        }
        BusEvent::WorktreeDeleted { .. } => {
            3u8.hash(&mut hasher);
        }
    }
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use adw_core::PhaseStatus;

    #[test]
    fn test_queue_drops_oldest_on_overflow() {
        let session = Session::new();
        for i in 0..OUTBOUND_QUEUE_CAP + 10 {
            session.enqueue(format!("msg {i}"));
        }
        assert_eq!(session.queued(), OUTBOUND_QUEUE_CAP);
        // The oldest 10 are gone.
        let first = futures::executor::block_on(session.next()).unwrap();
        assert_eq!(first, "msg 10");
    }

    #[tokio::test]
    async fn test_next_drains_then_waits_until_close() {
        let session = std::sync::Arc::new(Session::new());
        session.enqueue("one".into());
        assert_eq!(session.next().await.as_deref(), Some("one"));

        let waiter = session.clone();
        let handle = tokio::spawn(async move { waiter.next().await });
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        session.close();
        assert_eq!(handle.await.unwrap(), None);
    }

    #[test]
    fn test_dedup_window_suppresses_repeats() {
        let session = Session::new();
        let event = BusEvent::status_update("a1b2c3d4", "build", PhaseStatus::Running, 40);
        let fp = fingerprint(&event, 1000);
        assert!(!session.dedup_seen(fp));
        assert!(session.dedup_seen(fp));
    }

    #[test]
    fn test_dedup_window_is_bounded() {
        let session = Session::new();
        let base = BusEvent::status_update("a1b2c3d4", "build", PhaseStatus::Running, 40);
        let first = fingerprint(&base, 0);
        assert!(!session.dedup_seen(first));
        // Push the first fingerprint out of the window.
        for i in 1..=DEDUP_WINDOW as i64 {
            session.dedup_seen(fingerprint(&base, i));
        }
        assert!(!session.dedup_seen(first));
    }

    #[test]
    fn test_fingerprint_varies_with_bucket_and_fields() {
        let a = BusEvent::status_update("a1b2c3d4", "build", PhaseStatus::Running, 40);
        let b = BusEvent::status_update("a1b2c3d4", "build", PhaseStatus::Running, 41);
        assert_eq!(fingerprint(&a, 5), fingerprint(&a, 5));
        assert_ne!(fingerprint(&a, 5), fingerprint(&a, 6));
        assert_ne!(fingerprint(&a, 5), fingerprint(&b, 5));
    }
}
