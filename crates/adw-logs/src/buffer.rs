//! Ring buffer for one run's log entries

use std::collections::VecDeque;
use tokio::sync::broadcast;

use adw_core::{LogEntry, LogLevel};

/// Default per-run capacity
pub const DEFAULT_CAPACITY: usize = 1000;
/// Hard cap regardless of configuration
pub const MAX_CAPACITY: usize = 10_000;

/// Snapshot filter
#[derive(Debug, Clone, Default)]
pub struct LogFilter {
    pub level: Option<LogLevel>,
    pub contains: Option<String>,
}

impl LogFilter {
    pub fn matches(&self, entry: &LogEntry) -> bool {
        if let Some(level) = self.level {
            if entry.level != level {
                return false;
            }
        }
        if let Some(needle) = &self.contains {
            if !entry.message.contains(needle.as_str()) {
                return false;
            }
        }
        true
    }
}

/// Bounded buffer plus a live-tail channel
#[derive(Debug)]
pub struct LogBuffer {
    capacity: usize,
    entries: VecDeque<LogEntry>,
    tx: broadcast::Sender<LogEntry>,
}

impl LogBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.clamp(1, MAX_CAPACITY);
        let (tx, _) = broadcast::channel(capacity);
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
            tx,
        }
    }

    /// O(1) append; evicts the oldest entry on overflow.
    pub fn append(&mut self, entry: LogEntry) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry.clone());
        // Live tail; nobody listening is fine.
        let _ = self.tx.send(entry);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LogEntry> {
        self.tx.subscribe()
    }

    pub fn snapshot(&self, filter: Option<&LogFilter>) -> Vec<LogEntry> {
        match filter {
            None => self.entries.iter().cloned().collect(),
            Some(f) => self.entries.iter().filter(|e| f.matches(e)).cloned().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(i: usize, level: LogLevel) -> LogEntry {
        LogEntry::new("a1b2c3d4", "build", level, format!("line {i}"))
    }

    #[test]
    fn test_overflow_evicts_oldest() {
        let mut buffer = LogBuffer::new(3);
        for i in 0..5 {
            buffer.append(entry(i, LogLevel::Info));
        }
        assert_eq!(buffer.len(), 3);
        let snapshot = buffer.snapshot(None);
        assert_eq!(snapshot[0].message, "line 2");
        assert_eq!(snapshot[2].message, "line 4");
    }

    #[test]
    fn test_capacity_clamped_to_hard_cap() {
        let buffer = LogBuffer::new(1_000_000);
        assert_eq!(buffer.capacity, MAX_CAPACITY);
    }

    #[test]
    fn test_filter_by_level_and_substring() {
        let mut buffer = LogBuffer::new(10);
        buffer.append(entry(0, LogLevel::Info));
        buffer.append(entry(1, LogLevel::Error));
        buffer.append(entry(2, LogLevel::Error));

        let errors = buffer.snapshot(Some(&LogFilter {
            level: Some(LogLevel::Error),
            contains: None,
        }));
        assert_eq!(errors.len(), 2);

        let one = buffer.snapshot(Some(&LogFilter {
            level: Some(LogLevel::Error),
            contains: Some("line 2".into()),
        }));
        assert_eq!(one.len(), 1);
        assert_eq!(one[0].message, "line 2");
    }

    #[tokio::test]
    async fn test_live_tail_receives_appends() {
        let mut buffer = LogBuffer::new(10);
        let mut rx = buffer.subscribe();
        buffer.append(entry(0, LogLevel::Info));
        let received = rx.recv().await.unwrap();
        assert_eq!(received.message, "line 0");
    }

    #[test]
    fn test_timestamps_non_decreasing_in_append_order() {
        let mut buffer = LogBuffer::new(100);
        for i in 0..50 {
            buffer.append(entry(i, LogLevel::Info));
        }
        let snapshot = buffer.snapshot(None);
        for pair in snapshot.windows(2) {
            assert!(pair[0].timestamp <= pair[1].timestamp);
        }
    }
}
