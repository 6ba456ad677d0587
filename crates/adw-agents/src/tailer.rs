//! Output-file tailer
//!
//! The agent CLI appends NDJSON to its output file; this task follows
//! the file as it grows and feeds parsed entries into the run's log
//! stream. Tailing keeps going until the child has exited AND the
//! file has been drained to EOF, so late flushes are never lost.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use adw_logs::LogStream;

use crate::ndjson;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

pub struct LogTailer {
    pub handle: JoinHandle<usize>,
    done_tx: watch::Sender<bool>,
}

impl LogTailer {
    /// Start tailing `path` for a run/phase. The file may not exist
    /// yet; the tailer waits for it. A pre-existing file means a
    /// retry is appending to earlier sessions, so tailing starts at
    /// the current end instead of re-forwarding old records.
    pub fn spawn(
        path: PathBuf,
        run_id: String,
        phase: String,
        logs: Arc<LogStream>,
    ) -> Self {
        let (done_tx, done_rx) = watch::channel(false);
        let start_at_end = path.exists();
        let handle = tokio::spawn(tail_loop(path, run_id, phase, logs, done_rx, start_at_end));
        Self { handle, done_tx }
    }

    /// Signal that the child has exited; the tailer drains to EOF and
    /// stops. Returns the number of entries forwarded.
    pub async fn finish(self) -> usize {
        let _ = self.done_tx.send(true);
        self.handle.await.unwrap_or(0)
    }
}

async fn tail_loop(
    path: PathBuf,
    run_id: String,
    phase: String,
    logs: Arc<LogStream>,
    done_rx: watch::Receiver<bool>,
    start_at_end: bool,
) -> usize {
    // Wait for the CLI to create the file.
    let mut file = loop {
        match tokio::fs::File::open(&path).await {
            Ok(f) => break f,
            Err(_) => {
                if *done_rx.borrow() {
                    debug!(path = %path.display(), "Output file never appeared");
                    return 0;
                }
                tokio::time::sleep(POLL_INTERVAL).await;
            }
        }
    };
    if start_at_end {
        use tokio::io::AsyncSeekExt;
        let _ = file.seek(std::io::SeekFrom::End(0)).await;
    }

    let mut reader = BufReader::new(file);
    let mut pending = String::new();
    let mut forwarded = 0usize;

    loop {
        let mut chunk = String::new();
        match reader.read_line(&mut chunk).await {
            Ok(0) => {
                // EOF: drain any final unterminated line once the
                // child is done, otherwise wait for more output.
                if *done_rx.borrow() {
                    if !pending.trim().is_empty() {
                        forwarded += forward(&pending, &run_id, &phase, &logs);
                    }
                    break;
                }
                tokio::time::sleep(POLL_INTERVAL).await;
            }
            Ok(_) => {
                pending.push_str(&chunk);
                if pending.ends_with('\n') {
                    forwarded += forward(&pending, &run_id, &phase, &logs);
                    pending.clear();
                }
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Tailer read error");
                break;
            }
        }
    }

    debug!(run_id = %run_id, phase = %phase, forwarded = forwarded, "Tailer finished");
    forwarded
}

fn forward(line: &str, run_id: &str, phase: &str, logs: &LogStream) -> usize {
    match ndjson::parse_line(line) {
        Some((kind, raw)) => {
            logs.append(ndjson::to_log_entry(run_id, phase, &kind, raw));
            1
        }
        None => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_tails_appends_until_done() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("output.jsonl");
        let logs = Arc::new(LogStream::with_defaults(None));

        let tailer = LogTailer::spawn(
            path.clone(),
            "a1b2c3d4".into(),
            "build".into(),
            logs.clone(),
        );

        // File appears after the tailer started.
        tokio::time::sleep(Duration::from_millis(150)).await;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .unwrap();
        writeln!(file, r#"{{"type":"message","content":"working"}}"#).unwrap();
        writeln!(file, r#"{{"type":"result","result":"done"}}"#).unwrap();
        file.flush().unwrap();

        tokio::time::sleep(Duration::from_millis(300)).await;
        let forwarded = tailer.finish().await;
        assert_eq!(forwarded, 2);

        let snapshot = logs.snapshot("a1b2c3d4", None);
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[1].message, "done");
    }

    #[tokio::test]
    async fn test_missing_file_with_immediate_done_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let logs = Arc::new(LogStream::with_defaults(None));
        let tailer = LogTailer::spawn(
            dir.path().join("never.jsonl"),
            "a1b2c3d4".into(),
            "plan".into(),
            logs,
        );
        assert_eq!(tailer.finish().await, 0);
    }
}
