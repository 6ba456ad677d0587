//! ADW Logs - Per-run bounded log streams
//!
//! One ring buffer per run, filled by the agent tailer and by system
//! events. Subscribers get a live tail over a broadcast channel;
//! one-shot consumers take a filtered snapshot. Overflow evicts the
//! oldest entries; the only backpressure in the pipeline lives at the
//! hub's per-session queues, never here.

mod buffer;
mod stream;

pub use buffer::{LogBuffer, LogFilter, DEFAULT_CAPACITY, MAX_CAPACITY};
pub use stream::LogStream;
