//! ADW Core - Shared foundation for the workflow orchestrator
//!
//! Provides the pieces every other crate leans on:
//! - Error taxonomy and `Result` alias
//! - Environment-derived configuration
//! - Run-id generation (8-char base-36 keys)
//! - Deterministic port allocation
//! - Broadcast event bus (status updates, logs, state changes)
//! - Per-run child-process registry for teardown

pub mod config;
pub mod error;
pub mod events;
pub mod ids;
pub mod log_entry;
pub mod ports;
pub mod procs;

pub use config::Config;
pub use error::{Error, Result};
pub use events::{BusEvent, EventBus, PhaseStatus};
pub use ids::{generate_run_id, is_valid_run_id};
pub use log_entry::{LogEntry, LogLevel};
pub use ports::{PortAllocator, PortPair};
pub use procs::ProcessRegistry;
