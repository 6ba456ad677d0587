//! ADW Web - WebSocket notification hub
//!
//! Accepts board clients at `/ws`, takes trigger requests, and fans
//! out status/log/state broadcasts to every connected session.
//! Publishes never block: each session has a bounded outbound queue
//! (drop-oldest) and a fingerprint window that suppresses duplicate
//! broadcasts. Assumes a trusted local network; no auth.

pub mod hub;
pub mod messages;
pub mod routes;
pub mod server;
pub mod session;
pub mod websocket;

pub use hub::Hub;
pub use messages::{ClientMessage, TriggerData};
pub use server::HubServer;
pub use session::Session;
