//! monwatch-ws — single-session WebSocket transport for the feed.
//!
//! # Features
//! - One socket per session, opened with a handshake timeout
//! - Owner event channel: `Opened` / `Frame` / `Error` / `Closed`
//! - Fail-fast sends once the connection is gone
//! - Process-unique session ids for stale-event filtering
//!
//! Deliberately absent: reconnect and resubscribe. Subscription handles
//! are invalid after any close, so recovery policy belongs to the layer
//! that owns the subscriptions.

pub mod session;

pub use session::{SessionConfig, SessionEvent, SessionId, WsSession};
