//! Transport-level error types.

use thiserror::Error;

use crate::wire::JsonRpcError;

/// Errors that can occur on the feed connection.
///
/// None of these are fatal to the process: connect failures and dropped
/// connections are surfaced to the caller, which owns any retry policy.
/// Malformed inbound frames are not represented here at all — they are
/// dropped without error.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The WebSocket handshake failed.
    #[error("connect failed: {0}")]
    Connect(String),

    /// The WebSocket handshake did not complete in time.
    #[error("connect timed out after {ms}ms")]
    ConnectTimeout { ms: u64 },

    /// A send was attempted while the connection is not open.
    #[error("connection is not open")]
    NotOpen,

    /// WebSocket send/receive error on an established connection.
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// JSON-RPC error object reported by the upstream.
    #[error("RPC error {}: {}", .0.code, .0.message)]
    Rpc(JsonRpcError),
}
