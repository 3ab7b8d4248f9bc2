//! JSON-RPC 2.0 wire types for the subscription feed.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::kind::SubscriptionKind;

/// Request id reserved for the connection bootstrap height probe.
///
/// [`crate::registry::Registry`] hands out ids starting at 1, so the probe
/// id can never collide with a tracked request.
pub const BOOTSTRAP_PROBE_ID: u64 = 0;

/// A JSON-RPC 2.0 request.
///
/// Outbound ids on the feed connection are always numeric; the upstream
/// echoes them back verbatim in the matching response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub method: String,
    pub params: Vec<Value>,
    pub id: u64,
}

impl JsonRpcRequest {
    /// Create a new JSON-RPC 2.0 request.
    pub fn new(id: u64, method: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            method: method.into(),
            params,
            id,
        }
    }

    /// `eth_subscribe` request for the given stream kind.
    pub fn subscribe(id: u64, kind: SubscriptionKind) -> Self {
        Self::new(id, "eth_subscribe", vec![Value::String(kind.param().into())])
    }

    /// `eth_unsubscribe` request for a previously returned handle.
    pub fn unsubscribe(id: u64, handle: &str) -> Self {
        Self::new(id, "eth_unsubscribe", vec![Value::String(handle.into())])
    }

    /// The `eth_blockNumber` probe sent right after connecting, using the
    /// reserved [`BOOTSTRAP_PROBE_ID`].
    pub fn height_probe() -> Self {
        Self::new(BOOTSTRAP_PROBE_ID, "eth_blockNumber", vec![])
    }
}

/// A JSON-RPC 2.0 error object, as reported by the upstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl std::fmt::Display for JsonRpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "JSON-RPC error {}: {}", self.code, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribe_serialization() {
        let req = JsonRpcRequest::subscribe(7, SubscriptionKind::SpeculativeHeads);
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("\"jsonrpc\":\"2.0\""));
        assert!(json.contains("\"method\":\"eth_subscribe\""));
        assert!(json.contains("\"params\":[\"monadNewHeads\"]"));
        assert!(json.contains("\"id\":7"));
    }

    #[test]
    fn unsubscribe_carries_handle() {
        let req = JsonRpcRequest::unsubscribe(8, "0xabc");
        assert_eq!(req.method, "eth_unsubscribe");
        assert_eq!(req.params, vec![Value::String("0xabc".into())]);
    }

    #[test]
    fn probe_uses_reserved_id() {
        let req = JsonRpcRequest::height_probe();
        assert_eq!(req.id, BOOTSTRAP_PROBE_ID);
        assert_eq!(req.method, "eth_blockNumber");
        assert!(req.params.is_empty());
    }
}
