//! Inbound frame classification.
//!
//! One decoded JSON-RPC frame maps to exactly one [`Inbound`] variant.
//! The upstream wire format has no discriminant field, so notification
//! payloads are classified by shape: block headers carry `number`, log
//! deliveries are a single object with `address` or an array of such
//! objects, and speculative deliveries carry the commit-progression
//! field. All of that sniffing lives in this module and nowhere else.

use serde_json::Value;

use crate::block::{BlockEvent, LogRecord, COMMIT_ID_FIELD};
use crate::wire::JsonRpcError;

/// Classified inbound frame.
#[derive(Debug)]
pub enum Inbound {
    /// Subscription notification: opaque handle plus raw payload.
    Notification { handle: String, payload: Value },
    /// Response to a request we sent.
    Response { id: u64, result: Value },
    /// Upstream-reported error object.
    Failure {
        id: Option<u64>,
        error: JsonRpcError,
    },
    /// Anything else. Dropped by the caller, never an error.
    Unrecognized,
}

/// Classify one decoded frame.
pub fn classify(frame: &Value) -> Inbound {
    if frame.get("method").and_then(Value::as_str) == Some("eth_subscription") {
        if let Some(params) = frame.get("params") {
            if let (Some(handle), Some(payload)) = (
                params.get("subscription").and_then(Value::as_str),
                params.get("result"),
            ) {
                return Inbound::Notification {
                    handle: handle.to_string(),
                    payload: payload.clone(),
                };
            }
        }
        return Inbound::Unrecognized;
    }

    if let Some(error) = frame.get("error") {
        return Inbound::Failure {
            id: frame.get("id").and_then(Value::as_u64),
            error: parse_error(error),
        };
    }

    if let (Some(id), Some(result)) = (
        frame.get("id").and_then(Value::as_u64),
        frame.get("result"),
    ) {
        return Inbound::Response {
            id,
            result: result.clone(),
        };
    }

    Inbound::Unrecognized
}

/// The upstream error object, carried verbatim. A malformed error object
/// still surfaces, with its raw JSON as the message.
fn parse_error(error: &Value) -> JsonRpcError {
    serde_json::from_value(error.clone()).unwrap_or_else(|_| JsonRpcError {
        code: 0,
        message: error.to_string(),
        data: None,
    })
}

/// Shaped notification payload.
#[derive(Debug)]
pub enum NotifyPayload {
    Block(BlockEvent),
    Logs {
        /// Shape-derived: the payload (not the subscription) carries the
        /// commit-progression field.
        speculative: bool,
        /// A batched delivery counts as one event per element.
        count: usize,
        /// First record, for single-log display.
        first: Option<LogRecord>,
    },
    Unrecognized,
}

/// Shape a notification payload into a block or log event.
pub fn shape_notification(payload: &Value) -> NotifyPayload {
    if payload.get("number").is_some() {
        return NotifyPayload::Block(BlockEvent::from_payload(payload));
    }

    if let Some(records) = payload.as_array() {
        return NotifyPayload::Logs {
            speculative: false,
            count: records.len(),
            first: records.first().map(LogRecord::from_payload),
        };
    }

    if payload.get("address").is_some() {
        return NotifyPayload::Logs {
            speculative: payload.get(COMMIT_ID_FIELD).is_some(),
            count: 1,
            first: Some(LogRecord::from_payload(payload)),
        };
    }

    NotifyPayload::Unrecognized
}
