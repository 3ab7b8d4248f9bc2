//! Block and log payload shaping.
//!
//! All parsing here is total: missing keys, bad hex and unexpected value
//! types produce `None` fields, never an error. Display code renders
//! unknown fields as `?`.

use serde_json::Value;

/// Payload field carried only by speculative deliveries.
pub const COMMIT_ID_FIELD: &str = "blockId";

/// Finality stage of a speculative block at notification time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitState {
    Proposed,
    Finalized,
    /// A stage outside the known set. Kept verbatim for display.
    Other(String),
}

impl CommitState {
    pub fn parse(label: &str) -> Self {
        match label {
            "Proposed" => Self::Proposed,
            "Finalized" => Self::Finalized,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Self::Proposed => "Proposed",
            Self::Finalized => "Finalized",
            Self::Other(label) => label,
        }
    }
}

impl std::fmt::Display for CommitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// One block-header notification, shaped for stats and display.
#[derive(Debug, Clone)]
pub struct BlockEvent {
    pub number: Option<u64>,
    pub gas_used: Option<u64>,
    pub gas_limit: Option<u64>,
    /// Set when the payload carries the commit-progression field.
    pub speculative: bool,
    pub commit_state: Option<CommitState>,
}

impl BlockEvent {
    /// Shape a raw notification payload into a block event.
    pub fn from_payload(payload: &Value) -> Self {
        Self {
            number: hex_quantity(payload.get("number")),
            gas_used: hex_quantity(payload.get("gasUsed")),
            gas_limit: hex_quantity(payload.get("gasLimit")),
            speculative: payload.get(COMMIT_ID_FIELD).is_some(),
            commit_state: payload
                .get("commitState")
                .and_then(Value::as_str)
                .map(CommitState::parse),
        }
    }

    /// Gas utilization as a percentage. `None` when either gas field is
    /// unknown or the limit is zero.
    pub fn gas_percent(&self) -> Option<f64> {
        match (self.gas_used, self.gas_limit) {
            (Some(used), Some(limit)) if limit > 0 => {
                Some(used as f64 / limit as f64 * 100.0)
            }
            _ => None,
        }
    }
}

/// A single event-log record, shaped for display.
#[derive(Debug, Clone)]
pub struct LogRecord {
    pub address: Option<String>,
    pub block_number: Option<u64>,
}

impl LogRecord {
    pub fn from_payload(payload: &Value) -> Self {
        Self {
            address: payload
                .get("address")
                .and_then(Value::as_str)
                .map(str::to_string),
            block_number: hex_quantity(payload.get("blockNumber")),
        }
    }
}

/// Parse a hex-quantity field (`"0x..."`). Plain JSON numbers are
/// accepted too; anything else is `None`.
pub fn hex_quantity(value: Option<&Value>) -> Option<u64> {
    match value? {
        Value::String(s) => {
            let digits = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X"))?;
            u64::from_str_radix(digits, 16).ok()
        }
        Value::Number(n) => n.as_u64(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn hex_quantity_parses_prefixed_hex() {
        assert_eq!(hex_quantity(Some(&json!("0x5"))), Some(5));
        assert_eq!(hex_quantity(Some(&json!("0xc8"))), Some(200));
        assert_eq!(hex_quantity(Some(&json!(42))), Some(42));
    }

    #[test]
    fn hex_quantity_total_over_garbage() {
        assert_eq!(hex_quantity(None), None);
        assert_eq!(hex_quantity(Some(&json!("zzz"))), None);
        assert_eq!(hex_quantity(Some(&json!("0xzz"))), None);
        assert_eq!(hex_quantity(Some(&json!(null))), None);
        assert_eq!(hex_quantity(Some(&json!(["0x5"]))), None);
        assert_eq!(hex_quantity(Some(&json!(-1))), None);
    }

    #[test]
    fn speculative_block_shape() {
        let ev = BlockEvent::from_payload(&json!({
            "number": "0x5",
            "gasUsed": "0x64",
            "gasLimit": "0xc8",
            "blockId": "0xfeed",
            "commitState": "Finalized",
        }));
        assert!(ev.speculative);
        assert_eq!(ev.number, Some(5));
        assert_eq!(ev.commit_state, Some(CommitState::Finalized));
        assert_eq!(ev.gas_percent(), Some(50.0));
    }

    #[test]
    fn standard_block_has_no_commit_progression() {
        let ev = BlockEvent::from_payload(&json!({
            "number": "0x10",
            "gasUsed": "0x0",
            "gasLimit": "0x1388",
        }));
        assert!(!ev.speculative);
        assert_eq!(ev.commit_state, None);
        assert_eq!(ev.gas_percent(), Some(0.0));
    }

    #[test]
    fn gas_percent_undefined_on_zero_limit() {
        let ev = BlockEvent::from_payload(&json!({
            "number": "0x1",
            "gasUsed": "0x64",
            "gasLimit": "0x0",
        }));
        assert_eq!(ev.gas_percent(), None);
    }

    #[test]
    fn unknown_commit_state_is_kept_verbatim() {
        let state = CommitState::parse("Voted");
        assert_eq!(state, CommitState::Other("Voted".into()));
        assert_eq!(state.label(), "Voted");
    }

    #[test]
    fn malformed_fields_resolve_to_unknown() {
        let ev = BlockEvent::from_payload(&json!({
            "number": "not hex",
            "gasUsed": {},
            "commitState": 7,
        }));
        assert_eq!(ev.number, None);
        assert_eq!(ev.gas_used, None);
        assert_eq!(ev.gas_limit, None);
        assert_eq!(ev.commit_state, None);
        assert_eq!(ev.gas_percent(), None);
    }
}
