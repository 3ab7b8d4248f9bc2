//! Request and subscription bookkeeping for one feed connection.
//!
//! Tracks requests awaiting a response and maps accepted subscription
//! handles back to their semantic kind. The registry never touches the
//! transport: callers send the frames and feed responses back in.

use std::collections::HashMap;
use std::time::Instant;

use serde_json::Value;

use crate::kind::SubscriptionKind;

/// A request sent upstream, awaiting its response.
#[derive(Debug, Clone)]
pub struct PendingRequest {
    pub id: u64,
    /// Set when the request was an `eth_subscribe` for this kind.
    pub kind: Option<SubscriptionKind>,
    pub issued_at: Instant,
}

/// An accepted subscription.
#[derive(Debug, Clone)]
pub struct Subscription {
    /// Id of the request that created it.
    pub request_id: u64,
    /// Opaque handle assigned by the upstream.
    pub handle: String,
    pub kind: SubscriptionKind,
}

/// Per-connection request/subscription registry.
///
/// Request ids are monotonic and never reused for the lifetime of the
/// connection, so a stale in-flight response can never match a newer
/// request. Id 0 is reserved for the bootstrap probe; issued ids start
/// at 1.
#[derive(Debug)]
pub struct Registry {
    next_id: u64,
    pending: HashMap<u64, PendingRequest>,
    subscriptions: HashMap<String, Subscription>,
}

impl Default for Registry {
    fn default() -> Self {
        Self {
            next_id: 1,
            pending: HashMap::new(),
            subscriptions: HashMap::new(),
        }
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next unused request id.
    pub fn next_request_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Record a pending request and return the id the caller must put in
    /// the outgoing frame. `kind` ties a subscribe request to the stream
    /// it asked for, so the handle can be registered on resolve.
    pub fn issue(&mut self, kind: Option<SubscriptionKind>) -> u64 {
        let id = self.next_request_id();
        self.pending.insert(
            id,
            PendingRequest {
                id,
                kind,
                issued_at: Instant::now(),
            },
        );
        id
    }

    /// Resolve a pending request with its result.
    ///
    /// When the request was a subscribe and the result is a handle (a
    /// string), the subscription is registered under that handle. An
    /// unknown id returns `None` and mutates nothing: the upstream may
    /// resend, or the id may belong to a dropped connection.
    pub fn resolve(&mut self, id: u64, result: &Value) -> Option<PendingRequest> {
        let pending = self.pending.remove(&id)?;
        if let (Some(kind), Some(handle)) = (pending.kind, result.as_str()) {
            self.subscriptions.insert(
                handle.to_string(),
                Subscription {
                    request_id: id,
                    handle: handle.to_string(),
                    kind,
                },
            );
        }
        Some(pending)
    }

    /// Remove a pending request after an upstream error, registering
    /// nothing.
    pub fn resolve_failure(&mut self, id: u64) -> Option<PendingRequest> {
        self.pending.remove(&id)
    }

    /// Remove a subscription and return it so the caller can emit the
    /// unsubscribe request. No-op if the handle is unknown.
    pub fn unsubscribe(&mut self, handle: &str) -> Option<Subscription> {
        self.subscriptions.remove(handle)
    }

    /// Clear every pending request and subscription without emitting any
    /// unsubscribe traffic. Used on forced disconnect; ids are not reset.
    pub fn drop_all(&mut self) {
        let pending = self.pending.len();
        let subscriptions = self.subscriptions.len();
        if pending > 0 || subscriptions > 0 {
            tracing::debug!(pending, subscriptions, "dropping registry state");
        }
        self.pending.clear();
        self.subscriptions.clear();
    }

    /// Kind of the subscription behind `handle`, if registered.
    pub fn kind_of(&self, handle: &str) -> Option<SubscriptionKind> {
        self.subscriptions.get(handle).map(|s| s.kind)
    }

    /// Currently registered subscription handles.
    pub fn handles(&self) -> Vec<String> {
        self.subscriptions.keys().cloned().collect()
    }

    /// Currently registered subscriptions.
    pub fn subscriptions(&self) -> impl Iterator<Item = &Subscription> {
        self.subscriptions.values()
    }

    /// Number of active subscriptions.
    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    /// Returns `true` if there are no active subscriptions.
    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    /// Number of requests still awaiting a response.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn ids_are_monotonic_and_never_reused() {
        let mut reg = Registry::new();
        let a = reg.issue(None);
        let b = reg.issue(Some(SubscriptionKind::StandardHeads));
        reg.resolve(a, &json!(null));
        let c = reg.issue(None);
        assert!(a < b && b < c);
    }

    #[test]
    fn resolve_registers_subscription_for_string_result() {
        let mut reg = Registry::new();
        let id = reg.issue(Some(SubscriptionKind::SpeculativeHeads));
        let pending = reg.resolve(id, &json!("0xabc")).unwrap();
        assert_eq!(pending.id, id);
        assert_eq!(
            reg.kind_of("0xabc"),
            Some(SubscriptionKind::SpeculativeHeads)
        );
        assert_eq!(reg.pending_len(), 0);
    }

    #[test]
    fn resolve_without_kind_registers_nothing() {
        let mut reg = Registry::new();
        let id = reg.issue(None);
        reg.resolve(id, &json!("0xabc"));
        assert!(reg.is_empty());
    }

    #[test]
    fn resolve_non_string_result_registers_nothing() {
        let mut reg = Registry::new();
        let id = reg.issue(Some(SubscriptionKind::StandardLogs));
        reg.resolve(id, &json!({"odd": true}));
        assert!(reg.is_empty());
    }

    #[test]
    fn unknown_id_is_ignored() {
        let mut reg = Registry::new();
        reg.issue(Some(SubscriptionKind::StandardHeads));
        assert!(reg.resolve(999, &json!("0xabc")).is_none());
        assert_eq!(reg.pending_len(), 1);
        assert!(reg.is_empty());
    }

    #[test]
    fn unsubscribe_returns_entry_once() {
        let mut reg = Registry::new();
        let id = reg.issue(Some(SubscriptionKind::StandardLogs));
        reg.resolve(id, &json!("0xfeed"));
        let sub = reg.unsubscribe("0xfeed").unwrap();
        assert_eq!(sub.kind, SubscriptionKind::StandardLogs);
        assert!(reg.unsubscribe("0xfeed").is_none());
    }

    #[test]
    fn drop_all_clears_everything() {
        let mut reg = Registry::new();
        reg.issue(None);
        let id = reg.issue(Some(SubscriptionKind::SpeculativeLogs));
        reg.resolve(id, &json!("0x1"));
        reg.drop_all();
        assert_eq!(reg.pending_len(), 0);
        assert!(reg.is_empty());
        // Ids keep counting after a drop.
        assert!(reg.issue(None) > id);
    }
}
