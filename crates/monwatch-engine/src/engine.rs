//! The feed engine: one connection, its subscriptions, and the running
//! statistics derived from what arrives.

use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::sync::mpsc;

use monwatch_core::block::{hex_quantity, BlockEvent, LogRecord};
use monwatch_core::classify::{classify, shape_notification, Inbound, NotifyPayload};
use monwatch_core::error::TransportError;
use monwatch_core::events::{EventLog, DEFAULT_LOG_CAPACITY};
use monwatch_core::kind::SubscriptionKind;
use monwatch_core::registry::Registry;
use monwatch_core::stats::{StatsAggregator, StatsSnapshot};
use monwatch_core::wire::{JsonRpcRequest, BOOTSTRAP_PROBE_ID};
use monwatch_ws::{SessionConfig, SessionEvent, SessionId, WsSession};

/// Connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Open,
    Closing,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Open => write!(f, "open"),
            Self::Closing => write!(f, "closing"),
        }
    }
}

/// Configuration for the engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub session: SessionConfig,
    /// Entries retained by the event log.
    pub log_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            session: SessionConfig::default(),
            log_capacity: DEFAULT_LOG_CAPACITY,
        }
    }
}

/// The subscription/event-processing engine.
///
/// Owns at most one live [`WsSession`] plus the per-connection
/// [`Registry`] and [`StatsAggregator`], and feeds the shared
/// [`EventLog`]. All mutation happens inside one command method or one
/// [`handle_event`] call, so the engine needs no locking of its own:
/// effects land in exactly the delivery order of the transport.
///
/// [`handle_event`]: Engine::handle_event
pub struct Engine {
    config: EngineConfig,
    state: ConnectionState,
    session: Option<WsSession>,
    session_id: Option<SessionId>,
    events: Option<mpsc::UnboundedReceiver<(SessionId, SessionEvent)>>,
    registry: Registry,
    stats: StatsAggregator,
    log: EventLog,
    connected_at: Option<Instant>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        let log = EventLog::new(config.log_capacity);
        Self {
            config,
            state: ConnectionState::Disconnected,
            session: None,
            session_id: None,
            events: None,
            registry: Registry::new(),
            stats: StatsAggregator::new(),
            log,
            connected_at: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Open
    }

    /// Time since the last successful connect. Zero before the first one.
    pub fn uptime(&self) -> Duration {
        self.connected_at.map(|t| t.elapsed()).unwrap_or_default()
    }

    pub fn stats_snapshot(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Shared event log handle. Clone it, snapshot it, or subscribe to
    /// its push feed; the engine is the only writer.
    pub fn log(&self) -> &EventLog {
        &self.log
    }

    pub fn subscription_count(&self) -> usize {
        self.registry.len()
    }

    /// Take the session event receiver so an outer loop can drive
    /// [`handle_event`] while still borrowing the engine between events.
    ///
    /// [`handle_event`]: Engine::handle_event
    pub fn take_events(
        &mut self,
    ) -> Option<mpsc::UnboundedReceiver<(SessionId, SessionEvent)>> {
        self.events.take()
    }

    /// Open a fresh connection.
    ///
    /// A successful connect is the one action that zeroes the stats and
    /// starts a new registry; a dropped connection never resets them on
    /// its own. The bootstrap height probe goes out right away.
    pub async fn connect(&mut self, url: &str) -> Result<(), TransportError> {
        if matches!(self.state, ConnectionState::Open | ConnectionState::Connecting) {
            tracing::debug!(state = %self.state, "connect ignored");
            return Ok(());
        }

        self.state = ConnectionState::Connecting;
        let (session, events) = match WsSession::open(url, self.config.session.clone()).await {
            Ok(opened) => opened,
            Err(e) => {
                self.state = ConnectionState::Disconnected;
                self.log.append(format!("Connection failed: {e}"));
                return Err(e);
            }
        };

        self.session_id = Some(session.id());
        self.session = Some(session);
        self.events = Some(events);
        self.state = ConnectionState::Open;
        self.begin_connection(url);
        if let Some(session) = &self.session {
            if let Err(e) = session.send(&JsonRpcRequest::height_probe()) {
                tracing::warn!(error = %e, "bootstrap probe failed");
            }
        }
        Ok(())
    }

    /// Fresh-connect bookkeeping: new registry, zeroed stats, uptime
    /// stamp, connect log line.
    fn begin_connection(&mut self, url: &str) {
        self.registry = Registry::new();
        self.stats.reset();
        self.connected_at = Some(Instant::now());
        self.log.append(format!("Connected to {url}"));
    }

    /// Gracefully tear the connection down: unsubscribe everything that
    /// still has a live handle, close the socket, drop all registry
    /// state. Idempotent; further events from the old session are
    /// ignored by identity.
    pub fn disconnect(&mut self) {
        if self.state == ConnectionState::Disconnected {
            return;
        }
        self.unsubscribe_all();
        self.state = ConnectionState::Closing;
        if let Some(session) = &self.session {
            session.close();
        }
        self.session = None;
        self.session_id = None;
        self.events = None;
        self.registry.drop_all();
        self.state = ConnectionState::Disconnected;
        self.log.append("Disconnected");
    }

    /// Subscribe to one stream. Returns the request id on its way to the
    /// upstream; the subscription itself exists once the response carries
    /// a handle.
    pub fn subscribe(&mut self, kind: SubscriptionKind) -> Result<u64, TransportError> {
        if self.state != ConnectionState::Open {
            return Err(TransportError::NotOpen);
        }
        let id = self.registry.issue(Some(kind));
        let req = JsonRpcRequest::subscribe(id, kind);
        let sent = match &self.session {
            Some(session) => session.send(&req),
            None => Err(TransportError::NotOpen),
        };
        if let Err(e) = sent {
            self.registry.resolve_failure(id);
            return Err(e);
        }
        self.log.append(format!("Starting {kind} subscription"));
        Ok(id)
    }

    /// Drop every subscription, emitting one unsubscribe request per
    /// handle while the connection is still open. With the connection
    /// gone the handles are invalid upstream anyway, so none is sent.
    pub fn unsubscribe_all(&mut self) {
        let handles = self.registry.handles();
        if handles.is_empty() {
            return;
        }
        for handle in handles {
            let Some(sub) = self.registry.unsubscribe(&handle) else {
                continue;
            };
            if self.session.as_ref().is_some_and(|s| s.is_open()) {
                let id = self.registry.issue(None);
                let req = JsonRpcRequest::unsubscribe(id, &sub.handle);
                if let Some(session) = &self.session {
                    if let Err(e) = session.send(&req) {
                        tracing::debug!(error = %e, handle = %sub.handle, "unsubscribe send failed");
                    }
                }
            }
        }
        self.log.append("All subscriptions cancelled");
    }

    /// Process one transport event. Events carrying a stale session id
    /// are dropped: a closed connection halts all processing for it even
    /// if frames were still in flight.
    pub fn handle_event(&mut self, session: SessionId, event: SessionEvent) {
        if self.session_id != Some(session) {
            tracing::debug!(session = %session, "event from stale session dropped");
            return;
        }
        match event {
            SessionEvent::Opened => {}
            SessionEvent::Frame(frame) => self.handle_frame(&frame),
            SessionEvent::Error(cause) => {
                tracing::warn!(cause = %cause, "transport error");
                self.log.append(format!("Transport error: {cause}"));
            }
            SessionEvent::Closed(code) => {
                self.registry.drop_all();
                self.session = None;
                self.session_id = None;
                self.events = None;
                self.state = ConnectionState::Disconnected;
                match code {
                    Some(code) => self.log.append(format!("Connection closed (code {code})")),
                    None => self.log.append("Connection closed"),
                }
            }
        }
    }

    fn handle_frame(&mut self, frame: &Value) {
        match classify(frame) {
            Inbound::Notification { handle, payload } => {
                self.handle_notification(&handle, &payload);
            }
            Inbound::Response { id, result } => {
                if id == BOOTSTRAP_PROBE_ID {
                    // Height reading for the log only; no stats effect.
                    if let Some(height) = hex_quantity(Some(&result)) {
                        self.log.append(format!("Current block: #{height}"));
                    }
                } else if let Some(pending) = self.registry.resolve(id, &result) {
                    if let (Some(kind), Some(handle)) = (pending.kind, result.as_str()) {
                        self.log.append(format!(
                            "{kind} subscription created: {}",
                            short_handle(handle)
                        ));
                    }
                }
                // Unknown ids are silently ignored.
            }
            Inbound::Failure { id, error } => {
                if let Some(id) = id {
                    self.registry.resolve_failure(id);
                }
                self.log.append(format!("RPC error: {error}"));
            }
            Inbound::Unrecognized => {
                tracing::debug!("unrecognized frame dropped");
            }
        }
    }

    fn handle_notification(&mut self, handle: &str, payload: &Value) {
        let Some(kind) = self.registry.kind_of(handle) else {
            tracing::debug!(handle, "notification for unknown subscription");
            return;
        };

        if kind.is_heads() {
            match shape_notification(payload) {
                NotifyPayload::Block(event) => {
                    self.stats.record_block(&event);
                    self.stats.record_interval(Instant::now());
                    self.log.append(block_line(&event));
                }
                _ => tracing::debug!(handle, "head notification without block shape"),
            }
        } else {
            match shape_notification(payload) {
                NotifyPayload::Logs {
                    speculative,
                    count,
                    first,
                } => {
                    self.stats.record_logs(count);
                    self.log.append(logs_line(speculative, count, first.as_ref()));
                }
                _ => tracing::debug!(handle, "log notification without log shape"),
            }
        }
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

fn block_line(event: &BlockEvent) -> String {
    let number = event
        .number
        .map(|n| n.to_string())
        .unwrap_or_else(|| "?".into());
    let gas = event
        .gas_percent()
        .map(|p| format!("{p:.1}%"))
        .unwrap_or_else(|| "?".into());
    if event.speculative {
        let state = event
            .commit_state
            .as_ref()
            .map(|s| s.label())
            .unwrap_or("Unknown");
        format!("Monad Block #{number} [{state}] | Gas: {gas}")
    } else {
        format!("Standard Block #{number} | Gas: {gas}")
    }
}

fn logs_line(speculative: bool, count: usize, first: Option<&LogRecord>) -> String {
    let tag = if speculative { "monad" } else { "standard" };
    if count == 1 {
        if let Some(record) = first {
            let address = record.address.as_deref().unwrap_or("?");
            let block = record
                .block_number
                .map(|n| format!("#{n}"))
                .unwrap_or_else(|| "pending".into());
            return format!(
                "Event log: {} | Block: {block} ({tag})",
                short_handle(address)
            );
        }
    }
    format!("{count} event logs received ({tag})")
}

fn short_handle(handle: &str) -> String {
    match handle.get(..10) {
        Some(prefix) if handle.len() > 10 => format!("{prefix}..."),
        _ => handle.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use monwatch_core::stats::StatsSnapshot;
    use serde_json::json;

    fn engine() -> Engine {
        Engine::new(EngineConfig::default())
    }

    /// Engine wired as if a connection were open, without a socket.
    fn connected_engine() -> (Engine, SessionId) {
        let mut e = engine();
        let sid = SessionId::next();
        e.session_id = Some(sid);
        e.state = ConnectionState::Open;
        (e, sid)
    }

    fn register(e: &mut Engine, kind: SubscriptionKind, handle: &str) {
        let id = e.registry.issue(Some(kind));
        e.handle_frame(&json!({"jsonrpc": "2.0", "id": id, "result": handle}));
        assert_eq!(e.registry.kind_of(handle), Some(kind));
    }

    fn notification(handle: &str, result: Value) -> Value {
        json!({
            "jsonrpc": "2.0",
            "method": "eth_subscription",
            "params": {"subscription": handle, "result": result},
        })
    }

    #[test]
    fn subscribe_response_registers_subscription() {
        let mut e = engine();
        let id = e.registry.issue(Some(SubscriptionKind::SpeculativeHeads));
        e.handle_frame(&json!({"jsonrpc": "2.0", "id": id, "result": "0xabc"}));
        assert_eq!(
            e.registry.kind_of("0xabc"),
            Some(SubscriptionKind::SpeculativeHeads)
        );
        let lines = e.log().snapshot();
        assert!(lines
            .iter()
            .any(|l| l.text.contains("subscription created: 0xabc")));
    }

    #[test]
    fn speculative_block_updates_stats_and_log() {
        let mut e = engine();
        register(&mut e, SubscriptionKind::SpeculativeHeads, "0xbeef");
        e.handle_frame(&notification(
            "0xbeef",
            json!({
                "number": "0x5",
                "gasUsed": "0x64",
                "gasLimit": "0xc8",
                "blockId": "0xfeed",
                "commitState": "Finalized",
            }),
        ));
        let snap = e.stats_snapshot();
        assert_eq!(snap.speculative_blocks, 1);
        assert_eq!(snap.finalized, 1);
        assert_eq!(snap.standard_blocks, 0);
        assert!(e
            .log()
            .snapshot()
            .iter()
            .any(|l| l.text.contains("Monad Block #5 [Finalized]") && l.text.contains("50.0%")));
    }

    #[test]
    fn standard_block_on_speculative_subscription() {
        // Kind picks the heads branch; the payload shape decides
        // standard vs speculative.
        let mut e = engine();
        register(&mut e, SubscriptionKind::SpeculativeHeads, "0xbeef");
        e.handle_frame(&notification(
            "0xbeef",
            json!({"number": "0x10", "gasUsed": "0x1", "gasLimit": "0x2"}),
        ));
        let snap = e.stats_snapshot();
        assert_eq!(snap.standard_blocks, 1);
        assert_eq!(snap.speculative_blocks, 0);
        assert!(e
            .log()
            .snapshot()
            .iter()
            .any(|l| l.text.contains("Standard Block #16")));
    }

    #[test]
    fn batched_logs_count_per_record() {
        let mut e = engine();
        register(&mut e, SubscriptionKind::StandardLogs, "0x10");
        e.handle_frame(&notification(
            "0x10",
            json!([{"address": "0xaa"}, {"address": "0xbb"}, {"address": "0xcc"}]),
        ));
        assert_eq!(e.stats_snapshot().logs, 3);
        assert!(e
            .log()
            .snapshot()
            .iter()
            .any(|l| l.text.contains("3 event logs received (standard)")));
    }

    #[test]
    fn single_log_line_names_address_and_block() {
        let mut e = engine();
        register(&mut e, SubscriptionKind::SpeculativeLogs, "0x11");
        e.handle_frame(&notification(
            "0x11",
            json!({"address": "0x1234567890abcdef", "blockNumber": "0x10", "blockId": "0x1"}),
        ));
        assert_eq!(e.stats_snapshot().logs, 1);
        assert!(e
            .log()
            .snapshot()
            .iter()
            .any(|l| l.text.contains("0x12345678...") && l.text.contains("Block: #16")
                && l.text.contains("(monad)")));
    }

    #[test]
    fn pending_log_without_block_number() {
        let mut e = engine();
        register(&mut e, SubscriptionKind::StandardLogs, "0x12");
        e.handle_frame(&notification("0x12", json!({"address": "0xaa"})));
        assert!(e
            .log()
            .snapshot()
            .iter()
            .any(|l| l.text.contains("Block: pending")));
    }

    #[test]
    fn probe_response_is_log_only() {
        let mut e = engine();
        e.handle_frame(&json!({"jsonrpc": "2.0", "id": 0, "result": "0x1b4"}));
        assert_eq!(e.stats_snapshot(), StatsSnapshot::default());
        assert!(e
            .log()
            .snapshot()
            .iter()
            .any(|l| l.text.contains("Current block: #436")));
    }

    #[test]
    fn error_response_clears_pending() {
        let mut e = engine();
        let id = e.registry.issue(Some(SubscriptionKind::StandardHeads));
        e.handle_frame(&json!({
            "id": id,
            "error": {"code": -32000, "message": "subscriptions unavailable"},
        }));
        assert_eq!(e.registry.pending_len(), 0);
        assert!(e.registry.is_empty());
        assert!(e
            .log()
            .snapshot()
            .iter()
            .any(|l| l.text.contains("RPC error") && l.text.contains("subscriptions unavailable")));
    }

    #[test]
    fn malformed_frames_are_inert() {
        let mut e = engine();
        let before = e.log().appended();
        for frame in [
            json!({"foo": "bar"}),
            json!(null),
            json!({"method": "eth_subscription"}),
            json!({"id": "not a number", "result": "0x1"}),
        ] {
            e.handle_frame(&frame);
        }
        assert_eq!(e.stats_snapshot(), StatsSnapshot::default());
        assert_eq!(e.log().appended(), before);
        assert_eq!(e.registry.pending_len(), 0);
    }

    #[test]
    fn unknown_handle_notification_is_dropped() {
        let mut e = engine();
        e.handle_frame(&notification("0xdead", json!({"number": "0x1"})));
        assert_eq!(e.stats_snapshot(), StatsSnapshot::default());
    }

    #[test]
    fn stale_session_events_are_ignored() {
        let (mut e, _sid) = connected_engine();
        register(&mut e, SubscriptionKind::StandardHeads, "0xaa");
        let stale = SessionId::next();
        e.handle_event(
            stale,
            SessionEvent::Frame(notification("0xaa", json!({"number": "0x1"}))),
        );
        assert_eq!(e.stats_snapshot(), StatsSnapshot::default());
        // A stale close must not tear down the live connection either.
        e.handle_event(stale, SessionEvent::Closed(None));
        assert_eq!(e.state(), ConnectionState::Open);
        assert!(!e.registry.is_empty());
    }

    #[test]
    fn transport_close_clears_registry_without_unsubscribes() {
        let (mut e, sid) = connected_engine();
        register(&mut e, SubscriptionKind::SpeculativeHeads, "0xaa");
        e.registry.issue(None);
        e.handle_event(sid, SessionEvent::Closed(Some(1006)));
        assert_eq!(e.state(), ConnectionState::Disconnected);
        assert!(e.registry.is_empty());
        assert_eq!(e.registry.pending_len(), 0);
        assert!(e
            .log()
            .snapshot()
            .iter()
            .any(|l| l.text.contains("Connection closed (code 1006)")));
        // No unsubscribe line: the handles died with the connection.
        assert!(!e
            .log()
            .snapshot()
            .iter()
            .any(|l| l.text.contains("cancelled")));
    }

    #[test]
    fn transport_close_does_not_reset_stats() {
        let (mut e, sid) = connected_engine();
        register(&mut e, SubscriptionKind::StandardHeads, "0xaa");
        e.handle_frame(&notification("0xaa", json!({"number": "0x1"})));
        e.handle_event(sid, SessionEvent::Closed(None));
        assert_eq!(e.stats_snapshot().standard_blocks, 1);
    }

    #[test]
    fn begin_connection_resets_stats() {
        let mut e = engine();
        register(&mut e, SubscriptionKind::StandardHeads, "0xaa");
        e.handle_frame(&notification("0xaa", json!({"number": "0x1"})));
        assert_eq!(e.stats_snapshot().standard_blocks, 1);
        e.begin_connection("wss://example.invalid");
        assert_eq!(e.stats_snapshot(), StatsSnapshot::default());
        assert!(e.registry.is_empty());
        assert!(e.connected_at.is_some());
    }

    #[test]
    fn unsubscribe_all_without_session_just_clears() {
        let mut e = engine();
        register(&mut e, SubscriptionKind::StandardLogs, "0xaa");
        e.unsubscribe_all();
        assert!(e.registry.is_empty());
        assert!(e
            .log()
            .snapshot()
            .iter()
            .any(|l| l.text.contains("All subscriptions cancelled")));
    }

    #[test]
    fn subscribe_fails_fast_when_not_open() {
        let mut e = engine();
        let err = e.subscribe(SubscriptionKind::StandardHeads).unwrap_err();
        assert!(matches!(err, TransportError::NotOpen));
        assert_eq!(e.registry.pending_len(), 0);
    }

    #[test]
    fn error_frame_after_subscribe_registers_nothing() {
        let mut e = engine();
        let id = e.registry.issue(Some(SubscriptionKind::SpeculativeLogs));
        e.handle_frame(&json!({
            "id": id,
            "error": {"code": -32601, "message": "unknown stream"},
        }));
        // A later duplicate response for the same id must also be inert.
        e.handle_frame(&json!({"id": id, "result": "0xabc"}));
        assert!(e.registry.is_empty());
    }
}
