//! monwatch-core — subscription bookkeeping, classification and stats
//! for the Monad block/log feed.
//!
//! # Overview
//!
//! monwatch turns the testnet's JSON-RPC subscription feed into running
//! statistics and a bounded event history. This crate holds everything
//! with state but no I/O:
//!
//! - [`JsonRpcRequest`] / [`JsonRpcError`] — wire types
//! - [`SubscriptionKind`] — the four feed streams
//! - [`Registry`] — pending requests and accepted subscriptions
//! - [`classify`] module — inbound frame and payload classification
//! - [`StatsAggregator`] — counters and block-interval timing
//! - [`EventLog`] — capacity-bounded, push-notified event feed
//! - [`net`] module — testnet profile constants

pub mod block;
pub mod classify;
pub mod error;
pub mod events;
pub mod kind;
pub mod net;
pub mod registry;
pub mod stats;
pub mod wire;

pub use block::{BlockEvent, CommitState, LogRecord};
pub use error::TransportError;
pub use events::{EventLog, LogEntry};
pub use kind::SubscriptionKind;
pub use registry::{PendingRequest, Registry, Subscription};
pub use stats::{StatsAggregator, StatsSnapshot, INTERVAL_WINDOW};
pub use wire::{JsonRpcError, JsonRpcRequest, BOOTSTRAP_PROBE_ID};
