//! monwatch-engine — connection lifecycle and event dispatch.
//!
//! Composes a [`WsSession`](monwatch_ws::WsSession) with the registry,
//! stats aggregator and event log from `monwatch-core` into one
//! [`Engine`] with a small command surface for a front end:
//! connect/disconnect, subscribe/unsubscribe, and read-only access to
//! stats, the event feed, connection state and uptime.

pub mod engine;

pub use engine::{ConnectionState, Engine, EngineConfig};
