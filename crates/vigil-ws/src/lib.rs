//! # vigil-ws
//!
//! Axum WebSocket server supervised by `vigil-core` heartbeats.
//!
//! - `WsConnection` adapts one client socket to the supervisor's
//!   [`ProbeTarget`](vigil_core::ProbeTarget) interface: probes are Ping
//!   frames, Pong frames fire the response listeners.
//! - `ConnectionRegistry` is the live connection set the supervisor
//!   observes.
//! - `WsServer` serves `/ws`, `/health` and `/metrics`, starts supervision
//!   once the listener is bound, and shuts everything down through one
//!   `CancellationToken`.

#![deny(unsafe_code)]

pub mod config;
pub mod connection;
pub mod errors;
pub mod health;
pub mod metrics;
pub mod registry;
pub mod server;
pub mod shutdown;

pub use config::ServerConfig;
pub use server::WsServer;
