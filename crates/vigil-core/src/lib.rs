//! # vigil-core
//!
//! Heartbeat supervision for long-lived bidirectional connections.
//!
//! A [`Supervisor`] watches a dynamic set of connections owned by a server
//! and keeps the set honest:
//!
//! - **Probe emitter**: on a fixed interval, sends a liveness probe to every
//!   open connection.
//! - **Liveness checker**: on a fixed interval, terminates connections whose
//!   last probe response is older than the configured timeout.
//! - **Side table**: per-connection liveness records (last response time,
//!   installed listener), owned entirely by the supervisor and swept on
//!   `stop`.
//!
//! The supervisor is transport-agnostic: servers plug in through the
//! [`ConnectionSet`] and [`ProbeTarget`] traits.

#![deny(unsafe_code)]

pub mod config;
pub mod errors;
pub mod peer;
pub mod record;
pub mod supervisor;

pub use config::SupervisorConfig;
pub use peer::{ConnectionSet, ListenerId, ProbeTarget, ResponseListener};
pub use supervisor::Supervisor;
