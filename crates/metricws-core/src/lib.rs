//! metricws core: transport-agnostic RPC envelope primitives and error types.
//!
//! This crate defines the wire-level contracts shared by the gateway and by
//! operation handlers: the inbound request envelope, the outbound response
//! envelope (eager or streaming), and the error surface. It carries no
//! transport or runtime dependencies so it can be reused by clients and tests.
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here
//! (`#![deny(clippy::panic, clippy::unwrap_used, clippy::expect_used)]`).
//! Malformed client input surfaces as `MwsError`/`Result`, never as a crash.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod error;
pub mod protocol;

/// Shared result type.
pub use error::{ClientCode, MwsError, Result};
