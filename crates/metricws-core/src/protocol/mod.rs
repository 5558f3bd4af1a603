//! RPC envelope modules (request + response).
//!
//! This module hosts the JSON wire formats exchanged over WebSocket text
//! frames:
//! - Request: `{"id", "op", "type", "payload"}` with lazily parsed payload.
//! - Response: `{"id", "rerid", "t", "op", "msg"}`, either materialized in
//!   memory or written incrementally through a [`stream::StreamWriter`].
//!
//! All parsers are panic-free: malformed input is reported as `MwsError`
//! instead of panicking, keeping the gateway resilient to hostile traffic.

pub mod request;
pub mod response;
pub mod stream;

pub use request::{ParseFailure, RequestEnvelope, RequestType};
pub use response::{ResponseEnvelope, ResponseType};
pub use stream::{StreamShape, StreamWriter};
