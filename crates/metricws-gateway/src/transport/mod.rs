//! Transport layer.
//!
//! Owns the connection abstraction, the HTTP to WebSocket handshake, codec
//! settings and the per-connection session loop.

pub mod codec;
pub mod connection;
pub mod handshake;
pub mod ws;

pub use connection::{Connection, ConnectionId, ConnectionRegistry, Delivery, Outbound};
pub use handshake::{FrameAction, HandshakeNegotiator, HandshakeState, Negotiated};
