//! metricws gateway library entry.
//!
//! One listening port serves plain HTTP and WebSocket. Every request enters
//! the demultiplexer ([`demux`]), which routes HTTP by first path segment
//! and runs WebSocket text frames through the JSON-RPC dispatch router
//! ([`dispatch`]). Used by the binary (`main.rs`) and by integration tests.

pub mod app_state;
pub mod config;
pub mod demux;
pub mod dispatch;
pub mod http;
pub mod obs;
pub mod ops;
pub mod router;
pub mod services;
pub mod transport;

pub use app_state::{AppState, AppStateBuilder};
