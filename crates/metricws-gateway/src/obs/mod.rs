//! In-process metrics.
//!
//! Labelled families live in [`metrics`]; the three demultiplexer totals
//! live in [`counters`] as plain atomics so the hot path never touches a map.

pub mod counters;
pub mod metrics;

pub use counters::{CounterSnapshot, DemuxCounters};
pub use metrics::GatewayMetrics;
