//! Top-level facade crate for metricws.
//!
//! Re-exports the wire contracts and the gateway library so users can depend
//! on a single crate.

pub mod core {
    pub use metricws_core::*;
}

pub mod gateway {
    pub use metricws_gateway::*;
}
