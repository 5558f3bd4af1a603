//! RPC dispatch: operation registry, subscription table and response writer.

pub mod reply;
pub mod router;
pub mod subscriptions;

pub use reply::{Reply, StreamingReply};
pub use router::{DispatchOutcome, OpCall, OpHandler, OpRouter};
pub use subscriptions::{Subscription, SubscriptionTable};

use std::any::Any;

/// Best-effort text of a caught panic payload.
pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}
