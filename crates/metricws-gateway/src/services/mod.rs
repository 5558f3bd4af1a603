//! Built-in operations.
//!
//! Registered by [`crate::app_state::AppStateBuilder::with_builtins`].

pub mod echo;
pub mod heartbeat;
pub mod ping;
pub mod range;

pub use echo::Echo;
pub use heartbeat::Heartbeat;
pub use ping::Ping;
pub use range::Range;
