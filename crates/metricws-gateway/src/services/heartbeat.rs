//! `heartbeat` subscription and its publisher.
//!
//! The operation only acknowledges `sub`/`xsub`; the dispatch router keeps
//! the subscription table. [`Heartbeat::run`] pushes `{ts, seq}` to every
//! subscriber each `services.heartbeat_interval_ms`.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde::Serialize;

use metricws_core::error::{MwsError, Result};
use metricws_core::protocol::RequestType;

use crate::app_state::AppState;
use crate::dispatch::{OpCall, OpHandler};

#[derive(Debug, Clone, Copy, Serialize)]
pub struct Beat {
    pub ts: u64,
    pub seq: u64,
}

#[derive(Default)]
pub struct Heartbeat;

impl Heartbeat {
    pub const OP: &'static str = "heartbeat";

    /// Publish until the gateway starts draining.
    pub async fn run(state: AppState) {
        let every = Duration::from_millis(state.cfg().services.heartbeat_interval_ms);
        let mut tick = tokio::time::interval(every);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut seq: u64 = 0;

        loop {
            tick.tick().await;
            if state.is_draining() {
                break;
            }
            seq += 1;
            match Self::beat(&state, seq) {
                Ok(0) => {}
                Ok(n) => tracing::trace!(seq, subscribers = n, "heartbeat published"),
                Err(e) => tracing::warn!(error = %e, "heartbeat publish failed"),
            }
        }
        tracing::debug!("heartbeat publisher stopped");
    }

    /// Publish one beat. Returns how many subscribers it was queued for.
    pub fn beat(state: &AppState, seq: u64) -> Result<usize> {
        let ts = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        state.subscriptions().publish(Self::OP, &Beat { ts, seq })
    }
}

#[async_trait]
impl OpHandler for Heartbeat {
    async fn handle(&self, call: OpCall) -> Result<()> {
        let ack = match call.kind() {
            RequestType::Subscribe => "subscribed",
            RequestType::Unsubscribe => "unsubscribed",
            other => {
                return Err(MwsError::Unsupported(format!(
                    "heartbeat does not support {}",
                    other.code()
                )))
            }
        };
        call.reply().set_content(ack)?.send()?;
        Ok(())
    }
}
