use async_trait::async_trait;

use metricws_core::error::{MwsError, Result};
use metricws_core::protocol::RequestType;

use crate::dispatch::{OpCall, OpHandler};

/// Liveness probe over the RPC layer: answers `"pong"`.
#[derive(Default)]
pub struct Ping;

impl Ping {
    pub const OP: &'static str = "ping";
}

#[async_trait]
impl OpHandler for Ping {
    async fn handle(&self, call: OpCall) -> Result<()> {
        match call.kind() {
            RequestType::Request | RequestType::MRequest => {
                call.reply().set_content("pong")?.send()?;
                Ok(())
            }
            other => Err(MwsError::Unsupported(format!(
                "ping does not support {}",
                other.code()
            ))),
        }
    }
}
