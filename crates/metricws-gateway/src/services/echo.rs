use async_trait::async_trait;
use serde_json::Value;

use metricws_core::error::{MwsError, Result};
use metricws_core::protocol::RequestType;

use crate::dispatch::{OpCall, OpHandler};

/// Sends the payload back. For `mreq` with an array payload, each element
/// gets its own `resp`.
#[derive(Default)]
pub struct Echo;

impl Echo {
    pub const OP: &'static str = "echo";
}

#[async_trait]
impl OpHandler for Echo {
    async fn handle(&self, call: OpCall) -> Result<()> {
        let payload: Value = call.payload()?;
        match (call.kind(), payload) {
            (RequestType::MRequest, Value::Array(items)) => {
                for item in &items {
                    call.reply().set_content(item)?.send()?;
                }
                Ok(())
            }
            (RequestType::Request | RequestType::MRequest, payload) => {
                call.reply().set_content(&payload)?.send()?;
                Ok(())
            }
            (other, _) => Err(MwsError::Unsupported(format!(
                "echo does not support {}",
                other.code()
            ))),
        }
    }
}
