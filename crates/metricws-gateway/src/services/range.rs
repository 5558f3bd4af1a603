use async_trait::async_trait;
use serde::Deserialize;

use metricws_core::error::{MwsError, Result};

use crate::dispatch::{OpCall, OpHandler};

const MAX_COUNT: u64 = 1_000_000;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RangeReq {
    count: u64,
}

/// Streams `[0, 1, .., count-1]` as an array-shaped response.
#[derive(Default)]
pub struct Range;

impl Range {
    pub const OP: &'static str = "range";
}

#[async_trait]
impl OpHandler for Range {
    async fn handle(&self, call: OpCall) -> Result<()> {
        let req: RangeReq = call.payload()?;
        if req.count > MAX_COUNT {
            return Err(MwsError::BadRequest(format!(
                "range count must be <= {MAX_COUNT}"
            )));
        }

        let mut out = call.reply().stream_array()?;
        for i in 0..req.count {
            out.push(&i)?;
        }
        out.finish()?;
        Ok(())
    }
}
