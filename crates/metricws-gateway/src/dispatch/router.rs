use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures_util::FutureExt;
use serde::de::DeserializeOwned;

use metricws_core::error::{MwsError, Result};
use metricws_core::protocol::{RequestEnvelope, RequestType, ResponseEnvelope, ResponseType};

use super::{panic_message, Reply, SubscriptionTable};
use crate::transport::Connection;

/// A named RPC operation. Handlers send their own responses through
/// [`OpCall::reply`]; returning `Err` (or panicking) makes the router answer
/// with an `err` envelope instead.
#[async_trait]
pub trait OpHandler: Send + Sync + 'static {
    async fn handle(&self, call: OpCall) -> Result<()>;
}

/// One invocation: the parsed request plus the connection it came from.
#[derive(Debug)]
pub struct OpCall {
    pub request: RequestEnvelope,
    pub conn: Connection,
}

impl OpCall {
    pub fn id(&self) -> i64 {
        self.request.id()
    }

    pub fn op(&self) -> &str {
        self.request.op()
    }

    pub fn kind(&self) -> RequestType {
        self.request.kind()
    }

    pub fn payload<T: DeserializeOwned>(&self) -> Result<T> {
        self.request.payload()
    }

    /// A `resp` envelope correlated to this request, aimed at the caller.
    pub fn reply(&self) -> Reply {
        Reply::new(
            ResponseEnvelope::for_request(&self.request, ResponseType::Response),
            self.conn.clone(),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Handled,
    UnknownOp,
    /// Refused before the handler ran (duplicate subscription).
    Rejected(String),
    /// Handler returned an error or panicked.
    Failed(String),
}

/// Operation name -> handler. Names are unique; registering one twice is
/// an error.
#[derive(Default)]
pub struct OpRouter {
    ops: DashMap<String, Arc<dyn OpHandler>>,
}

impl OpRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, name: impl Into<String>, handler: Arc<dyn OpHandler>) -> Result<()> {
        let name = name.into();
        if name.is_empty() {
            return Err(MwsError::Config("operation name must not be empty".into()));
        }
        match self.ops.entry(name) {
            Entry::Occupied(e) => Err(MwsError::Duplicate(format!(
                "operation already registered: {}",
                e.key()
            ))),
            Entry::Vacant(e) => {
                e.insert(handler);
                Ok(())
            }
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.ops.contains_key(name)
    }

    pub fn registered_ops(&self) -> Vec<String> {
        let mut ops: Vec<String> = self.ops.iter().map(|e| e.key().clone()).collect();
        ops.sort();
        ops
    }

    /// Route one request. Never fails: every miss or handler failure is
    /// answered on `conn` with an `err` envelope echoing the request id.
    pub async fn dispatch(
        &self,
        subs: &SubscriptionTable,
        conn: &Connection,
        req: RequestEnvelope,
    ) -> DispatchOutcome {
        let Some(handler) = self.ops.get(req.op()).map(|h| h.value().clone()) else {
            send_error(conn, &req, &format!("no such operation: {}", req.op()));
            return DispatchOutcome::UnknownOp;
        };

        let kind = req.kind();
        let rerid = req.id();

        if kind == RequestType::Subscribe {
            if let Err(e) = subs.subscribe(conn, rerid, req.op()) {
                send_error(conn, &req, &e.to_string());
                return DispatchOutcome::Rejected(e.to_string());
            }
        }

        let op = req.op().to_owned();
        let call = OpCall {
            request: req,
            conn: conn.clone(),
        };
        let failure = match AssertUnwindSafe(handler.handle(call)).catch_unwind().await {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e.to_string()),
            Err(panic) => Some(panic_message(panic)),
        };

        match kind {
            RequestType::Unsubscribe => {
                subs.unsubscribe(conn.id(), rerid);
            }
            RequestType::Subscribe if failure.is_some() => {
                subs.unsubscribe(conn.id(), rerid);
            }
            _ => {}
        }

        match failure {
            None => DispatchOutcome::Handled,
            Some(msg) => {
                tracing::warn!(conn_id = conn.id(), %op, rerid, error = %msg, "operation failed");
                let env = ResponseEnvelope::error(rerid, Some(&op), &msg);
                let _ = Reply::new(env, conn.clone()).send();
                DispatchOutcome::Failed(msg)
            }
        }
    }
}

fn send_error(conn: &Connection, req: &RequestEnvelope, msg: &str) {
    let env = ResponseEnvelope::error(req.id(), Some(req.op()), msg);
    if let Err(e) = Reply::new(env, conn.clone()).send() {
        tracing::warn!(conn_id = conn.id(), error = %e, "error reply not sent");
    }
}
