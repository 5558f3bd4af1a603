//! Response envelope (JSON text frame).
//!
//! A response is either materialized (`set_content` + `to_bytes`) or streamed
//! (`begin_stream`), never both. The first mode chosen sticks for the lifetime
//! of the envelope; asking for the other one is an error.

use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use serde::Serialize;
use serde_json::Value;

use crate::error::{MwsError, Result};
use crate::protocol::request::RequestEnvelope;
use crate::protocol::stream::{StreamShape, StreamWriter};

/// Op code written when none was set.
pub const DEFAULT_OP: &str = "ok";

static NEXT_INSTANCE: AtomicU64 = AtomicU64::new(1);

/// Response type tag (`t` on the wire).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseType {
    /// Successful response (`resp`).
    Response,
    /// Failure (`err`).
    Error,
    /// Subscription push (`sub`).
    Event,
}

impl ResponseType {
    pub fn code(self) -> &'static str {
        match self {
            ResponseType::Response => "resp",
            ResponseType::Error => "err",
            ResponseType::Event => "sub",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "resp" => Some(ResponseType::Response),
            "err" => Some(ResponseType::Error),
            "sub" => Some(ResponseType::Event),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
enum Body {
    Empty,
    Content(Value),
    Streaming,
}

#[derive(Serialize)]
struct Wire<'a> {
    id: u64,
    rerid: i64,
    t: &'static str,
    op: &'a str,
    msg: Option<&'a Value>,
}

/// One outbound message.
#[derive(Debug)]
pub struct ResponseEnvelope {
    instance: u64,
    rerid: i64,
    kind: ResponseType,
    op: Option<String>,
    body: Body,
}

impl ResponseEnvelope {
    pub fn new(rerid: i64, kind: ResponseType) -> Self {
        Self {
            instance: NEXT_INSTANCE.fetch_add(1, Ordering::Relaxed),
            rerid,
            kind,
            op: None,
            body: Body::Empty,
        }
    }

    /// Response correlated to `req`, op code mirrored from the request.
    pub fn for_request(req: &RequestEnvelope, kind: ResponseType) -> Self {
        Self::new(req.id(), kind).with_op(req.op())
    }

    /// Error response carrying `message` as content.
    pub fn error(rerid: i64, op: Option<&str>, message: &str) -> Self {
        let mut env = Self::new(rerid, ResponseType::Error);
        if let Some(op) = op {
            env.set_op(op);
        }
        env.body = Body::Content(Value::String(message.to_owned()));
        env
    }

    /// A related response sharing this one's correlation id and op code
    /// (e.g. promoting a subscription ack into a push template). The clone
    /// gets a fresh instance id and an empty body.
    pub fn clone_as(&self, kind: ResponseType) -> Self {
        Self {
            instance: NEXT_INSTANCE.fetch_add(1, Ordering::Relaxed),
            rerid: self.rerid,
            kind,
            op: self.op.clone(),
            body: Body::Empty,
        }
    }

    /// Server-assigned instance id, for tracing only.
    pub fn instance_id(&self) -> u64 {
        self.instance
    }

    pub fn rerid(&self) -> i64 {
        self.rerid
    }

    pub fn kind(&self) -> ResponseType {
        self.kind
    }

    pub fn op(&self) -> &str {
        self.op.as_deref().unwrap_or(DEFAULT_OP)
    }

    pub fn set_op(&mut self, op: impl Into<String>) -> &mut Self {
        self.op = Some(op.into());
        self
    }

    pub fn with_op(mut self, op: impl Into<String>) -> Self {
        self.set_op(op);
        self
    }

    /// Materialize the payload. Fails once streaming has started.
    pub fn set_content<T: Serialize + ?Sized>(&mut self, content: &T) -> Result<&mut Self> {
        if matches!(self.body, Body::Streaming) {
            return Err(MwsError::Unsupported(
                "cannot set content: streaming already started".into(),
            ));
        }
        let value = serde_json::to_value(content)
            .map_err(|e| MwsError::Internal(format!("content encode failed: {e}")))?;
        self.body = Body::Content(value);
        Ok(self)
    }

    pub fn content(&self) -> Option<&Value> {
        match &self.body {
            Body::Content(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self.body, Body::Streaming)
    }

    /// Switch to streaming mode and write the fixed header. Fails when content
    /// was already set or a stream was already opened.
    pub fn begin_stream(&mut self, shape: StreamShape) -> Result<StreamWriter> {
        match self.body {
            Body::Content(_) => {
                return Err(MwsError::Unsupported(
                    "cannot start streaming: content already set".into(),
                ))
            }
            Body::Streaming => {
                return Err(MwsError::Unsupported("stream already opened".into()));
            }
            Body::Empty => {}
        }
        let writer = StreamWriter::open(self.instance, self.rerid, self.kind, self.op(), shape)?;
        self.body = Body::Streaming;
        Ok(writer)
    }

    /// Serialize the whole envelope as one unit.
    pub fn to_bytes(&self) -> Result<Bytes> {
        if self.is_streaming() {
            return Err(MwsError::Unsupported(
                "streaming response is written by its StreamWriter".into(),
            ));
        }
        let wire = Wire {
            id: self.instance,
            rerid: self.rerid,
            t: self.kind.code(),
            op: self.op(),
            msg: self.content(),
        };
        serde_json::to_vec(&wire)
            .map(Bytes::from)
            .map_err(|e| MwsError::Internal(format!("response encode failed: {e}")))
    }
}
