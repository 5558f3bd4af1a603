//! Request envelope (JSON text frame).
//!
//! The payload is kept as `RawValue` so handlers decide how (and whether) to
//! parse it.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::value::RawValue;
use serde_json::{json, Value};

use crate::error::{MwsError, Result};

/// Operation type carried in the `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestType {
    /// Simple request/response.
    Request,
    /// Compound request, potentially answered by several responses.
    MRequest,
    /// Starts a subscription.
    Subscribe,
    /// Cancels a subscription.
    Unsubscribe,
}

impl RequestType {
    /// Wire code.
    pub fn code(self) -> &'static str {
        match self {
            RequestType::Request => "req",
            RequestType::MRequest => "mreq",
            RequestType::Subscribe => "sub",
            RequestType::Unsubscribe => "xsub",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "req" => Some(RequestType::Request),
            "mreq" => Some(RequestType::MRequest),
            "sub" => Some(RequestType::Subscribe),
            "xsub" => Some(RequestType::Unsubscribe),
            _ => None,
        }
    }
}

/// First-pass shape. Every field is optional and loosely typed so a single
/// broken field still lets us echo back whatever else was readable.
#[derive(Debug, Deserialize)]
struct LooseEnvelope {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    op: Option<Value>,
    #[serde(default, rename = "type")]
    kind: Option<Value>,
    #[serde(default)]
    payload: Option<Box<RawValue>>,
}

/// A request that could not be turned into a [`RequestEnvelope`].
///
/// Carries the correlation id and operation name when they were readable so
/// the error reply can still be correlated by the client.
#[derive(Debug)]
pub struct ParseFailure {
    /// Correlation id, 0 when missing or malformed.
    pub rerid: i64,
    /// Operation name when it was readable.
    pub op: Option<String>,
    pub error: MwsError,
}

/// One inbound operation invocation. Immutable once parsed.
#[derive(Debug, Clone)]
pub struct RequestEnvelope {
    id: i64,
    op: String,
    kind: RequestType,
    payload: Option<Box<RawValue>>,
}

impl RequestEnvelope {
    pub fn new(id: i64, op: impl Into<String>, kind: RequestType) -> Self {
        Self {
            id,
            op: op.into(),
            kind,
            payload: None,
        }
    }

    /// Attach a payload (client side / tests).
    pub fn with_payload<T: serde::Serialize>(mut self, payload: &T) -> Result<Self> {
        let raw = serde_json::value::to_raw_value(payload)
            .map_err(|e| MwsError::BadRequest(format!("payload encode failed: {e}")))?;
        self.payload = Some(raw);
        Ok(self)
    }

    /// Parse one text frame.
    ///
    /// `type` defaults to `req` when absent; `id` defaults to 0. A missing or
    /// empty `op`, a non-integer `id` or an unknown `type` invalidates the
    /// request.
    pub fn parse(text: &str) -> std::result::Result<Self, ParseFailure> {
        let loose: LooseEnvelope = serde_json::from_str(text).map_err(|e| ParseFailure {
            rerid: 0,
            op: None,
            error: MwsError::BadRequest(format!("invalid envelope json: {e}")),
        })?;

        let op = match &loose.op {
            Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
            _ => None,
        };

        let id = match &loose.id {
            None | Some(Value::Null) => Ok(0),
            Some(Value::Number(n)) => n
                .as_i64()
                .ok_or_else(|| MwsError::BadRequest(format!("malformed id: {n}"))),
            Some(other) => Err(MwsError::BadRequest(format!("malformed id: {other}"))),
        };
        let id = match id {
            Ok(id) => id,
            Err(error) => return Err(ParseFailure { rerid: 0, op, error }),
        };

        let Some(op) = op else {
            return Err(ParseFailure {
                rerid: id,
                op: None,
                error: MwsError::BadRequest("missing op".into()),
            });
        };

        let kind = match &loose.kind {
            None | Some(Value::Null) => RequestType::Request,
            Some(Value::String(code)) => match RequestType::from_code(code) {
                Some(kind) => kind,
                None => {
                    return Err(ParseFailure {
                        rerid: id,
                        op: Some(op),
                        error: MwsError::BadRequest(format!("unknown request type: {code}")),
                    })
                }
            },
            Some(other) => {
                return Err(ParseFailure {
                    rerid: id,
                    op: Some(op),
                    error: MwsError::BadRequest(format!("malformed request type: {other}")),
                })
            }
        };

        Ok(Self {
            id,
            op,
            kind,
            payload: loose.payload,
        })
    }

    /// Correlation id assigned by the client.
    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn op(&self) -> &str {
        &self.op
    }

    pub fn kind(&self) -> RequestType {
        self.kind
    }

    pub fn raw_payload(&self) -> Option<&RawValue> {
        self.payload.as_deref()
    }

    /// Deserialize the payload. An absent payload reads as JSON `null`.
    pub fn payload<T: DeserializeOwned>(&self) -> Result<T> {
        let text = self.payload.as_deref().map(RawValue::get).unwrap_or("null");
        serde_json::from_str(text)
            .map_err(|e| MwsError::BadRequest(format!("{} invalid payload: {e}", self.op)))
    }

    /// Encode back to the wire form.
    pub fn to_json_string(&self) -> String {
        let mut v = json!({
            "id": self.id,
            "op": self.op,
            "type": self.kind.code(),
        });
        if let (Some(raw), Value::Object(map)) = (&self.payload, &mut v) {
            let payload: Value = serde_json::from_str(raw.get()).unwrap_or(Value::Null);
            map.insert("payload".into(), payload);
        }
        v.to_string()
    }
}
