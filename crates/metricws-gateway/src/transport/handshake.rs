//! HTTP to WebSocket upgrade negotiation.
//!
//! One negotiator per connection:
//! `Init -> Handshaking -> Upgraded | Rejected`.
//! Once upgraded it classifies inbound frames for the session loop.

use axum::extract::Request;
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::Response;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use hyper::upgrade::OnUpgrade;
use sha1::{Digest, Sha1};
use tokio_tungstenite::tungstenite::Message;

use metricws_core::error::{MwsError, Result};

use crate::http::failure;
use crate::transport::codec::frame_kind;

const WS_GUID: &[u8] = b"258EAFA5-E914-47DA-95CA-C5AB0DC85B11";
pub const SUPPORTED_VERSION: &str = "13";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    Init,
    Handshaking,
    Upgraded,
    Rejected,
}

/// What the session loop does with one inbound frame.
#[derive(Debug, PartialEq, Eq)]
pub enum FrameAction {
    /// Hand to the demultiplexer.
    Forward,
    /// Reply with a pong carrying this payload.
    Pong(Vec<u8>),
    Ignore,
    /// Finish the close handshake and end the session.
    Close,
}

pub enum Negotiated {
    /// Send `response` (101); the upgraded stream arrives via `on_upgrade`.
    Switching {
        response: Response,
        on_upgrade: OnUpgrade,
    },
    Rejected(Response),
}

impl std::fmt::Debug for Negotiated {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Negotiated::Switching { response, .. } => {
                f.debug_tuple("Switching").field(&response.status()).finish()
            }
            Negotiated::Rejected(r) => f.debug_tuple("Rejected").field(&r.status()).finish(),
        }
    }
}

#[derive(Debug)]
pub struct HandshakeNegotiator {
    state: HandshakeState,
}

impl Default for HandshakeNegotiator {
    fn default() -> Self {
        Self::new()
    }
}

impl HandshakeNegotiator {
    pub fn new() -> Self {
        Self {
            state: HandshakeState::Init,
        }
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// Validate the upgrade request and build the switching response.
    ///
    /// Malformed requests get 400, an unsupported version gets 426 with the
    /// supported version advertised. Both close the connection.
    pub fn negotiate(&mut self, req: &mut Request) -> Negotiated {
        if self.state != HandshakeState::Init {
            return self.reject(StatusCode::BAD_REQUEST, "Handshake already attempted");
        }

        let key = match validate_headers(req.method(), req.headers()) {
            Ok(key) => key.to_owned(),
            Err(msg) => return self.reject(StatusCode::BAD_REQUEST, msg),
        };

        let version = req
            .headers()
            .get(header::SEC_WEBSOCKET_VERSION)
            .and_then(|v| v.to_str().ok())
            .map(str::trim);
        if version != Some(SUPPORTED_VERSION) {
            self.state = HandshakeState::Rejected;
            let mut resp = failure(StatusCode::UPGRADE_REQUIRED, "Unsupported WebSocket version", true);
            resp.headers_mut().insert(
                header::SEC_WEBSOCKET_VERSION,
                HeaderValue::from_static(SUPPORTED_VERSION),
            );
            return Negotiated::Rejected(resp);
        }

        let Some(on_upgrade) = req.extensions_mut().remove::<OnUpgrade>() else {
            return self.reject(StatusCode::BAD_REQUEST, "Connection cannot be upgraded");
        };

        let accept = accept_key(key.as_bytes());
        let response = Response::builder()
            .status(StatusCode::SWITCHING_PROTOCOLS)
            .header(header::CONNECTION, "upgrade")
            .header(header::UPGRADE, "websocket")
            .header(header::SEC_WEBSOCKET_ACCEPT, accept)
            .body(axum::body::Body::empty());
        match response {
            Ok(response) => {
                self.state = HandshakeState::Handshaking;
                Negotiated::Switching { response, on_upgrade }
            }
            Err(_) => self.reject(StatusCode::INTERNAL_SERVER_ERROR, "Handshake response failed"),
        }
    }

    /// The switching response was flushed and the stream is ours.
    pub fn on_upgraded(&mut self) {
        if self.state == HandshakeState::Handshaking {
            self.state = HandshakeState::Upgraded;
        }
    }

    /// The switching response could not be delivered.
    pub fn on_failed(&mut self) {
        self.state = HandshakeState::Rejected;
    }

    /// Classify one inbound frame. Non-text data frames are an
    /// `Unsupported` error for that frame only.
    pub fn on_frame(&self, msg: &Message) -> Result<FrameAction> {
        if self.state != HandshakeState::Upgraded {
            return Err(MwsError::Unsupported("frame before upgrade completed".into()));
        }
        match msg {
            Message::Close(_) => Ok(FrameAction::Close),
            Message::Ping(payload) => Ok(FrameAction::Pong(payload.clone())),
            Message::Pong(_) => Ok(FrameAction::Ignore),
            Message::Text(_) => Ok(FrameAction::Forward),
            other => Err(MwsError::Unsupported(format!(
                "{} frames are not supported",
                frame_kind(other)
            ))),
        }
    }

    fn reject(&mut self, status: StatusCode, msg: &str) -> Negotiated {
        self.state = HandshakeState::Rejected;
        Negotiated::Rejected(failure(status, msg, true))
    }
}

/// `Sec-WebSocket-Accept` for a client key.
pub fn accept_key(key: &[u8]) -> String {
    let mut sha = Sha1::new();
    sha.update(key);
    sha.update(WS_GUID);
    STANDARD.encode(sha.finalize())
}

fn validate_headers<'a>(method: &Method, headers: &'a HeaderMap) -> std::result::Result<&'a str, &'static str> {
    if method != Method::GET {
        return Err("WebSocket upgrade requires GET");
    }

    let connection_upgrade = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|t| t.trim().eq_ignore_ascii_case("upgrade"));
    if !connection_upgrade {
        return Err("Missing Connection: upgrade");
    }

    let upgrade_ws = headers
        .get(header::UPGRADE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.trim().eq_ignore_ascii_case("websocket"));
    if !upgrade_ws {
        return Err("Missing Upgrade: websocket");
    }

    let key = headers
        .get(header::SEC_WEBSOCKET_KEY)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .ok_or("Missing Sec-WebSocket-Key")?;
    match STANDARD.decode(key) {
        Ok(raw) if raw.len() == 16 => Ok(key),
        _ => Err("Invalid Sec-WebSocket-Key"),
    }
}
