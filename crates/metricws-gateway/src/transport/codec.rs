//! Frame codec settings.
//!
//! Framing itself is done by `tokio-tungstenite`; this module only maps the
//! `ws.*` config onto its limits.

use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::Message;

use crate::config::WsSection;

pub fn ws_config(ws: &WsSection) -> WebSocketConfig {
    let max_message = if ws.aggregation_enabled {
        ws.max_message_bytes
    } else {
        ws.max_frame_bytes
    };
    WebSocketConfig {
        max_message_size: Some(max_message),
        max_frame_size: Some(ws.max_frame_bytes),
        ..Default::default()
    }
}

/// Short label for logs and metrics.
pub fn frame_kind(msg: &Message) -> &'static str {
    match msg {
        Message::Text(_) => "text",
        Message::Binary(_) => "binary",
        Message::Ping(_) => "ping",
        Message::Pong(_) => "pong",
        Message::Close(_) => "close",
        Message::Frame(_) => "raw",
    }
}
