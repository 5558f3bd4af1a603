//! Connection demultiplexer.
//!
//! Single entry point for every decoded unit. HTTP requests go through the
//! path router, WebSocket text frames through envelope parsing and the RPC
//! dispatch router. Nothing a client sends can make this module fail: route
//! misses and handler failures become error responses here.

use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::time::Instant;

use axum::body::Body;
use axum::extract::Request;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::Response;
use futures_util::FutureExt;
use http_body_util::Limited;
use tokio_tungstenite::tungstenite::Message;

use metricws_core::protocol::{RequestEnvelope, ResponseEnvelope};

use crate::app_state::AppState;
use crate::dispatch::{panic_message, DispatchOutcome, Reply};
use crate::http::{failure, route_key, HttpExchange};
use crate::transport::Connection;

/// One decoded unit from a connection.
pub enum Unit {
    Http { req: Request, peer: SocketAddr },
    Frame { msg: Message, conn: Connection },
}

#[derive(Debug)]
pub enum Demuxed {
    Http(Response),
    /// A text frame went through the RPC layer.
    Dispatched(DispatchOutcome),
    /// Not ours; handed back untouched.
    Passthrough(Message),
}

pub async fn demux(state: &AppState, unit: Unit) -> Demuxed {
    match unit {
        Unit::Http { req, peer } => Demuxed::Http(on_http(state, req, peer).await),
        Unit::Frame { msg, conn } => on_frame(state, &conn, msg).await,
    }
}

pub async fn on_http(state: &AppState, req: Request, peer: SocketAddr) -> Response {
    state.counters().http_request();

    let cors = state.cors();
    if let Some(resp) = cors.preflight(&req) {
        return resp;
    }
    let origin = req.headers().get(header::ORIGIN).cloned();

    let mut resp = route_http(state, req, peer).await;
    cors.decorate(origin.as_ref(), &mut resp);
    resp
}

async fn route_http(state: &AppState, req: Request, peer: SocketAddr) -> Response {
    let http = &state.cfg().http;
    let metrics = state.metrics();

    let chunked = is_chunked(req.headers());
    if chunked && !http.chunking_enabled {
        metrics.http_requests.inc(&[("route", "-")]);
        return failure(StatusCode::BAD_REQUEST, "HTTP Chunking Not Enabled", true);
    }
    if content_length(req.headers()).is_some_and(|n| n > http.max_chunk_bytes as u64) {
        metrics.http_requests.inc(&[("route", "-")]);
        return failure(
            StatusCode::PAYLOAD_TOO_LARGE,
            &format!("Request body exceeds {} bytes", http.max_chunk_bytes),
            true,
        );
    }

    let path = req.uri().path().to_string();
    let Some(key) = route_key(&path) else {
        metrics.http_requests.inc(&[("route", "-")]);
        return failure(StatusCode::NOT_FOUND, "No handler found for [/]", true);
    };
    let Some(handler) = state.paths().lookup(key) else {
        metrics.http_requests.inc(&[("route", "-")]);
        tracing::debug!(%peer, route = %key, "no http handler");
        return failure(
            StatusCode::NOT_FOUND,
            &format!("No handler found for [{key}]"),
            true,
        );
    };
    metrics.http_requests.inc(&[("route", key)]);

    let req = if chunked {
        let max = http.max_chunk_bytes;
        req.map(|b| Body::new(Limited::new(b, max)))
    } else {
        req
    };

    let ex = HttpExchange {
        req,
        peer,
        route: key.to_string(),
    };
    let failed = match AssertUnwindSafe(handler.handle(state.clone(), ex))
        .catch_unwind()
        .await
    {
        Ok(Ok(resp)) => return resp,
        Ok(Err(e)) => e.to_string(),
        Err(panic) => panic_message(panic),
    };

    state.counters().error();
    metrics.handler_errors.inc(&[("side", "http")]);
    tracing::warn!(%peer, route = %key, error = %failed, "http handler failed");
    failure(StatusCode::INTERNAL_SERVER_ERROR, &failed, false)
}

/// Parse and dispatch one frame. Only text frames are demultiplexed; any
/// other frame comes back as [`Demuxed::Passthrough`].
pub async fn on_frame(state: &AppState, conn: &Connection, msg: Message) -> Demuxed {
    let Message::Text(text) = msg else {
        return Demuxed::Passthrough(msg);
    };

    let req = match RequestEnvelope::parse(&text) {
        Ok(req) => req,
        Err(bad) => {
            state.counters().error();
            state.metrics().decode_errors.inc(&[]);
            tracing::debug!(conn_id = conn.id(), rerid = bad.rerid, error = %bad.error, "malformed envelope");
            let env = ResponseEnvelope::error(bad.rerid, bad.op.as_deref(), &bad.error.to_string());
            if let Err(e) = Reply::new(env, conn.clone()).send() {
                tracing::warn!(conn_id = conn.id(), error = %e, "error reply not sent");
            }
            return Demuxed::Dispatched(DispatchOutcome::Rejected(bad.error.to_string()));
        }
    };

    state.counters().ws_request();
    let metrics = state.metrics();
    let op = req.op().to_string();
    metrics.ws_requests.inc(&[("op", op.as_str())]);

    let started = Instant::now();
    let outcome = state
        .ops()
        .dispatch(state.subscriptions(), conn, req)
        .await;
    metrics.dispatch_duration.observe(&[("op", op.as_str())], started.elapsed());

    match &outcome {
        DispatchOutcome::UnknownOp => metrics.unknown_ops.inc(&[]),
        DispatchOutcome::Failed(_) => {
            state.counters().error();
            metrics.handler_errors.inc(&[("side", "ws")]);
        }
        DispatchOutcome::Handled | DispatchOutcome::Rejected(_) => {}
    }
    Demuxed::Dispatched(outcome)
}

fn is_chunked(headers: &HeaderMap) -> bool {
    headers
        .get_all(header::TRANSFER_ENCODING)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|t| t.trim().eq_ignore_ascii_case("chunked"))
}

fn content_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(header::CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}
