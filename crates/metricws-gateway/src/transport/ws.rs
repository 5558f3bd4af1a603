//! WebSocket sessions.
//!
//! [`WsUpgrade`] is the HTTP handler bound to the upgrade path. After the
//! switching response is flushed, [`run_session`] owns the socket: a reader
//! loop feeding the demultiplexer in arrival order and a writer task
//! draining the connection's outbound queue in enqueue order.

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use axum::http::StatusCode;
use axum::response::Response;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use hyper::upgrade::{OnUpgrade, Upgraded};
use hyper_util::rt::TokioIo;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::Role;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::Instrument;

use metricws_core::error::Result;
use metricws_core::protocol::ResponseEnvelope;

use crate::app_state::AppState;
use crate::demux;
use crate::dispatch::Reply;
use crate::http::{failure, HttpExchange, HttpHandler};
use crate::transport::codec::{frame_kind, ws_config};
use crate::transport::connection::{Connection, ConnectionId, Outbound};
use crate::transport::handshake::{FrameAction, HandshakeNegotiator, Negotiated};

type WsStream = WebSocketStream<TokioIo<Upgraded>>;
type WsSink = SplitSink<WsStream, Message>;

/// Handler for the upgrade path.
pub struct WsUpgrade;

#[async_trait]
impl HttpHandler for WsUpgrade {
    async fn handle(&self, state: AppState, ex: HttpExchange) -> Result<Response> {
        let HttpExchange { mut req, peer, .. } = ex;
        let metrics = state.metrics();

        if state.is_draining() {
            metrics.handshakes.inc(&[("outcome", "draining")]);
            return Ok(failure(StatusCode::SERVICE_UNAVAILABLE, "Server is draining", true));
        }

        let mut nego = HandshakeNegotiator::new();
        match nego.negotiate(&mut req) {
            Negotiated::Rejected(resp) => {
                metrics.handshakes.inc(&[("outcome", "rejected")]);
                tracing::debug!(%peer, status = %resp.status(), "upgrade rejected");
                Ok(resp)
            }
            Negotiated::Switching { response, on_upgrade } => {
                metrics.handshakes.inc(&[("outcome", "switching")]);
                tokio::spawn(run_session(state, peer, nego, on_upgrade));
                Ok(response)
            }
        }
    }
}

/// Wait for the upgraded stream, then run the session to completion.
pub async fn run_session(
    state: AppState,
    peer: SocketAddr,
    mut nego: HandshakeNegotiator,
    on_upgrade: OnUpgrade,
) {
    let cfg = state.cfg();
    let wait = Duration::from_millis(cfg.gateway.handshake_timeout_ms);

    let upgraded = match tokio::time::timeout(wait, on_upgrade).await {
        Ok(Ok(upgraded)) => upgraded,
        Ok(Err(e)) => {
            nego.on_failed();
            state.metrics().handshakes.inc(&[("outcome", "failed")]);
            tracing::warn!(%peer, error = %e, "upgrade failed");
            return;
        }
        Err(_) => {
            nego.on_failed();
            state.metrics().handshakes.inc(&[("outcome", "timeout")]);
            tracing::warn!(%peer, "upgrade timed out");
            return;
        }
    };
    nego.on_upgraded();
    state.metrics().handshakes.inc(&[("outcome", "upgraded")]);

    let stream =
        WebSocketStream::from_raw_socket(TokioIo::new(upgraded), Role::Server, Some(ws_config(&cfg.ws)))
            .await;

    let id = state.connections().next_id();
    let span = tracing::info_span!("ws_session", conn_id = id, %peer);
    session(state, id, peer, nego, stream).instrument(span).await;
}

async fn session(
    state: AppState,
    id: ConnectionId,
    peer: SocketAddr,
    nego: HandshakeNegotiator,
    stream: WsStream,
) {
    let cfg = state.cfg();
    let log_frames = cfg.logging.frames;
    let metrics = state.metrics();

    let (conn, out_rx) = Connection::open(id, peer, cfg.gateway.outbound_queue);
    state.connections().insert(conn.clone());
    metrics.ws_sessions_active.inc(&[]);
    tracing::info!("session opened");

    let (sink, mut source) = stream.split();
    let writer = tokio::spawn(write_loop(conn.clone(), sink, out_rx, log_frames).in_current_span());

    loop {
        tokio::select! {
            _ = conn.closed() => break,
            incoming = source.next() => {
                let msg = match incoming {
                    Some(Ok(msg)) => msg,
                    Some(Err(e)) => {
                        tracing::debug!(error = %e, "read failed");
                        break;
                    }
                    None => break,
                };
                if log_frames {
                    tracing::debug!(kind = frame_kind(&msg), len = msg.len(), "inbound frame");
                }

                match nego.on_frame(&msg) {
                    Ok(FrameAction::Forward) => {
                        if let demux::Demuxed::Passthrough(m) = demux::on_frame(&state, &conn, msg).await {
                            tracing::debug!(kind = frame_kind(&m), "frame passed through");
                        }
                    }
                    Ok(FrameAction::Pong(payload)) => {
                        conn.write(Message::Pong(payload));
                    }
                    Ok(FrameAction::Ignore) => {}
                    Ok(FrameAction::Close) => break,
                    Err(e) => {
                        state.counters().error();
                        metrics.frames_rejected.inc(&[("kind", frame_kind(&msg))]);
                        tracing::warn!(error = %e, "frame rejected");
                        let env = ResponseEnvelope::error(0, None, &e.to_string());
                        let _ = Reply::new(env, conn.clone()).send();
                    }
                }
            }
        }
    }

    conn.close();
    let purged = state.subscriptions().purge(id);
    state.connections().remove(id);
    metrics.ws_sessions_active.dec(&[]);
    if writer.await.is_err() {
        tracing::warn!("writer task aborted");
    }
    tracing::info!(purged, "session closed");
}

async fn write_loop(
    conn: Connection,
    mut sink: WsSink,
    mut rx: mpsc::Receiver<Outbound>,
    log_frames: bool,
) {
    loop {
        tokio::select! {
            biased;
            next = rx.recv() => {
                let Some(out) = next else { break };
                if !deliver(&mut sink, out, log_frames).await {
                    conn.close();
                    break;
                }
            }
            _ = conn.closed() => {
                // flush what was queued before the close
                while let Ok(out) = rx.try_recv() {
                    if !deliver(&mut sink, out, log_frames).await {
                        break;
                    }
                }
                break;
            }
        }
    }
    rx.close();
    let _ = sink.send(Message::Close(None)).await;
    let _ = sink.close().await;
}

async fn deliver(sink: &mut WsSink, out: Outbound, log_frames: bool) -> bool {
    if log_frames {
        tracing::debug!(kind = frame_kind(&out.msg), len = out.msg.len(), "outbound frame");
    }
    let ok = sink.send(out.msg).await.is_ok();
    if let Some(done) = out.done {
        let _ = done.send(ok);
    }
    ok
}
