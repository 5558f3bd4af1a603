//! Axum wiring.
//!
//! Axum only accepts connections and hands every request to the
//! demultiplexer; routing by path prefix happens in [`crate::http::PathRouter`].

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Request, State};
use axum::response::Response;
use axum::Router;

use crate::{app_state::AppState, demux};

pub fn build_router(state: AppState) -> Router {
    Router::new().fallback(entry).with_state(state)
}

async fn entry(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    req: Request,
) -> Response {
    demux::on_http(&state, req, peer).await
}
