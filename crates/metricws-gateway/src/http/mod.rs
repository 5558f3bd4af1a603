//! HTTP side of the demultiplexer: handler trait, prefix router, CORS and
//! the plain-text failure format.

pub mod cors;
pub mod paths;

use std::net::SocketAddr;

use async_trait::async_trait;
use axum::extract::Request;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};

use metricws_core::error::Result;

use crate::app_state::AppState;

pub use cors::{CorsPolicy, NoCors, OriginAllowList};
pub use paths::{route_key, PathRouter};

/// One routed HTTP request.
#[derive(Debug)]
pub struct HttpExchange {
    pub req: Request,
    pub peer: SocketAddr,
    /// The path segment the request was routed on.
    pub route: String,
}

/// A handler bound to a path prefix. It must produce the complete response.
#[async_trait]
pub trait HttpHandler: Send + Sync + 'static {
    async fn handle(&self, state: AppState, ex: HttpExchange) -> Result<Response>;
}

/// `Failure: <status>\r\n<message>\r\n` as `text/plain`. With `close` the
/// transport drops the connection once the response is flushed.
pub fn failure(status: StatusCode, message: &str, close: bool) -> Response {
    let body = format!("Failure: {status}\r\n{message}\r\n");
    let mut resp = (
        status,
        [(header::CONTENT_TYPE, "text/plain; charset=UTF-8")],
        body,
    )
        .into_response();
    if close {
        resp.headers_mut()
            .insert(header::CONNECTION, HeaderValue::from_static("close"));
    }
    resp
}
