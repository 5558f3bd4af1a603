//! Operational HTTP endpoints.
//!
//! - `healthz` : liveness
//! - `readyz`  : readiness (503 while draining)
//! - `metrics` : Prometheus text format

use async_trait::async_trait;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};

use metricws_core::error::Result;

use crate::app_state::AppState;
use crate::http::{HttpExchange, HttpHandler};

pub struct Healthz;

#[async_trait]
impl HttpHandler for Healthz {
    async fn handle(&self, _state: AppState, _ex: HttpExchange) -> Result<Response> {
        Ok((StatusCode::OK, "ok").into_response())
    }
}

pub struct Readyz;

#[async_trait]
impl HttpHandler for Readyz {
    async fn handle(&self, state: AppState, _ex: HttpExchange) -> Result<Response> {
        let resp = if state.is_draining() {
            (StatusCode::SERVICE_UNAVAILABLE, "draining")
        } else {
            (StatusCode::OK, "ready")
        };
        Ok(resp.into_response())
    }
}

pub struct Metrics;

#[async_trait]
impl HttpHandler for Metrics {
    async fn handle(&self, state: AppState, _ex: HttpExchange) -> Result<Response> {
        let body = state.metrics().render(&state.metrics_extra());
        Ok((
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response())
    }
}
