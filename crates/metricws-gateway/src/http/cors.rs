//! CORS extension point.
//!
//! The demultiplexer asks the policy to answer preflights before routing and
//! to decorate every routed response.

use std::collections::HashSet;
use std::sync::Arc;

use axum::extract::Request;
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::response::Response;

use crate::config::CorsSection;

use super::failure;

pub trait CorsPolicy: Send + Sync + 'static {
    /// Answer a preflight, or `None` to let the request route normally.
    fn preflight(&self, req: &Request) -> Option<Response>;

    /// Adjust a routed response for the request's `Origin`.
    fn decorate(&self, origin: Option<&HeaderValue>, resp: &mut Response);
}

/// Leaves requests and responses alone.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCors;

impl CorsPolicy for NoCors {
    fn preflight(&self, _req: &Request) -> Option<Response> {
        None
    }

    fn decorate(&self, _origin: Option<&HeaderValue>, _resp: &mut Response) {}
}

/// Exact-match origin list; `*` admits any origin.
#[derive(Debug, Clone)]
pub struct OriginAllowList {
    any: bool,
    origins: HashSet<String>,
}

impl OriginAllowList {
    pub fn new<I, S>(origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let origins: HashSet<String> = origins.into_iter().map(Into::into).collect();
        Self {
            any: origins.contains("*"),
            origins,
        }
    }

    pub fn allows(&self, origin: &str) -> bool {
        self.any || self.origins.contains(origin)
    }

    fn allowed<'a>(&self, origin: Option<&'a HeaderValue>) -> Option<&'a HeaderValue> {
        origin.filter(|o| o.to_str().is_ok_and(|o| self.allows(o)))
    }
}

impl CorsPolicy for OriginAllowList {
    fn preflight(&self, req: &Request) -> Option<Response> {
        let headers = req.headers();
        if req.method() != Method::OPTIONS
            || !headers.contains_key(header::ACCESS_CONTROL_REQUEST_METHOD)
        {
            return None;
        }
        let origin = headers.get(header::ORIGIN)?;
        let Some(origin) = self.allowed(Some(origin)) else {
            return Some(failure(StatusCode::FORBIDDEN, "Origin not allowed", false));
        };

        let mut builder = Response::builder()
            .status(StatusCode::NO_CONTENT)
            .header(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin.clone())
            .header(header::ACCESS_CONTROL_ALLOW_METHODS, "GET, POST, OPTIONS")
            .header(header::ACCESS_CONTROL_MAX_AGE, "600")
            .header(header::VARY, "Origin");
        if let Some(h) = headers.get(header::ACCESS_CONTROL_REQUEST_HEADERS) {
            builder = builder.header(header::ACCESS_CONTROL_ALLOW_HEADERS, h.clone());
        }
        builder.body(axum::body::Body::empty()).ok()
    }

    fn decorate(&self, origin: Option<&HeaderValue>, resp: &mut Response) {
        if let Some(origin) = self.allowed(origin) {
            let headers = resp.headers_mut();
            headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin.clone());
            headers.append(header::VARY, HeaderValue::from_static("Origin"));
        }
    }
}

/// Policy for the configured origin list. An empty list disables CORS.
pub fn from_config(cfg: &CorsSection) -> Arc<dyn CorsPolicy> {
    if cfg.allow_origins.is_empty() {
        Arc::new(NoCors)
    } else {
        Arc::new(OriginAllowList::new(cfg.allow_origins.iter().cloned()))
    }
}
