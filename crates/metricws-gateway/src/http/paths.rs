use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use metricws_core::error::{MwsError, Result};

use super::HttpHandler;

/// First non-empty segment of `path`: `/ws?x=1` and `//ws/a` both give `ws`.
pub fn route_key(path: &str) -> Option<&str> {
    let path = path.split(['?', '#']).next().unwrap_or_default();
    path.split('/').find(|s| !s.is_empty())
}

/// Path prefix -> handler.
#[derive(Default)]
pub struct PathRouter {
    routes: DashMap<String, Arc<dyn HttpHandler>>,
}

impl PathRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, prefix: impl Into<String>, handler: Arc<dyn HttpHandler>) -> Result<()> {
        let prefix = prefix.into();
        let prefix = prefix.trim_matches('/').to_string();
        if prefix.is_empty() || prefix.contains('/') {
            return Err(MwsError::Config(format!(
                "path prefix must be a single segment: {prefix:?}"
            )));
        }
        match self.routes.entry(prefix) {
            Entry::Occupied(e) => Err(MwsError::Duplicate(format!(
                "path prefix already registered: {}",
                e.key()
            ))),
            Entry::Vacant(e) => {
                e.insert(handler);
                Ok(())
            }
        }
    }

    pub fn lookup(&self, key: &str) -> Option<Arc<dyn HttpHandler>> {
        self.routes.get(key).map(|h| h.value().clone())
    }

    pub fn prefixes(&self) -> Vec<String> {
        let mut p: Vec<String> = self.routes.iter().map(|e| e.key().clone()).collect();
        p.sort();
        p
    }
}
