//! Shared gateway context.
//!
//! Everything the demultiplexer, handlers and publishers need is reached
//! through one cloneable [`AppState`], built explicitly at startup. Several
//! independent instances can coexist (tests do this).

use std::sync::Arc;

use metricws_core::error::Result;

use crate::config::GatewayConfig;
use crate::dispatch::{OpHandler, OpRouter, SubscriptionTable};
use crate::http::{cors, CorsPolicy, HttpHandler, PathRouter};
use crate::obs::{DemuxCounters, GatewayMetrics};
use crate::ops::{Healthz, Metrics, Readyz};
use crate::services::{Echo, Heartbeat, Ping, Range};
use crate::transport::ws::WsUpgrade;
use crate::transport::ConnectionRegistry;

#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    cfg: GatewayConfig,
    metrics: GatewayMetrics,
    counters: DemuxCounters,
    paths: PathRouter,
    ops: OpRouter,
    subs: SubscriptionTable,
    conns: ConnectionRegistry,
    cors: Arc<dyn CorsPolicy>,
}

impl AppState {
    /// State with every built-in route and operation registered.
    pub fn new(cfg: GatewayConfig) -> Result<Self> {
        Ok(Self::builder(cfg).with_builtins()?.build())
    }

    /// Empty registries; callers register what they need.
    pub fn builder(cfg: GatewayConfig) -> AppStateBuilder {
        AppStateBuilder {
            cors: cors::from_config(&cfg.http.cors),
            cfg,
            paths: PathRouter::new(),
            ops: OpRouter::new(),
        }
    }

    pub fn cfg(&self) -> &GatewayConfig {
        &self.inner.cfg
    }

    pub fn metrics(&self) -> &GatewayMetrics {
        &self.inner.metrics
    }

    pub fn counters(&self) -> &DemuxCounters {
        &self.inner.counters
    }

    pub fn paths(&self) -> &PathRouter {
        &self.inner.paths
    }

    pub fn ops(&self) -> &OpRouter {
        &self.inner.ops
    }

    pub fn subscriptions(&self) -> &SubscriptionTable {
        &self.inner.subs
    }

    pub fn connections(&self) -> &ConnectionRegistry {
        &self.inner.conns
    }

    pub fn cors(&self) -> &Arc<dyn CorsPolicy> {
        &self.inner.cors
    }

    pub fn is_draining(&self) -> bool {
        self.inner.metrics.is_draining()
    }

    /// Refuse new upgrades and close every open connection. Returns how many
    /// connections were closed.
    pub fn begin_drain(&self) -> usize {
        self.inner.metrics.set_draining();
        self.inner.conns.close_all()
    }

    /// Extra `name value` lines for `/metrics`.
    pub fn metrics_extra(&self) -> Vec<(&'static str, u64)> {
        let mut extra: Vec<(&'static str, u64)> =
            self.inner.counters.snapshot().as_extra().to_vec();
        extra.push(("metricws_ws_connections", self.inner.conns.len() as u64));
        extra.push(("metricws_subscriptions", self.inner.subs.len() as u64));
        extra
    }
}

pub struct AppStateBuilder {
    cfg: GatewayConfig,
    paths: PathRouter,
    ops: OpRouter,
    cors: Arc<dyn CorsPolicy>,
}

impl AppStateBuilder {
    pub fn with_http(self, prefix: impl Into<String>, handler: Arc<dyn HttpHandler>) -> Result<Self> {
        self.paths.register(prefix, handler)?;
        Ok(self)
    }

    pub fn with_op(self, name: impl Into<String>, handler: Arc<dyn OpHandler>) -> Result<Self> {
        self.ops.register(name, handler)?;
        Ok(self)
    }

    pub fn with_cors(mut self, policy: Arc<dyn CorsPolicy>) -> Self {
        self.cors = policy;
        self
    }

    /// The upgrade path, the operational endpoints and the built-in
    /// operations. A clash with `ws.path` is a startup error.
    pub fn with_builtins(self) -> Result<Self> {
        let ws_path = self.cfg.ws.path.clone();
        self.with_http(ws_path, Arc::new(WsUpgrade))?
            .with_http("healthz", Arc::new(Healthz))?
            .with_http("readyz", Arc::new(Readyz))?
            .with_http("metrics", Arc::new(Metrics))?
            .with_op(Ping::OP, Arc::new(Ping))?
            .with_op(Echo::OP, Arc::new(Echo))?
            .with_op(Range::OP, Arc::new(Range))?
            .with_op(Heartbeat::OP, Arc::new(Heartbeat))
    }

    pub fn build(self) -> AppState {
        AppState {
            inner: Arc::new(AppStateInner {
                cfg: self.cfg,
                metrics: GatewayMetrics::default(),
                counters: DemuxCounters::default(),
                paths: self.paths,
                ops: self.ops,
                subs: SubscriptionTable::new(),
                conns: ConnectionRegistry::default(),
                cors: self.cors,
            }),
        }
    }
}
