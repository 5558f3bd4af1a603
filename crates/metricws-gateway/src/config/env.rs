//! Compile-time table of environment overrides.
//!
//! Every config key that may be overridden from the environment appears
//! exactly once in [`KEYS`], together with its env var and default.

use std::fmt;

use metricws_core::error::{MwsError, Result};

use super::schema::*;
use super::GatewayConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultValue {
    Str(&'static str),
    Bool(bool),
    Num(u64),
    /// Comma separated list, empty by default.
    List,
}

impl fmt::Display for DefaultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefaultValue::Str(s) => f.write_str(s),
            DefaultValue::Bool(b) => write!(f, "{b}"),
            DefaultValue::Num(n) => write!(f, "{n}"),
            DefaultValue::List => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ConfigKey {
    pub key: &'static str,
    pub env: &'static str,
    pub default: DefaultValue,
}

pub const KEYS: &[ConfigKey] = &[
    ConfigKey { key: "gateway.listen", env: "MWS_HTTP_LISTEN", default: DefaultValue::Str(DEFAULT_LISTEN) },
    ConfigKey { key: "gateway.bind_timeout_ms", env: "MWS_BIND_TIMEOUT_MS", default: DefaultValue::Num(DEFAULT_BIND_TIMEOUT_MS) },
    ConfigKey { key: "gateway.handshake_timeout_ms", env: "MWS_HANDSHAKE_TIMEOUT_MS", default: DefaultValue::Num(DEFAULT_HANDSHAKE_TIMEOUT_MS) },
    ConfigKey { key: "gateway.outbound_queue", env: "MWS_OUTBOUND_QUEUE", default: DefaultValue::Num(DEFAULT_OUTBOUND_QUEUE) },
    ConfigKey { key: "http.chunking_enabled", env: "MWS_HTTP_CHUNKING", default: DefaultValue::Bool(DEFAULT_CHUNKING_ENABLED) },
    ConfigKey { key: "http.max_chunk_bytes", env: "MWS_HTTP_MAX_CHUNK_BYTES", default: DefaultValue::Num(DEFAULT_MAX_CHUNK_BYTES) },
    ConfigKey { key: "http.cors.allow_origins", env: "MWS_CORS_ALLOW_ORIGINS", default: DefaultValue::List },
    ConfigKey { key: "ws.path", env: "MWS_WS_PATH", default: DefaultValue::Str(DEFAULT_WS_PATH) },
    ConfigKey { key: "ws.aggregation_enabled", env: "MWS_WS_AGGREGATION", default: DefaultValue::Bool(DEFAULT_WS_AGGREGATION) },
    ConfigKey { key: "ws.max_frame_bytes", env: "MWS_WS_MAX_FRAME_BYTES", default: DefaultValue::Num(DEFAULT_MAX_FRAME_BYTES) },
    ConfigKey { key: "ws.max_message_bytes", env: "MWS_WS_MAX_MESSAGE_BYTES", default: DefaultValue::Num(DEFAULT_MAX_MESSAGE_BYTES) },
    ConfigKey { key: "runtime.worker_threads", env: "MWS_WORKER_THREADS", default: DefaultValue::Num(DEFAULT_WORKER_THREADS) },
    ConfigKey { key: "runtime.max_blocking_threads", env: "MWS_MAX_BLOCKING_THREADS", default: DefaultValue::Num(DEFAULT_MAX_BLOCKING_THREADS) },
    ConfigKey { key: "runtime.thread_keep_alive_ms", env: "MWS_THREAD_KEEP_ALIVE_MS", default: DefaultValue::Num(DEFAULT_THREAD_KEEP_ALIVE_MS) },
    ConfigKey { key: "logging.level", env: "MWS_LOG_LEVEL", default: DefaultValue::Str(DEFAULT_LOG_LEVEL) },
    ConfigKey { key: "logging.frames", env: "MWS_LOG_FRAMES", default: DefaultValue::Bool(DEFAULT_LOG_FRAMES) },
    ConfigKey { key: "services.heartbeat_interval_ms", env: "MWS_HEARTBEAT_INTERVAL_MS", default: DefaultValue::Num(DEFAULT_HEARTBEAT_INTERVAL_MS) },
];

pub fn lookup_key(key: &str) -> Option<&'static ConfigKey> {
    KEYS.iter().find(|k| k.key == key)
}

/// Apply overrides from the process environment.
pub fn apply_env(cfg: &mut GatewayConfig) -> Result<Vec<&'static str>> {
    apply_with(cfg, |name| std::env::var(name).ok())
}

/// Apply overrides using `lookup` as the environment. Returns the keys that
/// were overridden, in table order.
pub fn apply_with<F>(cfg: &mut GatewayConfig, lookup: F) -> Result<Vec<&'static str>>
where
    F: Fn(&str) -> Option<String>,
{
    let mut applied = Vec::new();
    for k in KEYS {
        if let Some(raw) = lookup(k.env) {
            set(cfg, k.key, raw.trim())
                .map_err(|e| MwsError::Config(format!("{} ({}): {e}", k.env, k.key)))?;
            applied.push(k.key);
        }
    }
    Ok(applied)
}

/// Render the current value of `key` the same way defaults are rendered.
pub fn current(cfg: &GatewayConfig, key: &str) -> Option<String> {
    let v = match key {
        "gateway.listen" => cfg.gateway.listen.clone(),
        "gateway.bind_timeout_ms" => cfg.gateway.bind_timeout_ms.to_string(),
        "gateway.handshake_timeout_ms" => cfg.gateway.handshake_timeout_ms.to_string(),
        "gateway.outbound_queue" => cfg.gateway.outbound_queue.to_string(),
        "http.chunking_enabled" => cfg.http.chunking_enabled.to_string(),
        "http.max_chunk_bytes" => cfg.http.max_chunk_bytes.to_string(),
        "http.cors.allow_origins" => cfg.http.cors.allow_origins.join(","),
        "ws.path" => cfg.ws.path.clone(),
        "ws.aggregation_enabled" => cfg.ws.aggregation_enabled.to_string(),
        "ws.max_frame_bytes" => cfg.ws.max_frame_bytes.to_string(),
        "ws.max_message_bytes" => cfg.ws.max_message_bytes.to_string(),
        "runtime.worker_threads" => cfg.runtime.worker_threads.to_string(),
        "runtime.max_blocking_threads" => cfg.runtime.max_blocking_threads.to_string(),
        "runtime.thread_keep_alive_ms" => cfg.runtime.thread_keep_alive_ms.to_string(),
        "logging.level" => cfg.logging.level.clone(),
        "logging.frames" => cfg.logging.frames.to_string(),
        "services.heartbeat_interval_ms" => cfg.services.heartbeat_interval_ms.to_string(),
        _ => return None,
    };
    Some(v)
}

fn set(cfg: &mut GatewayConfig, key: &str, raw: &str) -> std::result::Result<(), String> {
    match key {
        "gateway.listen" => cfg.gateway.listen = raw.to_string(),
        "gateway.bind_timeout_ms" => cfg.gateway.bind_timeout_ms = num(raw)?,
        "gateway.handshake_timeout_ms" => cfg.gateway.handshake_timeout_ms = num(raw)?,
        "gateway.outbound_queue" => cfg.gateway.outbound_queue = num(raw)?,
        "http.chunking_enabled" => cfg.http.chunking_enabled = flag(raw)?,
        "http.max_chunk_bytes" => cfg.http.max_chunk_bytes = num(raw)?,
        "http.cors.allow_origins" => cfg.http.cors.allow_origins = list(raw),
        "ws.path" => cfg.ws.path = raw.to_string(),
        "ws.aggregation_enabled" => cfg.ws.aggregation_enabled = flag(raw)?,
        "ws.max_frame_bytes" => cfg.ws.max_frame_bytes = num(raw)?,
        "ws.max_message_bytes" => cfg.ws.max_message_bytes = num(raw)?,
        "runtime.worker_threads" => cfg.runtime.worker_threads = num(raw)?,
        "runtime.max_blocking_threads" => cfg.runtime.max_blocking_threads = num(raw)?,
        "runtime.thread_keep_alive_ms" => cfg.runtime.thread_keep_alive_ms = num(raw)?,
        "logging.level" => cfg.logging.level = raw.to_string(),
        "logging.frames" => cfg.logging.frames = flag(raw)?,
        "services.heartbeat_interval_ms" => cfg.services.heartbeat_interval_ms = num(raw)?,
        other => return Err(format!("unknown key {other}")),
    }
    Ok(())
}

fn num<T: std::str::FromStr>(raw: &str) -> std::result::Result<T, String> {
    raw.parse().map_err(|_| format!("expected a number, got {raw:?}"))
}

fn flag(raw: &str) -> std::result::Result<bool, String> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(format!("expected a boolean, got {raw:?}")),
    }
}

fn list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
