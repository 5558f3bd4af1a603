use std::net::SocketAddr;

use serde::Deserialize;
use metricws_core::error::{MwsError, Result};

pub const DEFAULT_LISTEN: &str = "0.0.0.0:8134";
pub const DEFAULT_BIND_TIMEOUT_MS: u64 = 5000;
pub const DEFAULT_HANDSHAKE_TIMEOUT_MS: u64 = 10000;
pub const DEFAULT_OUTBOUND_QUEUE: u64 = 1024;
pub const DEFAULT_CHUNKING_ENABLED: bool = true;
pub const DEFAULT_MAX_CHUNK_BYTES: u64 = 1024 * 1024;
pub const DEFAULT_WS_PATH: &str = "ws";
pub const DEFAULT_WS_AGGREGATION: bool = true;
pub const DEFAULT_MAX_FRAME_BYTES: u64 = 1024 * 1024;
pub const DEFAULT_MAX_MESSAGE_BYTES: u64 = 16 * 1024 * 1024;
pub const DEFAULT_WORKER_THREADS: u64 = 0;
pub const DEFAULT_MAX_BLOCKING_THREADS: u64 = 512;
pub const DEFAULT_THREAD_KEEP_ALIVE_MS: u64 = 60000;
pub const DEFAULT_LOG_LEVEL: &str = "info";
pub const DEFAULT_LOG_FRAMES: bool = false;
pub const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 5000;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    pub version: u32,

    #[serde(default)]
    pub gateway: GatewaySection,

    #[serde(default)]
    pub http: HttpSection,

    #[serde(default)]
    pub ws: WsSection,

    #[serde(default)]
    pub runtime: RuntimeSection,

    #[serde(default)]
    pub logging: LoggingSection,

    #[serde(default)]
    pub services: ServicesSection,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            version: 1,
            gateway: GatewaySection::default(),
            http: HttpSection::default(),
            ws: WsSection::default(),
            runtime: RuntimeSection::default(),
            logging: LoggingSection::default(),
            services: ServicesSection::default(),
        }
    }
}

impl GatewayConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(MwsError::UnsupportedVersion);
        }

        self.gateway.validate()?;
        self.http.validate()?;
        self.ws.validate()?;
        self.runtime.validate()?;
        self.services.validate()?;

        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatewaySection {
    #[serde(default = "default_listen")]
    pub listen: String,

    #[serde(default = "default_bind_timeout_ms")]
    pub bind_timeout_ms: u64,

    #[serde(default = "default_handshake_timeout_ms")]
    pub handshake_timeout_ms: u64,

    /// Per-connection outbound frame queue depth.
    #[serde(default = "default_outbound_queue")]
    pub outbound_queue: usize,
}

impl Default for GatewaySection {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            bind_timeout_ms: default_bind_timeout_ms(),
            handshake_timeout_ms: default_handshake_timeout_ms(),
            outbound_queue: default_outbound_queue(),
        }
    }
}

impl GatewaySection {
    pub fn validate(&self) -> Result<()> {
        self.listen_addr()?;
        if !(100..=60000).contains(&self.bind_timeout_ms) {
            return Err(MwsError::Config(
                "gateway.bind_timeout_ms must be between 100 and 60000".into(),
            ));
        }
        if !(1000..=120000).contains(&self.handshake_timeout_ms) {
            return Err(MwsError::Config(
                "gateway.handshake_timeout_ms must be between 1000 and 120000".into(),
            ));
        }
        if !(1..=65536).contains(&self.outbound_queue) {
            return Err(MwsError::Config(
                "gateway.outbound_queue must be between 1 and 65536".into(),
            ));
        }
        Ok(())
    }

    pub fn listen_addr(&self) -> Result<SocketAddr> {
        self.listen
            .parse()
            .map_err(|e| MwsError::Config(format!("gateway.listen must be a valid SocketAddr: {e}")))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HttpSection {
    #[serde(default = "default_chunking_enabled")]
    pub chunking_enabled: bool,

    /// Upper bound for request bodies, chunked or not.
    #[serde(default = "default_max_chunk_bytes")]
    pub max_chunk_bytes: usize,

    #[serde(default)]
    pub cors: CorsSection,
}

impl Default for HttpSection {
    fn default() -> Self {
        Self {
            chunking_enabled: default_chunking_enabled(),
            max_chunk_bytes: default_max_chunk_bytes(),
            cors: CorsSection::default(),
        }
    }
}

impl HttpSection {
    pub fn validate(&self) -> Result<()> {
        if self.max_chunk_bytes == 0 {
            return Err(MwsError::Config("http.max_chunk_bytes must be > 0".into()));
        }
        for origin in &self.cors.allow_origins {
            if origin.is_empty() || origin.ends_with('/') {
                return Err(MwsError::Config(format!(
                    "http.cors.allow_origins: invalid origin {origin:?}"
                )));
            }
        }
        Ok(())
    }
}

/// Empty `allow_origins` disables CORS handling.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CorsSection {
    #[serde(default)]
    pub allow_origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WsSection {
    /// First path segment that triggers the upgrade handshake.
    #[serde(default = "default_ws_path")]
    pub path: String,

    /// When false, fragmented messages larger than one frame are refused.
    #[serde(default = "default_ws_aggregation")]
    pub aggregation_enabled: bool,

    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,

    #[serde(default = "default_max_message_bytes")]
    pub max_message_bytes: usize,
}

impl Default for WsSection {
    fn default() -> Self {
        Self {
            path: default_ws_path(),
            aggregation_enabled: default_ws_aggregation(),
            max_frame_bytes: default_max_frame_bytes(),
            max_message_bytes: default_max_message_bytes(),
        }
    }
}

impl WsSection {
    pub fn validate(&self) -> Result<()> {
        if self.path.is_empty() || self.path.contains('/') {
            return Err(MwsError::Config(
                "ws.path must be a single non-empty path segment".into(),
            ));
        }
        if self.max_frame_bytes == 0 {
            return Err(MwsError::Config("ws.max_frame_bytes must be > 0".into()));
        }
        if self.max_message_bytes < self.max_frame_bytes {
            return Err(MwsError::Config(
                "ws.max_message_bytes must be >= ws.max_frame_bytes".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuntimeSection {
    /// 0 means one worker per core.
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,

    #[serde(default = "default_max_blocking_threads")]
    pub max_blocking_threads: usize,

    #[serde(default = "default_thread_keep_alive_ms")]
    pub thread_keep_alive_ms: u64,
}

impl Default for RuntimeSection {
    fn default() -> Self {
        Self {
            worker_threads: default_worker_threads(),
            max_blocking_threads: default_max_blocking_threads(),
            thread_keep_alive_ms: default_thread_keep_alive_ms(),
        }
    }
}

impl RuntimeSection {
    pub fn validate(&self) -> Result<()> {
        if self.worker_threads > 1024 {
            return Err(MwsError::Config("runtime.worker_threads must be <= 1024".into()));
        }
        if self.max_blocking_threads == 0 {
            return Err(MwsError::Config("runtime.max_blocking_threads must be > 0".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingSection {
    /// Fallback filter when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log every inbound/outbound frame at debug level.
    #[serde(default = "default_log_frames")]
    pub frames: bool,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            frames: default_log_frames(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServicesSection {
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
}

impl Default for ServicesSection {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
        }
    }
}

impl ServicesSection {
    pub fn validate(&self) -> Result<()> {
        if !(100..=3_600_000).contains(&self.heartbeat_interval_ms) {
            return Err(MwsError::Config(
                "services.heartbeat_interval_ms must be between 100 and 3600000".into(),
            ));
        }
        Ok(())
    }
}

fn default_listen() -> String {
    DEFAULT_LISTEN.into()
}
fn default_bind_timeout_ms() -> u64 {
    DEFAULT_BIND_TIMEOUT_MS
}
fn default_handshake_timeout_ms() -> u64 {
    DEFAULT_HANDSHAKE_TIMEOUT_MS
}
fn default_outbound_queue() -> usize {
    DEFAULT_OUTBOUND_QUEUE as usize
}
fn default_chunking_enabled() -> bool {
    DEFAULT_CHUNKING_ENABLED
}
fn default_max_chunk_bytes() -> usize {
    DEFAULT_MAX_CHUNK_BYTES as usize
}
fn default_ws_path() -> String {
    DEFAULT_WS_PATH.into()
}
fn default_ws_aggregation() -> bool {
    DEFAULT_WS_AGGREGATION
}
fn default_max_frame_bytes() -> usize {
    DEFAULT_MAX_FRAME_BYTES as usize
}
fn default_max_message_bytes() -> usize {
    DEFAULT_MAX_MESSAGE_BYTES as usize
}
fn default_worker_threads() -> usize {
    DEFAULT_WORKER_THREADS as usize
}
fn default_max_blocking_threads() -> usize {
    DEFAULT_MAX_BLOCKING_THREADS as usize
}
fn default_thread_keep_alive_ms() -> u64 {
    DEFAULT_THREAD_KEEP_ALIVE_MS
}
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.into()
}
fn default_log_frames() -> bool {
    DEFAULT_LOG_FRAMES
}
fn default_heartbeat_interval_ms() -> u64 {
    DEFAULT_HEARTBEAT_INTERVAL_MS
}
