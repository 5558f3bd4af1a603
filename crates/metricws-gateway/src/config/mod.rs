//! Gateway config loader (strict parsing, then env overrides, then validate).

pub mod env;
pub mod schema;

use std::fs;
use std::path::Path;

use metricws_core::error::{MwsError, Result};

pub use schema::{
    CorsSection, GatewayConfig, GatewaySection, HttpSection, LoggingSection, RuntimeSection,
    ServicesSection, WsSection,
};

/// Env var naming the config file.
pub const CONFIG_PATH_ENV: &str = "MWS_CONFIG";
/// Config file used when `MWS_CONFIG` is unset.
pub const DEFAULT_CONFIG_PATH: &str = "metricws.yaml";

pub fn load_from_file(path: &str) -> Result<GatewayConfig> {
    let s = fs::read_to_string(path)
        .map_err(|e| MwsError::Config(format!("read config failed ({path}): {e}")))?;
    load_from_str(&s)
}

pub fn load_from_str(s: &str) -> Result<GatewayConfig> {
    let cfg = parse(s)?;
    cfg.validate()?;
    Ok(cfg)
}

/// File (or defaults when the file does not exist), then env overrides,
/// then validation.
pub fn load_layered<F>(path: &str, lookup: F) -> Result<GatewayConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let mut cfg = if Path::new(path).exists() {
        let s = fs::read_to_string(path)
            .map_err(|e| MwsError::Config(format!("read config failed ({path}): {e}")))?;
        parse(&s)?
    } else {
        tracing::info!(%path, "config file not found, using defaults");
        GatewayConfig::default()
    };

    let applied = env::apply_with(&mut cfg, lookup)?;
    for key in applied {
        tracing::info!(%key, "config value overridden from environment");
    }

    cfg.validate()?;
    Ok(cfg)
}

fn parse(s: &str) -> Result<GatewayConfig> {
    serde_yaml::from_str(s).map_err(|e| MwsError::Config(format!("invalid yaml: {e}")))
}
