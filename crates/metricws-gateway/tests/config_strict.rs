#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::collections::HashMap;

use metricws_gateway::config::{self, env, GatewayConfig};

#[test]
fn deny_unknown_fields_nested() {
    let bad = r#"
version: 1
ws:
  path: "ws"
  max_frame_bytez: 123 # typo should fail
"#;

    let err = config::load_from_str(bad).expect_err("must fail");
    assert_eq!(err.client_code().as_str(), "CONFIG");
}

#[test]
fn ok_minimal_config() {
    let cfg = config::load_from_str("version: 1\n").expect("must parse");
    assert_eq!(cfg.version, 1);
    assert_eq!(cfg.gateway.listen, "0.0.0.0:8134");
    assert_eq!(cfg.ws.path, "ws");
    assert!(cfg.http.chunking_enabled);
    assert!(cfg.http.cors.allow_origins.is_empty());
}

#[test]
fn unknown_version_is_rejected() {
    let err = config::load_from_str("version: 2\n").expect_err("must fail");
    assert_eq!(err.client_code().as_str(), "UNSUPPORTED_VERSION");
}

#[test]
fn validation_catches_bad_values() {
    let cases = [
        "version: 1\ngateway:\n  listen: \"not-an-addr\"\n",
        "version: 1\nws:\n  path: \"a/b\"\n",
        "version: 1\nws:\n  max_frame_bytes: 2048\n  max_message_bytes: 1024\n",
        "version: 1\nhttp:\n  max_chunk_bytes: 0\n",
        "version: 1\nservices:\n  heartbeat_interval_ms: 1\n",
    ];
    for yaml in cases {
        let err = config::load_from_str(yaml).expect_err(yaml);
        assert_eq!(err.client_code().as_str(), "CONFIG", "{yaml}");
    }
}

#[test]
fn override_table_defaults_match_schema_defaults() {
    let cfg = GatewayConfig::default();
    for k in env::KEYS {
        let current = env::current(&cfg, k.key).unwrap_or_else(|| panic!("no getter for {}", k.key));
        assert_eq!(current, k.default.to_string(), "{}", k.key);
    }
}

#[test]
fn override_table_has_unique_keys_and_vars() {
    let mut keys = std::collections::HashSet::new();
    let mut vars = std::collections::HashSet::new();
    for k in env::KEYS {
        assert!(keys.insert(k.key), "duplicate key {}", k.key);
        assert!(vars.insert(k.env), "duplicate env {}", k.env);
        assert!(k.env.starts_with("MWS_"));
    }
    assert_eq!(env::lookup_key("gateway.listen").map(|k| k.env), Some("MWS_HTTP_LISTEN"));
}

#[test]
fn env_overrides_apply_after_file() {
    let vars: HashMap<&str, &str> = HashMap::from([
        ("MWS_HTTP_LISTEN", "127.0.0.1:9000"),
        ("MWS_HTTP_CHUNKING", "false"),
        ("MWS_CORS_ALLOW_ORIGINS", "https://a.example, https://b.example"),
        ("MWS_WS_MAX_FRAME_BYTES", "4096"),
    ]);
    let mut cfg = config::load_from_str("version: 1\ngateway:\n  listen: \"0.0.0.0:1\"\n").unwrap();

    let applied = env::apply_with(&mut cfg, |k| vars.get(k).map(|v| v.to_string())).unwrap();

    assert_eq!(
        applied,
        vec![
            "gateway.listen",
            "http.chunking_enabled",
            "http.cors.allow_origins",
            "ws.max_frame_bytes"
        ]
    );
    assert_eq!(cfg.gateway.listen, "127.0.0.1:9000");
    assert!(!cfg.http.chunking_enabled);
    assert_eq!(cfg.http.cors.allow_origins, vec!["https://a.example", "https://b.example"]);
    assert_eq!(cfg.ws.max_frame_bytes, 4096);
    cfg.validate().unwrap();
}

#[test]
fn bad_env_value_is_a_config_error() {
    let mut cfg = GatewayConfig::default();
    let err = env::apply_with(&mut cfg, |k| {
        (k == "MWS_OUTBOUND_QUEUE").then(|| "lots".to_string())
    })
    .expect_err("must fail");
    assert_eq!(err.client_code().as_str(), "CONFIG");
    assert!(err.to_string().contains("MWS_OUTBOUND_QUEUE"));
}

#[test]
fn missing_file_falls_back_to_defaults() {
    let cfg = config::load_layered("/nonexistent/metricws.yaml", |k| {
        (k == "MWS_WS_PATH").then(|| "socket".to_string())
    })
    .unwrap();
    assert_eq!(cfg.ws.path, "socket");
    assert_eq!(cfg.gateway.listen, "0.0.0.0:8134");
}

#[test]
fn layered_load_validates_overrides() {
    let err = config::load_layered("/nonexistent/metricws.yaml", |k| {
        (k == "MWS_WS_PATH").then(|| "a/b".to_string())
    })
    .expect_err("must fail");
    assert_eq!(err.client_code().as_str(), "CONFIG");
}
