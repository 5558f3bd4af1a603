//! metricws gateway binary.
//!
//! Config comes from `MWS_CONFIG` (default `metricws.yaml`, defaults when the
//! file is missing) plus `MWS_*` environment overrides.

use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tracing_subscriber::{fmt, EnvFilter};

use metricws_gateway::services::Heartbeat;
use metricws_gateway::{app_state::AppState, config, router};

const EXIT_CONFIG: u8 = 2;
const EXIT_BIND: u8 = 3;
const EXIT_SERVE: u8 = 4;

fn main() -> ExitCode {
    let path = std::env::var(config::CONFIG_PATH_ENV)
        .unwrap_or_else(|_| config::DEFAULT_CONFIG_PATH.to_string());
    let cfg = match config::load_layered(&path, |k| std::env::var(k).ok()) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("metricws-gateway: config load failed ({path}): {e}");
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cfg.logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    let rt = &cfg.runtime;
    let mut builder = tokio::runtime::Builder::new_multi_thread();
    builder
        .enable_all()
        .thread_name_fn(|| {
            static NEXT: AtomicUsize = AtomicUsize::new(0);
            format!("mws-worker-{}", NEXT.fetch_add(1, Ordering::Relaxed))
        })
        .max_blocking_threads(rt.max_blocking_threads)
        .thread_keep_alive(Duration::from_millis(rt.thread_keep_alive_ms));
    if rt.worker_threads > 0 {
        builder.worker_threads(rt.worker_threads);
    }
    let runtime = match builder.build() {
        Ok(r) => r,
        Err(e) => {
            tracing::error!(error = %e, "runtime build failed");
            return ExitCode::FAILURE;
        }
    };

    runtime.block_on(serve(cfg))
}

async fn serve(cfg: config::GatewayConfig) -> ExitCode {
    let listen = match cfg.gateway.listen_addr() {
        Ok(a) => a,
        Err(e) => {
            tracing::error!(error = %e, "invalid listen address");
            return ExitCode::from(EXIT_CONFIG);
        }
    };
    let bind_wait = Duration::from_millis(cfg.gateway.bind_timeout_ms);

    let state = match AppState::new(cfg) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "gateway setup failed");
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    let listener = match tokio::time::timeout(bind_wait, tokio::net::TcpListener::bind(listen)).await {
        Ok(Ok(l)) => l,
        Ok(Err(e)) => {
            tracing::error!(%listen, error = %e, "bind failed");
            return ExitCode::from(EXIT_BIND);
        }
        Err(_) => {
            tracing::error!(%listen, ?bind_wait, "bind timed out");
            return ExitCode::from(EXIT_BIND);
        }
    };

    tracing::info!(
        %listen,
        ws_path = %state.cfg().ws.path,
        ops = ?state.ops().registered_ops(),
        routes = ?state.paths().prefixes(),
        "metricws-gateway starting"
    );

    tokio::spawn(Heartbeat::run(state.clone()));

    let app = router::build_router(state.clone());
    let shutdown_state = state.clone();
    let shutdown = async move {
        if tokio::signal::ctrl_c().await.is_err() {
            tracing::warn!("ctrl-c handler unavailable");
            std::future::pending::<()>().await;
        }
        let closed = shutdown_state.begin_drain();
        tracing::info!(closed, "draining");
    };

    match axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
    {
        Ok(()) => {
            tracing::info!("metricws-gateway stopped");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "server failed");
            ExitCode::from(EXIT_SERVE)
        }
    }
}
