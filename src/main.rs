mod config;
mod error;
mod handlers;
mod metrics;
mod rate_limit;
mod routes;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{Router, middleware, routing::get};
use clap::Parser;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::Args;
use crate::rate_limit::RateLimiter;
use crate::routes::RouteTable;
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let args = Args::parse();

    info!(version = env!("CARGO_PKG_VERSION"), "starting api-gateway");

    // resolve and validate routing before binding anything: a service
    // without a backend URL refuses to start, not fails on first request
    let specs = args.resolve_services()?;
    let routes = RouteTable::from_specs(&specs)?;

    let state = Arc::new(AppState {
        client: reqwest::Client::builder()
            .timeout(Duration::from_secs(args.proxy_timeout_secs))
            .build()?,
        routes,
        limiter: RateLimiter::new(args.rate_limit, Duration::from_millis(args.rate_window_ms)),
    });

    let app = gateway_router(state);

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!(port = args.port, "gateway listening");
    info!(
        max_requests = args.rate_limit,
        window_ms = args.rate_window_ms,
        "rate limit configured"
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("gateway stopped");
    Ok(())
}

// Proxy dispatch sits behind admission control; the gateway's own
// operational endpoints do not, so probes and scrapes never starve.
// Everything gets the access log.
fn gateway_router(state: Arc<AppState>) -> Router {
    Router::new()
        .fallback(handlers::proxy_handler)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::admission_middleware,
        ))
        .route("/health", get(handlers::health_handler))
        .route("/metrics", get(handlers::metrics_handler))
        .layer(middleware::from_fn(metrics::access_log))
        .with_state(state)
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("received Ctrl+C, shutting down");
        }
        _ = terminate => {
            info!("received SIGTERM, shutting down");
        }
    }
}
