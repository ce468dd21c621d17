use std::time::Instant;

use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;
use lazy_static::lazy_static;
use prometheus::{Counter, Gauge, Histogram, register_counter, register_gauge, register_histogram};
use tracing::info;

lazy_static! {
    pub static ref REQUEST_TOTAL: Counter =
        register_counter!("gateway_requests_total", "Total number of requests").unwrap();
    pub static ref RATE_LIMITED_TOTAL: Counter = register_counter!(
        "gateway_rate_limited_total",
        "Requests rejected by the rate limiter"
    )
    .unwrap();
    pub static ref PROXY_ERRORS_TOTAL: Counter = register_counter!(
        "gateway_proxy_errors_total",
        "Backend calls that failed or timed out"
    )
    .unwrap();
    pub static ref REQUEST_LATENCY: Histogram = register_histogram!(
        "gateway_request_latency_seconds",
        "Request latency in seconds"
    )
    .unwrap();
    pub static ref TRACKED_CLIENTS: Gauge = register_gauge!(
        "gateway_tracked_clients",
        "Distinct clients with an active rate limit window"
    )
    .unwrap();
}

/// Access log + request metrics for every inbound request.
pub async fn access_log(request: Request, next: Next) -> Response {
    REQUEST_TOTAL.inc();
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    let response = next.run(request).await;

    let latency = start.elapsed();
    REQUEST_LATENCY.observe(latency.as_secs_f64());
    info!(
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        latency_ms = latency.as_millis() as u64,
        "request"
    );

    response
}
