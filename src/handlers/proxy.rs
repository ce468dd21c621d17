use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::http::header::{CONTENT_LENGTH, HOST, HeaderName};
use axum::response::{IntoResponse, Response};
use tracing::{error, warn};

use crate::error::GatewayError;
use crate::metrics;
use crate::state::AppState;

/// Proxy dispatch: resolve the service from the path, rewrite, forward,
/// and relay the backend response. Each request is forwarded at most once.
pub async fn proxy_handler(State(state): State<Arc<AppState>>, request: Request) -> Response {
    match forward(&state, request).await {
        Ok(response) => response,
        Err(err) => err.into_response(),
    }
}

async fn forward(state: &AppState, request: Request) -> Result<Response, GatewayError> {
    let path = request.uri().path().to_string();
    let query = request.uri().query().map(str::to_string);

    let Some((route, rewritten)) = state.routes.resolve(&path) else {
        warn!(path = %path, "no route for request");
        return Err(GatewayError::NoRoute(path));
    };
    let service = route.name.clone();
    let url = route.backend_url(&rewritten, query.as_deref());

    let (parts, body) = request.into_parts();

    // Host is rewritten to the backend's (change-origin); the transport
    // re-derives framing headers for the streamed body.
    let mut outbound = HeaderMap::new();
    for (name, value) in parts.headers.iter() {
        if *name == HOST || *name == CONTENT_LENGTH || is_hop_by_hop(name) {
            continue;
        }
        outbound.append(name, value.clone());
    }

    let backend_response = state
        .client
        .request(parts.method, &url)
        .headers(outbound)
        .body(reqwest::Body::wrap_stream(body.into_data_stream()))
        .send()
        .await
        .map_err(|e| {
            metrics::PROXY_ERRORS_TOTAL.inc();
            error!(service = %service, url = %url, error = %e, "backend call failed");
            GatewayError::from_backend(&service, &e)
        })?;

    let mut response = Response::builder().status(backend_response.status());
    if let Some(headers) = response.headers_mut() {
        for (name, value) in backend_response.headers().iter() {
            if is_hop_by_hop(name) {
                continue;
            }
            headers.append(name, value.clone());
        }
    }

    response
        .body(Body::from_stream(backend_response.bytes_stream()))
        .map_err(|e| GatewayError::Internal(e.to_string()))
}

// Hop-by-hop headers never travel end to end (RFC 9110 section 7.6.1).
fn is_hop_by_hop(name: &HeaderName) -> bool {
    matches!(
        name.as_str(),
        "connection"
            | "keep-alive"
            | "proxy-connection"
            | "te"
            | "trailer"
            | "transfer-encoding"
            | "upgrade"
    )
}
