use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

// JSON body for every gateway-generated error response
#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

/// Gateway-level failures. Each request either proxies cleanly or ends in
/// exactly one of these, rendered as a JSON envelope.
#[derive(Error, Debug)]
pub enum GatewayError {
    // startup-only: refuses to start, never reaches a caller
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("No route for {0}")]
    NoRoute(String),

    #[error("Bad gateway: {0}")]
    BadGateway(String),

    #[error("Gateway timeout: {0}")]
    GatewayTimeout(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, GatewayError>;

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::Config(_) | GatewayError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            GatewayError::NoRoute(_) => StatusCode::NOT_FOUND,
            GatewayError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            GatewayError::GatewayTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    /// Classify a failed backend call: timeouts map to 504, everything
    /// else (refused connection, DNS, protocol errors) to 502.
    pub fn from_backend(service: &str, err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            GatewayError::GatewayTimeout(format!("service '{service}' did not respond in time"))
        } else {
            GatewayError::BadGateway(format!("service '{service}' is unreachable"))
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        // internal detail stays in the logs
        let message = match &self {
            GatewayError::Config(_) | GatewayError::Internal(_) => {
                "Internal gateway error".to_string()
            }
            other => other.to_string(),
        };
        (status, Json(ErrorBody { error: message })).into_response()
    }
}
