use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Unified error type for the Waypoint proxy
#[derive(Error, Debug)]
pub enum WaypointError {
    // Target validation
    #[error("Target URL is required")]
    MissingTargetUrl,

    #[error("Invalid URL format")]
    InvalidTargetUrl(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    // Admission
    #[error("Too many requests, please try again later")]
    RateLimitExceeded,

    #[error("Client {client_ip} is temporarily blocked")]
    ClientBlocked { client_ip: String },

    // Egress
    #[error("No egress candidates available")]
    NoEgressCandidates,

    #[error("All egress attempts failed after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },

    #[error("Upstream connection failed: {0}")]
    UpstreamConnectionFailed(String),

    #[error("Upstream returned server error {status}")]
    UpstreamServerError { status: u16 },

    #[error("Operation timed out")]
    Timeout,

    // Configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for Waypoint operations
pub type Result<T> = std::result::Result<T, WaypointError>;

impl WaypointError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            WaypointError::MissingTargetUrl
            | WaypointError::InvalidTargetUrl(_)
            | WaypointError::InvalidRequest(_) => StatusCode::BAD_REQUEST,

            // 429 Too Many Requests
            WaypointError::RateLimitExceeded | WaypointError::ClientBlocked { .. } => {
                StatusCode::TOO_MANY_REQUESTS
            }

            // 502 Bad Gateway
            WaypointError::RetriesExhausted { .. }
            | WaypointError::UpstreamConnectionFailed(_)
            | WaypointError::UpstreamServerError { .. }
            | WaypointError::Timeout => StatusCode::BAD_GATEWAY,

            // 503 Service Unavailable
            WaypointError::NoEgressCandidates => StatusCode::SERVICE_UNAVAILABLE,

            // 500 Internal Server Error
            WaypointError::InvalidConfig(_) | WaypointError::Io(_) | WaypointError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Whether a failed egress attempt with this error may be retried on another path
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            WaypointError::UpstreamConnectionFailed(_)
                | WaypointError::UpstreamServerError { .. }
                | WaypointError::Timeout
        )
    }

    /// Message safe to show to clients; internal detail never leaves the process
    pub fn public_message(&self) -> String {
        if self.status_code().is_server_error()
            && !matches!(
                self,
                WaypointError::NoEgressCandidates | WaypointError::RetriesExhausted { .. }
            )
        {
            match self.status_code() {
                StatusCode::BAD_GATEWAY => "Proxy error occurred".to_string(),
                _ => "Internal server error".to_string(),
            }
        } else {
            self.to_string()
        }
    }

    /// Build a JSON error response tagged with the request correlation id
    pub fn to_response(&self, request_id: Option<&str>) -> Response {
        let body = match request_id {
            Some(id) => json!({ "error": self.public_message(), "requestId": id }),
            None => json!({ "error": self.public_message() }),
        };

        (self.status_code(), Json(body)).into_response()
    }
}

impl IntoResponse for WaypointError {
    fn into_response(self) -> Response {
        self.to_response(None)
    }
}

impl From<url::ParseError> for WaypointError {
    fn from(err: url::ParseError) -> Self {
        WaypointError::InvalidTargetUrl(err.to_string())
    }
}

impl From<reqwest::Error> for WaypointError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            WaypointError::Timeout
        } else {
            WaypointError::UpstreamConnectionFailed(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_code_mapping() {
        assert_eq!(
            WaypointError::MissingTargetUrl.status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            WaypointError::InvalidTargetUrl("bad".to_string()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            WaypointError::RateLimitExceeded.status_code(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            WaypointError::ClientBlocked {
                client_ip: "127.0.0.1".to_string()
            }
            .status_code(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            WaypointError::RetriesExhausted { attempts: 3 }.status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            WaypointError::NoEgressCandidates.status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            WaypointError::Internal("boom".to_string()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_transient_classification() {
        assert!(WaypointError::Timeout.is_transient());
        assert!(WaypointError::UpstreamServerError { status: 503 }.is_transient());
        assert!(WaypointError::UpstreamConnectionFailed("reset".into()).is_transient());
        assert!(!WaypointError::MissingTargetUrl.is_transient());
        assert!(!WaypointError::NoEgressCandidates.is_transient());
    }

    #[test]
    fn test_internal_detail_is_not_leaked() {
        let err = WaypointError::Internal("database password wrong".to_string());
        assert_eq!(err.public_message(), "Internal server error");

        let err = WaypointError::UpstreamConnectionFailed("10.0.0.7:3128 refused".to_string());
        assert_eq!(err.public_message(), "Proxy error occurred");

        let err = WaypointError::RetriesExhausted { attempts: 3 };
        assert_eq!(
            err.public_message(),
            "All egress attempts failed after 3 attempts"
        );
    }

    #[tokio::test]
    async fn test_error_response_carries_request_id() {
        let response = WaypointError::Internal("x".into()).to_response(Some("req-1"));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["requestId"], "req-1");
        assert_eq!(value["error"], "Internal server error");
    }
}
