//! CORS middleware configuration

use axum::http::{HeaderName, HeaderValue, Method};
use tower_http::cors::{Any, CorsLayer};
use tracing::debug;

use super::request_id::REQUEST_ID_HEADER;

/// Create a CORS layer for the given origins
///
/// An empty list allows any origin: proxied pages are loaded from wherever
/// the link was shared.
pub fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::HEAD,
            Method::OPTIONS,
        ])
        .allow_headers(Any)
        .expose_headers([HeaderName::from_static(REQUEST_ID_HEADER)]);

    if allowed_origins.is_empty() {
        debug!("CORS: No origins specified, allowing any origin");
        return base.allow_origin(Any);
    }

    debug!("CORS: Allowing origins: {:?}", allowed_origins);
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();

    base.allow_origin(origins)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use axum::routing::get;
    use tower::ServiceExt;

    async fn allow_origin_for(layer: CorsLayer, origin: &str) -> Option<String> {
        let app = axum::Router::new()
            .route("/", get(|| async { "ok" }))
            .layer(layer);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/")
                    .header("Origin", origin)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        response
            .headers()
            .get("access-control-allow-origin")
            .map(|v| v.to_str().unwrap().to_string())
    }

    #[tokio::test]
    async fn test_cors_empty_origins_allows_any() {
        assert_eq!(
            allow_origin_for(cors_layer(&[]), "https://anywhere.example").await.as_deref(),
            Some("*")
        );
    }

    #[tokio::test]
    async fn test_cors_with_origins_allows_only_configured() {
        let origins = vec![
            "https://example.com".to_string(),
            "https://app.example.com".to_string(),
        ];

        assert_eq!(
            allow_origin_for(cors_layer(&origins), "https://app.example.com").await.as_deref(),
            Some("https://app.example.com")
        );
        assert_eq!(
            allow_origin_for(cors_layer(&origins), "https://evil.example").await,
            None
        );
    }
}
