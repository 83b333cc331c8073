//! Response rewriting
//!
//! Turns an upstream response into one that keeps the client inside the
//! proxy: redirect locations, cookies and in-body references are pointed
//! back at `/proxy`.

pub mod body;
pub mod encoding;
pub mod headers;

use std::time::Duration;

use axum::body::Body;
use axum::http::header::{self, HeaderMap, HeaderValue};
use axum::http::Response;
use tracing::{debug, warn};
use url::Url;

use self::encoding::{decode, encode, Coding};
use self::headers::{response_headers, rewrite_location};
use crate::config::ServerConfig;
use crate::error::{Result, WaypointError};
use crate::proxy::target::TargetDescriptor;

pub use self::body::rewrite_body;

/// Largest text body buffered for rewriting
pub const MAX_REWRITE_BODY: usize = 32 * 1024 * 1024;

/// Deadline for buffering a text body unless the caller sets one
pub const DEFAULT_BODY_TIMEOUT: Duration = Duration::from_secs(30);

/// Content types whose bodies are rewritten
const REWRITABLE_TYPES: &[&str] = &[
    "text/html",
    "text/css",
    "application/javascript",
    "text/javascript",
    "application/json",
];

/// Whether a `Content-Type` value names a rewritable body
pub fn is_rewritable(content_type: Option<&HeaderValue>) -> bool {
    let Some(value) = content_type.and_then(|v| v.to_str().ok()) else {
        return false;
    };
    let essence = value.split(';').next().unwrap_or_default().trim().to_ascii_lowercase();
    REWRITABLE_TYPES.contains(&essence.as_str())
}

/// Scheme and host the client reached the proxy on
///
/// Configured values win; otherwise the inbound `X-Forwarded-Proto` and
/// `Host` headers are used.
pub fn proxy_origin(server: &ServerConfig, inbound: &HeaderMap) -> (String, String) {
    let scheme = server
        .public_scheme
        .clone()
        .or_else(|| {
            inbound
                .get("x-forwarded-proto")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.split(',').next())
                .map(|v| v.trim().to_ascii_lowercase())
                .filter(|v| v == "http" || v == "https")
        })
        .unwrap_or_else(|| "http".to_string());

    let host = server
        .public_host
        .clone()
        .or_else(|| {
            inbound
                .get(header::HOST)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        })
        .unwrap_or_else(|| server.listen_host());

    (scheme, host)
}

/// Everything needed to turn a target reference into a proxy link
#[derive(Debug, Clone)]
pub struct RewriteContext {
    pub target_url: Url,
    pub origin: String,
    pub proxy_scheme: String,
    pub proxy_host: String,
    pub country: Option<String>,
    /// Deadline for reading a body that is buffered for rewriting
    pub body_timeout: Duration,
}

impl RewriteContext {
    pub fn new(target: &TargetDescriptor, proxy_scheme: &str, proxy_host: &str) -> Self {
        Self {
            target_url: target.url.clone(),
            origin: target.origin.clone(),
            proxy_scheme: proxy_scheme.to_string(),
            proxy_host: proxy_host.to_string(),
            country: target.country.clone(),
            body_timeout: DEFAULT_BODY_TIMEOUT,
        }
    }

    pub fn with_body_timeout(mut self, body_timeout: Duration) -> Self {
        self.body_timeout = body_timeout;
        self
    }

    /// Proxy link for an absolute URL
    pub fn proxy_url(&self, absolute: &str) -> String {
        let mut link = format!(
            "{}://{}/proxy?url={}",
            self.proxy_scheme,
            self.proxy_host,
            urlencoding::encode(absolute)
        );
        if let Some(country) = &self.country {
            link.push_str("&country=");
            link.push_str(&urlencoding::encode(country));
        }
        link
    }

    /// Resolve a reference against the target URL
    pub fn resolve(&self, reference: &str) -> Option<Url> {
        self.target_url
            .join(reference.trim())
            .ok()
            .filter(|u| matches!(u.scheme(), "http" | "https"))
    }
}

/// Rewrite an upstream response for delivery to the client
pub async fn rewrite_response(upstream: Response<Body>, ctx: &RewriteContext) -> Result<Response<Body>> {
    let (parts, upstream_body) = upstream.into_parts();
    let mut headers = response_headers(&parts.headers);

    if parts.status.is_redirection() {
        if let Some(location) = parts.headers.get(header::LOCATION) {
            let mut redirect = HeaderMap::new();
            let rewritten = location
                .to_str()
                .ok()
                .and_then(|l| rewrite_location(l, ctx))
                .and_then(|l| HeaderValue::from_str(&l).ok())
                .unwrap_or_else(|| location.clone());
            redirect.insert(header::LOCATION, rewritten);
            for cookie in headers.get_all(header::SET_COOKIE) {
                redirect.append(header::SET_COOKIE, cookie.clone());
            }

            return Ok(build(parts.status, redirect, Body::empty()));
        }
    }

    if !is_rewritable(parts.headers.get(header::CONTENT_TYPE)) {
        return Ok(build(parts.status, headers, upstream_body));
    }

    let raw = tokio::time::timeout(
        ctx.body_timeout,
        axum::body::to_bytes(upstream_body, MAX_REWRITE_BODY),
    )
    .await
    .map_err(|_| {
        warn!(timeout_secs = ctx.body_timeout.as_secs(), "Upstream body stalled");
        WaypointError::Timeout
    })?
    .map_err(|e| WaypointError::UpstreamConnectionFailed(format!("reading body: {}", e)))?;

    let (plain, coding) = match decode(&raw, parts.headers.get(header::CONTENT_ENCODING)) {
        Ok(decoded) => decoded,
        Err(e) => {
            warn!(error = %e, "Body could not be decoded; passing it through unmodified");
            return Ok(build(parts.status, headers, Body::from(raw)));
        }
    };

    let rewritten = rewrite_body(&plain, ctx);
    debug!(before = plain.len(), after = rewritten.len(), ?coding, "Rewrote body");

    headers.remove(header::CONTENT_LENGTH);
    headers.remove(header::CONTENT_ENCODING);

    let body = match encode(&rewritten, coding) {
        Ok(encoded) => {
            if let Some(value) = coding.header_value() {
                headers.insert(header::CONTENT_ENCODING, value);
            }
            encoded
        }
        Err(e) => {
            warn!(error = %e, "Re-encoding failed; sending identity body");
            rewritten
        }
    };

    Ok(build(parts.status, headers, Body::from(body)))
}

fn build(status: axum::http::StatusCode, headers: HeaderMap, body: Body) -> Response<Body> {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}
