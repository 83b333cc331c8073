//! Link builder endpoint

use axum::extract::{RawQuery, State};
use axum::http::{header, HeaderMap};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use bytes::Bytes;
use tracing::debug;

use crate::api::middleware::RequestId;
use crate::api::server::AppState;
use crate::error::{Result, WaypointError};
use crate::models::{ProxyLink, TargetParams};
use crate::proxy::rewrite::{proxy_origin, RewriteContext};
use crate::proxy::TargetDescriptor;

/// Parse target parameters from a raw query string
pub(crate) fn query_params(query: Option<&str>) -> Result<TargetParams> {
    match query {
        Some(q) if !q.is_empty() => serde_urlencoded::from_str(q)
            .map_err(|e| WaypointError::InvalidRequest(format!("malformed query: {}", e))),
        _ => Ok(TargetParams::default()),
    }
}

/// Parse target parameters from a JSON or form body
fn body_params(headers: &HeaderMap, body: &[u8]) -> Result<TargetParams> {
    if body.is_empty() {
        return Ok(TargetParams::default());
    }

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_ascii_lowercase();

    if content_type.starts_with("application/json") {
        serde_json::from_slice(body)
            .map_err(|e| WaypointError::InvalidRequest(format!("malformed JSON body: {}", e)))
    } else if content_type.starts_with("application/x-www-form-urlencoded") {
        serde_urlencoded::from_bytes(body)
            .map_err(|e| WaypointError::InvalidRequest(format!("malformed form body: {}", e)))
    } else {
        Ok(TargetParams::default())
    }
}

/// Build a proxy link for a target URL
///
/// The query string wins over the body.
pub async fn create_link(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    match build_link(&state, &request_id, query.as_deref(), &headers, &body) {
        Ok(link) => Json(link).into_response(),
        Err(e) => e.to_response(Some(request_id.as_str())),
    }
}

fn build_link(
    state: &AppState,
    request_id: &RequestId,
    query: Option<&str>,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<ProxyLink> {
    let from_query = query_params(query)?;
    let params = if from_query.url.is_some() {
        from_query
    } else {
        body_params(headers, body)?
    };

    let target = TargetDescriptor::resolve(params.url.as_deref(), params.country.as_deref())?;
    let (scheme, host) = proxy_origin(&state.config.server, headers);
    let ctx = RewriteContext::new(&target, &scheme, &host);

    debug!(target = %target.url, "Built proxy link");

    Ok(ProxyLink {
        proxy_url: ctx.proxy_url(target.url.as_str()),
        original_url: target.url.to_string(),
        request_id: request_id.0.clone(),
    })
}
