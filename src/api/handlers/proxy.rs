//! Proxy endpoint

use std::time::Duration;

use axum::body::Body;
use axum::extract::{RawQuery, State};
use axum::http::{HeaderMap, Method};
use axum::response::Response;
use axum::Extension;
use tracing::{error, warn};

use super::link::query_params;
use crate::api::middleware::RequestId;
use crate::api::server::AppState;
use crate::error::{Result, WaypointError};
use crate::proxy::rewrite::{proxy_origin, rewrite_response, RewriteContext};
use crate::proxy::TargetDescriptor;

/// Largest client request body buffered for replay across attempts
pub const MAX_REQUEST_BODY: usize = 10 * 1024 * 1024;

/// Fetch the target named in the query and return the rewritten response
pub async fn proxy(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    RawQuery(query): RawQuery,
    method: Method,
    headers: HeaderMap,
    body: Body,
) -> Response {
    match forward(&state, query.as_deref(), method, headers, body).await {
        Ok(response) => response,
        Err(e) => {
            if e.status_code().is_server_error() {
                error!(request_id = %request_id.as_str(), error = %e, "Proxy request failed");
            } else {
                warn!(request_id = %request_id.as_str(), error = %e, "Proxy request rejected");
            }
            e.to_response(Some(request_id.as_str()))
        }
    }
}

async fn forward(
    state: &AppState,
    query: Option<&str>,
    method: Method,
    headers: HeaderMap,
    body: Body,
) -> Result<Response> {
    let params = query_params(query)?;
    let target = TargetDescriptor::resolve(params.url.as_deref(), params.country.as_deref())?;

    let body = axum::body::to_bytes(body, MAX_REQUEST_BODY)
        .await
        .map_err(|e| WaypointError::InvalidRequest(format!("request body: {}", e)))?;

    let upstream = state.handler.fetch(&target, method, &headers, body).await?;

    let (scheme, host) = proxy_origin(&state.config.server, &headers);
    let ctx = RewriteContext::new(&target, &scheme, &host)
        .with_body_timeout(Duration::from_secs(state.config.upstream.request_timeout));

    rewrite_response(upstream, &ctx).await
}
