//! Admission check in front of the proxy routes

use std::net::SocketAddr;

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;

use super::request_id::RequestId;
use crate::api::server::AppState;

/// Reject the request with 429 unless the guard admits the caller
pub async fn admission(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    req: Request<Body>,
    next: Next,
) -> Response {
    if let Err(err) = state.guard.check(addr.ip()) {
        let request_id = req.extensions().get::<RequestId>().cloned();
        return err.to_response(request_id.as_ref().map(RequestId::as_str));
    }

    next.run(req).await
}
