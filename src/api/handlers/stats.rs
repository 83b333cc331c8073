//! Admission stats endpoints

use std::net::{IpAddr, SocketAddr};

use axum::extract::{ConnectInfo, Path, State};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use tokio::time::Instant;

use crate::api::middleware::RequestId;
use crate::api::server::AppState;
use crate::error::WaypointError;

/// Stats for the calling client
pub async fn own_stats(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
) -> Response {
    Json(state.guard.stats(&addr.ip(), Instant::now())).into_response()
}

/// Stats for an arbitrary client address
pub async fn client_stats(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Path(ip): Path<String>,
) -> Response {
    match ip.parse::<IpAddr>() {
        Ok(ip) => Json(state.guard.stats(&ip, Instant::now())).into_response(),
        Err(_) => WaypointError::InvalidRequest(format!("invalid IP address: {}", ip))
            .to_response(Some(request_id.as_str())),
    }
}
