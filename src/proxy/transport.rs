//! Upstream transport
//!
//! Sends one request over one egress route. The coordinator only sees the
//! [`UpstreamTransport`] trait so retry behavior can be exercised without
//! a network.

use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{HeaderMap, Method, Response};
use bytes::Bytes;
use reqwest::redirect::Policy;
use tracing::{debug, instrument};
use url::Url;

use super::egress::{EgressPool, EgressRoute};
use crate::config::UpstreamConfig;
use crate::error::{Result, WaypointError};

/// A request ready to leave the proxy
#[derive(Debug, Clone)]
pub struct UpstreamRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Trait for sending a request over an egress route
///
/// The returned response has only its head read; the body is still a live
/// stream from the upstream.
#[async_trait]
pub trait UpstreamTransport: Send + Sync {
    async fn send(&self, route: EgressRoute, request: &UpstreamRequest) -> Result<Response<Body>>;
}

/// Transport backed by one `reqwest` client per route
pub struct HttpTransport {
    direct: reqwest::Client,
    pooled: Vec<reqwest::Client>,
    request_timeout: Duration,
}

impl HttpTransport {
    pub fn new(config: &UpstreamConfig, pool: &EgressPool) -> Result<Self> {
        let direct = Self::client_builder(config)
            .no_proxy()
            .build()
            .map_err(|e| WaypointError::InvalidConfig(format!("HTTP client: {}", e)))?;

        let pooled = pool
            .entries()
            .iter()
            .map(|entry| {
                let proxy = reqwest::Proxy::all(entry.url()).map_err(|e| {
                    WaypointError::InvalidConfig(format!(
                        "egress proxy {}: {}",
                        entry.address(),
                        e
                    ))
                })?;
                Self::client_builder(config)
                    .proxy(proxy)
                    .build()
                    .map_err(|e| WaypointError::InvalidConfig(format!("HTTP client: {}", e)))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            direct,
            pooled,
            request_timeout: Duration::from_secs(config.request_timeout),
        })
    }

    fn client_builder(config: &UpstreamConfig) -> reqwest::ClientBuilder {
        reqwest::Client::builder()
            .redirect(Policy::none())
            .connect_timeout(Duration::from_secs(config.connect_timeout))
            .danger_accept_invalid_certs(config.accept_invalid_certs)
    }

    fn client(&self, route: EgressRoute) -> Result<&reqwest::Client> {
        match route {
            EgressRoute::Direct => Ok(&self.direct),
            EgressRoute::Pool(index) => self
                .pooled
                .get(index)
                .ok_or_else(|| WaypointError::Internal(format!("unknown egress entry {}", index))),
        }
    }
}

#[async_trait]
impl UpstreamTransport for HttpTransport {
    #[instrument(skip(self, request), fields(url = %request.url))]
    async fn send(&self, route: EgressRoute, request: &UpstreamRequest) -> Result<Response<Body>> {
        let client = self.client(route)?;

        let pending = client
            .request(request.method.clone(), request.url.clone())
            .headers(request.headers.clone())
            .body(request.body.clone())
            .send();

        let upstream = tokio::time::timeout(self.request_timeout, pending)
            .await
            .map_err(|_| WaypointError::Timeout)??;

        debug!(status = upstream.status().as_u16(), "Upstream responded");

        let status = upstream.status();
        let headers = upstream.headers().clone();

        let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
        *response.status_mut() = status;
        *response.headers_mut() = headers;

        Ok(response)
    }
}
