//! Egress/retry coordinator
//!
//! Dispatches a client request to its target, either directly or through
//! the egress pool, retrying failed pool paths with a fresh entry.

use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::http::{HeaderMap, Method, Response};
use bytes::Bytes;
use tracing::{debug, error, info, instrument, warn};

use super::egress::{representative_address, EgressPool, EgressRoute};
use super::headers::outbound_headers;
use super::rotation::EgressAttempts;
use super::target::TargetDescriptor;
use super::transport::{UpstreamRequest, UpstreamTransport};
use crate::config::{UpstreamConfig, DEFAULT_USER_AGENT};
use crate::error::{Result, WaypointError};

/// Configuration for the coordinator
#[derive(Clone)]
pub struct ProxyHandlerConfig {
    /// Attempt budget for pool-routed requests
    pub max_retries: u32,
    /// User agent presented upstream
    pub user_agent: String,
}

impl Default for ProxyHandlerConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl From<&UpstreamConfig> for ProxyHandlerConfig {
    fn from(config: &UpstreamConfig) -> Self {
        Self {
            max_retries: config.max_retries.max(1),
            user_agent: config.user_agent.clone(),
        }
    }
}

/// Egress/retry coordinator
pub struct ProxyHandler {
    transport: Arc<dyn UpstreamTransport>,
    pool: Arc<EgressPool>,
    config: ProxyHandlerConfig,
}

impl ProxyHandler {
    pub fn new(
        transport: Arc<dyn UpstreamTransport>,
        pool: Arc<EgressPool>,
        config: ProxyHandlerConfig,
    ) -> Self {
        Self {
            transport,
            pool,
            config,
        }
    }

    /// Fetch the target, returning the first response that is not a failure.
    ///
    /// The response body is untouched; nothing reaches the client until the
    /// outcome of an attempt is known.
    #[instrument(skip(self, headers, body), fields(target = %target.host(), country = ?target.country))]
    pub async fn fetch(
        &self,
        target: &TargetDescriptor,
        method: Method,
        headers: &HeaderMap,
        body: Bytes,
    ) -> Result<Response<Body>> {
        match target.country.as_deref() {
            Some(country) if !self.pool.is_empty() => {
                let request = UpstreamRequest {
                    method,
                    url: target.url.clone(),
                    headers: outbound_headers(headers, target, &self.config.user_agent, None),
                    body,
                };
                self.fetch_via_pool(country, &request).await
            }
            country => {
                let synthetic = country.and_then(representative_address);
                let request = UpstreamRequest {
                    method,
                    url: target.url.clone(),
                    headers: outbound_headers(headers, target, &self.config.user_agent, synthetic),
                    body,
                };
                self.fetch_direct(&request).await
            }
        }
    }

    /// Single direct attempt; any upstream status is relayed
    async fn fetch_direct(&self, request: &UpstreamRequest) -> Result<Response<Body>> {
        let start = Instant::now();
        match self.transport.send(EgressRoute::Direct, request).await {
            Ok(response) => {
                debug!(
                    status = response.status().as_u16(),
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Direct fetch complete"
                );
                Ok(response)
            }
            Err(e) => {
                warn!(error = %e, "Direct fetch failed");
                Err(e)
            }
        }
    }

    /// Rotate through untried pool entries until one succeeds
    async fn fetch_via_pool(
        &self,
        country: &str,
        request: &UpstreamRequest,
    ) -> Result<Response<Body>> {
        let mut attempts = EgressAttempts::new(&self.pool, country);
        let max_attempts = self.config.max_retries;

        loop {
            if !attempts.has_untried() {
                error!(
                    attempts = attempts.attempts(),
                    "No untried egress candidates left for {}", country
                );
                return Err(WaypointError::NoEgressCandidates);
            }
            if attempts.attempts() >= max_attempts {
                error!("All egress attempts failed after {} attempts", max_attempts);
                return Err(WaypointError::RetriesExhausted {
                    attempts: attempts.attempts(),
                });
            }

            let Some(index) = attempts.draw() else {
                return Err(WaypointError::NoEgressCandidates);
            };
            let route = EgressRoute::Pool(index);
            let via = self.pool.describe(route);

            debug!(
                "Forwarding through {} (attempt {}/{})",
                via,
                attempts.attempts(),
                max_attempts
            );

            let attempt_start = Instant::now();
            let outcome = match self.transport.send(route, request).await {
                Ok(response) if response.status().is_server_error() => {
                    Err(WaypointError::UpstreamServerError {
                        status: response.status().as_u16(),
                    })
                }
                other => other,
            };

            match outcome {
                Ok(response) => {
                    info!(
                        via = %via,
                        status = response.status().as_u16(),
                        elapsed_ms = attempt_start.elapsed().as_millis() as u64,
                        "Egress attempt succeeded"
                    );
                    return Ok(response);
                }
                Err(e) if e.is_transient() => {
                    warn!(
                        "Request through {} failed: {} (attempt {}/{})",
                        via,
                        e,
                        attempts.attempts(),
                        max_attempts
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::parse_egress_pool;
    use axum::http::StatusCode;
    use parking_lot::Mutex;

    /// Transport answering from a script, recording the routes it was asked for
    pub(crate) struct ScriptedTransport {
        pub routes: Mutex<Vec<EgressRoute>>,
        pub requests: Mutex<Vec<UpstreamRequest>>,
        respond: Box<dyn Fn(EgressRoute) -> Result<Response<Body>> + Send + Sync>,
    }

    impl ScriptedTransport {
        pub(crate) fn new(
            respond: impl Fn(EgressRoute) -> Result<Response<Body>> + Send + Sync + 'static,
        ) -> Self {
            Self {
                routes: Mutex::new(Vec::new()),
                requests: Mutex::new(Vec::new()),
                respond: Box::new(respond),
            }
        }
    }

    #[async_trait::async_trait]
    impl UpstreamTransport for ScriptedTransport {
        async fn send(
            &self,
            route: EgressRoute,
            request: &UpstreamRequest,
        ) -> Result<Response<Body>> {
            self.routes.lock().push(route);
            self.requests.lock().push(request.clone());
            (self.respond)(route)
        }
    }

    pub(crate) fn status(code: u16) -> Result<Response<Body>> {
        let mut response = Response::new(Body::from("upstream"));
        *response.status_mut() = StatusCode::from_u16(code).unwrap();
        Ok(response)
    }

    fn handler(transport: Arc<ScriptedTransport>, pool_spec: &str, budget: u32) -> ProxyHandler {
        ProxyHandler::new(
            transport,
            Arc::new(EgressPool::new(parse_egress_pool(pool_spec).unwrap())),
            ProxyHandlerConfig {
                max_retries: budget,
                ..ProxyHandlerConfig::default()
            },
        )
    }

    fn target(country: Option<&str>) -> TargetDescriptor {
        TargetDescriptor::resolve(Some("https://ex.com/page"), country).unwrap()
    }

    fn pool_of(k: usize) -> String {
        (0..k)
            .map(|i| format!("http://egress{}.example:3128", i))
            .collect::<Vec<_>>()
            .join(",")
    }

    fn assert_no_repeats(routes: &[EgressRoute]) {
        let mut seen = std::collections::HashSet::new();
        for route in routes {
            assert!(seen.insert(*route), "{:?} attempted twice", route);
        }
    }

    #[tokio::test]
    async fn test_pool_exhausted_before_budget_is_503() {
        let transport = Arc::new(ScriptedTransport::new(|_| status(500)));
        let handler = handler(transport.clone(), &pool_of(2), 3);

        let err = handler
            .fetch(&target(Some("us")), Method::GET, &HeaderMap::new(), Bytes::new())
            .await
            .unwrap_err();

        assert!(matches!(err, WaypointError::NoEgressCandidates));
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        let routes = transport.routes.lock();
        assert_eq!(routes.len(), 2);
        assert_no_repeats(&routes);
    }

    #[tokio::test]
    async fn test_budget_spent_before_pool_is_502() {
        let transport = Arc::new(ScriptedTransport::new(|_| status(503)));
        let handler = handler(transport.clone(), &pool_of(5), 3);

        let err = handler
            .fetch(&target(Some("us")), Method::GET, &HeaderMap::new(), Bytes::new())
            .await
            .unwrap_err();

        assert!(matches!(err, WaypointError::RetriesExhausted { attempts: 3 }));
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
        let routes = transport.routes.lock();
        assert_eq!(routes.len(), 3);
        assert_no_repeats(&routes);
    }

    #[tokio::test]
    async fn test_attempts_are_min_of_pool_and_budget() {
        for k in 0..6 {
            let transport = Arc::new(ScriptedTransport::new(|_| status(502)));
            let handler = handler(transport.clone(), &pool_of(k), 3);

            let err = handler
                .fetch(&target(Some("us")), Method::GET, &HeaderMap::new(), Bytes::new())
                .await
                .unwrap_err();

            let routes = transport.routes.lock();
            assert_eq!(routes.len(), k.min(3), "pool size {}", k);
            assert_no_repeats(&routes);
            if k <= 3 {
                assert!(matches!(err, WaypointError::NoEgressCandidates));
            } else {
                assert!(matches!(err, WaypointError::RetriesExhausted { .. }));
            }
        }
    }

    #[tokio::test]
    async fn test_connection_errors_rotate_to_next_entry() {
        let transport = Arc::new(ScriptedTransport::new(|route| match route {
            EgressRoute::Pool(0) => Err(WaypointError::Timeout),
            EgressRoute::Pool(1) => Err(WaypointError::UpstreamConnectionFailed("reset".into())),
            _ => status(200),
        }));
        let handler = handler(transport.clone(), &pool_of(3), 3);

        let response = handler
            .fetch(&target(Some("us")), Method::GET, &HeaderMap::new(), Bytes::new())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(transport.routes.lock().last(), Some(&EgressRoute::Pool(2)));
    }

    #[tokio::test]
    async fn test_client_errors_and_redirects_are_success() {
        for code in [301, 404, 429] {
            let transport = Arc::new(ScriptedTransport::new(move |_| status(code)));
            let handler = handler(transport.clone(), &pool_of(3), 3);

            let response = handler
                .fetch(&target(Some("us")), Method::GET, &HeaderMap::new(), Bytes::new())
                .await
                .unwrap();

            assert_eq!(response.status().as_u16(), code);
            assert_eq!(transport.routes.lock().len(), 1);
        }
    }

    #[tokio::test]
    async fn test_country_restricts_candidates() {
        let transport = Arc::new(ScriptedTransport::new(|_| status(500)));
        let handler = handler(
            transport.clone(),
            "us=http://a.example,de=http://b.example,us=http://c.example",
            3,
        );

        let err = handler
            .fetch(&target(Some("de")), Method::GET, &HeaderMap::new(), Bytes::new())
            .await
            .unwrap_err();

        assert!(matches!(err, WaypointError::NoEgressCandidates));
        assert_eq!(*transport.routes.lock(), vec![EgressRoute::Pool(1)]);
    }

    #[tokio::test]
    async fn test_no_hint_goes_direct_and_relays_server_errors() {
        let transport = Arc::new(ScriptedTransport::new(|_| status(500)));
        let handler = handler(transport.clone(), &pool_of(3), 3);

        let response = handler
            .fetch(&target(None), Method::GET, &HeaderMap::new(), Bytes::new())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(*transport.routes.lock(), vec![EgressRoute::Direct]);
        assert!(transport.requests.lock()[0]
            .headers
            .get("x-forwarded-for")
            .is_none());
    }

    #[tokio::test]
    async fn test_hint_without_pool_presents_synthetic_address() {
        let transport = Arc::new(ScriptedTransport::new(|_| status(200)));
        let handler = handler(transport.clone(), "", 3);

        handler
            .fetch(&target(Some("us")), Method::GET, &HeaderMap::new(), Bytes::new())
            .await
            .unwrap();

        assert_eq!(*transport.routes.lock(), vec![EgressRoute::Direct]);
        let expected = representative_address("us").unwrap().to_string();
        assert_eq!(
            transport.requests.lock()[0]
                .headers
                .get("x-forwarded-for")
                .unwrap(),
            expected.as_str()
        );
    }

    #[tokio::test]
    async fn test_direct_failure_is_bad_gateway() {
        let transport = Arc::new(ScriptedTransport::new(|_| {
            Err(WaypointError::UpstreamConnectionFailed("refused".into()))
        }));
        let handler = handler(transport.clone(), "", 3);

        let err = handler
            .fetch(&target(None), Method::GET, &HeaderMap::new(), Bytes::new())
            .await
            .unwrap_err();

        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
        assert_eq!(transport.routes.lock().len(), 1);
    }
}
