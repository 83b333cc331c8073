use serde::{Deserialize, Serialize};

/// Parameters naming a proxy target, accepted from the query string or body
#[derive(Debug, Clone, Deserialize, Default)]
pub struct TargetParams {
    pub url: Option<String>,
    pub country: Option<String>,
}

/// Response of the link builder endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyLink {
    pub proxy_url: String,
    pub original_url: String,
    pub request_id: String,
}
