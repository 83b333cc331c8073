use crate::error::{Result, WaypointError};
use std::env;
use std::time::Duration;
use url::Url;

/// Generic desktop browser user agent sent to every upstream
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/108.0.0.0 Safari/537.36";

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server configuration
    pub server: ServerConfig,
    /// Upstream dispatch and egress pool configuration
    pub upstream: UpstreamConfig,
    /// Admission guard configuration
    pub admission: AdmissionConfig,
    /// Logging configuration
    pub log: LogConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to listen on (default: 3000)
    pub port: u16,
    /// Host to bind to (default: 0.0.0.0)
    pub host: String,
    /// Public host used in rewritten links (default: inbound Host header)
    pub public_host: Option<String>,
    /// Public scheme used in rewritten links (default: X-Forwarded-Proto, else http)
    pub public_scheme: Option<String>,
    /// Allowed CORS origins (comma-separated, empty = any origin)
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            host: "0.0.0.0".to_string(),
            public_host: None,
            public_scheme: None,
            cors_origins: Vec::new(),
        }
    }
}

impl ServerConfig {
    /// `host:port` as a client would address this server
    pub fn listen_host(&self) -> String {
        let host = match self.host.as_str() {
            "0.0.0.0" | "::" | "" => "localhost",
            other => other,
        };
        format_tcp_addr(host, self.port)
    }
}

#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    /// Attempt budget for pool-routed requests
    pub max_retries: u32,
    /// Connection timeout in seconds
    pub connect_timeout: u64,
    /// Per-attempt timeout in seconds, clamped to 10..=30
    pub request_timeout: u64,
    /// Skip TLS certificate verification towards targets
    pub accept_invalid_certs: bool,
    /// User agent presented to targets
    pub user_agent: String,
    /// Forward proxies available for country-routed requests
    pub egress_pool: Vec<EgressProxyConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EgressProxyProtocol {
    Http,
    /// HTTP proxy reached over TLS
    Https,
    Socks5,
}

impl EgressProxyProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            EgressProxyProtocol::Http => "http",
            EgressProxyProtocol::Https => "https",
            EgressProxyProtocol::Socks5 => "socks5h",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EgressProxyConfig {
    /// Country this egress path exits in; `None` serves every country
    pub country: Option<String>,
    pub protocol: EgressProxyProtocol,
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl EgressProxyConfig {
    /// Address without credentials, safe for logs
    pub fn address(&self) -> String {
        format_tcp_addr(&self.host, self.port)
    }

    /// Proxy URL understood by the HTTP client, credentials included
    pub fn url(&self) -> String {
        let auth = match (&self.username, &self.password) {
            (Some(user), Some(pass)) => format!(
                "{}:{}@",
                urlencoding::encode(user),
                urlencoding::encode(pass)
            ),
            (Some(user), None) => format!("{}@", urlencoding::encode(user)),
            _ => String::new(),
        };

        format!("{}://{}{}", self.protocol.as_str(), auth, self.address())
    }

    /// Whether this path may serve a request hinted at `country`
    pub fn serves(&self, country: &str) -> bool {
        self.country
            .as_deref()
            .map(|c| c.eq_ignore_ascii_case(country))
            .unwrap_or(true)
    }
}

#[derive(Debug, Clone)]
pub struct AdmissionConfig {
    /// Sliding window length in seconds
    pub window_secs: u64,
    /// Requests allowed per identity within one window
    pub burst_threshold: usize,
    /// Block duration in seconds once the threshold is exceeded
    pub block_secs: u64,
    /// Requests per minute across all identities (0 = unlimited)
    pub global_per_minute: u32,
    /// How long activity is retained for stats, in seconds
    pub retention_secs: u64,
    /// Interval of the activity sweep, in seconds
    pub sweep_interval_secs: u64,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            window_secs: 60,
            burst_threshold: 100,
            block_secs: 300,
            global_per_minute: 6000,
            retention_secs: 3600,
            sweep_interval_secs: 3600,
        }
    }
}

impl AdmissionConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    pub fn block_duration(&self) -> Duration {
        Duration::from_secs(self.block_secs)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Log level (debug, info, warn, error)
    pub level: String,
    /// Output format (json, pretty)
    pub format: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let defaults = AdmissionConfig::default();

        Ok(Config {
            server: ServerConfig {
                port: get_env_or("PORT", "3000").parse().map_err(|_| {
                    WaypointError::InvalidConfig("PORT must be a valid port number".into())
                })?,
                host: get_env_or("HOST", "0.0.0.0"),
                public_host: get_env_opt("PUBLIC_HOST"),
                public_scheme: match get_env_opt("PUBLIC_SCHEME") {
                    Some(s) if s == "http" || s == "https" => Some(s),
                    Some(other) => {
                        return Err(WaypointError::InvalidConfig(format!(
                            "PUBLIC_SCHEME must be http or https, got {}",
                            other
                        )))
                    }
                    None => None,
                },
                cors_origins: get_env_or("CORS_ORIGINS", "")
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
            },
            upstream: UpstreamConfig {
                max_retries: parse_env_u32("PROXY_MAX_RETRIES", 3)?.max(1),
                connect_timeout: parse_env_u64("PROXY_CONNECT_TIMEOUT", 10)?,
                request_timeout: parse_env_u64("PROXY_REQUEST_TIMEOUT", 30)?.clamp(10, 30),
                accept_invalid_certs: get_env_or("PROXY_ACCEPT_INVALID_CERTS", "false")
                    .parse()
                    .unwrap_or(false),
                user_agent: get_env_or("PROXY_USER_AGENT", DEFAULT_USER_AGENT),
                egress_pool: parse_egress_pool(&get_env_or("EGRESS_POOL", ""))?,
            },
            admission: AdmissionConfig {
                window_secs: parse_env_u64("RATE_LIMIT_WINDOW_SECS", defaults.window_secs)?,
                burst_threshold: usize::try_from(parse_env_u64(
                    "RATE_LIMIT_BURST",
                    defaults.burst_threshold as u64,
                )?)
                .map_err(|_| {
                    WaypointError::InvalidConfig("RATE_LIMIT_BURST is out of range".into())
                })?,
                block_secs: parse_env_u64("RATE_LIMIT_BLOCK_SECS", defaults.block_secs)?,
                global_per_minute: parse_env_u32(
                    "GLOBAL_RATE_LIMIT_PER_MINUTE",
                    defaults.global_per_minute,
                )?,
                retention_secs: parse_env_u64("ACTIVITY_RETENTION_SECS", defaults.retention_secs)?,
                sweep_interval_secs: parse_env_u64(
                    "ACTIVITY_SWEEP_SECS",
                    defaults.sweep_interval_secs,
                )?
                .max(1),
            },
            log: LogConfig {
                level: get_env_or("LOG_LEVEL", "info"),
                format: get_env_or("LOG_FORMAT", "json"),
            },
        })
    }

    /// Get the listen address
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

/// Parse the `EGRESS_POOL` list: `[country=]scheme://[user:pass@]host:port`, comma separated
pub fn parse_egress_pool(raw: &str) -> Result<Vec<EgressProxyConfig>> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(parse_egress_entry)
        .collect()
}

fn parse_egress_entry(entry: &str) -> Result<EgressProxyConfig> {
    let (country, raw_url) = match entry.split_once('=') {
        Some((country, rest)) if !country.contains("://") => {
            let country = country.trim().to_lowercase();
            if country.is_empty() {
                return Err(WaypointError::InvalidConfig(format!(
                    "EGRESS_POOL entry has an empty country tag: {}",
                    entry
                )));
            }
            (Some(country), rest.trim())
        }
        _ => (None, entry),
    };

    let url = Url::parse(raw_url).map_err(|e| {
        WaypointError::InvalidConfig(format!("EGRESS_POOL entry must be a valid URL: {}", e))
    })?;

    // Reject URLs that carry request-specific components.
    if url.fragment().is_some() || url.query().is_some() {
        return Err(WaypointError::InvalidConfig(
            "EGRESS_POOL entries must not include query/fragment".into(),
        ));
    }
    if !(url.path().is_empty() || url.path() == "/") {
        return Err(WaypointError::InvalidConfig(
            "EGRESS_POOL entries must not include a path".into(),
        ));
    }

    let protocol = match url.scheme().to_lowercase().as_str() {
        "http" => EgressProxyProtocol::Http,
        "https" => EgressProxyProtocol::Https,
        "socks5" | "socks5h" => EgressProxyProtocol::Socks5,
        other => {
            return Err(WaypointError::InvalidConfig(format!(
                "EGRESS_POOL entry has unsupported scheme: {}",
                other
            )))
        }
    };

    let host = url.host_str().ok_or_else(|| {
        WaypointError::InvalidConfig("EGRESS_POOL entries must include a host".into())
    })?;

    let port = match url.port() {
        Some(p) => p,
        None => match protocol {
            EgressProxyProtocol::Http => 80,
            EgressProxyProtocol::Https => 443,
            EgressProxyProtocol::Socks5 => 1080,
        },
    };

    let username = if url.username().is_empty() {
        None
    } else {
        Some(decode_component(url.username()))
    };

    let password = match (protocol, &username, url.password()) {
        (_, None, _) => None,
        (EgressProxyProtocol::Http | EgressProxyProtocol::Https, Some(_), None) => {
            Some(String::new())
        }
        (EgressProxyProtocol::Http | EgressProxyProtocol::Https, Some(_), Some(p)) => {
            Some(decode_component(p))
        }
        (EgressProxyProtocol::Socks5, Some(_), Some(p)) if !p.is_empty() => {
            Some(decode_component(p))
        }
        (EgressProxyProtocol::Socks5, Some(_), _) => {
            return Err(WaypointError::InvalidConfig(
                "EGRESS_POOL socks5 auth requires a non-empty password".into(),
            ))
        }
    };

    Ok(EgressProxyConfig {
        country,
        protocol,
        host: host.trim_start_matches('[').trim_end_matches(']').to_string(),
        port,
        username,
        password,
    })
}

fn decode_component(raw: &str) -> String {
    urlencoding::decode(raw)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| raw.to_string())
}

fn format_tcp_addr(host: &str, port: u16) -> String {
    if host.contains(':') {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    }
}

/// Get environment variable with a default value
fn get_env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn get_env_opt(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_env_u64(key: &str, default: u64) -> Result<u64> {
    match get_env_opt(key) {
        Some(raw) => raw
            .parse()
            .map_err(|_| WaypointError::InvalidConfig(format!("{} must be a valid number", key))),
        None => Ok(default),
    }
}

fn parse_env_u32(key: &str, default: u32) -> Result<u32> {
    let value = parse_env_u64(key, u64::from(default))?;
    u32::try_from(value).map_err(|_| {
        WaypointError::InvalidConfig(format!("{} must be at most {}", key, u32::MAX))
    })
}
