//! Egress paths
//!
//! A request leaves either directly or through one of the configured forward
//! proxies. When a country hint is given but no pool is configured, the hint
//! is only presented to the target as a synthetic forwarding address.

use std::net::IpAddr;

use crate::config::EgressProxyConfig;

/// One way out to the target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EgressRoute {
    Direct,
    /// Index into the egress pool
    Pool(usize),
}

/// The configured forward proxies
#[derive(Debug, Clone, Default)]
pub struct EgressPool {
    entries: Vec<EgressProxyConfig>,
}

impl EgressPool {
    pub fn new(entries: Vec<EgressProxyConfig>) -> Self {
        Self { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn get(&self, index: usize) -> Option<&EgressProxyConfig> {
        self.entries.get(index)
    }

    pub fn entries(&self) -> &[EgressProxyConfig] {
        &self.entries
    }

    /// Indices of entries able to serve `country`
    pub fn candidates_for(&self, country: &str) -> Vec<usize> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| entry.serves(country))
            .map(|(index, _)| index)
            .collect()
    }

    /// Human readable description of a route for logs
    pub fn describe(&self, route: EgressRoute) -> String {
        match route {
            EgressRoute::Direct => "direct".to_string(),
            EgressRoute::Pool(index) => self
                .get(index)
                .map(|e| e.address())
                .unwrap_or_else(|| format!("pool#{}", index)),
        }
    }
}

/// Representative client address for a country, presented when no real
/// egress path exists for the hint
pub fn representative_address(country: &str) -> Option<IpAddr> {
    let octets: [u8; 4] = match country.to_ascii_lowercase().as_str() {
        "us" => [3, 80, 0, 10],
        "ca" => [99, 224, 0, 10],
        "gb" | "uk" => [81, 2, 69, 10],
        "de" => [85, 214, 0, 10],
        "fr" => [90, 84, 0, 10],
        "nl" => [145, 53, 0, 10],
        "jp" => [126, 0, 0, 10],
        "au" => [1, 120, 0, 10],
        "in" => [49, 36, 0, 10],
        "br" => [177, 8, 0, 10],
        _ => return None,
    };
    Some(IpAddr::from(octets))
}
