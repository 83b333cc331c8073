use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Process health report
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    /// Process uptime in seconds
    pub uptime: f64,
    pub memory: MemoryUsage,
    #[serde(rename = "blockedIPs")]
    pub blocked_ips: usize,
}

/// Memory figures in bytes
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct MemoryUsage {
    /// Resident set size of this process
    pub rss: u64,
    /// Virtual memory of this process
    pub virtual_memory: u64,
    pub system_total: u64,
    pub system_used: u64,
}
