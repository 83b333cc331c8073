use serde::{Deserialize, Serialize};

/// Read-only projection of a client's recorded activity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ClientStats {
    /// Requests still retained for this client
    pub total_requests: usize,
    /// Requests in the trailing minute
    pub minute_requests: usize,
    /// Requests in the trailing hour
    pub hour_requests: usize,
    /// Whether the client is currently blocked
    pub is_blocked: bool,
}
