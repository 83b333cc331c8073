//! Request admission guard
//!
//! Two independent checks run before any upstream work starts: a global
//! governor quota shared by every client, then a per-client sliding window
//! that blocks abusive clients for a fixed penalty.

use std::net::IpAddr;
use std::num::NonZeroU32;
use std::sync::Arc;

use dashmap::DashMap;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter as GovRateLimiter};
use tokio::time::Instant;
use tracing::{debug, warn};

use super::blocklist::BlockList;
use crate::config::AdmissionConfig;
use crate::error::{Result, WaypointError};
use crate::models::ClientStats;

const MINUTE: std::time::Duration = std::time::Duration::from_secs(60);
const HOUR: std::time::Duration = std::time::Duration::from_secs(3600);

/// Outcome of an admission check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allowed,
    /// The global quota is spent
    RateLimited,
    /// The client exceeded its burst threshold and is serving a penalty
    Blocked,
}

/// Admission guard shared by every in-flight request
#[derive(Clone)]
pub struct AdmissionGuard {
    config: AdmissionConfig,
    /// Request instants per client, oldest first
    activity: Arc<DashMap<IpAddr, Vec<Instant>>>,
    blocks: Arc<BlockList>,
    global: Option<Arc<GovRateLimiter<NotKeyed, InMemoryState, DefaultClock>>>,
}

impl AdmissionGuard {
    /// Create a new admission guard
    pub fn new(config: AdmissionConfig) -> Self {
        let global = NonZeroU32::new(config.global_per_minute)
            .map(|per_minute| Arc::new(GovRateLimiter::direct(Quota::per_minute(per_minute))));

        Self {
            config,
            activity: Arc::new(DashMap::new()),
            blocks: Arc::new(BlockList::new()),
            global,
        }
    }

    /// The block list, shared with the block expiry service
    pub fn blocks(&self) -> Arc<BlockList> {
        Arc::clone(&self.blocks)
    }

    pub fn is_blocked(&self, client_ip: &IpAddr) -> bool {
        self.blocks.is_blocked(client_ip)
    }

    /// Decide whether a request arriving at `now` may proceed
    pub fn admit(&self, client_ip: IpAddr, now: Instant) -> Admission {
        if let Some(global) = &self.global {
            if global.check().is_err() {
                warn!("Global rate limit exceeded");
                return Admission::RateLimited;
            }
        }

        if self.blocks.is_blocked(&client_ip) {
            debug!(client_ip = %client_ip, "Rejecting blocked client");
            return Admission::Blocked;
        }

        let window_start = now.checked_sub(self.config.window());
        let retention_start = now.checked_sub(self.config.retention());

        let in_window = {
            let mut timestamps = self.activity.entry(client_ip).or_default();
            if let Some(start) = retention_start {
                timestamps.retain(|t| *t > start);
            }
            timestamps.push(now);
            timestamps
                .iter()
                .filter(|t| window_start.map_or(true, |start| **t > start))
                .count()
        };

        if in_window > self.config.burst_threshold {
            let until = now + self.config.block_duration();
            if self.blocks.block(client_ip, until) {
                warn!(
                    client_ip = %client_ip,
                    requests = in_window,
                    block_secs = self.config.block_secs,
                    "Client exceeded burst threshold, blocking"
                );
            }
            return Admission::Blocked;
        }

        Admission::Allowed
    }

    /// Admission check mapped onto the error taxonomy
    pub fn check(&self, client_ip: IpAddr) -> Result<()> {
        match self.admit(client_ip, Instant::now()) {
            Admission::Allowed => Ok(()),
            Admission::RateLimited => Err(WaypointError::RateLimitExceeded),
            Admission::Blocked => Err(WaypointError::ClientBlocked {
                client_ip: client_ip.to_string(),
            }),
        }
    }

    /// Read-only view of a client's recorded activity
    pub fn stats(&self, client_ip: &IpAddr, now: Instant) -> ClientStats {
        let count_since = |timestamps: &[Instant], span: std::time::Duration| match now
            .checked_sub(span)
        {
            Some(start) => timestamps.iter().filter(|t| **t > start).count(),
            None => timestamps.len(),
        };

        let (total, minute, hour) = self
            .activity
            .get(client_ip)
            .map(|t| {
                let timestamps = t.as_slice();
                (
                    timestamps.len(),
                    count_since(timestamps, MINUTE),
                    count_since(timestamps, HOUR),
                )
            })
            .unwrap_or_default();

        ClientStats {
            total_requests: total,
            minute_requests: minute,
            hour_requests: hour,
            is_blocked: self.blocks.is_blocked(client_ip),
        }
    }

    /// Drop activity older than the retention period and forget idle clients
    pub fn sweep(&self, now: Instant) -> usize {
        let Some(cutoff) = now.checked_sub(self.config.retention()) else {
            return 0;
        };

        let before = self.activity.len();
        self.activity.retain(|_, timestamps| {
            timestamps.retain(|t| *t > cutoff);
            !timestamps.is_empty()
        });

        before.saturating_sub(self.activity.len())
    }

    /// Number of clients with recorded activity
    pub fn client_count(&self) -> usize {
        self.activity.len()
    }

    /// Number of currently blocked clients
    pub fn blocked_count(&self) -> usize {
        self.blocks.len()
    }
}
