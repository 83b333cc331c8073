//! Self-expiring client block list
//!
//! Membership lives in a `DashMap` so lookups stay O(1). Every block is also
//! pushed onto a min-heap keyed by expiry; the block expiry service drains the
//! heap when the earliest entry comes due, so lookups never compare timestamps.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::net::IpAddr;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::info;

#[derive(Debug, Default)]
pub struct BlockList {
    entries: DashMap<IpAddr, Instant>,
    schedule: Mutex<BinaryHeap<Reverse<(Instant, IpAddr)>>>,
    changed: Notify,
}

impl BlockList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block `ip` until `until`.
    ///
    /// Returns false if the client is already blocked; the existing expiry is kept.
    pub fn block(&self, ip: IpAddr, until: Instant) -> bool {
        match self.entries.entry(ip) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(until);
                self.schedule.lock().push(Reverse((until, ip)));
                self.changed.notify_one();
                true
            }
        }
    }

    pub fn is_blocked(&self, ip: &IpAddr) -> bool {
        self.entries.contains_key(ip)
    }

    /// Expiry of a client's block, if any
    pub fn expires_at(&self, ip: &IpAddr) -> Option<Instant> {
        self.entries.get(ip).map(|e| *e)
    }

    /// Number of currently blocked clients
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Earliest scheduled expiry
    pub fn next_expiry(&self) -> Option<Instant> {
        self.schedule.lock().peek().map(|Reverse((at, _))| *at)
    }

    /// Lift every block whose expiry is at or before `now`
    pub fn release_expired(&self, now: Instant) -> usize {
        let mut released = 0;
        let mut schedule = self.schedule.lock();

        while let Some(Reverse((at, ip))) = schedule.peek().copied() {
            if at > now {
                break;
            }
            schedule.pop();

            if self
                .entries
                .remove_if(&ip, |_, expires| *expires <= now)
                .is_some()
            {
                info!(client_ip = %ip, "Block lifted");
                released += 1;
            }
        }

        released
    }

    /// Resolves once a new block has been scheduled
    pub async fn changed(&self) {
        self.changed.notified().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn ip(last: u8) -> IpAddr {
        IpAddr::from([192, 168, 1, last])
    }

    #[test]
    fn test_block_and_lookup() {
        let blocks = BlockList::new();
        let now = Instant::now();

        assert!(!blocks.is_blocked(&ip(1)));
        assert!(blocks.block(ip(1), now + Duration::from_secs(300)));
        assert!(blocks.is_blocked(&ip(1)));
        assert!(!blocks.is_blocked(&ip(2)));
        assert_eq!(blocks.len(), 1);
    }

    #[test]
    fn test_reblock_does_not_extend_expiry() {
        let blocks = BlockList::new();
        let now = Instant::now();
        let first = now + Duration::from_secs(300);

        assert!(blocks.block(ip(1), first));
        assert!(!blocks.block(ip(1), now + Duration::from_secs(600)));
        assert_eq!(blocks.expires_at(&ip(1)), Some(first));
    }

    #[test]
    fn test_release_expired_in_expiry_order() {
        let blocks = BlockList::new();
        let now = Instant::now();

        blocks.block(ip(1), now + Duration::from_secs(30));
        blocks.block(ip(2), now + Duration::from_secs(10));
        blocks.block(ip(3), now + Duration::from_secs(20));

        assert_eq!(blocks.next_expiry(), Some(now + Duration::from_secs(10)));

        assert_eq!(blocks.release_expired(now + Duration::from_secs(5)), 0);
        assert_eq!(blocks.release_expired(now + Duration::from_secs(20)), 2);
        assert!(blocks.is_blocked(&ip(1)));
        assert!(!blocks.is_blocked(&ip(2)));
        assert!(!blocks.is_blocked(&ip(3)));

        assert_eq!(blocks.release_expired(now + Duration::from_secs(30)), 1);
        assert!(blocks.is_empty());
        assert_eq!(blocks.next_expiry(), None);
    }
}
