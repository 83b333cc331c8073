//! Block expiry service
//!
//! Lifts client blocks when they come due. Sleeps until the earliest
//! scheduled expiry and wakes early whenever a new block is added.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, instrument};

use crate::proxy::middleware::BlockList;

/// Block expiry service
pub struct BlockExpiryService {
    blocks: Arc<BlockList>,
}

impl BlockExpiryService {
    pub fn new(blocks: Arc<BlockList>) -> Self {
        Self { blocks }
    }

    /// Run the expiry loop until shutdown
    #[instrument(skip(self, shutdown))]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!("Starting block expiry service");

        loop {
            let next = self.blocks.next_expiry();

            tokio::select! {
                _ = wait_until(next) => {
                    let released = self.blocks.release_expired(Instant::now());
                    debug!("Released {} expired blocks", released);
                }
                _ = self.blocks.changed() => {}
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Block expiry service shutting down");
                        break;
                    }
                }
            }
        }
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => sleep_until(at).await,
        None => std::future::pending::<()>().await,
    }
}

/// Handle for managing the block expiry service
pub struct BlockExpiryHandle {
    shutdown_tx: watch::Sender<bool>,
}

impl BlockExpiryHandle {
    pub fn new() -> (Self, watch::Receiver<bool>) {
        let (tx, rx) = watch::channel(false);
        (Self { shutdown_tx: tx }, rx)
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

impl Default for BlockExpiryHandle {
    fn default() -> Self {
        Self::new().0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::IpAddr;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_blocks_are_lifted_at_expiry() {
        let blocks = Arc::new(BlockList::new());
        let (handle, shutdown) = BlockExpiryHandle::new();
        let service = BlockExpiryService::new(blocks.clone());
        let task = tokio::spawn(async move { service.run(shutdown).await });

        let a = IpAddr::from([10, 0, 0, 1]);
        let b = IpAddr::from([10, 0, 0, 2]);
        let now = Instant::now();
        blocks.block(a, now + Duration::from_secs(20));
        blocks.block(b, now + Duration::from_secs(10));

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert!(blocks.is_blocked(&a));
        assert!(!blocks.is_blocked(&b));

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(blocks.is_empty());

        handle.shutdown();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_service_stops_on_shutdown() {
        let (handle, shutdown) = BlockExpiryHandle::new();
        let service = BlockExpiryService::new(Arc::new(BlockList::new()));
        let task = tokio::spawn(async move { service.run(shutdown).await });

        handle.shutdown();
        task.await.unwrap();
    }
}
