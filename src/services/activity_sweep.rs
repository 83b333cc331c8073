//! Activity sweep service
//!
//! Periodically prunes admission activity older than the retention period
//! and forgets clients with nothing left, bounding memory.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, instrument};

use crate::proxy::middleware::AdmissionGuard;

/// Activity sweep configuration
#[derive(Clone)]
pub struct ActivitySweepConfig {
    /// How often to sweep
    pub interval: Duration,
}

impl Default for ActivitySweepConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3600), // 1 hour
        }
    }
}

/// Activity sweep service
pub struct ActivitySweepService {
    guard: AdmissionGuard,
    config: ActivitySweepConfig,
}

impl ActivitySweepService {
    pub fn new(guard: AdmissionGuard, config: ActivitySweepConfig) -> Self {
        Self { guard, config }
    }

    /// Run the sweep loop until shutdown
    #[instrument(skip(self, shutdown))]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Starting activity sweep service ({}s interval)",
            self.config.interval.as_secs()
        );

        let mut sweep_interval = interval(self.config.interval);
        sweep_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        sweep_interval.tick().await; // Skip immediate tick

        loop {
            tokio::select! {
                _ = sweep_interval.tick() => {
                    let removed = self.guard.sweep(Instant::now());
                    debug!(
                        removed,
                        tracked = self.guard.client_count(),
                        "Activity sweep complete"
                    );
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Activity sweep service shutting down");
                        break;
                    }
                }
            }
        }
    }
}

/// Handle for managing the activity sweep service
pub struct ActivitySweepHandle {
    shutdown_tx: watch::Sender<bool>,
}

impl ActivitySweepHandle {
    pub fn new() -> (Self, watch::Receiver<bool>) {
        let (tx, rx) = watch::channel(false);
        (Self { shutdown_tx: tx }, rx)
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

impl Default for ActivitySweepHandle {
    fn default() -> Self {
        Self::new().0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AdmissionConfig;
    use std::net::IpAddr;

    #[test]
    fn test_config_default() {
        let config = ActivitySweepConfig::default();
        assert_eq!(config.interval, Duration::from_secs(3600));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_runs_on_interval() {
        let guard = AdmissionGuard::new(AdmissionConfig {
            global_per_minute: 0,
            ..AdmissionConfig::default()
        });
        guard.admit(IpAddr::from([10, 0, 0, 1]), Instant::now());
        assert_eq!(guard.client_count(), 1);

        let (handle, shutdown) = ActivitySweepHandle::new();
        let service = ActivitySweepService::new(guard.clone(), ActivitySweepConfig::default());
        let task = tokio::spawn(async move { service.run(shutdown).await });

        tokio::time::sleep(Duration::from_secs(3601)).await;
        assert_eq!(guard.client_count(), 0);

        handle.shutdown();
        task.await.unwrap();
    }
}
