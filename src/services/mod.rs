//! Background services

pub mod activity_sweep;
pub mod block_expiry;

pub use activity_sweep::{ActivitySweepConfig, ActivitySweepHandle, ActivitySweepService};
pub use block_expiry::{BlockExpiryHandle, BlockExpiryService};
