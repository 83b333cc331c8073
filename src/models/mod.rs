pub mod health;
pub mod link;
pub mod stats;

pub use health::*;
pub use link::*;
pub use stats::*;
