//! Proxy middleware for request admission

mod admission;
mod blocklist;

pub use admission::{Admission, AdmissionGuard};
pub use blocklist::BlockList;
