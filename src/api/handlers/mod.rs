//! Request handlers

pub mod health;
pub mod link;
pub mod proxy;
pub mod stats;
