//! HTTP surface
//!
//! Exposes the link builder, the proxy endpoint and the admission stats.

pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod server;

pub use server::{ApiServer, AppState};
