//! Waypoint - Rewriting HTTP Proxy
//!
//! Fetches a client-chosen target through the proxy and rewrites the response
//! so that further navigation stays inside it.
//!
//! ## Features
//!
//! - Link, redirect, cookie and CSS reference rewriting (gzip/deflate aware)
//! - Country-hinted egress through an HTTP/SOCKS5 forward-proxy pool with retry
//! - Per-client sliding-window admission with temporary blocking
//! - Global request quota

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod proxy;
pub mod services;

pub use config::Config;
pub use error::{Result, WaypointError};
