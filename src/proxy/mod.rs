//! Rewriting proxy core
//!
//! This module provides:
//! - Target resolution and sanitization
//! - Admission control per client identity
//! - Egress selection with retry over a forward-proxy pool
//! - Response rewriting so navigation stays inside the proxy

pub mod egress;
pub mod handler;
pub mod headers;
pub mod middleware;
pub mod rewrite;
pub mod rotation;
pub mod target;
pub mod transport;

pub use egress::{EgressPool, EgressRoute};
pub use handler::{ProxyHandler, ProxyHandlerConfig};
pub use middleware::{Admission, AdmissionGuard, BlockList};
pub use rewrite::{rewrite_response, RewriteContext};
pub use target::TargetDescriptor;
pub use transport::{HttpTransport, UpstreamTransport};
