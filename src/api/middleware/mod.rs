//! HTTP middleware

mod admission;
mod cors;
mod request_id;

pub use admission::admission;
pub use cors::cors_layer;
pub use request_id::{request_context, RequestId, REQUEST_ID_HEADER};
