//! Middleware for the web authentication API
//!
//! Request tracing, security headers and CORS.

mod cors;
mod security;
mod tracing;

pub use cors::cors_layer;
pub use security::{hsts_header, security_headers};
pub use self::tracing::{request_tracing, REQUEST_ID_HEADER};
