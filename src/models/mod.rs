//! Data models for the web authentication API

pub mod auth;
pub use auth::*;
