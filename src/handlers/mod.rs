//! API handlers

pub mod auth;
mod body;
pub mod health;

pub use body::JsonOrForm;
