//! Route definitions

mod auth;

use axum::{routing::get, Router};

use crate::config::Environment;
use crate::handlers::health;
use crate::middleware;
use crate::state::AppState;

pub use auth::auth_routes;

/// Full application router with middleware
pub fn app(
    state: AppState,
    environment: Environment,
    cors_allowed_origins: Option<&str>,
) -> Router {
    let router = Router::new()
        .route("/", get(health::root))
        .route("/health", get(health::health_check))
        .merge(auth_routes())
        .with_state(state)
        .layer(axum::middleware::from_fn(middleware::security_headers));

    let router = if environment.is_production() {
        router.layer(axum::middleware::from_fn(middleware::hsts_header))
    } else {
        router
    };

    router
        .layer(axum::middleware::from_fn(middleware::request_tracing))
        .layer(middleware::cors_layer(cors_allowed_origins))
}
