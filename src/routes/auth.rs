//! Web authentication routes

use axum::{routing::get, Router};

use crate::handlers::auth;
use crate::state::AppState;

/// Challenge issuance and token exchange share one endpoint
pub fn auth_routes() -> Router<AppState> {
    Router::new().route("/auth", get(auth::get_challenge).post(auth::exchange_token))
}
