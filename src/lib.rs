//! Stellar Web Authentication Server
//!
//! Proves ownership of a Stellar account through a signed challenge
//! transaction and issues a short-lived JWT for it.

pub mod auth;
pub mod challenge;
pub mod config;
pub mod error;
pub mod handlers;
pub mod horizon;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod state;

use std::sync::Arc;

use auth::{TokenIssuer, WebAuthService, WebAuthSettings};
use challenge::{ChallengeScope, XdrChallengeVerifier};
use config::Config;
use horizon::AccountResolver;

/// Wire the authentication service from configuration
pub fn build_auth_service(
    config: &Config,
    account_resolver: Arc<dyn AccountResolver>,
) -> WebAuthService {
    let settings = WebAuthSettings {
        scope: ChallengeScope {
            network_passphrase: config.network_passphrase.clone(),
            web_auth_domain: config.web_auth_domain.clone(),
            home_domains: config.home_domains.clone(),
        },
        signing_keys: config.signing_keys.clone(),
        challenge_expires_in: config.challenge_expires_in,
        allow_accounts_that_do_not_exist: config.allow_accounts_that_do_not_exist,
        account_lookup_timeout: config.horizon_timeout,
    };

    let token_issuer = TokenIssuer::new(
        config.jwt_issuer.clone(),
        config.jwt_key.clone(),
        config.jwt_expires_in,
    );

    WebAuthService::new(
        settings,
        Arc::new(XdrChallengeVerifier::new()),
        account_resolver,
        token_issuer,
    )
}
