//! Web authentication service
//!
//! Exchanges signed challenges for tokens:
//! key selection, account lookup, signer verification, token issuance.
//! Every stage short-circuits with a classified [`AuthError`].

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tracing::Instrument;

use super::jwt::{JwtError, TokenIssuer};
use super::selector::{select_signing_key, SelectionError};
use super::strkey::{self, Keypair};
use super::verifier::{verify_account, AccountVerificationMode, VerificationError};
use crate::challenge::{build_challenge, ChallengeError, ChallengeParams, ChallengeScope, ChallengeVerifier};
use crate::horizon::{AccountLookup, AccountResolver, HorizonError};

/// Auth service errors
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Bad challenge: {0}")]
    BadChallenge(#[from] SelectionError),

    #[error("Invalid challenge request: {0}")]
    InvalidChallengeRequest(String),

    #[error("Verification failed: {0}")]
    Verification(#[from] VerificationError),

    #[error("Account lookup failed: {0}")]
    AccountLookup(#[from] HorizonError),

    #[error("Challenge could not be processed: {0}")]
    Challenge(#[from] ChallengeError),

    #[error("Token error: {0}")]
    Token(#[from] JwtError),
}

/// How a failure is reported to the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    BadRequest,
    Unauthorized,
    ServerError,
}

impl AuthError {
    pub fn kind(&self) -> FailureKind {
        match self {
            AuthError::BadChallenge(_) | AuthError::InvalidChallengeRequest(_) => {
                FailureKind::BadRequest
            }
            AuthError::Verification(VerificationError::Hash(_)) => FailureKind::ServerError,
            AuthError::Verification(_) => FailureKind::Unauthorized,
            AuthError::AccountLookup(_) | AuthError::Challenge(_) | AuthError::Token(_) => {
                FailureKind::ServerError
            }
        }
    }
}

/// Immutable service policy, fixed at startup
#[derive(Debug, Clone)]
pub struct WebAuthSettings {
    pub scope: ChallengeScope,
    /// Candidate server keys, in the order they are tried. The first one
    /// signs newly issued challenges.
    pub signing_keys: Vec<Keypair>,
    pub challenge_expires_in: chrono::Duration,
    pub allow_accounts_that_do_not_exist: bool,
    pub account_lookup_timeout: Duration,
}

/// A freshly built challenge
#[derive(Debug, Clone)]
pub struct IssuedChallenge {
    pub transaction: String,
    pub network_passphrase: String,
}

/// Authentication service
#[derive(Clone)]
pub struct WebAuthService {
    settings: Arc<WebAuthSettings>,
    signing_addresses: Arc<Vec<String>>,
    challenge_verifier: Arc<dyn ChallengeVerifier>,
    account_resolver: Arc<dyn AccountResolver>,
    token_issuer: Arc<TokenIssuer>,
}

impl WebAuthService {
    pub fn new(
        settings: WebAuthSettings,
        challenge_verifier: Arc<dyn ChallengeVerifier>,
        account_resolver: Arc<dyn AccountResolver>,
        token_issuer: TokenIssuer,
    ) -> Self {
        let signing_addresses = settings
            .signing_keys
            .iter()
            .map(|key| key.address().to_string())
            .collect();
        Self {
            settings: Arc::new(settings),
            signing_addresses: Arc::new(signing_addresses),
            challenge_verifier,
            account_resolver,
            token_issuer: Arc::new(token_issuer),
        }
    }

    pub fn network_passphrase(&self) -> &str {
        &self.settings.scope.network_passphrase
    }

    /// Build a challenge for `account_id`, signed with the first server key
    pub fn generate_challenge(
        &self,
        account_id: &str,
        home_domain: Option<&str>,
    ) -> Result<IssuedChallenge, AuthError> {
        if !strkey::is_account_id(account_id) {
            return Err(AuthError::InvalidChallengeRequest(format!(
                "{} is not a valid account id",
                account_id
            )));
        }

        let scope = &self.settings.scope;
        let home_domain = match home_domain.filter(|domain| !domain.is_empty()) {
            Some(domain) => scope
                .home_domains
                .iter()
                .find(|candidate| candidate.as_str() == domain)
                .ok_or_else(|| {
                    AuthError::InvalidChallengeRequest(format!(
                        "home domain {} is not supported",
                        domain
                    ))
                })?,
            None => scope.home_domains.first().ok_or_else(|| {
                AuthError::InvalidChallengeRequest("no home domains configured".to_string())
            })?,
        };

        let server_key = self.settings.signing_keys.first().ok_or_else(|| {
            AuthError::Challenge(ChallengeError::Invalid(
                "no signing keys configured".to_string(),
            ))
        })?;

        let transaction = build_challenge(&ChallengeParams {
            server_key,
            client_account_id: account_id,
            web_auth_domain: &scope.web_auth_domain,
            home_domain,
            network_passphrase: &scope.network_passphrase,
            issued_at: Utc::now().timestamp(),
            timeout: self.settings.challenge_expires_in,
        })?;

        tracing::info!(
            account = %account_id,
            homedomain = %home_domain,
            serversigner = %server_key.address(),
            "Issued challenge transaction."
        );

        Ok(IssuedChallenge {
            transaction,
            network_passphrase: scope.network_passphrase.clone(),
        })
    }

    /// Verify a signed challenge and issue a token for its client account
    pub async fn exchange_challenge(&self, raw: &str) -> Result<String, AuthError> {
        let scope = &self.settings.scope;

        let selected = select_signing_key(
            self.challenge_verifier.as_ref(),
            raw,
            &self.signing_addresses,
            scope,
        )
        .map_err(|e| {
            tracing::info!(error = %e, "Rejected challenge transaction.");
            AuthError::from(e)
        })?;
        let challenge = selected.challenge;

        let hash = self
            .challenge_verifier
            .hash(&challenge, &scope.network_passphrase)
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to hash challenge transaction.");
                AuthError::from(e)
            })?;

        let span = tracing::info_span!(
            "verify_challenge",
            tx = %hex::encode(hash),
            account = %challenge.client_account_id,
            serversigner = %selected.signing_address,
            homedomain = %challenge.home_domain,
        );

        async move {
            tracing::info!("Start verifying challenge transaction.");

            let lookup = self.resolve_account(&challenge.client_account_id).await?;

            let mode = AccountVerificationMode::for_lookup(
                lookup,
                &challenge.client_account_id,
                self.settings.allow_accounts_that_do_not_exist,
            )
            .map_err(|e| {
                tracing::info!("Failed to verify because accounts that do not exist are not allowed.");
                AuthError::from(e)
            })?;

            let signers = verify_account(
                self.challenge_verifier.as_ref(),
                &challenge,
                &scope.network_passphrase,
                &mode,
            )
            .map_err(|e| {
                log_verification_failure(&e);
                AuthError::from(e)
            })?;

            tracing::info!(
                signers = %signers.join(","),
                "Successfully verified challenge transaction."
            );

            let issued = self
                .token_issuer
                .issue(&challenge.client_account_id, challenge.time_bounds.min_time)
                .map_err(|e| {
                    tracing::error!(error = %e, "Failed to sign token.");
                    AuthError::from(e)
                })?;

            Ok::<_, AuthError>(issued.token)
        }
        .instrument(span)
        .await
    }

    async fn resolve_account(&self, account_id: &str) -> Result<AccountLookup, AuthError> {
        let lookup = tokio::time::timeout(
            self.settings.account_lookup_timeout,
            self.account_resolver.resolve(account_id),
        )
        .await
        .unwrap_or(Err(HorizonError::Timeout));

        match lookup {
            Ok(AccountLookup::Found(table)) => {
                tracing::info!("Account exists.");
                Ok(AccountLookup::Found(table))
            }
            Ok(AccountLookup::NotFound) => {
                tracing::info!("Account does not exist.");
                Ok(AccountLookup::NotFound)
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to look up account.");
                Err(e.into())
            }
        }
    }
}

fn log_verification_failure(error: &VerificationError) {
    match error {
        VerificationError::ThresholdNotMet {
            signers_count,
            signatures_count,
            required_threshold,
            source,
        } => tracing::info!(
            signers_count,
            signatures_count,
            required_threshold,
            reason = %source,
            "Failed to verify with signers that do not meet threshold."
        ),
        VerificationError::MasterKeyNotVerified(source) => tracing::info!(
            reason = %source,
            "Failed to verify with account master key as signer."
        ),
        VerificationError::Hash(source) => {
            tracing::error!(error = %source, "Failed to hash challenge transaction.")
        }
        VerificationError::AccountNotAllowed => {}
    }
}
