//! Account verification
//!
//! Existing accounts must reach their high threshold with distinct signers.
//! Accounts that do not exist yet can only be proven by their own master key,
//! and only when the service allows them.

use std::collections::HashMap;

use crate::challenge::{Challenge, ChallengeError, ChallengeVerifier};
use crate::horizon::AccountLookup;

/// How a challenge's client signatures are checked
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountVerificationMode {
    /// Existing account: signer weights must reach `threshold`
    Threshold {
        signers: HashMap<String, i32>,
        threshold: i64,
    },
    /// Missing account: the account key is the only possible signer
    MasterKey { account_id: String },
}

#[derive(Debug, thiserror::Error)]
pub enum VerificationError {
    #[error("Accounts that do not exist are not allowed")]
    AccountNotAllowed,

    #[error("Signers do not meet threshold: {source}")]
    ThresholdNotMet {
        signers_count: usize,
        signatures_count: usize,
        required_threshold: i64,
        source: ChallengeError,
    },

    #[error("Account master key did not sign the challenge: {0}")]
    MasterKeyNotVerified(ChallengeError),

    #[error("Challenge could not be hashed: {0}")]
    Hash(ChallengeError),
}

impl AccountVerificationMode {
    /// Pick the mode for a lookup result. The high threshold is always used.
    pub fn for_lookup(
        lookup: AccountLookup,
        account_id: &str,
        allow_accounts_that_do_not_exist: bool,
    ) -> Result<Self, VerificationError> {
        match lookup {
            AccountLookup::Found(table) => Ok(Self::Threshold {
                signers: table.signer_summary(),
                threshold: i64::from(table.thresholds.high),
            }),
            AccountLookup::NotFound if allow_accounts_that_do_not_exist => Ok(Self::MasterKey {
                account_id: account_id.to_string(),
            }),
            AccountLookup::NotFound => Err(VerificationError::AccountNotAllowed),
        }
    }
}

/// Verify client signatures under `mode`, returning the distinct signers found
pub fn verify_account(
    verifier: &dyn ChallengeVerifier,
    challenge: &Challenge,
    network_passphrase: &str,
    mode: &AccountVerificationMode,
) -> Result<Vec<String>, VerificationError> {
    match mode {
        AccountVerificationMode::Threshold { signers, threshold } => verifier
            .verify_threshold(challenge, network_passphrase, *threshold, signers)
            .map_err(|source| match source {
                ChallengeError::Xdr(_) => VerificationError::Hash(source),
                source => VerificationError::ThresholdNotMet {
                    signers_count: signers.len(),
                    signatures_count: challenge.signature_count(),
                    required_threshold: *threshold,
                    source,
                },
            }),
        AccountVerificationMode::MasterKey { account_id } => verifier
            .verify_signers_only(challenge, network_passphrase, account_id)
            .map_err(|source| match source {
                ChallengeError::Xdr(_) => VerificationError::Hash(source),
                source => VerificationError::MasterKeyNotVerified(source),
            }),
    }
}
