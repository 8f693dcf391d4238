//! Challenge transactions
//!
//! A challenge is an unsubmitted transaction whose only purpose is to be
//! signed. This module reads and validates challenges, verifies their
//! signatures, and builds new ones.

mod builder;
mod xdr;

use std::collections::{HashMap, HashSet};

use stellar_xdr::next::{DecoratedSignature, TransactionV1Envelope};
use thiserror::Error;

pub use builder::{build_challenge, sign_challenge, ChallengeParams};
pub use xdr::XdrChallengeVerifier;

/// Grace period applied to `minTime` for clock drift between server and client
pub const MIN_TIME_GRACE_SECONDS: i64 = 5 * 60;

/// Name of the operation carrying the service domain
pub const WEB_AUTH_DOMAIN_KEY: &str = "web_auth_domain";

/// Errors raised while reading or verifying a challenge
#[derive(Error, Debug)]
pub enum ChallengeError {
    #[error("Challenge could not be decoded: {0}")]
    Decode(String),

    #[error("XDR error: {0}")]
    Xdr(#[from] stellar_xdr::next::Error),

    #[error("Invalid challenge: {0}")]
    Invalid(String),

    #[error("Challenge is not within its time bounds (now={now}, min_time={min_time}, max_time={max_time})")]
    OutsideTimeBounds {
        now: i64,
        min_time: i64,
        max_time: i64,
    },

    #[error("Challenge not signed by {0}")]
    NotSigned(String),

    #[error("No verifiable signers provided, at least one G... address must be provided")]
    NoVerifiableSigners,

    #[error("Challenge has unrecognized signatures")]
    UnrecognizedSignatures,

    #[error("Signers with weight {weight} do not meet threshold {threshold}")]
    ThresholdNotMet { weight: i64, threshold: i64 },
}

/// Where a challenge is allowed to come from
#[derive(Debug, Clone)]
pub struct ChallengeScope {
    pub network_passphrase: String,
    pub web_auth_domain: String,
    pub home_domains: Vec<String>,
}

/// Validity window declared by the challenge, in unix seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeBounds {
    pub min_time: i64,
    pub max_time: i64,
}

/// A parsed and structurally validated challenge
#[derive(Debug, Clone)]
pub struct Challenge {
    /// Server account the challenge was validated against
    pub server_account: String,
    pub client_account_id: String,
    pub home_domain: String,
    pub time_bounds: TimeBounds,
    pub(crate) envelope: TransactionV1Envelope,
}

impl Challenge {
    pub fn signatures(&self) -> &[DecoratedSignature] {
        self.envelope.signatures.as_slice()
    }

    pub fn signature_count(&self) -> usize {
        self.signatures().len()
    }
}

/// Parsing and signature primitives for challenge transactions.
///
/// `read_challenge` validates structure and the server signature for one
/// candidate server account; the verify methods never re-read the
/// transaction.
pub trait ChallengeVerifier: Send + Sync {
    fn read_challenge(
        &self,
        raw: &str,
        server_account: &str,
        scope: &ChallengeScope,
    ) -> Result<Challenge, ChallengeError>;

    fn hash(&self, challenge: &Challenge, network_passphrase: &str)
        -> Result<[u8; 32], ChallengeError>;

    /// Client signers (server excluded) whose signatures verify, in the order given.
    fn verify_signers(
        &self,
        challenge: &Challenge,
        network_passphrase: &str,
        signers: &[String],
    ) -> Result<Vec<String>, ChallengeError>;

    fn verify_threshold(
        &self,
        challenge: &Challenge,
        network_passphrase: &str,
        threshold: i64,
        signer_summary: &HashMap<String, i32>,
    ) -> Result<Vec<String>, ChallengeError> {
        let mut signers: Vec<String> = signer_summary.keys().cloned().collect();
        signers.sort();

        let found = self.verify_signers(challenge, network_passphrase, &signers)?;

        let mut seen = HashSet::new();
        let weight: i64 = found
            .iter()
            .filter(|signer| seen.insert(signer.as_str()))
            .map(|signer| i64::from(signer_summary.get(signer).copied().unwrap_or(0)))
            .sum();

        if weight < threshold {
            return Err(ChallengeError::ThresholdNotMet { weight, threshold });
        }

        Ok(found)
    }

    fn verify_signers_only(
        &self,
        challenge: &Challenge,
        network_passphrase: &str,
        account_id: &str,
    ) -> Result<Vec<String>, ChallengeError> {
        self.verify_signers(challenge, network_passphrase, &[account_id.to_string()])
    }
}
