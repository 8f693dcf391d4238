//! Server signing key selection
//!
//! Several server keys may be configured to allow key rotation. The challenge
//! is tried against each in configured order and the first that validates is
//! authoritative for the rest of the request.

use crate::challenge::{Challenge, ChallengeError, ChallengeScope, ChallengeVerifier};

/// Why no configured key accepted a challenge
#[derive(Debug, thiserror::Error)]
pub enum SelectionError {
    #[error("No signing key validated the challenge: {0}")]
    NoMatchingKey(String),

    #[error("Challenge home domain is empty")]
    EmptyHomeDomain,
}

/// Challenge together with the server key it validated against
#[derive(Debug, Clone)]
pub struct SelectedChallenge {
    pub challenge: Challenge,
    pub signing_address: String,
}

/// Try `candidates` in order and return the first that reads the challenge
pub fn select_signing_key(
    verifier: &dyn ChallengeVerifier,
    raw: &str,
    candidates: &[String],
    scope: &ChallengeScope,
) -> Result<SelectedChallenge, SelectionError> {
    let mut last_error: Option<ChallengeError> = None;

    let selected = candidates.iter().find_map(|candidate| {
        match verifier.read_challenge(raw, candidate, scope) {
            Ok(challenge) => Some(SelectedChallenge {
                challenge,
                signing_address: candidate.clone(),
            }),
            Err(e) => {
                tracing::debug!(serversigner = %candidate, error = %e, "Challenge rejected for signing key");
                last_error = Some(e);
                None
            }
        }
    });

    let selected = selected.ok_or_else(|| {
        SelectionError::NoMatchingKey(
            last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no signing keys configured".to_string()),
        )
    })?;

    if selected.challenge.home_domain.is_empty() {
        return Err(SelectionError::EmptyHomeDomain);
    }

    Ok(selected)
}
