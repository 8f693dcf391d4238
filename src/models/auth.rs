//! Web authentication request and response models

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Query for a new challenge
#[derive(Debug, Deserialize, Validate)]
pub struct ChallengeQuery {
    #[validate(length(equal = 56))]
    pub account: String,
    pub home_domain: Option<String>,
}

/// Response containing the challenge transaction
#[derive(Debug, Serialize, Deserialize)]
pub struct ChallengeResponse {
    /// Base64 XDR of the server-signed challenge
    pub transaction: String,
    pub network_passphrase: String,
}

/// Request exchanging a signed challenge for a token
#[derive(Debug, Deserialize, Validate)]
pub struct TokenRequest {
    #[validate(length(min = 1))]
    pub transaction: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub token: String,
}
