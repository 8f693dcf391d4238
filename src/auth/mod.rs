//! Authentication module
//!
//! Proves control of a Stellar account through a signed challenge
//! transaction and issues a short-lived JWT.
//! - Server signing key selection (key rotation)
//! - Threshold and master-key signer verification
//! - JWT issuance anchored to the challenge time bounds

mod jwt;
mod selector;
mod service;
pub mod strkey;
mod verifier;

pub use jwt::{Claims, IssuedToken, JwtError, TokenIssuer, TokenSigningKey};
pub use selector::{select_signing_key, SelectedChallenge, SelectionError};
pub use service::{AuthError, FailureKind, IssuedChallenge, WebAuthService, WebAuthSettings};
pub use strkey::Keypair;
pub use verifier::{verify_account, AccountVerificationMode, VerificationError};
