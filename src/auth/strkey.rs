//! Stellar strkey encoding
//!
//! Account ids (`G...`) and secret seeds (`S...`) are base32-encoded with a
//! version byte prefix and a 2-byte CRC16 checksum at the end.

use base32::Alphabet;
use ed25519_dalek::{SigningKey, VerifyingKey};
use thiserror::Error;

const VERSION_BYTE_ACCOUNT_ID: u8 = 6 << 3;
const VERSION_BYTE_SEED: u8 = 18 << 3;

/// Errors that can occur while decoding strkeys
#[derive(Error, Debug, PartialEq, Eq)]
pub enum StrkeyError {
    #[error("Invalid strkey format: {0}")]
    InvalidFormat(String),

    #[error("Invalid strkey checksum")]
    InvalidChecksum,

    #[error("Unexpected version byte: expected {expected}, got {actual}")]
    InvalidVersion { expected: u8, actual: u8 },
}

/// Decode a `G...` account id into its raw ed25519 public key
pub fn decode_account_id(address: &str) -> Result<[u8; 32], StrkeyError> {
    decode_check(VERSION_BYTE_ACCOUNT_ID, address)
}

/// Encode a raw ed25519 public key as a `G...` account id
pub fn encode_account_id(public_key: &[u8; 32]) -> String {
    encode_check(VERSION_BYTE_ACCOUNT_ID, public_key)
}

/// Decode an `S...` secret seed
pub fn decode_seed(seed: &str) -> Result<[u8; 32], StrkeyError> {
    decode_check(VERSION_BYTE_SEED, seed)
}

/// Encode a raw ed25519 seed as an `S...` secret seed
pub fn encode_seed(seed: &[u8; 32]) -> String {
    encode_check(VERSION_BYTE_SEED, seed)
}

/// Whether `address` is a well-formed `G...` account id
pub fn is_account_id(address: &str) -> bool {
    decode_account_id(address).is_ok()
}

/// Signature hint for a public key: its last four bytes
pub fn signature_hint(public_key: &[u8; 32]) -> [u8; 4] {
    let mut hint = [0u8; 4];
    hint.copy_from_slice(&public_key[28..]);
    hint
}

/// A server keypair loaded from a secret seed
#[derive(Clone)]
pub struct Keypair {
    signing_key: SigningKey,
    address: String,
}

impl Keypair {
    pub fn from_seed(seed: &str) -> Result<Self, StrkeyError> {
        let raw = decode_seed(seed.trim())?;
        Ok(Self::from_signing_key(SigningKey::from_bytes(&raw)))
    }

    pub fn from_signing_key(signing_key: SigningKey) -> Self {
        let address = encode_account_id(signing_key.verifying_key().as_bytes());
        Self {
            signing_key,
            address,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn signing_key(&self) -> &SigningKey {
        &self.signing_key
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }
}

impl std::fmt::Debug for Keypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keypair")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

fn encode_check(version: u8, payload: &[u8; 32]) -> String {
    let mut data = Vec::with_capacity(35);
    data.push(version);
    data.extend_from_slice(payload);
    let checksum = crc16_xmodem(&data);
    data.extend_from_slice(&checksum);
    base32::encode(Alphabet::Rfc4648 { padding: false }, &data)
}

fn decode_check(version: u8, encoded: &str) -> Result<[u8; 32], StrkeyError> {
    if encoded.len() != 56 {
        return Err(StrkeyError::InvalidFormat(format!(
            "Expected 56 characters, got {}",
            encoded.len()
        )));
    }

    let decoded = base32::decode(Alphabet::Rfc4648 { padding: false }, encoded)
        .ok_or_else(|| StrkeyError::InvalidFormat("Invalid base32 encoding".to_string()))?;

    // 1 version byte + 32 key bytes + 2 checksum bytes
    if decoded.len() != 35 {
        return Err(StrkeyError::InvalidFormat(format!(
            "Expected 35 bytes, got {}",
            decoded.len()
        )));
    }

    if decoded[0] != version {
        return Err(StrkeyError::InvalidVersion {
            expected: version,
            actual: decoded[0],
        });
    }

    let payload = &decoded[..33];
    if decoded[33..35] != crc16_xmodem(payload) {
        return Err(StrkeyError::InvalidChecksum);
    }

    let mut key = [0u8; 32];
    key.copy_from_slice(&decoded[1..33]);
    Ok(key)
}

/// CRC16-XModem checksum, little-endian
fn crc16_xmodem(data: &[u8]) -> [u8; 2] {
    let mut crc: u16 = 0;

    for byte in data {
        crc ^= (*byte as u16) << 8;
        for _ in 0..8 {
            if crc & 0x8000 != 0 {
                crc = (crc << 1) ^ 0x1021;
            } else {
                crc <<= 1;
            }
        }
    }

    [(crc & 0xff) as u8, (crc >> 8) as u8]
}
