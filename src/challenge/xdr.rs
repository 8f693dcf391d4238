//! Challenge verification backed by `stellar-xdr`

use std::collections::HashSet;

use base64::{engine::general_purpose, Engine as _};
use chrono::Utc;
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use sha2::{Digest, Sha256};
use stellar_xdr::next::{
    Hash, Limits, MuxedAccount, Operation, OperationBody, Preconditions, ReadXdr, Transaction,
    TransactionEnvelope, TransactionSignaturePayload,
    TransactionSignaturePayloadTaggedTransaction, WriteXdr,
};

use super::{
    Challenge, ChallengeError, ChallengeScope, ChallengeVerifier, TimeBounds,
    MIN_TIME_GRACE_SECONDS, WEB_AUTH_DOMAIN_KEY,
};
use crate::auth::strkey;

/// Upper bound on the decoded envelope size
const MAX_CHALLENGE_XDR_LEN: usize = 32_768;

/// Length of the base64-encoded nonce in the first operation
const NONCE_ENCODED_LEN: usize = 64;
const NONCE_DECODED_LEN: usize = 48;

/// Reads and verifies challenges encoded as base64 transaction envelopes
#[derive(Debug, Clone, Copy, Default)]
pub struct XdrChallengeVerifier;

impl XdrChallengeVerifier {
    pub fn new() -> Self {
        Self
    }
}

impl ChallengeVerifier for XdrChallengeVerifier {
    fn read_challenge(
        &self,
        raw: &str,
        server_account: &str,
        scope: &ChallengeScope,
    ) -> Result<Challenge, ChallengeError> {
        let bytes = general_purpose::STANDARD
            .decode(raw.trim())
            .map_err(|e| ChallengeError::Decode(e.to_string()))?;

        let envelope =
            TransactionEnvelope::from_xdr(&bytes, Limits::len(MAX_CHALLENGE_XDR_LEN))?;

        let envelope = match envelope {
            TransactionEnvelope::Tx(envelope) => envelope,
            TransactionEnvelope::TxFeeBump(_) => {
                return Err(invalid("challenge cannot be a fee bump transaction"))
            }
            TransactionEnvelope::TxV0(_) => {
                return Err(invalid("challenge must be a v1 transaction envelope"))
            }
        };

        let tx = &envelope.tx;

        let source = plain_account(&tx.source_account).ok_or_else(|| {
            invalid("only valid Ed25519 accounts are allowed as transaction source")
        })?;
        if source != server_account {
            return Err(invalid("transaction source account is not equal to server's account"));
        }

        if tx.seq_num.0 != 0 {
            return Err(invalid("transaction sequence number must be 0"));
        }

        let time_bounds = time_bounds(tx)?;
        if time_bounds.max_time == 0 {
            return Err(invalid("transaction requires non-infinite timebounds"));
        }
        let now = Utc::now().timestamp();
        if now + MIN_TIME_GRACE_SECONDS < time_bounds.min_time || now > time_bounds.max_time {
            return Err(ChallengeError::OutsideTimeBounds {
                now,
                min_time: time_bounds.min_time,
                max_time: time_bounds.max_time,
            });
        }

        let operations = tx.operations.as_slice();
        let (first, rest) = operations
            .split_first()
            .ok_or_else(|| invalid("transaction requires at least one manage_data operation"))?;

        let first_op = ManageData::from_operation(first)?;
        let client_account_id = first_op.source.ok_or_else(|| {
            invalid("only valid Ed25519 accounts are allowed as operation source")
        })?;

        let home_domain = scope
            .home_domains
            .iter()
            .find(|domain| first_op.name == format!("{} auth", domain))
            .cloned()
            .ok_or_else(|| {
                invalid(&format!(
                    "operation key does not match any home domain (key={:?})",
                    first_op.name
                ))
            })?;

        if first_op.value.len() != NONCE_ENCODED_LEN {
            return Err(invalid("random nonce encoded as base64 should be 64 bytes long"));
        }
        let nonce = general_purpose::STANDARD
            .decode(&first_op.value)
            .map_err(|e| invalid(&format!("failed to decode random nonce: {}", e)))?;
        if nonce.len() != NONCE_DECODED_LEN {
            return Err(invalid(
                "random nonce before encoding as base64 should be 48 bytes long",
            ));
        }

        for op in rest {
            let op = ManageData::from_operation(op)?;
            let op_source = op.source.as_deref();
            if op.name == WEB_AUTH_DOMAIN_KEY {
                if op_source != Some(server_account) {
                    return Err(invalid("web auth domain operation must have server source account"));
                }
                if op.value != scope.web_auth_domain.as_bytes() {
                    return Err(invalid(&format!(
                        "web auth domain operation value is {:?} but expected {:?}",
                        String::from_utf8_lossy(&op.value),
                        scope.web_auth_domain
                    )));
                }
            } else if op_source != Some(server_account) {
                return Err(invalid("subsequent operations are unrecognized"));
            }
        }

        let challenge = Challenge {
            server_account: server_account.to_string(),
            client_account_id,
            home_domain,
            time_bounds,
            envelope,
        };

        let hash = self.hash(&challenge, &scope.network_passphrase)?;
        let found = matched_signers(&challenge, &hash, &[server_account.to_string()])?;
        if found.is_empty() {
            return Err(ChallengeError::NotSigned(server_account.to_string()));
        }

        Ok(challenge)
    }

    fn hash(
        &self,
        challenge: &Challenge,
        network_passphrase: &str,
    ) -> Result<[u8; 32], ChallengeError> {
        transaction_hash(&challenge.envelope.tx, network_passphrase)
    }

    fn verify_signers(
        &self,
        challenge: &Challenge,
        network_passphrase: &str,
        signers: &[String],
    ) -> Result<Vec<String>, ChallengeError> {
        let server = challenge.server_account.as_str();

        let mut seen = HashSet::new();
        let client_signers: Vec<String> = signers
            .iter()
            .filter(|signer| signer.as_str() != server)
            .filter(|signer| strkey::is_account_id(signer))
            .filter(|signer| seen.insert(signer.as_str()))
            .cloned()
            .collect();

        if client_signers.is_empty() {
            return Err(ChallengeError::NoVerifiableSigners);
        }

        // Server and client signers are matched in one pass so each signature
        // is consumed at most once.
        let mut all_signers = Vec::with_capacity(client_signers.len() + 1);
        all_signers.push(server.to_string());
        all_signers.extend(client_signers.iter().cloned());

        let hash = self.hash(challenge, network_passphrase)?;
        let all_found = matched_signers(challenge, &hash, &all_signers)?;

        let server_found = all_found.iter().any(|signer| signer == server);
        let client_found: Vec<String> = all_found
            .iter()
            .filter(|signer| signer.as_str() != server)
            .cloned()
            .collect();

        if !server_found {
            return Err(ChallengeError::NotSigned(server.to_string()));
        }
        if client_found.is_empty() {
            return Err(ChallengeError::NotSigned(client_signers.join(", ")));
        }
        if all_found.len() != challenge.signature_count() {
            return Err(ChallengeError::UnrecognizedSignatures);
        }

        Ok(client_found)
    }
}

/// SHA-256 of the transaction signature payload for `network_passphrase`
pub(crate) fn transaction_hash(
    tx: &Transaction,
    network_passphrase: &str,
) -> Result<[u8; 32], ChallengeError> {
    let network_id: [u8; 32] = Sha256::digest(network_passphrase.as_bytes()).into();
    let payload = TransactionSignaturePayload {
        network_id: Hash(network_id),
        tagged_transaction: TransactionSignaturePayloadTaggedTransaction::Tx(tx.clone()),
    };
    let bytes = payload.to_xdr(Limits::none())?;
    Ok(Sha256::digest(&bytes).into())
}

/// Signers in `signers` that have a matching, valid signature. Each signature
/// is consumed by at most one signer.
fn matched_signers(
    challenge: &Challenge,
    hash: &[u8; 32],
    signers: &[String],
) -> Result<Vec<String>, ChallengeError> {
    let signatures = challenge.signatures();
    let mut used = vec![false; signatures.len()];
    let mut found = Vec::new();

    for signer in signers {
        let public_key = strkey::decode_account_id(signer)
            .map_err(|e| ChallengeError::Invalid(format!("signer {} is not an address: {}", signer, e)))?;
        let Ok(verifying_key) = VerifyingKey::from_bytes(&public_key) else {
            continue;
        };
        let hint = strkey::signature_hint(&public_key);

        for (i, decorated) in signatures.iter().enumerate() {
            if used[i] || decorated.hint.0 != hint {
                continue;
            }
            let Ok(signature) = Signature::from_slice(decorated.signature.0.as_slice()) else {
                continue;
            };
            if verifying_key.verify(hash, &signature).is_ok() {
                used[i] = true;
                found.push(signer.clone());
                break;
            }
        }
    }

    Ok(found)
}

struct ManageData {
    source: Option<String>,
    name: String,
    value: Vec<u8>,
}

impl ManageData {
    fn from_operation(op: &Operation) -> Result<Self, ChallengeError> {
        let OperationBody::ManageData(body) = &op.body else {
            return Err(invalid("operation type should be manage_data"));
        };
        let source = match &op.source_account {
            None => return Err(invalid("operation should have a source account")),
            Some(account) => plain_account(account),
        };
        let name = String::from_utf8(body.data_name.0.as_slice().to_vec())
            .map_err(|_| invalid("manage_data name is not valid UTF-8"))?;
        let value = body
            .data_value
            .as_ref()
            .map(|value| value.0.as_slice().to_vec())
            .unwrap_or_default();
        Ok(Self {
            source,
            name,
            value,
        })
    }
}

/// `G...` address of a non-muxed account
fn plain_account(account: &MuxedAccount) -> Option<String> {
    match account {
        MuxedAccount::Ed25519(key) => Some(strkey::encode_account_id(&key.0)),
        MuxedAccount::MuxedEd25519(_) => None,
    }
}

fn time_bounds(tx: &Transaction) -> Result<TimeBounds, ChallengeError> {
    let bounds = match &tx.cond {
        Preconditions::Time(bounds) => bounds,
        Preconditions::V2(conditions) => conditions
            .time_bounds
            .as_ref()
            .ok_or_else(|| invalid("transaction requires timebounds"))?,
        Preconditions::None => return Err(invalid("transaction requires timebounds")),
    };
    let to_seconds = |t: u64| {
        i64::try_from(t).map_err(|_| invalid("timebound does not fit in a unix timestamp"))
    };
    Ok(TimeBounds {
        min_time: to_seconds(bounds.min_time.0)?,
        max_time: to_seconds(bounds.max_time.0)?,
    })
}

fn invalid(reason: &str) -> ChallengeError {
    ChallengeError::Invalid(reason.to_string())
}
