//! Challenge construction and client-side signing

use base64::{engine::general_purpose, Engine as _};
use chrono::Duration;
use ed25519_dalek::{Signer, SigningKey};
use rand::RngCore;
use stellar_xdr::next::{
    DataValue, DecoratedSignature, Limits, ManageDataOp, Memo, MuxedAccount, Operation,
    OperationBody, Preconditions, ReadXdr, SequenceNumber, Signature, SignatureHint, String64,
    TimeBounds, TimePoint, Transaction, TransactionEnvelope, TransactionExt,
    TransactionV1Envelope, Uint256, WriteXdr,
};

use super::xdr::transaction_hash;
use super::{ChallengeError, WEB_AUTH_DOMAIN_KEY};
use crate::auth::strkey::{self, Keypair};

/// Base fee per operation, in stroops
const BASE_FEE: u32 = 100;

/// Inputs for a new challenge
pub struct ChallengeParams<'a> {
    pub server_key: &'a Keypair,
    pub client_account_id: &'a str,
    pub web_auth_domain: &'a str,
    pub home_domain: &'a str,
    pub network_passphrase: &'a str,
    /// Unix seconds used as `minTime`
    pub issued_at: i64,
    pub timeout: Duration,
}

/// Build a challenge signed by the server key, returned as base64 XDR
pub fn build_challenge(params: &ChallengeParams<'_>) -> Result<String, ChallengeError> {
    if params.timeout < Duration::seconds(1) {
        return Err(ChallengeError::Invalid(
            "provided timeout must be at least 1s (300s is recommended)".to_string(),
        ));
    }

    let client_key = strkey::decode_account_id(params.client_account_id).map_err(|e| {
        ChallengeError::Invalid(format!(
            "{} is not a valid account id: {}",
            params.client_account_id, e
        ))
    })?;
    let server_key = *params.server_key.verifying_key().as_bytes();

    // 48 random bytes encode to exactly 64 base64 characters
    let mut nonce = [0u8; 48];
    rand::thread_rng().fill_bytes(&mut nonce);
    let nonce = general_purpose::STANDARD.encode(nonce);

    let min_time = u64::try_from(params.issued_at)
        .map_err(|_| ChallengeError::Invalid("issue time precedes the unix epoch".to_string()))?;
    let max_time = params
        .issued_at
        .checked_add(params.timeout.num_seconds())
        .and_then(|max_time| u64::try_from(max_time).ok())
        .ok_or_else(|| ChallengeError::Invalid("challenge expiry is out of range".to_string()))?;

    let operations = vec![
        manage_data(
            client_key,
            &format!("{} auth", params.home_domain),
            nonce.as_bytes(),
        )?,
        manage_data(
            server_key,
            WEB_AUTH_DOMAIN_KEY,
            params.web_auth_domain.as_bytes(),
        )?,
    ];

    let tx = Transaction {
        source_account: MuxedAccount::Ed25519(Uint256(server_key)),
        fee: BASE_FEE * operations.len() as u32,
        seq_num: SequenceNumber(0),
        cond: Preconditions::Time(TimeBounds {
            min_time: TimePoint(min_time),
            max_time: TimePoint(max_time),
        }),
        memo: Memo::None,
        operations: operations.try_into()?,
        ext: TransactionExt::V0,
    };

    let signature = decorated_signature(&tx, params.network_passphrase, params.server_key.signing_key())?;
    let envelope = TransactionEnvelope::Tx(TransactionV1Envelope {
        tx,
        signatures: vec![signature].try_into()?,
    });

    Ok(general_purpose::STANDARD.encode(envelope.to_xdr(Limits::none())?))
}

/// Append signatures from `signers` to an encoded challenge
pub fn sign_challenge(
    raw: &str,
    network_passphrase: &str,
    signers: &[&SigningKey],
) -> Result<String, ChallengeError> {
    let bytes = general_purpose::STANDARD
        .decode(raw.trim())
        .map_err(|e| ChallengeError::Decode(e.to_string()))?;

    let TransactionEnvelope::Tx(envelope) = TransactionEnvelope::from_xdr(&bytes, Limits::none())?
    else {
        return Err(ChallengeError::Invalid(
            "challenge must be a v1 transaction envelope".to_string(),
        ));
    };

    let mut signatures = envelope.signatures.to_vec();
    for signer in signers {
        signatures.push(decorated_signature(&envelope.tx, network_passphrase, signer)?);
    }

    let envelope = TransactionEnvelope::Tx(TransactionV1Envelope {
        tx: envelope.tx,
        signatures: signatures.try_into()?,
    });

    Ok(general_purpose::STANDARD.encode(envelope.to_xdr(Limits::none())?))
}

fn manage_data(source: [u8; 32], name: &str, value: &[u8]) -> Result<Operation, ChallengeError> {
    Ok(Operation {
        source_account: Some(MuxedAccount::Ed25519(Uint256(source))),
        body: OperationBody::ManageData(ManageDataOp {
            data_name: String64(name.as_bytes().to_vec().try_into()?),
            data_value: Some(DataValue(value.to_vec().try_into()?)),
        }),
    })
}

fn decorated_signature(
    tx: &Transaction,
    network_passphrase: &str,
    signer: &SigningKey,
) -> Result<DecoratedSignature, ChallengeError> {
    let hash = transaction_hash(tx, network_passphrase)?;
    let signature = signer.sign(&hash);
    Ok(DecoratedSignature {
        hint: SignatureHint(strkey::signature_hint(signer.verifying_key().as_bytes())),
        signature: Signature(signature.to_bytes().to_vec().try_into()?),
    })
}
