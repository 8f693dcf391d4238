//! Horizon account lookups
//!
//! Fetches the signer table and thresholds of a client account. Results are
//! never cached: a stale signer table would authorize keys the account has
//! already removed.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use thiserror::Error;

/// Errors from the account lookup backend. None of these mean "not found".
#[derive(Error, Debug)]
pub enum HorizonError {
    #[error("Horizon request failed: {0}")]
    Request(String),

    #[error("Horizon returned unexpected status {0}")]
    UnexpectedStatus(u16),

    #[error("Horizon response could not be decoded: {0}")]
    Decode(String),

    #[error("Account lookup timed out")]
    Timeout,
}

/// A signer entry of an existing account
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AccountSigner {
    pub key: String,
    pub weight: i32,
    #[serde(rename = "type", default)]
    pub kind: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub struct Thresholds {
    #[serde(rename = "low_threshold")]
    pub low: u8,
    #[serde(rename = "med_threshold")]
    pub medium: u8,
    #[serde(rename = "high_threshold")]
    pub high: u8,
}

/// Signers and thresholds of an existing account
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AccountSignerTable {
    pub signers: Vec<AccountSigner>,
    pub thresholds: Thresholds,
}

impl AccountSignerTable {
    /// Signer key to weight
    pub fn signer_summary(&self) -> HashMap<String, i32> {
        self.signers
            .iter()
            .map(|signer| (signer.key.clone(), signer.weight))
            .collect()
    }
}

/// Outcome of a successful lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountLookup {
    Found(AccountSignerTable),
    NotFound,
}

#[async_trait]
pub trait AccountResolver: Send + Sync {
    async fn resolve(&self, account_id: &str) -> Result<AccountLookup, HorizonError>;
}

/// Account resolver backed by the Horizon REST API
#[derive(Debug, Clone)]
pub struct HorizonClient {
    base_url: String,
    client: Client,
}

impl HorizonClient {
    pub fn new(base_url: String, timeout: Duration) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }

    fn account_url(&self, account_id: &str) -> String {
        format!("{}/accounts/{}", self.base_url, account_id)
    }
}

#[async_trait]
impl AccountResolver for HorizonClient {
    async fn resolve(&self, account_id: &str) -> Result<AccountLookup, HorizonError> {
        let response = self
            .client
            .get(self.account_url(account_id))
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    HorizonError::Timeout
                } else {
                    HorizonError::Request(e.to_string())
                }
            })?;

        match response.status() {
            StatusCode::OK => {
                let table = response
                    .json::<AccountSignerTable>()
                    .await
                    .map_err(|e| HorizonError::Decode(e.to_string()))?;
                Ok(AccountLookup::Found(table))
            }
            StatusCode::NOT_FOUND => Ok(AccountLookup::NotFound),
            status => Err(HorizonError::UnexpectedStatus(status.as_u16())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_account_response() {
        let body = r#"{
            "id": "GAAZI4TCR3TY5OJHCTJC2A4QSY6CJWJH5IAJTGKIN2ER7LBNVKOCCWN7",
            "account_id": "GAAZI4TCR3TY5OJHCTJC2A4QSY6CJWJH5IAJTGKIN2ER7LBNVKOCCWN7",
            "sequence": "123",
            "thresholds": {"low_threshold": 1, "med_threshold": 2, "high_threshold": 3},
            "signers": [
                {"weight": 1, "key": "GAAZI4TCR3TY5OJHCTJC2A4QSY6CJWJH5IAJTGKIN2ER7LBNVKOCCWN7", "type": "ed25519_public_key"},
                {"weight": 2, "key": "GBX", "type": "ed25519_public_key"}
            ]
        }"#;

        let table: AccountSignerTable = serde_json::from_str(body).unwrap();
        assert_eq!(table.thresholds.high, 3);
        assert_eq!(table.thresholds.medium, 2);

        let summary = table.signer_summary();
        assert_eq!(summary.len(), 2);
        assert_eq!(summary["GBX"], 2);
    }

    #[test]
    fn test_account_url() {
        let client = HorizonClient::new(
            "https://horizon-testnet.stellar.org/".to_string(),
            Duration::from_secs(1),
        );
        assert_eq!(
            client.account_url("GABC"),
            "https://horizon-testnet.stellar.org/accounts/GABC"
        );
    }
}
