//! Configuration management
//!
//! Loads and validates configuration from environment variables (and a `.env`
//! file when present). Configuration is read once at startup and never changes.

use std::env;
use std::time::Duration;

use jsonwebtoken::Algorithm;
use thiserror::Error;

use crate::auth::strkey::Keypair;
use crate::auth::TokenSigningKey;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid environment value: {0}")]
    InvalidValue(String),

    #[error("Invalid port number: {0}")]
    InvalidPort(String),
}

/// Application environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl Environment {
    /// Parse environment from string
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        match s.to_lowercase().as_str() {
            "dev" | "development" => Ok(Environment::Development),
            "staging" => Ok(Environment::Staging),
            "prod" | "production" => Ok(Environment::Production),
            _ => Err(ConfigError::InvalidValue(format!(
                "Invalid environment: '{}'. Expected: dev, staging, or prod",
                s
            ))),
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Staging => "staging",
            Environment::Production => "production",
        }
    }
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub environment: Environment,

    pub port: u16,

    /// Log level (RUST_LOG)
    pub log_level: String,

    /// CORS allowed origins, comma separated
    pub cors_allowed_origins: Option<String>,

    /// Stellar Horizon API URL used for account lookups
    pub horizon_url: String,

    /// Upper bound on a single account lookup
    pub horizon_timeout: Duration,

    /// Network passphrase for the Stellar network
    pub network_passphrase: String,

    /// Domain of this service, expected in the `web_auth_domain` operation
    pub web_auth_domain: String,

    /// Home domains a challenge may be scoped to
    pub home_domains: Vec<String>,

    /// Server signing keys in selection order; the first signs new challenges
    pub signing_keys: Vec<Keypair>,

    pub challenge_expires_in: chrono::Duration,

    pub jwt_key: TokenSigningKey,

    pub jwt_issuer: String,

    pub jwt_expires_in: chrono::Duration,

    pub allow_accounts_that_do_not_exist: bool,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let optional = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let required =
            |key: &str| optional(key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()));

        let environment = optional("ENVIRONMENT")
            .map(|s| Environment::parse(&s))
            .unwrap_or(Ok(Environment::Development))?;

        let port = optional("PORT")
            .unwrap_or_else(|| "8000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort("PORT must be a valid number".to_string()))?;

        let log_level = optional("RUST_LOG").unwrap_or_else(|| "info".to_string());

        let cors_allowed_origins = optional("CORS_ALLOWED_ORIGINS");

        let horizon_url = optional("HORIZON_URL")
            .unwrap_or_else(|| "https://horizon-testnet.stellar.org".to_string());

        let horizon_timeout = Duration::from_secs(parse_seconds(
            optional("HORIZON_TIMEOUT_SECONDS"),
            "HORIZON_TIMEOUT_SECONDS",
            10,
        )? as u64);

        let network_passphrase = optional("NETWORK_PASSPHRASE")
            .unwrap_or_else(|| "Test SDF Network ; September 2015".to_string());

        let web_auth_domain = required("WEB_AUTH_DOMAIN")?;

        let home_domains = split_list(&required("HOME_DOMAINS")?);
        if home_domains.is_empty() {
            return Err(ConfigError::InvalidValue(
                "HOME_DOMAINS must list at least one domain".to_string(),
            ));
        }

        let signing_keys = split_list(&required("SIGNING_KEYS")?)
            .iter()
            .map(|seed| {
                Keypair::from_seed(seed).map_err(|e| {
                    ConfigError::InvalidValue(format!("SIGNING_KEYS contains an invalid seed: {}", e))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        if signing_keys.is_empty() {
            return Err(ConfigError::InvalidValue(
                "SIGNING_KEYS must list at least one seed".to_string(),
            ));
        }

        let challenge_expires_in = parse_duration(
            optional("CHALLENGE_EXPIRES_IN_SECONDS"),
            "CHALLENGE_EXPIRES_IN_SECONDS",
            300,
        )?;

        let jwt_algorithm = TokenSigningKey::parse_algorithm(
            &optional("JWT_ALGORITHM").unwrap_or_else(|| "HS256".to_string()),
        )
        .map_err(|e| ConfigError::InvalidValue(e.to_string()))?;
        let jwt_key = TokenSigningKey::new(jwt_algorithm, required("JWT_KEY")?);

        let jwt_issuer = required("JWT_ISSUER")?;

        let jwt_expires_in = parse_duration(
            optional("JWT_EXPIRES_IN_SECONDS"),
            "JWT_EXPIRES_IN_SECONDS",
            300,
        )?;

        let allow_accounts_that_do_not_exist = optional("ALLOW_ACCOUNTS_THAT_DO_NOT_EXIST")
            .map(|value| parse_bool(&value, "ALLOW_ACCOUNTS_THAT_DO_NOT_EXIST"))
            .unwrap_or(Ok(false))?;

        Ok(Config {
            environment,
            port,
            log_level,
            cors_allowed_origins,
            horizon_url,
            horizon_timeout,
            network_passphrase,
            web_auth_domain,
            home_domains,
            signing_keys,
            challenge_expires_in,
            jwt_key,
            jwt_issuer,
            jwt_expires_in,
            allow_accounts_that_do_not_exist,
        })
    }

    pub fn jwt_algorithm(&self) -> Algorithm {
        self.jwt_key.algorithm()
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_seconds(value: Option<String>, key: &str, default: i64) -> Result<i64, ConfigError> {
    match value {
        None => Ok(default),
        Some(value) => match value.trim().parse::<i64>() {
            Ok(seconds) if seconds > 0 => Ok(seconds),
            _ => Err(ConfigError::InvalidValue(format!(
                "{} must be a positive number of seconds",
                key
            ))),
        },
    }
}

fn parse_duration(
    value: Option<String>,
    key: &str,
    default: i64,
) -> Result<chrono::Duration, ConfigError> {
    let seconds = parse_seconds(value, key, default)?;
    chrono::Duration::try_seconds(seconds)
        .ok_or_else(|| ConfigError::InvalidValue(format!("{} is out of range", key)))
}

fn parse_bool(value: &str, key: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        _ => Err(ConfigError::InvalidValue(format!("{} must be true or false", key))),
    }
}
