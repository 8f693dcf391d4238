//! End-to-end tests of the challenge and token endpoints

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use chrono::Utc;
use ed25519_dalek::SigningKey;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde_json::Value;
use tower::ServiceExt;

use stellar_webauth::auth::strkey::{encode_seed, Keypair};
use stellar_webauth::auth::Claims;
use stellar_webauth::challenge::{
    build_challenge, sign_challenge, ChallengeParams, ChallengeScope, ChallengeVerifier,
    XdrChallengeVerifier,
};
use stellar_webauth::config::{Config, Environment};
use stellar_webauth::horizon::{
    AccountLookup, AccountResolver, AccountSigner, AccountSignerTable, HorizonError, Thresholds,
};
use stellar_webauth::state::AppState;
use stellar_webauth::{build_auth_service, routes};

const NETWORK: &str = "Test SDF Network ; September 2015";
const JWT_SECRET: &str = "integration-secret";
const JWT_ISSUER: &str = "https://auth.example.com";

/// In-memory Horizon
#[derive(Default)]
struct FakeHorizon {
    accounts: HashMap<String, AccountSignerTable>,
    unavailable: bool,
}

#[async_trait]
impl AccountResolver for FakeHorizon {
    async fn resolve(&self, account_id: &str) -> Result<AccountLookup, HorizonError> {
        if self.unavailable {
            return Err(HorizonError::UnexpectedStatus(503));
        }
        Ok(self
            .accounts
            .get(account_id)
            .cloned()
            .map(AccountLookup::Found)
            .unwrap_or(AccountLookup::NotFound))
    }
}

fn keypair(n: u8) -> Keypair {
    Keypair::from_signing_key(SigningKey::from_bytes(&[n; 32]))
}

fn server_keys() -> (Keypair, Keypair) {
    (keypair(100), keypair(101))
}

fn config(allow_missing: bool, jwt_expires_in: i64) -> Config {
    let (current, previous) = server_keys();
    let vars = HashMap::from([
        ("WEB_AUTH_DOMAIN", "auth.example.com".to_string()),
        ("HOME_DOMAINS", "example.com".to_string()),
        (
            "SIGNING_KEYS",
            format!(
                "{},{}",
                encode_seed(&current.signing_key().to_bytes()),
                encode_seed(&previous.signing_key().to_bytes())
            ),
        ),
        ("JWT_KEY", JWT_SECRET.to_string()),
        ("JWT_ISSUER", JWT_ISSUER.to_string()),
        ("JWT_EXPIRES_IN_SECONDS", jwt_expires_in.to_string()),
        (
            "ALLOW_ACCOUNTS_THAT_DO_NOT_EXIST",
            allow_missing.to_string(),
        ),
    ]);
    Config::from_lookup(|key| vars.get(key).cloned()).unwrap()
}

fn app(horizon: FakeHorizon, allow_missing: bool) -> Router {
    app_with_token_lifetime(horizon, allow_missing, 900)
}

fn app_with_token_lifetime(horizon: FakeHorizon, allow_missing: bool, seconds: i64) -> Router {
    let config = config(allow_missing, seconds);
    let service = build_auth_service(&config, Arc::new(horizon));
    routes::app(AppState::new(Arc::new(service)), Environment::Development, None)
}

fn account(signers: &[(&Keypair, i32)], high: u8) -> AccountSignerTable {
    AccountSignerTable {
        signers: signers
            .iter()
            .map(|(key, weight)| AccountSigner {
                key: key.address().to_string(),
                weight: *weight,
                kind: "ed25519_public_key".to_string(),
            })
            .collect(),
        thresholds: Thresholds {
            low: 0,
            medium: 0,
            high,
        },
    }
}

fn horizon_with(client: &Keypair, table: AccountSignerTable) -> FakeHorizon {
    FakeHorizon {
        accounts: HashMap::from([(client.address().to_string(), table)]),
        unavailable: false,
    }
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value, axum::http::HeaderMap) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body, headers)
}

async fn fetch_challenge(app: &Router, account: &str) -> String {
    let request = Request::get(format!("/auth?account={}", account))
        .body(Body::empty())
        .unwrap();
    let (status, body, _) = send(app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["network_passphrase"], NETWORK);
    body["transaction"].as_str().unwrap().to_string()
}

async fn post_json(app: &Router, transaction: &str) -> (StatusCode, Value) {
    let request = Request::post("/auth")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            serde_json::json!({ "transaction": transaction }).to_string(),
        ))
        .unwrap();
    let (status, body, _) = send(app, request).await;
    (status, body)
}

fn sign(transaction: &str, signers: &[&Keypair]) -> String {
    let keys: Vec<&SigningKey> = signers.iter().map(|k| k.signing_key()).collect();
    sign_challenge(transaction, NETWORK, &keys).unwrap()
}

fn claims(token: &str) -> Claims {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_issuer(&[JWT_ISSUER]);
    decode_with(token, &validation)
}

fn decode_with(token: &str, validation: &Validation) -> Claims {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(JWT_SECRET.as_bytes()),
        validation,
    )
    .unwrap()
    .claims
}

fn challenge_min_time(transaction: &str, server: &Keypair) -> i64 {
    let scope = ChallengeScope {
        network_passphrase: NETWORK.to_string(),
        web_auth_domain: "auth.example.com".to_string(),
        home_domains: vec!["example.com".to_string()],
    };
    XdrChallengeVerifier
        .read_challenge(transaction, server.address(), &scope)
        .unwrap()
        .time_bounds
        .min_time
}

#[tokio::test]
async fn test_existing_account_meeting_threshold_gets_token() {
    let client = keypair(1);
    let app = app(horizon_with(&client, account(&[(&client, 30)], 30)), false);

    let challenge = fetch_challenge(&app, client.address()).await;
    let (status, body) = post_json(&app, &sign(&challenge, &[&client])).await;

    assert_eq!(status, StatusCode::OK);
    let claims = claims(body["token"].as_str().unwrap());
    assert_eq!(claims.sub, client.address());
    assert_eq!(claims.iss, JWT_ISSUER);
    assert_eq!(claims.exp - claims.iat, 900);
    assert_eq!(claims.iat, challenge_min_time(&challenge, &server_keys().0));
}

#[tokio::test]
async fn test_existing_account_below_threshold_is_unauthorized() {
    let client = keypair(1);
    let app = app(horizon_with(&client, account(&[(&client, 20)], 30)), true);

    let challenge = fetch_challenge(&app, client.address()).await;
    let (status, body) = post_json(&app, &sign(&challenge, &[&client])).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");
    let text = body.to_string();
    assert!(!text.contains("threshold"));
    assert!(!text.contains(client.address()));
}

#[tokio::test]
async fn test_multisig_weights_are_summed() {
    let client = keypair(1);
    let cosigner = keypair(2);
    let app = app(
        horizon_with(&client, account(&[(&client, 15), (&cosigner, 15)], 30)),
        false,
    );

    let challenge = fetch_challenge(&app, client.address()).await;

    let (status, _) = post_json(&app, &sign(&challenge, &[&client])).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = post_json(&app, &sign(&challenge, &[&client, &cosigner])).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(claims(body["token"].as_str().unwrap()).sub, client.address());
}

#[tokio::test]
async fn test_missing_account_with_self_signature_when_allowed() {
    let client = keypair(1);
    let app = app(FakeHorizon::default(), true);

    let challenge = fetch_challenge(&app, client.address()).await;
    let (status, body) = post_json(&app, &sign(&challenge, &[&client])).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(claims(body["token"].as_str().unwrap()).sub, client.address());
}

#[tokio::test]
async fn test_missing_account_rejected_when_not_allowed() {
    let client = keypair(1);
    let app = app(FakeHorizon::default(), false);

    let challenge = fetch_challenge(&app, client.address()).await;
    let (status, _) = post_json(&app, &sign(&challenge, &[&client])).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_missing_account_without_self_signature() {
    let client = keypair(1);
    let app = app(FakeHorizon::default(), true);

    let challenge = fetch_challenge(&app, client.address()).await;
    let (status, _) = post_json(&app, &sign(&challenge, &[&keypair(2)])).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_form_encoded_request() {
    let client = keypair(1);
    let app = app(FakeHorizon::default(), true);

    let challenge = sign(&fetch_challenge(&app, client.address()).await, &[&client]);
    let body = serde_urlencoded::to_string([("transaction", &challenge)]).unwrap();
    let request = Request::post("/auth")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(body))
        .unwrap();

    let (status, body, headers) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["token"].is_string());
    assert_eq!(headers[header::CACHE_CONTROL], "no-store");
}

#[tokio::test]
async fn test_unsupported_content_type() {
    let app = app(FakeHorizon::default(), true);
    let request = Request::post("/auth")
        .header(header::CONTENT_TYPE, "text/plain")
        .body(Body::from("transaction=AAAA"))
        .unwrap();

    let (status, body, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_malformed_and_empty_transactions() {
    let app = app(FakeHorizon::default(), true);

    let (status, _) = post_json(&app, "not a transaction").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = post_json(&app, "").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_challenge_from_unknown_server_key() {
    let client = keypair(1);
    let app = app(FakeHorizon::default(), true);

    let foreign = build_challenge(&ChallengeParams {
        server_key: &keypair(99),
        client_account_id: client.address(),
        web_auth_domain: "auth.example.com",
        home_domain: "example.com",
        network_passphrase: NETWORK,
        issued_at: Utc::now().timestamp(),
        timeout: chrono::Duration::seconds(300),
    })
    .unwrap();

    let (status, _) = post_json(&app, &sign(&foreign, &[&client])).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_challenge_from_rotated_out_key_still_accepted() {
    let client = keypair(1);
    let (_, previous) = server_keys();
    let app = app(FakeHorizon::default(), true);

    let challenge = build_challenge(&ChallengeParams {
        server_key: &previous,
        client_account_id: client.address(),
        web_auth_domain: "auth.example.com",
        home_domain: "example.com",
        network_passphrase: NETWORK,
        issued_at: Utc::now().timestamp(),
        timeout: chrono::Duration::seconds(300),
    })
    .unwrap();

    let (status, body) = post_json(&app, &sign(&challenge, &[&client])).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        claims(body["token"].as_str().unwrap()).iat,
        challenge_min_time(&challenge, &previous)
    );
}

#[tokio::test]
async fn test_late_submission_gets_already_expired_token() {
    let client = keypair(1);
    let (server, _) = server_keys();
    let app = app_with_token_lifetime(FakeHorizon::default(), true, 60);

    let now = Utc::now().timestamp();
    let challenge = build_challenge(&ChallengeParams {
        server_key: &server,
        client_account_id: client.address(),
        web_auth_domain: "auth.example.com",
        home_domain: "example.com",
        network_passphrase: NETWORK,
        issued_at: now - 250,
        timeout: chrono::Duration::seconds(300),
    })
    .unwrap();

    let (status, body) = post_json(&app, &sign(&challenge, &[&client])).await;
    assert_eq!(status, StatusCode::OK);

    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = false;
    let claims = decode_with(body["token"].as_str().unwrap(), &validation);
    assert_eq!(claims.iat, now - 250);
    assert_eq!(claims.exp, now - 190);
    assert!(claims.exp < Utc::now().timestamp());
}

#[tokio::test]
async fn test_horizon_outage_is_server_error() {
    let client = keypair(1);
    let app = app(
        FakeHorizon {
            accounts: HashMap::new(),
            unavailable: true,
        },
        true,
    );

    let challenge = fetch_challenge(&app, client.address()).await;
    let (status, body) = post_json(&app, &sign(&challenge, &[&client])).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"]["code"], "INTERNAL_ERROR");
}

#[tokio::test]
async fn test_resubmitting_challenge_keeps_claims() {
    let client = keypair(1);
    let app = app(horizon_with(&client, account(&[(&client, 1)], 1)), false);

    let signed = sign(&fetch_challenge(&app, client.address()).await, &[&client]);

    let (_, first) = post_json(&app, &signed).await;
    let (_, second) = post_json(&app, &signed).await;

    let first = claims(first["token"].as_str().unwrap());
    let second = claims(second["token"].as_str().unwrap());
    assert_eq!(first.iat, second.iat);
    assert_eq!(first.sub, second.sub);
}

#[tokio::test]
async fn test_challenge_request_validation() {
    let app = app(FakeHorizon::default(), true);

    let request = Request::get("/auth").body(Body::empty()).unwrap();
    let (status, _, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let request = Request::get("/auth?account=GABC").body(Body::empty()).unwrap();
    let (status, _, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let request = Request::get(format!(
        "/auth?account={}&home_domain=evil.example",
        keypair(1).address()
    ))
    .body(Body::empty())
    .unwrap();
    let (status, _, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_health() {
    let app = app(FakeHorizon::default(), true);
    let request = Request::get("/health").body(Body::empty()).unwrap();

    let (status, body, headers) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert!(headers.contains_key("x-request-id"));
}
