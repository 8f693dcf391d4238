//! Web authentication HTTP handlers

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    Json,
};
use validator::Validate;

use super::body::JsonOrForm;
use crate::error::{ApiError, ApiResult};
use crate::models::{ChallengeQuery, ChallengeResponse, TokenRequest, TokenResponse};
use crate::state::AppState;

/// GET /auth - Issue a challenge transaction for an account
pub async fn get_challenge(
    State(state): State<AppState>,
    query: Result<Query<ChallengeQuery>, QueryRejection>,
) -> ApiResult<Json<ChallengeResponse>> {
    let Query(query) = query.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    query.validate()?;

    let challenge = state
        .auth_service
        .generate_challenge(&query.account, query.home_domain.as_deref())?;

    Ok(Json(ChallengeResponse {
        transaction: challenge.transaction,
        network_passphrase: challenge.network_passphrase,
    }))
}

/// POST /auth - Exchange a signed challenge for a token
pub async fn exchange_token(
    State(state): State<AppState>,
    JsonOrForm(req): JsonOrForm<TokenRequest>,
) -> ApiResult<Json<TokenResponse>> {
    req.validate()?;

    let token = state
        .auth_service
        .exchange_challenge(&req.transaction)
        .await?;

    Ok(Json(TokenResponse { token }))
}
