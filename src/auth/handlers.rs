use axum::{
    extract::{FromRef, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use tracing::instrument;

use super::{
    dto::{AuthResponse, LoginRequest, RefreshRequest, SignupRequest},
    extractors::CurrentUser,
    jwt::JwtKeys,
    services,
};
use crate::{error::ApiError, extract::ApiJson, state::AppState};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/signup/", post(signup))
        .route("/login/", post(login))
        .route("/refresh/", post(refresh))
        .route("/logout/", post(logout))
}

#[instrument(skip(state, payload))]
pub async fn signup(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<SignupRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), ApiError> {
    let keys = JwtKeys::from_ref(&state);
    let res = services::signup(state.repo.as_ref(), &keys, payload).await?;
    Ok((StatusCode::CREATED, Json(res)))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<LoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let keys = JwtKeys::from_ref(&state);
    let res = services::login(state.repo.as_ref(), &keys, payload).await?;
    Ok(Json(res))
}

#[instrument(skip(state, payload))]
pub async fn refresh(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<RefreshRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let keys = JwtKeys::from_ref(&state);
    let res = services::refresh(state.repo.as_ref(), &keys, &payload.refresh).await?;
    Ok(Json(res))
}

#[instrument(skip(state, actor, payload), fields(user_id = %actor.id))]
pub async fn logout(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    ApiJson(payload): ApiJson<RefreshRequest>,
) -> Result<StatusCode, ApiError> {
    let keys = JwtKeys::from_ref(&state);
    services::logout(state.repo.as_ref(), &keys, &actor, &payload.refresh).await?;
    Ok(StatusCode::NO_CONTENT)
}
