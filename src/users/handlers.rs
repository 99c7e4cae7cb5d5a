use axum::{
    extract::State,
    http::StatusCode,
    routing::{delete, get, put},
    Json, Router,
};
use tracing::instrument;
use uuid::Uuid;

use super::{
    dto::{DeleteUserRequest, DetailResponse, PublicUser, UpdatePasswordRequest, UpdateUserRequest},
    services,
};
use crate::{
    auth::CurrentUser,
    error::ApiError,
    extract::{ApiJson, ApiPath},
    state::AppState,
};

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users/", get(list_users))
        .route("/users/:id/", get(get_user).put(update_user))
        .route("/users/:id/new-password/", put(update_password))
        .route("/users/:id/delete-user/", delete(delete_user))
}

#[instrument(skip(state, actor), fields(user_id = %actor.id))]
pub async fn list_users(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
) -> Result<Json<Vec<PublicUser>>, ApiError> {
    let users = services::list_users(state.repo.as_ref(), &actor).await?;
    Ok(Json(users.into_iter().map(PublicUser::from).collect()))
}

#[instrument(skip(state, actor), fields(user_id = %actor.id))]
pub async fn get_user(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<PublicUser>, ApiError> {
    let user = services::get_user(state.repo.as_ref(), &actor, id).await?;
    Ok(Json(user.into()))
}

#[instrument(skip(state, actor, payload), fields(user_id = %actor.id))]
pub async fn update_user(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    ApiPath(id): ApiPath<Uuid>,
    payload: Result<ApiJson<UpdateUserRequest>, ApiError>,
) -> Result<Json<PublicUser>, ApiError> {
    let req = payload.map(ApiJson::into_inner);
    let user = services::update_user(state.repo.as_ref(), &actor, id, req).await?;
    Ok(Json(user.into()))
}

#[instrument(skip(state, actor, payload), fields(user_id = %actor.id))]
pub async fn update_password(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    ApiPath(id): ApiPath<Uuid>,
    payload: Result<ApiJson<UpdatePasswordRequest>, ApiError>,
) -> Result<Json<DetailResponse>, ApiError> {
    let req = payload.map(ApiJson::into_inner);
    services::update_password(state.repo.as_ref(), &actor, id, req).await?;
    Ok(Json(DetailResponse {
        detail: "Password updated successfully",
    }))
}

#[instrument(skip(state, actor, payload), fields(user_id = %actor.id))]
pub async fn delete_user(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    ApiPath(id): ApiPath<Uuid>,
    payload: Result<ApiJson<DeleteUserRequest>, ApiError>,
) -> Result<StatusCode, ApiError> {
    let req = payload.map(ApiJson::into_inner);
    services::delete_user(state.repo.as_ref(), &actor, id, req).await?;
    Ok(StatusCode::NO_CONTENT)
}
