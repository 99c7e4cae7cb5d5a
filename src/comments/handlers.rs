use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use tracing::instrument;
use uuid::Uuid;

use super::{
    dto::{CommentRequest, CommentResponse},
    services::{self, Thread},
};
use crate::{
    auth::CurrentUser,
    error::ApiError,
    extract::{ApiJson, ApiPath},
    state::AppState,
};

pub fn comment_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/projects/:project_id/issues/:issue_id/comments/",
            get(list_comments).post(create_comment),
        )
        .route(
            "/projects/:project_id/issues/:issue_id/comments/:comment_id/",
            get(get_comment).put(update_comment).delete(delete_comment),
        )
}

fn thread(project_id: Uuid, issue_id: Uuid) -> Thread {
    Thread {
        project_id,
        issue_id,
    }
}

#[instrument(skip(state, actor), fields(user_id = %actor.id))]
pub async fn list_comments(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    ApiPath((project_id, issue_id)): ApiPath<(Uuid, Uuid)>,
) -> Result<Json<Vec<CommentResponse>>, ApiError> {
    let repo = state.repo.as_ref();
    let rows = services::list_comments(repo, &actor, thread(project_id, issue_id)).await?;
    Ok(Json(services::present(repo, rows).await?))
}

#[instrument(skip(state, actor, payload), fields(user_id = %actor.id))]
pub async fn create_comment(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    ApiPath((project_id, issue_id)): ApiPath<(Uuid, Uuid)>,
    payload: Result<ApiJson<CommentRequest>, ApiError>,
) -> Result<(StatusCode, Json<CommentResponse>), ApiError> {
    let repo = state.repo.as_ref();
    let req = payload.map(ApiJson::into_inner);
    let comment = services::create_comment(repo, &actor, thread(project_id, issue_id), req).await?;
    Ok((StatusCode::CREATED, Json(services::present_one(repo, comment).await?)))
}

#[instrument(skip(state, actor), fields(user_id = %actor.id))]
pub async fn get_comment(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    ApiPath((project_id, issue_id, comment_id)): ApiPath<(Uuid, Uuid, Uuid)>,
) -> Result<Json<CommentResponse>, ApiError> {
    let repo = state.repo.as_ref();
    let comment =
        services::get_comment(repo, &actor, thread(project_id, issue_id), comment_id).await?;
    Ok(Json(services::present_one(repo, comment).await?))
}

#[instrument(skip(state, actor, payload), fields(user_id = %actor.id))]
pub async fn update_comment(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    ApiPath((project_id, issue_id, comment_id)): ApiPath<(Uuid, Uuid, Uuid)>,
    payload: Result<ApiJson<CommentRequest>, ApiError>,
) -> Result<Json<CommentResponse>, ApiError> {
    let repo = state.repo.as_ref();
    let req = payload.map(ApiJson::into_inner);
    let comment = services::update_comment(
        repo,
        &actor,
        thread(project_id, issue_id),
        comment_id,
        req,
    )
    .await?;
    Ok(Json(services::present_one(repo, comment).await?))
}

#[instrument(skip(state, actor), fields(user_id = %actor.id))]
pub async fn delete_comment(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    ApiPath((project_id, issue_id, comment_id)): ApiPath<(Uuid, Uuid, Uuid)>,
) -> Result<StatusCode, ApiError> {
    services::delete_comment(
        state.repo.as_ref(),
        &actor,
        thread(project_id, issue_id),
        comment_id,
    )
    .await?;
    Ok(StatusCode::NO_CONTENT)
}
