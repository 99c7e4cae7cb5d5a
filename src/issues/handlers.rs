use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use tracing::instrument;
use uuid::Uuid;

use super::{
    dto::{IssueRequest, IssueResponse},
    services,
};
use crate::{
    auth::CurrentUser,
    error::ApiError,
    extract::{ApiJson, ApiPath},
    state::AppState,
};

pub fn issue_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/projects/:project_id/issues/",
            get(list_issues).post(create_issue),
        )
        .route(
            "/projects/:project_id/issues/:issue_id/",
            get(get_issue).put(update_issue).delete(delete_issue),
        )
}

#[instrument(skip(state, actor), fields(user_id = %actor.id))]
pub async fn list_issues(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    ApiPath(project_id): ApiPath<Uuid>,
) -> Result<Json<Vec<IssueResponse>>, ApiError> {
    let repo = state.repo.as_ref();
    let issues = services::list_issues(repo, &actor, project_id).await?;
    Ok(Json(services::present(repo, issues).await?))
}

#[instrument(skip(state, actor, payload), fields(user_id = %actor.id))]
pub async fn create_issue(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    ApiPath(project_id): ApiPath<Uuid>,
    payload: Result<ApiJson<IssueRequest>, ApiError>,
) -> Result<(StatusCode, Json<IssueResponse>), ApiError> {
    let repo = state.repo.as_ref();
    let req = payload.map(ApiJson::into_inner);
    let issue = services::create_issue(repo, &actor, project_id, req).await?;
    Ok((StatusCode::CREATED, Json(services::present_one(repo, issue).await?)))
}

#[instrument(skip(state, actor), fields(user_id = %actor.id))]
pub async fn get_issue(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    ApiPath((project_id, issue_id)): ApiPath<(Uuid, Uuid)>,
) -> Result<Json<IssueResponse>, ApiError> {
    let repo = state.repo.as_ref();
    let issue = services::get_issue(repo, &actor, project_id, issue_id).await?;
    Ok(Json(services::present_one(repo, issue).await?))
}

#[instrument(skip(state, actor, payload), fields(user_id = %actor.id))]
pub async fn update_issue(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    ApiPath((project_id, issue_id)): ApiPath<(Uuid, Uuid)>,
    payload: Result<ApiJson<IssueRequest>, ApiError>,
) -> Result<Json<IssueResponse>, ApiError> {
    let repo = state.repo.as_ref();
    let req = payload.map(ApiJson::into_inner);
    let issue = services::update_issue(repo, &actor, project_id, issue_id, req).await?;
    Ok(Json(services::present_one(repo, issue).await?))
}

#[instrument(skip(state, actor), fields(user_id = %actor.id))]
pub async fn delete_issue(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    ApiPath((project_id, issue_id)): ApiPath<(Uuid, Uuid)>,
) -> Result<StatusCode, ApiError> {
    services::delete_issue(state.repo.as_ref(), &actor, project_id, issue_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
