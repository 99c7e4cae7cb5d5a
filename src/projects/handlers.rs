use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use tracing::instrument;
use uuid::Uuid;

use super::{
    dto::{PatchProjectRequest, ProjectRequest},
    services,
};
use crate::{
    auth::CurrentUser,
    error::ApiError,
    extract::{ApiJson, ApiPath},
    state::AppState,
    store::Project,
};

pub fn project_routes() -> Router<AppState> {
    Router::new()
        .route("/projects/", get(list_projects).post(create_project))
        .route(
            "/projects/:project_id/",
            get(get_project)
                .put(replace_project)
                .patch(patch_project)
                .delete(delete_project),
        )
}

#[instrument(skip(state, actor), fields(user_id = %actor.id))]
pub async fn list_projects(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
) -> Result<Json<Vec<Project>>, ApiError> {
    Ok(Json(services::list_projects(state.repo.as_ref(), &actor).await?))
}

#[instrument(skip(state, actor, payload), fields(user_id = %actor.id))]
pub async fn create_project(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    ApiJson(payload): ApiJson<ProjectRequest>,
) -> Result<(StatusCode, Json<Project>), ApiError> {
    let project = services::create_project(state.repo.as_ref(), &actor, payload).await?;
    Ok((StatusCode::CREATED, Json(project)))
}

#[instrument(skip(state, actor), fields(user_id = %actor.id))]
pub async fn get_project(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    ApiPath(project_id): ApiPath<Uuid>,
) -> Result<Json<Project>, ApiError> {
    Ok(Json(services::get_project(state.repo.as_ref(), &actor, project_id).await?))
}

#[instrument(skip(state, actor, payload), fields(user_id = %actor.id))]
pub async fn replace_project(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    ApiPath(project_id): ApiPath<Uuid>,
    payload: Result<ApiJson<ProjectRequest>, ApiError>,
) -> Result<Json<Project>, ApiError> {
    let patch = payload.map(|ApiJson(full)| PatchProjectRequest::from(full));
    let project = services::update_project(state.repo.as_ref(), &actor, project_id, patch).await?;
    Ok(Json(project))
}

#[instrument(skip(state, actor, payload), fields(user_id = %actor.id))]
pub async fn patch_project(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    ApiPath(project_id): ApiPath<Uuid>,
    payload: Result<ApiJson<PatchProjectRequest>, ApiError>,
) -> Result<Json<Project>, ApiError> {
    let patch = payload.map(ApiJson::into_inner);
    let project = services::update_project(state.repo.as_ref(), &actor, project_id, patch).await?;
    Ok(Json(project))
}

#[instrument(skip(state, actor), fields(user_id = %actor.id))]
pub async fn delete_project(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    ApiPath(project_id): ApiPath<Uuid>,
) -> Result<StatusCode, ApiError> {
    services::delete_project(state.repo.as_ref(), &actor, project_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
