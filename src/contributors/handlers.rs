use axum::{
    extract::State,
    http::StatusCode,
    routing::{delete, get},
    Json, Router,
};
use tracing::instrument;
use uuid::Uuid;

use super::{
    dto::{AddContributorRequest, ContributorResponse},
    services,
};
use crate::{
    auth::CurrentUser,
    error::ApiError,
    extract::{ApiJson, ApiPath},
    state::AppState,
};

pub fn contributor_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/projects/:project_id/users/",
            get(list_contributors).post(add_contributor),
        )
        .route(
            "/projects/:project_id/users/:contributor_id/",
            delete(remove_contributor),
        )
}

#[instrument(skip(state, actor), fields(user_id = %actor.id))]
pub async fn list_contributors(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    ApiPath(project_id): ApiPath<Uuid>,
) -> Result<Json<Vec<ContributorResponse>>, ApiError> {
    let repo = state.repo.as_ref();
    let rows = services::list_contributors(repo, &actor, project_id).await?;
    Ok(Json(services::present(repo, rows).await?))
}

#[instrument(skip(state, actor, payload), fields(user_id = %actor.id))]
pub async fn add_contributor(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    ApiPath(project_id): ApiPath<Uuid>,
    payload: Result<ApiJson<AddContributorRequest>, ApiError>,
) -> Result<(StatusCode, Json<ContributorResponse>), ApiError> {
    let repo = state.repo.as_ref();
    let req = payload.map(ApiJson::into_inner);
    let row = services::add_contributor(repo, &actor, project_id, req).await?;
    let shown = services::present_one(repo, row).await?;
    Ok((StatusCode::CREATED, Json(shown)))
}

#[instrument(skip(state, actor), fields(user_id = %actor.id))]
pub async fn remove_contributor(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    ApiPath((project_id, contributor_id)): ApiPath<(Uuid, Uuid)>,
) -> Result<StatusCode, ApiError> {
    services::remove_contributor(state.repo.as_ref(), &actor, project_id, contributor_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
