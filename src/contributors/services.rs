use tracing::{info, warn};
use uuid::Uuid;

use super::dto::{AddContributorRequest, ContributorResponse};
use crate::{
    error::ApiError,
    extract::Body,
    policy::{can_access_contributor_list, check_add_contributor, ensure, Method, ProjectAccess},
    projects::services::{membership, resolve_project},
    store::{Contributor, NewContributor, Project, Repository, User},
    users::services::UserDirectory,
    validate::{required, SHORT_TEXT},
};

async fn authorize(
    repo: &dyn Repository,
    actor: &User,
    project: &Project,
    method: Method,
) -> Result<(), ApiError> {
    let is_contributor = membership(repo, project, actor).await?;
    ensure(can_access_contributor_list(
        actor,
        ProjectAccess::new(project, is_contributor),
        method,
    ))
    .inspect_err(|_| {
        warn!(project_id = %project.id, user_id = %actor.id, ?method, "contributor access denied")
    })
}

pub async fn list_contributors(
    repo: &dyn Repository,
    actor: &User,
    project_id: Uuid,
) -> Result<Vec<Contributor>, ApiError> {
    let project = resolve_project(repo, project_id).await?;
    authorize(repo, actor, &project, Method::Read).await?;
    Ok(repo.list_contributors(project.id).await?)
}

pub async fn add_contributor(
    repo: &dyn Repository,
    actor: &User,
    project_id: Uuid,
    req: Body<AddContributorRequest>,
) -> Result<Contributor, ApiError> {
    let project = resolve_project(repo, project_id).await?;
    authorize(repo, actor, &project, Method::Create).await?;
    let req = req?;

    let candidate = repo
        .get_user(req.user)
        .await?
        .ok_or_else(|| ApiError::not_found("User"))?;
    let role = required("role", &req.role, SHORT_TEXT)?;

    let existing = repo.find_contributor(project.id, candidate.id).await?;
    check_add_contributor(&project, &candidate, existing.is_some())?;

    // a concurrent insert of the same pair still lands as a Conflict here
    let contributor = repo
        .create_contributor(NewContributor {
            user_id: candidate.id,
            project_id: project.id,
            role,
        })
        .await?;
    info!(
        project_id = %project.id,
        contributor_id = %contributor.id,
        user_id = %candidate.id,
        "contributor added"
    );
    Ok(contributor)
}

/// Embeds each row's user profile.
pub async fn present(
    repo: &dyn Repository,
    rows: Vec<Contributor>,
) -> Result<Vec<ContributorResponse>, ApiError> {
    let users = UserDirectory::load(repo, rows.iter().map(|c| c.user_id)).await?;
    rows.into_iter()
        .map(|row| {
            let user = users.get(row.user_id)?;
            Ok(ContributorResponse::new(row, user))
        })
        .collect()
}

pub async fn present_one(repo: &dyn Repository, row: Contributor) -> Result<ContributorResponse, ApiError> {
    let user = UserDirectory::load(repo, [row.user_id]).await?.get(row.user_id)?;
    Ok(ContributorResponse::new(row, user))
}

/// `contributor_id` is the contributor record, not the user.
pub async fn remove_contributor(
    repo: &dyn Repository,
    actor: &User,
    project_id: Uuid,
    contributor_id: Uuid,
) -> Result<(), ApiError> {
    let project = resolve_project(repo, project_id).await?;
    let contributor = repo
        .get_contributor(contributor_id)
        .await?
        .filter(|c| c.project_id == project.id)
        .ok_or_else(|| ApiError::not_found("Contributor"))?;
    authorize(repo, actor, &project, Method::Delete).await?;

    if !repo.delete_contributor(contributor.id).await? {
        return Err(ApiError::not_found("Contributor"));
    }
    info!(
        project_id = %project.id,
        contributor_id = %contributor.id,
        user_id = %contributor.user_id,
        "contributor removed"
    );
    Ok(())
}
