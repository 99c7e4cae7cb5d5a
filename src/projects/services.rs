use tracing::{info, warn};
use uuid::Uuid;

use super::dto::{PatchProjectRequest, ProjectRequest};
use crate::{
    error::ApiError,
    extract::Body,
    policy::{can_access_project, ensure, Method, ProjectAccess},
    store::{Project, Repository, User},
};

/// Loads a project by path id.
pub(crate) async fn resolve_project(repo: &dyn Repository, id: Uuid) -> Result<Project, ApiError> {
    repo.get_project(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Project"))
}

/// Whether `actor` has a contributor row on `project`.
pub(crate) async fn membership(
    repo: &dyn Repository,
    project: &Project,
    actor: &User,
) -> Result<bool, ApiError> {
    if project.author_id == actor.id {
        return Ok(false);
    }
    Ok(repo.is_contributor(project.id, actor.id).await?)
}

pub async fn list_projects(repo: &dyn Repository, actor: &User) -> Result<Vec<Project>, ApiError> {
    Ok(repo.list_projects_for_user(actor.id).await?)
}

pub async fn create_project(
    repo: &dyn Repository,
    actor: &User,
    req: ProjectRequest,
) -> Result<Project, ApiError> {
    let project = repo.create_project(req.into_new(actor.id)?).await?;
    info!(project_id = %project.id, author_id = %actor.id, "project created");
    Ok(project)
}

pub async fn get_project(repo: &dyn Repository, actor: &User, id: Uuid) -> Result<Project, ApiError> {
    let project = resolve_project(repo, id).await?;
    let is_contributor = membership(repo, &project, actor).await?;
    ensure(can_access_project(
        actor,
        ProjectAccess::new(&project, is_contributor),
        Method::Read,
    ))
    .inspect_err(|_| warn!(project_id = %id, user_id = %actor.id, "project read denied"))?;
    Ok(project)
}

pub async fn update_project(
    repo: &dyn Repository,
    actor: &User,
    id: Uuid,
    patch: Body<PatchProjectRequest>,
) -> Result<Project, ApiError> {
    let project = resolve_project(repo, id).await?;
    let is_contributor = membership(repo, &project, actor).await?;
    ensure(can_access_project(
        actor,
        ProjectAccess::new(&project, is_contributor),
        Method::Update,
    ))
    .inspect_err(|_| warn!(project_id = %id, user_id = %actor.id, "project update denied"))?;

    let changes = patch?.into_changes()?;
    let updated = repo
        .update_project(project.id, changes)
        .await?
        .ok_or_else(|| ApiError::not_found("Project"))?;
    info!(project_id = %updated.id, user_id = %actor.id, "project updated");
    Ok(updated)
}

/// Removes the project with its contributors, issues and comments.
pub async fn delete_project(repo: &dyn Repository, actor: &User, id: Uuid) -> Result<(), ApiError> {
    let project = resolve_project(repo, id).await?;
    let is_contributor = membership(repo, &project, actor).await?;
    ensure(can_access_project(
        actor,
        ProjectAccess::new(&project, is_contributor),
        Method::Delete,
    ))
    .inspect_err(|_| warn!(project_id = %id, user_id = %actor.id, "project delete denied"))?;

    if !repo.delete_project(project.id).await? {
        return Err(ApiError::not_found("Project"));
    }
    info!(project_id = %project.id, user_id = %actor.id, "project deleted");
    Ok(())
}
