use tracing::{info, warn};
use uuid::Uuid;

use super::dto::{IssueRequest, IssueResponse};
use crate::{
    error::ApiError,
    extract::Body,
    policy::{can_access_issue, ensure, Method, ProjectAccess},
    projects::services::{membership, resolve_project},
    store::{Issue, Project, Repository, User},
    users::services::UserDirectory,
};

/// Loads an issue and checks it belongs to `project`.
pub(crate) async fn resolve_issue(
    repo: &dyn Repository,
    project: &Project,
    id: Uuid,
) -> Result<Issue, ApiError> {
    repo.get_issue(id)
        .await?
        .filter(|i| i.project_id == project.id)
        .ok_or_else(|| ApiError::not_found("Issue"))
}

async fn authorize(
    repo: &dyn Repository,
    actor: &User,
    project: &Project,
    method: Method,
    issue: Option<&Issue>,
) -> Result<(), ApiError> {
    let is_contributor = membership(repo, project, actor).await?;
    ensure(can_access_issue(
        actor,
        ProjectAccess::new(project, is_contributor),
        method,
        issue,
    ))
    .inspect_err(|_| {
        warn!(
            project_id = %project.id,
            issue_id = ?issue.map(|i| i.id),
            user_id = %actor.id,
            ?method,
            "issue access denied"
        )
    })
}

pub async fn list_issues(
    repo: &dyn Repository,
    actor: &User,
    project_id: Uuid,
) -> Result<Vec<Issue>, ApiError> {
    let project = resolve_project(repo, project_id).await?;
    authorize(repo, actor, &project, Method::Read, None).await?;
    Ok(repo.list_issues(project.id).await?)
}

pub async fn create_issue(
    repo: &dyn Repository,
    actor: &User,
    project_id: Uuid,
    req: Body<IssueRequest>,
) -> Result<Issue, ApiError> {
    let project = resolve_project(repo, project_id).await?;
    authorize(repo, actor, &project, Method::Create, None).await?;

    let new = req?.into_new(project.id, actor.id, project.author_id)?;
    let issue = repo.create_issue(new).await?;
    info!(project_id = %project.id, issue_id = %issue.id, author_id = %actor.id, "issue created");
    Ok(issue)
}

pub async fn get_issue(
    repo: &dyn Repository,
    actor: &User,
    project_id: Uuid,
    issue_id: Uuid,
) -> Result<Issue, ApiError> {
    let project = resolve_project(repo, project_id).await?;
    let issue = resolve_issue(repo, &project, issue_id).await?;
    authorize(repo, actor, &project, Method::Read, Some(&issue)).await?;
    Ok(issue)
}

pub async fn update_issue(
    repo: &dyn Repository,
    actor: &User,
    project_id: Uuid,
    issue_id: Uuid,
    req: Body<IssueRequest>,
) -> Result<Issue, ApiError> {
    let project = resolve_project(repo, project_id).await?;
    let issue = resolve_issue(repo, &project, issue_id).await?;
    authorize(repo, actor, &project, Method::Update, Some(&issue)).await?;

    let changes = req?.into_changes()?;
    if let Some(assignee) = changes.assignee_id {
        let allowed = assignee == project.author_id || repo.is_contributor(project.id, assignee).await?;
        if !allowed {
            warn!(issue_id = %issue.id, assignee_id = %assignee, "assignee outside project");
            return Err(ApiError::Validation(
                "The assignee must be the project author or a contributor".into(),
            ));
        }
    }

    let updated = repo
        .update_issue(issue.id, changes)
        .await?
        .ok_or_else(|| ApiError::not_found("Issue"))?;
    info!(issue_id = %updated.id, user_id = %actor.id, "issue updated");
    Ok(updated)
}

/// Embeds author and assignee profiles.
pub async fn present(repo: &dyn Repository, issues: Vec<Issue>) -> Result<Vec<IssueResponse>, ApiError> {
    let users = UserDirectory::load(
        repo,
        issues.iter().flat_map(|i| [i.author_id, i.assignee_id]),
    )
    .await?;
    issues
        .into_iter()
        .map(|issue| {
            let author = users.get(issue.author_id)?;
            let assignee = users.get(issue.assignee_id)?;
            Ok(IssueResponse::new(issue, author, assignee))
        })
        .collect()
}

pub async fn present_one(repo: &dyn Repository, issue: Issue) -> Result<IssueResponse, ApiError> {
    let users = UserDirectory::load(repo, [issue.author_id, issue.assignee_id]).await?;
    let author = users.get(issue.author_id)?;
    let assignee = users.get(issue.assignee_id)?;
    Ok(IssueResponse::new(issue, author, assignee))
}

/// Removes the issue and its comments.
pub async fn delete_issue(
    repo: &dyn Repository,
    actor: &User,
    project_id: Uuid,
    issue_id: Uuid,
) -> Result<(), ApiError> {
    let project = resolve_project(repo, project_id).await?;
    let issue = resolve_issue(repo, &project, issue_id).await?;
    authorize(repo, actor, &project, Method::Delete, Some(&issue)).await?;

    if !repo.delete_issue(issue.id).await? {
        return Err(ApiError::not_found("Issue"));
    }
    info!(issue_id = %issue.id, user_id = %actor.id, "issue deleted");
    Ok(())
}
