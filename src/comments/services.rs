use tracing::{info, warn};
use uuid::Uuid;

use super::dto::{CommentRequest, CommentResponse};
use crate::{
    error::ApiError,
    extract::Body,
    issues::services::resolve_issue,
    policy::{can_access_comment, ensure, Method, ProjectAccess},
    projects::services::{membership, resolve_project},
    store::{Comment, CommentChanges, Issue, NewComment, Project, Repository, User},
    users::services::UserDirectory,
};

/// Path ids of a comment's parents.
#[derive(Debug, Clone, Copy)]
pub struct Thread {
    pub project_id: Uuid,
    pub issue_id: Uuid,
}

async fn resolve_thread(repo: &dyn Repository, thread: Thread) -> Result<(Project, Issue), ApiError> {
    let project = resolve_project(repo, thread.project_id).await?;
    let issue = resolve_issue(repo, &project, thread.issue_id).await?;
    Ok((project, issue))
}

async fn resolve_comment(repo: &dyn Repository, issue: &Issue, id: Uuid) -> Result<Comment, ApiError> {
    repo.get_comment(id)
        .await?
        .filter(|c| c.issue_id == issue.id)
        .ok_or_else(|| ApiError::not_found("Comment"))
}

async fn authorize(
    repo: &dyn Repository,
    actor: &User,
    project: &Project,
    method: Method,
    comment: Option<&Comment>,
) -> Result<(), ApiError> {
    let is_contributor = membership(repo, project, actor).await?;
    ensure(can_access_comment(
        actor,
        ProjectAccess::new(project, is_contributor),
        method,
        comment,
    ))
    .inspect_err(|_| {
        warn!(
            project_id = %project.id,
            comment_id = ?comment.map(|c| c.id),
            user_id = %actor.id,
            ?method,
            "comment access denied"
        )
    })
}

pub async fn list_comments(
    repo: &dyn Repository,
    actor: &User,
    thread: Thread,
) -> Result<Vec<Comment>, ApiError> {
    let (project, issue) = resolve_thread(repo, thread).await?;
    authorize(repo, actor, &project, Method::Read, None).await?;
    Ok(repo.list_comments(issue.id).await?)
}

pub async fn create_comment(
    repo: &dyn Repository,
    actor: &User,
    thread: Thread,
    req: Body<CommentRequest>,
) -> Result<Comment, ApiError> {
    let (project, issue) = resolve_thread(repo, thread).await?;
    authorize(repo, actor, &project, Method::Create, None).await?;
    let description = req?.description()?;

    let comment = repo
        .create_comment(NewComment {
            description,
            issue_id: issue.id,
            author_id: actor.id,
        })
        .await?;
    info!(issue_id = %issue.id, comment_id = %comment.id, author_id = %actor.id, "comment created");
    Ok(comment)
}

pub async fn get_comment(
    repo: &dyn Repository,
    actor: &User,
    thread: Thread,
    comment_id: Uuid,
) -> Result<Comment, ApiError> {
    let (project, issue) = resolve_thread(repo, thread).await?;
    let comment = resolve_comment(repo, &issue, comment_id).await?;
    authorize(repo, actor, &project, Method::Read, Some(&comment)).await?;
    Ok(comment)
}

pub async fn update_comment(
    repo: &dyn Repository,
    actor: &User,
    thread: Thread,
    comment_id: Uuid,
    req: Body<CommentRequest>,
) -> Result<Comment, ApiError> {
    let (project, issue) = resolve_thread(repo, thread).await?;
    let comment = resolve_comment(repo, &issue, comment_id).await?;
    authorize(repo, actor, &project, Method::Update, Some(&comment)).await?;

    let changes = CommentChanges {
        description: Some(req?.description()?),
    };
    let updated = repo
        .update_comment(comment.id, changes)
        .await?
        .ok_or_else(|| ApiError::not_found("Comment"))?;
    info!(comment_id = %updated.id, user_id = %actor.id, "comment updated");
    Ok(updated)
}

/// Embeds author profiles.
pub async fn present(repo: &dyn Repository, comments: Vec<Comment>) -> Result<Vec<CommentResponse>, ApiError> {
    let users = UserDirectory::load(repo, comments.iter().map(|c| c.author_id)).await?;
    comments
        .into_iter()
        .map(|comment| {
            let author = users.get(comment.author_id)?;
            Ok(CommentResponse::new(comment, author))
        })
        .collect()
}

pub async fn present_one(repo: &dyn Repository, comment: Comment) -> Result<CommentResponse, ApiError> {
    let author = UserDirectory::load(repo, [comment.author_id]).await?.get(comment.author_id)?;
    Ok(CommentResponse::new(comment, author))
}

pub async fn delete_comment(
    repo: &dyn Repository,
    actor: &User,
    thread: Thread,
    comment_id: Uuid,
) -> Result<(), ApiError> {
    let (project, issue) = resolve_thread(repo, thread).await?;
    let comment = resolve_comment(repo, &issue, comment_id).await?;
    authorize(repo, actor, &project, Method::Delete, Some(&comment)).await?;

    if !repo.delete_comment(comment.id).await? {
        return Err(ApiError::not_found("Comment"));
    }
    info!(comment_id = %comment.id, user_id = %actor.id, "comment deleted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contributors::{dto::AddContributorRequest, services::add_contributor};
    use crate::issues::services::{create_issue, get_issue, list_issues, testing::issue_req};
    use crate::projects::services::{delete_project, testing::*};
    use crate::state::AppState;

    fn say(text: &str) -> Body<CommentRequest> {
        Ok(CommentRequest {
            description: text.into(),
        })
    }

    #[tokio::test]
    async fn alpha_scenario() {
        let state = AppState::fake();
        let repo = state.repo.as_ref();
        let a = user(repo, "a@example.com").await;
        let b = user(repo, "b@example.com").await;
        let c = user(repo, "c@example.com").await;
        let alpha = project(repo, &a, "Alpha").await;

        add_contributor(
            repo,
            &a,
            alpha.id,
            Ok(AddContributorRequest {
                user: b.id,
                role: "tester".into(),
            }),
        )
        .await
        .unwrap();

        let issue = create_issue(repo, &b, alpha.id, Ok(issue_req("crash"))).await.unwrap();
        assert_eq!(issue.assignee_id, a.id);
        let thread = Thread {
            project_id: alpha.id,
            issue_id: issue.id,
        };
        let comment = create_comment(repo, &b, thread, say("repro attached")).await.unwrap();
        assert_eq!(comment.author_id, b.id);

        assert!(matches!(list_issues(repo, &c, alpha.id).await, Err(ApiError::Forbidden(_))));

        delete_project(repo, &a, alpha.id).await.unwrap();
        assert!(matches!(
            get_issue(repo, &a, alpha.id, issue.id).await,
            Err(ApiError::NotFound(_))
        ));
        assert!(matches!(
            get_comment(repo, &a, thread, comment.id).await,
            Err(ApiError::NotFound(_))
        ));
        assert!(repo.get_comment(comment.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn only_comment_author_or_superuser_may_change_it() {
        let state = AppState::fake();
        let repo = state.repo.as_ref();
        let a = user(repo, "a@example.com").await;
        let b = user(repo, "b@example.com").await;
        let root = superuser(repo, "root@example.com").await;
        let p = project(repo, &a, "Alpha").await;
        join(repo, &p, &b).await;
        let issue = create_issue(repo, &a, p.id, Ok(issue_req("crash"))).await.unwrap();
        let thread = Thread {
            project_id: p.id,
            issue_id: issue.id,
        };
        let comment = create_comment(repo, &b, thread, say("me too")).await.unwrap();

        assert!(matches!(
            update_comment(repo, &a, thread, comment.id, say("edited")).await,
            Err(ApiError::Forbidden(_))
        ));
        let edited = update_comment(repo, &b, thread, comment.id, say("me too, on 1.2"))
            .await
            .unwrap();
        assert_eq!(edited.description, "me too, on 1.2");

        assert!(matches!(
            delete_comment(repo, &a, thread, comment.id).await,
            Err(ApiError::Forbidden(_))
        ));
        delete_comment(repo, &root, thread, comment.id).await.unwrap();
        assert!(list_comments(repo, &a, thread).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn comment_under_another_issue_is_not_found() {
        let state = AppState::fake();
        let repo = state.repo.as_ref();
        let a = user(repo, "a@example.com").await;
        let p = project(repo, &a, "Alpha").await;
        let first = create_issue(repo, &a, p.id, Ok(issue_req("one"))).await.unwrap();
        let second = create_issue(repo, &a, p.id, Ok(issue_req("two"))).await.unwrap();
        let on_first = Thread {
            project_id: p.id,
            issue_id: first.id,
        };
        let on_second = Thread {
            project_id: p.id,
            issue_id: second.id,
        };
        let comment = create_comment(repo, &a, on_first, say("hi")).await.unwrap();

        assert!(matches!(
            get_comment(repo, &a, on_second, comment.id).await,
            Err(ApiError::NotFound(_))
        ));
        assert!(matches!(
            create_comment(repo, &a, on_first, say("   ")).await,
            Err(ApiError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn listing_is_newest_first_with_embedded_authors() {
        let state = AppState::fake();
        let repo = state.repo.as_ref();
        let a = user(repo, "a@example.com").await;
        let b = user(repo, "b@example.com").await;
        let p = project(repo, &a, "Alpha").await;
        join(repo, &p, &b).await;
        let issue = create_issue(repo, &a, p.id, Ok(issue_req("crash"))).await.unwrap();
        let thread = Thread {
            project_id: p.id,
            issue_id: issue.id,
        };
        let older = create_comment(repo, &a, thread, say("first")).await.unwrap();
        let newer = create_comment(repo, &b, thread, say("second")).await.unwrap();

        let comments = list_comments(repo, &b, thread).await.unwrap();
        let ids: Vec<Uuid> = comments.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![newer.id, older.id]);

        let shown = present(repo, comments).await.unwrap();
        assert_eq!(shown[0].author.email, "b@example.com");
        assert_eq!(shown[1].author.id, a.id);
    }

    #[tokio::test]
    async fn missing_issue_wins_over_unreadable_body() {
        let state = AppState::fake();
        let repo = state.repo.as_ref();
        let a = user(repo, "a@example.com").await;
        let p = project(repo, &a, "Alpha").await;
        let lost = Thread {
            project_id: p.id,
            issue_id: Uuid::new_v4(),
        };

        let unreadable = Err(ApiError::Validation("missing field `description`".into()));
        assert!(matches!(
            create_comment(repo, &a, lost, unreadable).await,
            Err(ApiError::NotFound(_))
        ));
    }
}
