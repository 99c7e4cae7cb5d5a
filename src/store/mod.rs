use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

mod memory;
pub mod models;
mod pg;

pub use memory::MemoryRepository;
pub use models::*;
pub use pg::PgRepository;

pub const DUPLICATE_CONTRIBUTOR: &str = "This user is already a contributor";
pub const DUPLICATE_EMAIL: &str = "A user with that email already exists";

#[derive(Debug, Error)]
pub enum RepoError {
    /// A uniqueness constraint rejected the write.
    #[error("{0}")]
    Conflict(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type RepoResult<T> = Result<T, RepoError>;

/// Persistent storage for accounts, projects and their children.
///
/// Deletes cascade: a project takes its contributors and issues with it, an
/// issue takes its comments, and a user takes everything that references it.
/// Each cascade is applied atomically.
#[async_trait]
pub trait Repository: Send + Sync {
    async fn create_user(&self, new: NewUser) -> RepoResult<User>;
    async fn get_user(&self, id: Uuid) -> RepoResult<Option<User>>;
    async fn find_user_by_email(&self, email: &str) -> RepoResult<Option<User>>;
    async fn list_users(&self) -> RepoResult<Vec<User>>;
    /// Users among `ids`, in no particular order; unknown ids are skipped.
    async fn list_users_by_ids(&self, ids: &[Uuid]) -> RepoResult<Vec<User>>;
    async fn update_user(&self, id: Uuid, changes: UserChanges) -> RepoResult<Option<User>>;
    async fn set_password(&self, id: Uuid, password_hash: &str) -> RepoResult<bool>;
    async fn delete_user(&self, id: Uuid) -> RepoResult<bool>;

    async fn create_project(&self, new: NewProject) -> RepoResult<Project>;
    async fn get_project(&self, id: Uuid) -> RepoResult<Option<Project>>;
    /// Projects the user authored or contributes to, newest first.
    async fn list_projects_for_user(&self, user_id: Uuid) -> RepoResult<Vec<Project>>;
    async fn update_project(&self, id: Uuid, changes: ProjectChanges) -> RepoResult<Option<Project>>;
    async fn delete_project(&self, id: Uuid) -> RepoResult<bool>;

    /// Fails with `RepoError::Conflict` when the (user, project) pair exists.
    async fn create_contributor(&self, new: NewContributor) -> RepoResult<Contributor>;
    async fn get_contributor(&self, id: Uuid) -> RepoResult<Option<Contributor>>;
    async fn find_contributor(&self, project_id: Uuid, user_id: Uuid) -> RepoResult<Option<Contributor>>;
    async fn list_contributors(&self, project_id: Uuid) -> RepoResult<Vec<Contributor>>;
    async fn delete_contributor(&self, id: Uuid) -> RepoResult<bool>;

    async fn create_issue(&self, new: NewIssue) -> RepoResult<Issue>;
    async fn get_issue(&self, id: Uuid) -> RepoResult<Option<Issue>>;
    async fn list_issues(&self, project_id: Uuid) -> RepoResult<Vec<Issue>>;
    async fn update_issue(&self, id: Uuid, changes: IssueChanges) -> RepoResult<Option<Issue>>;
    async fn delete_issue(&self, id: Uuid) -> RepoResult<bool>;

    async fn create_comment(&self, new: NewComment) -> RepoResult<Comment>;
    async fn get_comment(&self, id: Uuid) -> RepoResult<Option<Comment>>;
    async fn list_comments(&self, issue_id: Uuid) -> RepoResult<Vec<Comment>>;
    async fn update_comment(&self, id: Uuid, changes: CommentChanges) -> RepoResult<Option<Comment>>;
    async fn delete_comment(&self, id: Uuid) -> RepoResult<bool>;

    /// Adds a token id to the revocation list. Returns `false` when it was
    /// already revoked.
    async fn revoke_token(&self, jti: Uuid, user_id: Uuid, expires_at: OffsetDateTime) -> RepoResult<bool>;
    async fn is_token_revoked(&self, jti: Uuid) -> RepoResult<bool>;
    /// Drops revocations whose token has expired by `now`; an expired token
    /// fails verification on its own. Returns the number removed.
    async fn purge_expired_revocations(&self, now: OffsetDateTime) -> RepoResult<u64>;

    async fn is_contributor(&self, project_id: Uuid, user_id: Uuid) -> RepoResult<bool> {
        Ok(self.find_contributor(project_id, user_id).await?.is_some())
    }
}
