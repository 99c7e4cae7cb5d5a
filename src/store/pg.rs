use anyhow::Context;
use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use super::{
    Comment, CommentChanges, Contributor, Issue, IssueChanges, NewComment, NewContributor,
    NewIssue, NewProject, NewUser, Project, ProjectChanges, RepoError, RepoResult, Repository,
    User, UserChanges, DUPLICATE_CONTRIBUTOR, DUPLICATE_EMAIL,
};

const USER_COLUMNS: &str = "id, email, first_name, last_name, password_hash, is_staff, is_superuser, is_active, created_at";
const PROJECT_COLUMNS: &str = "id, title, description, project_type, author_id, created_time";
const CONTRIBUTOR_COLUMNS: &str = "id, user_id, project_id, role, created_time";
const ISSUE_COLUMNS: &str = "id, title, description, tag, priority, status, project_id, author_id, assignee_id, created_time";
const COMMENT_COLUMNS: &str = "id, description, issue_id, author_id, created_time";

impl From<sqlx::Error> for RepoError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.is_unique_violation() {
                let msg = match db_err.constraint() {
                    Some("contributors_user_project_key") => DUPLICATE_CONTRIBUTOR,
                    Some("users_email_key") => DUPLICATE_EMAIL,
                    _ => "duplicate record",
                };
                return RepoError::Conflict(msg.to_string());
            }
        }
        RepoError::Other(anyhow::Error::new(err))
    }
}

/// PostgreSQL-backed repository. Cascades are enforced by `ON DELETE CASCADE`
/// foreign keys, so every delete is a single atomic statement.
#[derive(Clone)]
pub struct PgRepository {
    pool: PgPool,
}

impl PgRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .context("connect to database")?;
        Ok(Self::new(pool))
    }

    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("run migrations")?;
        Ok(())
    }
}

#[async_trait]
impl Repository for PgRepository {
    async fn create_user(&self, new: NewUser) -> RepoResult<User> {
        let sql = format!(
            r#"
            INSERT INTO users (id, email, first_name, last_name, password_hash, is_staff, is_superuser)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {USER_COLUMNS}
            "#
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(Uuid::new_v4())
            .bind(&new.email)
            .bind(&new.first_name)
            .bind(&new.last_name)
            .bind(&new.password_hash)
            .bind(new.is_staff)
            .bind(new.is_superuser)
            .fetch_one(&self.pool)
            .await?;
        Ok(user)
    }

    async fn get_user(&self, id: Uuid) -> RepoResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn find_user_by_email(&self, email: &str) -> RepoResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn list_users(&self) -> RepoResult<Vec<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users ORDER BY created_at ASC");
        let users = sqlx::query_as::<_, User>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(users)
    }

    async fn list_users_by_ids(&self, ids: &[Uuid]) -> RepoResult<Vec<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ANY($1)");
        let users = sqlx::query_as::<_, User>(&sql)
            .bind(ids)
            .fetch_all(&self.pool)
            .await?;
        Ok(users)
    }

    async fn update_user(&self, id: Uuid, changes: UserChanges) -> RepoResult<Option<User>> {
        let sql = format!(
            r#"
            UPDATE users
               SET email = COALESCE($2, email),
                   first_name = COALESCE($3, first_name),
                   last_name = COALESCE($4, last_name)
             WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .bind(changes.email)
            .bind(changes.first_name)
            .bind(changes.last_name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn set_password(&self, id: Uuid, password_hash: &str) -> RepoResult<bool> {
        let res = sqlx::query("UPDATE users SET password_hash = $2 WHERE id = $1")
            .bind(id)
            .bind(password_hash)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() == 1)
    }

    async fn delete_user(&self, id: Uuid) -> RepoResult<bool> {
        let res = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() == 1)
    }

    async fn create_project(&self, new: NewProject) -> RepoResult<Project> {
        let sql = format!(
            r#"
            INSERT INTO projects (id, title, description, project_type, author_id)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {PROJECT_COLUMNS}
            "#
        );
        let project = sqlx::query_as::<_, Project>(&sql)
            .bind(Uuid::new_v4())
            .bind(&new.title)
            .bind(&new.description)
            .bind(&new.project_type)
            .bind(new.author_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(project)
    }

    async fn get_project(&self, id: Uuid) -> RepoResult<Option<Project>> {
        let sql = format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE id = $1");
        let project = sqlx::query_as::<_, Project>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(project)
    }

    async fn list_projects_for_user(&self, user_id: Uuid) -> RepoResult<Vec<Project>> {
        let sql = format!(
            r#"
            SELECT {PROJECT_COLUMNS}
              FROM projects p
             WHERE p.author_id = $1
                OR EXISTS (
                    SELECT 1 FROM contributors c
                     WHERE c.project_id = p.id AND c.user_id = $1
                )
             ORDER BY p.created_time DESC
            "#
        );
        let projects = sqlx::query_as::<_, Project>(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(projects)
    }

    async fn update_project(&self, id: Uuid, changes: ProjectChanges) -> RepoResult<Option<Project>> {
        let sql = format!(
            r#"
            UPDATE projects
               SET title = COALESCE($2, title),
                   description = COALESCE($3, description),
                   project_type = COALESCE($4, project_type)
             WHERE id = $1
            RETURNING {PROJECT_COLUMNS}
            "#
        );
        let project = sqlx::query_as::<_, Project>(&sql)
            .bind(id)
            .bind(changes.title)
            .bind(changes.description)
            .bind(changes.project_type)
            .fetch_optional(&self.pool)
            .await?;
        Ok(project)
    }

    async fn delete_project(&self, id: Uuid) -> RepoResult<bool> {
        let res = sqlx::query("DELETE FROM projects WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() == 1)
    }

    async fn create_contributor(&self, new: NewContributor) -> RepoResult<Contributor> {
        let sql = format!(
            r#"
            INSERT INTO contributors (id, user_id, project_id, role)
            VALUES ($1, $2, $3, $4)
            RETURNING {CONTRIBUTOR_COLUMNS}
            "#
        );
        let contributor = sqlx::query_as::<_, Contributor>(&sql)
            .bind(Uuid::new_v4())
            .bind(new.user_id)
            .bind(new.project_id)
            .bind(&new.role)
            .fetch_one(&self.pool)
            .await?;
        Ok(contributor)
    }

    async fn get_contributor(&self, id: Uuid) -> RepoResult<Option<Contributor>> {
        let sql = format!("SELECT {CONTRIBUTOR_COLUMNS} FROM contributors WHERE id = $1");
        let contributor = sqlx::query_as::<_, Contributor>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(contributor)
    }

    async fn find_contributor(&self, project_id: Uuid, user_id: Uuid) -> RepoResult<Option<Contributor>> {
        let sql = format!(
            "SELECT {CONTRIBUTOR_COLUMNS} FROM contributors WHERE project_id = $1 AND user_id = $2"
        );
        let contributor = sqlx::query_as::<_, Contributor>(&sql)
            .bind(project_id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(contributor)
    }

    async fn list_contributors(&self, project_id: Uuid) -> RepoResult<Vec<Contributor>> {
        let sql = format!(
            r#"
            SELECT {CONTRIBUTOR_COLUMNS}
              FROM contributors
             WHERE project_id = $1
             ORDER BY created_time DESC
            "#
        );
        let rows = sqlx::query_as::<_, Contributor>(&sql)
            .bind(project_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn delete_contributor(&self, id: Uuid) -> RepoResult<bool> {
        let res = sqlx::query("DELETE FROM contributors WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() == 1)
    }

    async fn create_issue(&self, new: NewIssue) -> RepoResult<Issue> {
        let sql = format!(
            r#"
            INSERT INTO issues (id, title, description, tag, priority, status, project_id, author_id, assignee_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {ISSUE_COLUMNS}
            "#
        );
        let issue = sqlx::query_as::<_, Issue>(&sql)
            .bind(Uuid::new_v4())
            .bind(&new.title)
            .bind(&new.description)
            .bind(&new.tag)
            .bind(&new.priority)
            .bind(&new.status)
            .bind(new.project_id)
            .bind(new.author_id)
            .bind(new.assignee_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(issue)
    }

    async fn get_issue(&self, id: Uuid) -> RepoResult<Option<Issue>> {
        let sql = format!("SELECT {ISSUE_COLUMNS} FROM issues WHERE id = $1");
        let issue = sqlx::query_as::<_, Issue>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(issue)
    }

    async fn list_issues(&self, project_id: Uuid) -> RepoResult<Vec<Issue>> {
        let sql = format!(
            r#"
            SELECT {ISSUE_COLUMNS}
              FROM issues
             WHERE project_id = $1
             ORDER BY created_time DESC
            "#
        );
        let rows = sqlx::query_as::<_, Issue>(&sql)
            .bind(project_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn update_issue(&self, id: Uuid, changes: IssueChanges) -> RepoResult<Option<Issue>> {
        let sql = format!(
            r#"
            UPDATE issues
               SET title = COALESCE($2, title),
                   description = COALESCE($3, description),
                   tag = COALESCE($4, tag),
                   priority = COALESCE($5, priority),
                   status = COALESCE($6, status),
                   assignee_id = COALESCE($7, assignee_id)
             WHERE id = $1
            RETURNING {ISSUE_COLUMNS}
            "#
        );
        let issue = sqlx::query_as::<_, Issue>(&sql)
            .bind(id)
            .bind(changes.title)
            .bind(changes.description)
            .bind(changes.tag)
            .bind(changes.priority)
            .bind(changes.status)
            .bind(changes.assignee_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(issue)
    }

    async fn delete_issue(&self, id: Uuid) -> RepoResult<bool> {
        let res = sqlx::query("DELETE FROM issues WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() == 1)
    }

    async fn create_comment(&self, new: NewComment) -> RepoResult<Comment> {
        let sql = format!(
            r#"
            INSERT INTO comments (id, description, issue_id, author_id)
            VALUES ($1, $2, $3, $4)
            RETURNING {COMMENT_COLUMNS}
            "#
        );
        let comment = sqlx::query_as::<_, Comment>(&sql)
            .bind(Uuid::new_v4())
            .bind(&new.description)
            .bind(new.issue_id)
            .bind(new.author_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(comment)
    }

    async fn get_comment(&self, id: Uuid) -> RepoResult<Option<Comment>> {
        let sql = format!("SELECT {COMMENT_COLUMNS} FROM comments WHERE id = $1");
        let comment = sqlx::query_as::<_, Comment>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(comment)
    }

    async fn list_comments(&self, issue_id: Uuid) -> RepoResult<Vec<Comment>> {
        let sql = format!(
            r#"
            SELECT {COMMENT_COLUMNS}
              FROM comments
             WHERE issue_id = $1
             ORDER BY created_time DESC
            "#
        );
        let rows = sqlx::query_as::<_, Comment>(&sql)
            .bind(issue_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn update_comment(&self, id: Uuid, changes: CommentChanges) -> RepoResult<Option<Comment>> {
        let sql = format!(
            r#"
            UPDATE comments
               SET description = COALESCE($2, description)
             WHERE id = $1
            RETURNING {COMMENT_COLUMNS}
            "#
        );
        let comment = sqlx::query_as::<_, Comment>(&sql)
            .bind(id)
            .bind(changes.description)
            .fetch_optional(&self.pool)
            .await?;
        Ok(comment)
    }

    async fn delete_comment(&self, id: Uuid) -> RepoResult<bool> {
        let res = sqlx::query("DELETE FROM comments WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() == 1)
    }

    async fn revoke_token(&self, jti: Uuid, user_id: Uuid, expires_at: OffsetDateTime) -> RepoResult<bool> {
        let res = sqlx::query(
            r#"
            INSERT INTO revoked_tokens (jti, user_id, expires_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (jti) DO NOTHING
            "#,
        )
        .bind(jti)
        .bind(user_id)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected() == 1)
    }

    async fn is_token_revoked(&self, jti: Uuid) -> RepoResult<bool> {
        let row = sqlx::query_as::<_, (Uuid,)>("SELECT jti FROM revoked_tokens WHERE jti = $1")
            .bind(jti)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    async fn purge_expired_revocations(&self, now: OffsetDateTime) -> RepoResult<u64> {
        let res = sqlx::query("DELETE FROM revoked_tokens WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected())
    }
}
