use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// Account record.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(skip_serializing)]
    pub password_hash: String, // argon2 PHC string, never exposed in JSON
    pub is_staff: bool,
    pub is_superuser: bool,
    pub is_active: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Project {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    #[serde(rename = "type")]
    pub project_type: String,
    pub author_id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub created_time: OffsetDateTime,
}

/// Join row granting a user access to a project.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Contributor {
    pub id: Uuid,
    pub user_id: Uuid,
    pub project_id: Uuid,
    pub role: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_time: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Issue {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub tag: String,
    pub priority: String,
    pub status: String,
    pub project_id: Uuid,
    pub author_id: Uuid,
    pub assignee_id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub created_time: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Comment {
    pub id: Uuid,
    pub description: String,
    pub issue_id: Uuid,
    pub author_id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub created_time: OffsetDateTime,
}

/// Records that carry an authoring user.
pub trait Authored {
    fn author_id(&self) -> Uuid;
}

impl Authored for Project {
    fn author_id(&self) -> Uuid {
        self.author_id
    }
}

impl Authored for Issue {
    fn author_id(&self) -> Uuid {
        self.author_id
    }
}

impl Authored for Comment {
    fn author_id(&self) -> Uuid {
        self.author_id
    }
}

// ---- inserts ----

#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub password_hash: String,
    pub is_staff: bool,
    pub is_superuser: bool,
}

#[derive(Debug, Clone)]
pub struct NewProject {
    pub title: String,
    pub description: String,
    pub project_type: String,
    pub author_id: Uuid,
}

#[derive(Debug, Clone)]
pub struct NewContributor {
    pub user_id: Uuid,
    pub project_id: Uuid,
    pub role: String,
}

#[derive(Debug, Clone)]
pub struct NewIssue {
    pub title: String,
    pub description: String,
    pub tag: String,
    pub priority: String,
    pub status: String,
    pub project_id: Uuid,
    pub author_id: Uuid,
    pub assignee_id: Uuid,
}

#[derive(Debug, Clone)]
pub struct NewComment {
    pub description: String,
    pub issue_id: Uuid,
    pub author_id: Uuid,
}

// ---- partial updates; `None` keeps the stored value ----

#[derive(Debug, Clone, Default)]
pub struct UserChanges {
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ProjectChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub project_type: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct IssueChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub tag: Option<String>,
    pub priority: Option<String>,
    pub status: Option<String>,
    pub assignee_id: Option<Uuid>,
}

#[derive(Debug, Clone, Default)]
pub struct CommentChanges {
    pub description: Option<String>,
}
