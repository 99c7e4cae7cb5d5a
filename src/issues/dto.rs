use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    error::ApiError,
    store::{Issue, IssueChanges, NewIssue},
    users::dto::PublicUser,
    validate::{required, LONG_TEXT, SHORT_TEXT},
};

/// Body of `POST /projects/{id}/issues/` and `PUT .../issues/{id}/`.
///
/// `assignee` is only honoured on update; new issues are always assigned to
/// the project author.
#[derive(Debug, Deserialize)]
pub struct IssueRequest {
    pub title: String,
    pub description: String,
    pub tag: String,
    pub priority: String,
    pub status: String,
    #[serde(default, alias = "assignee_id")]
    pub assignee: Option<Uuid>,
}

struct IssueFields {
    title: String,
    description: String,
    tag: String,
    priority: String,
    status: String,
}

impl IssueRequest {
    fn fields(&self) -> Result<IssueFields, ApiError> {
        Ok(IssueFields {
            title: required("title", &self.title, SHORT_TEXT)?,
            description: required("description", &self.description, LONG_TEXT)?,
            tag: required("tag", &self.tag, SHORT_TEXT)?,
            priority: required("priority", &self.priority, SHORT_TEXT)?,
            status: required("status", &self.status, SHORT_TEXT)?,
        })
    }

    pub fn into_new(self, project_id: Uuid, author_id: Uuid, assignee_id: Uuid) -> Result<NewIssue, ApiError> {
        let f = self.fields()?;
        Ok(NewIssue {
            title: f.title,
            description: f.description,
            tag: f.tag,
            priority: f.priority,
            status: f.status,
            project_id,
            author_id,
            assignee_id,
        })
    }

    pub fn into_changes(self) -> Result<IssueChanges, ApiError> {
        let f = self.fields()?;
        Ok(IssueChanges {
            title: Some(f.title),
            description: Some(f.description),
            tag: Some(f.tag),
            priority: Some(f.priority),
            status: Some(f.status),
            assignee_id: self.assignee,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct IssueResponse {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub tag: String,
    pub priority: String,
    pub status: String,
    pub project_id: Uuid,
    pub author: PublicUser,
    pub assignee: PublicUser,
    #[serde(with = "time::serde::rfc3339")]
    pub created_time: OffsetDateTime,
}

impl IssueResponse {
    pub fn new(issue: Issue, author: PublicUser, assignee: PublicUser) -> Self {
        Self {
            id: issue.id,
            title: issue.title,
            description: issue.description,
            tag: issue.tag,
            priority: issue.priority,
            status: issue.status,
            project_id: issue.project_id,
            author,
            assignee,
            created_time: issue.created_time,
        }
    }
}
