use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    error::ApiError,
    store::Comment,
    users::dto::PublicUser,
    validate::{required, LONG_TEXT},
};

#[derive(Debug, Deserialize)]
pub struct CommentRequest {
    pub description: String,
}

impl CommentRequest {
    pub fn description(&self) -> Result<String, ApiError> {
        required("description", &self.description, LONG_TEXT)
    }
}

#[derive(Debug, Serialize)]
pub struct CommentResponse {
    pub id: Uuid,
    pub description: String,
    pub issue_id: Uuid,
    pub author: PublicUser,
    #[serde(with = "time::serde::rfc3339")]
    pub created_time: OffsetDateTime,
}

impl CommentResponse {
    pub fn new(comment: Comment, author: PublicUser) -> Self {
        Self {
            id: comment.id,
            description: comment.description,
            issue_id: comment.issue_id,
            author,
            created_time: comment.created_time,
        }
    }
}
