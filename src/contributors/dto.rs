use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{store::Contributor, users::dto::PublicUser};

/// Body of `POST /projects/{id}/users/`.
#[derive(Debug, Deserialize)]
pub struct AddContributorRequest {
    #[serde(alias = "user_id")]
    pub user: Uuid,
    #[serde(default)]
    pub role: String,
}

#[derive(Debug, Serialize)]
pub struct ContributorResponse {
    pub id: Uuid,
    pub user: PublicUser,
    pub project_id: Uuid,
    pub role: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_time: OffsetDateTime,
}

impl ContributorResponse {
    pub fn new(row: Contributor, user: PublicUser) -> Self {
        Self {
            id: row.id,
            user,
            project_id: row.project_id,
            role: row.role,
            created_time: row.created_time,
        }
    }
}
