use serde::Deserialize;
use uuid::Uuid;

use crate::{
    error::ApiError,
    store::{NewProject, ProjectChanges},
    validate::{required, required_opt, LONG_TEXT, SHORT_TEXT},
};

/// Body of `POST /projects/` and `PUT /projects/{id}/`.
#[derive(Debug, Deserialize)]
pub struct ProjectRequest {
    pub title: String,
    pub description: String,
    #[serde(rename = "type")]
    pub project_type: String,
}

/// Body of `PATCH /projects/{id}/`.
#[derive(Debug, Default, Deserialize)]
pub struct PatchProjectRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub project_type: Option<String>,
}

impl ProjectRequest {
    pub fn into_new(self, author_id: Uuid) -> Result<NewProject, ApiError> {
        Ok(NewProject {
            title: required("title", &self.title, SHORT_TEXT)?,
            description: required("description", &self.description, LONG_TEXT)?,
            project_type: required("type", &self.project_type, SHORT_TEXT)?,
            author_id,
        })
    }
}

/// A full replacement is a patch that sets every field.
impl From<ProjectRequest> for PatchProjectRequest {
    fn from(r: ProjectRequest) -> Self {
        Self {
            title: Some(r.title),
            description: Some(r.description),
            project_type: Some(r.project_type),
        }
    }
}

impl PatchProjectRequest {
    pub fn into_changes(self) -> Result<ProjectChanges, ApiError> {
        Ok(ProjectChanges {
            title: required_opt("title", self.title.as_deref(), SHORT_TEXT)?,
            description: required_opt("description", self.description.as_deref(), LONG_TEXT)?,
            project_type: required_opt("type", self.project_type.as_deref(), SHORT_TEXT)?,
        })
    }
}
