//! Project listing and deletion requests from the hub's REST surface

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::{
    error::Error,
    project::Project,
    storage::{RecordKey, StateRecords},
    sync::StateSync,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectsResponse {
    pub projects: Vec<Project>,
}

/// Body of a deletion request; `id` is an opaque correlation value echoed back
#[derive(Debug, Clone, Deserialize)]
pub struct DeleteRequest {
    pub repo_url: String,
    pub name: String,
    pub id: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Removed,
    NotFound,
    /// The user's server is running
    Rejected,
    BadRequest,
}

/// Wire reply to a deletion request; the outcome is kept for callers
/// and is not part of the body
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeleteResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<serde_json::Value>,
    #[serde(skip)]
    outcome: DeleteOutcome,
}

impl DeleteResponse {
    fn removed(name: &str, id: serde_json::Value) -> Self {
        DeleteResponse {
            success: Some(format!("Project {} is deleted.", name)),
            error: None,
            id: Some(id),
            outcome: DeleteOutcome::Removed,
        }
    }

    fn failed(outcome: DeleteOutcome, message: impl Into<String>) -> Self {
        DeleteResponse {
            success: None,
            error: Some(message.into()),
            id: None,
            outcome,
        }
    }

    pub fn outcome(&self) -> DeleteOutcome {
        self.outcome
    }
}

pub struct ProjectApi<'a, R> {
    sync: &'a StateSync<R>,
}

impl<'a, R: StateRecords> ProjectApi<'a, R> {
    pub fn new(sync: &'a StateSync<R>) -> Self {
        ProjectApi { sync }
    }

    /// The user's projects, most recently used last. Never mutates state.
    pub fn list_projects(&self, user: &str) -> Result<ProjectsResponse> {
        if !self.sync.records().user_exists(user)? {
            return Err(Error::UserNotFound(user.to_string()).into());
        }
        let projects = self
            .sync
            .peek_projects(&RecordKey::default_server(user))?;
        Ok(ProjectsResponse { projects })
    }

    /// Handle a deletion request body. Failures become error responses.
    pub fn delete_project(&self, user: &str, body: &str) -> DeleteResponse {
        match self.try_delete(user, body) {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!("Project deletion for {} failed: {:#}", user, e);
                DeleteResponse::failed(DeleteOutcome::BadRequest, "Bad request.")
            }
        }
    }

    fn try_delete(&self, user: &str, body: &str) -> Result<DeleteResponse> {
        if !self.sync.records().user_exists(user)? {
            return Ok(DeleteResponse::failed(
                DeleteOutcome::BadRequest,
                format!("User {} doesn't exist.", user),
            ));
        }

        let key = RecordKey::default_server(user);
        if self.sync.records().running(&key)?.is_some() {
            return Ok(DeleteResponse::failed(
                DeleteOutcome::Rejected,
                "Project deletion is not allowed while the user server is running.",
            ));
        }

        let request: DeleteRequest = match serde_json::from_str(body) {
            Ok(request) => request,
            Err(e) => {
                tracing::debug!("Malformed deletion request: {}", e);
                return Ok(DeleteResponse::failed(
                    DeleteOutcome::BadRequest,
                    "Bad request.",
                ));
            }
        };

        let (_, found) = self.sync.commit_deletion(&key, &request.repo_url)?;
        if found {
            Ok(DeleteResponse::removed(&request.name, request.id))
        } else {
            Ok(DeleteResponse::failed(
                DeleteOutcome::NotFound,
                format!(
                    "Project {} ({}) doesn't exist.",
                    request.name, request.repo_url
                ),
            ))
        }
    }
}
