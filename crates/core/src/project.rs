// Project and owner types
//
// Projects are created and managed outside PulseBoard; these are the read
// views the pipeline needs from the project collaborator.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[cfg(feature = "openapi")]
use utoipa::ToSchema;

/// A monitored project. `api_key` is a secret capability token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: Uuid,
    pub name: String,
    #[serde(skip_serializing)]
    pub api_key: String,
    pub owner_user_id: Uuid,
}

/// Project joined with the contact details of its owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectOwner {
    pub project_id: Uuid,
    pub project_name: String,
    pub user_id: Uuid,
    pub email: String,
    pub name: String,
}

/// A user who owns at least one project, with the projects to summarize.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestRecipient {
    pub user_id: Uuid,
    pub email: String,
    pub name: String,
    /// (project id, project name)
    pub projects: Vec<(Uuid, String)>,
}
