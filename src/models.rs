// SPDX-License-Identifier: EUPL-1.2

//! Request and response bodies of the HTTP surface.

use serde::{Deserialize, Serialize};

use crate::project::Project;
use crate::s3::client::S3Client;
use crate::s3::profiles::S3Profile;
use crate::s3::service::DefaultUsecase;

/// Response for `GET /projects`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectsResponse {
    pub projects: Vec<Project>,
    pub selected_project_id: Option<String>,
}

/// Request body for `POST /project`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeProjectRequest {
    pub project_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServicePasswordResponse {
    pub service_password: String,
}

/// Response for `GET /s3-profiles`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct S3ProfilesResponse {
    pub s3_profiles: Vec<S3Profile>,
    pub is_s3_explorer_enabled: bool,
}

#[derive(Debug, Serialize)]
pub struct CreatedProfileResponse {
    pub id: String,
}

/// Request body for `POST /s3-profiles/:id/default`.
#[derive(Debug, Deserialize)]
pub struct ChangeIsDefaultRequest {
    pub usecase: DefaultUsecase,
    pub value: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileAndClient {
    pub s3_profile: S3Profile,
    pub s3_client: S3Client,
}
