// SPDX-License-Identifier: EUPL-1.2

//! Handlers for the S3 profiles of the selected project.
//!
//! ## Endpoints
//!
//! - `GET    /s3-profiles`: Aggregated profiles
//! - `POST   /s3-profiles/initialize`: Resolve region templates again
//! - `POST   /s3-profiles`: Create or update a user profile
//! - `DELETE /s3-profiles/:id`: Delete a user profile
//! - `POST   /s3-profiles/:id/bookmarks`: Edit bookmarks of a user profile
//! - `POST   /s3-profiles/:id/default`: Move the default/explorer flag
//! - `POST   /s3-profiles/:id/test`: Test the profile's credentials
//! - `GET    /s3-profiles/by-name/:name/client`: Client for a profile name
//! - `GET    /s3-profiles/explorer`: Explorer profile and its client

use crate::{
    db::{initialize_s3, AppState},
    error::ConsoleError,
    identity::Identity,
    models::{ChangeIsDefaultRequest, CreatedProfileResponse, ProfileAndClient, S3ProfilesResponse},
    s3::client::S3Client,
    s3::credentials_test::CredentialsTestStatus,
    s3::service::{BookmarkAction, S3ProfileInput},
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

async fn profiles_response(
    state: &AppState,
    identity: &Identity,
) -> Result<S3ProfilesResponse, ConsoleError> {
    let session = state.s3_session(identity).await?;
    let s3_profiles = session.s3.s3_profiles(&session.store).await?;
    Ok(S3ProfilesResponse {
        is_s3_explorer_enabled: crate::s3::profiles::is_s3_explorer_enabled(&s3_profiles),
        s3_profiles,
    })
}

/// `GET /s3-profiles`
pub async fn list_s3_profiles(
    State(state): State<Arc<AppState>>,
    identity: Identity,
) -> Result<Json<S3ProfilesResponse>, ConsoleError> {
    Ok(Json(profiles_response(&state, &identity).await?))
}

/// `POST /s3-profiles/initialize`: Re-resolve the region templates against
/// the caller's current token.
pub async fn initialize_s3_profiles(
    State(state): State<Arc<AppState>>,
    identity: Identity,
) -> Result<Json<S3ProfilesResponse>, ConsoleError> {
    let session = state.ready_session(&identity).await?;
    initialize_s3(&session, &identity).await?;
    Ok(Json(profiles_response(&state, &identity).await?))
}

/// `POST /s3-profiles`
///
/// Body: `{ "friendlyName": "...", "url": "...", "creationTime"?: 1700000000000, ... }`
pub async fn create_or_update_s3_profile(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Json(input): Json<S3ProfileInput>,
) -> Result<Json<CreatedProfileResponse>, ConsoleError> {
    let session = state.s3_session(&identity).await?;
    let id = session
        .s3
        .create_or_update_s3_profile(&session.store, input)
        .await?;
    Ok(Json(CreatedProfileResponse { id }))
}

/// `DELETE /s3-profiles/:id`
pub async fn delete_s3_profile(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(id): Path<String>,
) -> Result<StatusCode, ConsoleError> {
    let session = state.s3_session(&identity).await?;
    session.s3.delete_s3_profile(&session.store, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /s3-profiles/:id/bookmarks`
///
/// Body: `{ "action": "createOrUpdate", "s3UriPrefix": "s3://bucket/dir/", "displayName"?: "..." }`
/// or `{ "action": "delete", "s3UriPrefix": "s3://bucket/dir/" }`
pub async fn create_delete_or_update_bookmark(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(id): Path<String>,
    Json(action): Json<BookmarkAction>,
) -> Result<StatusCode, ConsoleError> {
    let session = state.s3_session(&identity).await?;
    session
        .s3
        .create_delete_or_update_bookmark(&session.store, &id, action)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /s3-profiles/:id/default`
///
/// Body: `{ "usecase": "defaultXOnyxia" | "explorer", "value": true }`
pub async fn change_is_default(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(id): Path<String>,
    Json(req): Json<ChangeIsDefaultRequest>,
) -> Result<StatusCode, ConsoleError> {
    let session = state.s3_session(&identity).await?;
    session
        .s3
        .change_is_default(&session.store, &id, req.usecase, req.value)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /s3-profiles/:id/test`
pub async fn test_s3_credentials(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(id): Path<String>,
) -> Result<Json<CredentialsTestStatus>, ConsoleError> {
    let session = state.s3_session(&identity).await?;
    let status = session.s3.test_s3_credentials(&session.store, &id).await?;
    Ok(Json(status))
}

/// `GET /s3-profiles/by-name/:name/client`
pub async fn get_s3_client(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(name): Path<String>,
) -> Result<Json<S3Client>, ConsoleError> {
    let session = state.s3_session(&identity).await?;
    let client = session.s3.get_s3_client(&session.store, &name).await?;
    Ok(Json(client.as_ref().clone()))
}

/// `GET /s3-profiles/explorer`: `null` when no profile is set up for the explorer.
pub async fn get_explorer_profile_and_client(
    State(state): State<Arc<AppState>>,
    identity: Identity,
) -> Result<Json<Option<ProfileAndClient>>, ConsoleError> {
    let session = state.s3_session(&identity).await?;
    let found = session
        .s3
        .get_s3_profile_and_client_for_explorer(&session.store)
        .await?
        .map(|(s3_profile, client)| ProfileAndClient {
            s3_profile,
            s3_client: client.as_ref().clone(),
        });
    Ok(Json(found))
}
