// SPDX-License-Identifier: EUPL-1.2

//! Error types for the Onyxia console core.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Errors surfaced by the resolvers, the project configuration store and the handlers.
#[derive(Debug, thiserror::Error)]
pub enum ConsoleError {
    /// A claim held something other than a string or an array of strings.
    /// Carries the full token so operators can see what the identity provider sent.
    #[error("The claim '{claim_name}' must be a string or an array of strings. Decoded id token: {token_dump}")]
    InvalidClaim {
        claim_name: String,
        token_dump: String,
    },

    #[error("Malformed S3 URI '{uri}': {reason}")]
    MalformedS3Uri { uri: String, reason: String },

    #[error("Invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Secret not found: {0}")]
    SecretNotFound(String),

    #[error("Project configuration is corrupt and could not be restored: {0}")]
    CorruptProjectConfigs(String),

    #[error("Stored model version {found} is newer than the supported version {supported}")]
    UnsupportedModelVersion { found: u64, supported: u64 },

    #[error("Project configuration '{0}' was modified by someone else, reload required")]
    ConcurrentModification(String),

    #[error("Project context changed while the operation was in flight")]
    ContextChanged,

    #[error("Unknown project: {0}")]
    UnknownProject(String),

    #[error("S3 profile not found: {0}")]
    ProfileNotFound(String),

    #[error("S3 profile {0} is defined by the region and cannot be modified")]
    ReadOnlyProfile(String),

    #[error("Not initialized: {0}")]
    NotInitialized(&'static str),

    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for ConsoleError {
    fn into_response(self) -> Response {
        let status = match &self {
            ConsoleError::InvalidClaim { .. }
            | ConsoleError::MalformedS3Uri { .. }
            | ConsoleError::InvalidPattern { .. }
            | ConsoleError::CorruptProjectConfigs(_)
            | ConsoleError::UnsupportedModelVersion { .. }
            | ConsoleError::Database(_)
            | ConsoleError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ConsoleError::SecretNotFound(_)
            | ConsoleError::UnknownProject(_)
            | ConsoleError::ProfileNotFound(_) => StatusCode::NOT_FOUND,
            ConsoleError::ConcurrentModification(_) | ConsoleError::ContextChanged => {
                StatusCode::CONFLICT
            }
            ConsoleError::ReadOnlyProfile(_) => StatusCode::FORBIDDEN,
            ConsoleError::NotInitialized(_) => StatusCode::PRECONDITION_REQUIRED,
            ConsoleError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            ConsoleError::Validation(_) | ConsoleError::Json(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
        };

        // The client is expected to drop its local view and reload everything.
        let reload = matches!(
            self,
            ConsoleError::ConcurrentModification(_) | ConsoleError::ContextChanged
        );

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("{self}");
        }

        (
            status,
            Json(json!({ "error": self.to_string(), "reload": reload })),
        )
            .into_response()
    }
}

pub type Result<T, E = ConsoleError> = std::result::Result<T, E>;
