// SPDX-License-Identifier: EUPL-1.2

//! Aggregation of user-created and region-defined S3 profiles.
//!
//! The aggregated list is what every consumer sees: user profiles first
//! (most recent first), then one entry per region template, or one per
//! resolved STS role when the template declares roles.

use serde::Serialize;

use super::bookmarks::ResolvedBookmark;
use super::client::{ParamsOfCreateS3Client, StsParams};
use super::credentials_test::{CredentialsTestState, CredentialsTestStatus};
use super::glob::matches_any_session_name;
use super::region::{ResolvedRegionProfile, RoleExpansion};
use super::template::LocalizedString;
use super::uri::parse_s3_uri_prefix;
use crate::project::configs::{S3ProfilesConfig, StoredS3Profile};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "origin", rename_all = "camelCase")]
pub enum S3ProfileOrigin {
    DefinedInRegion,
    #[serde(rename_all = "camelCase")]
    CreatedByUser {
        friendly_name: String,
        creation_time: i64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct S3Profile {
    pub id: String,
    pub profile_name: String,
    #[serde(flatten)]
    pub origin: S3ProfileOrigin,
    pub params_of_create_s3_client: ParamsOfCreateS3Client,
    pub bookmarks: Vec<ResolvedBookmark>,
    pub is_x_onyxia_default: bool,
    pub is_explorer_config: bool,
    pub credentials_test_status: CredentialsTestStatus,
}

impl S3Profile {
    pub fn is_defined_in_region(&self) -> bool {
        matches!(self.origin, S3ProfileOrigin::DefinedInRegion)
    }
}

fn user_bookmarks(profile: &StoredS3Profile) -> Vec<ResolvedBookmark> {
    profile
        .bookmarks
        .iter()
        .filter_map(|bookmark| {
            let s3_uri_prefix_obj = match parse_s3_uri_prefix(&bookmark.s3_uri_prefix, false) {
                Ok(obj) => obj,
                Err(e) => {
                    tracing::warn!("Skipping stored bookmark: {e}");
                    return None;
                }
            };
            Some(ResolvedBookmark {
                title: LocalizedString::Plain(
                    bookmark
                        .display_name
                        .clone()
                        .unwrap_or_else(|| bookmark.s3_uri_prefix.clone()),
                ),
                description: None,
                tags: Vec::new(),
                s3_uri_prefix_obj,
                for_profile_names: Vec::new(),
                for_sts_role_session_names: Vec::new(),
            })
        })
        .collect()
}

fn user_profile(profile: &StoredS3Profile, credentials_test_state: &CredentialsTestState) -> S3Profile {
    let params = ParamsOfCreateS3Client::NoSts {
        url: profile.url.clone(),
        path_style_access: profile.path_style_access,
        region: profile.region.clone(),
        credentials: profile.credentials.clone(),
    };

    S3Profile {
        id: profile.id(),
        profile_name: profile.friendly_name.clone(),
        origin: S3ProfileOrigin::CreatedByUser {
            friendly_name: profile.friendly_name.clone(),
            creation_time: profile.creation_time,
        },
        credentials_test_status: credentials_test_state.status_of(&params),
        params_of_create_s3_client: params,
        bookmarks: user_bookmarks(profile),
        is_x_onyxia_default: false,
        is_explorer_config: false,
    }
}

fn region_profile(
    resolved: &ResolvedRegionProfile,
    expansion: Option<&RoleExpansion>,
    credentials_test_state: &CredentialsTestState,
) -> S3Profile {
    let template = &resolved.template;
    let role = expansion.map(|e| &e.role);

    let profile_name = role
        .map(|r| r.profile_name.clone())
        .unwrap_or_else(|| template.profile_name.clone());

    let params = ParamsOfCreateS3Client::Sts {
        url: template.url.clone(),
        path_style_access: template.path_style_access,
        region: template.region.clone(),
        sts: StsParams {
            url: template.sts.url.clone(),
            duration_seconds: template.sts.duration_seconds,
            role: role.cloned(),
            oidc_params: template.sts.oidc_params.clone(),
        },
    };

    let role_session_name = role.map(|r| r.role_session_name.as_str());
    let bookmarks = resolved
        .bookmarks
        .iter()
        .filter(|b| matches_any_session_name(&b.for_sts_role_session_names, role_session_name))
        .filter(|b| b.applies_to_profile(&profile_name))
        .cloned()
        .collect();

    S3Profile {
        id: expansion.map_or_else(|| resolved.key.clone(), |e| e.id.clone()),
        profile_name,
        origin: S3ProfileOrigin::DefinedInRegion,
        credentials_test_status: credentials_test_state.status_of(&params),
        params_of_create_s3_client: params,
        bookmarks,
        is_x_onyxia_default: false,
        is_explorer_config: false,
    }
}

/// Build the profile list shown to the user.
///
/// The default and explorer flags go to the profile the vault points at.
/// An unset pointer flags nothing. A stale pointer flags the first
/// region-defined profile instead. At most one profile carries each flag.
pub fn aggregate_s3_profiles(
    from_vault: &S3ProfilesConfig,
    from_region: &[ResolvedRegionProfile],
    credentials_test_state: &CredentialsTestState,
) -> Vec<S3Profile> {
    let mut user_profiles: Vec<&StoredS3Profile> = from_vault.profiles.iter().collect();
    user_profiles.sort_by(|a, b| b.creation_time.cmp(&a.creation_time));

    let candidates = user_profiles
        .into_iter()
        .map(|p| user_profile(p, credentials_test_state))
        .chain(from_region.iter().flat_map(|resolved| {
            if resolved.sts_roles.is_empty() {
                vec![region_profile(resolved, None, credentials_test_state)]
            } else {
                resolved
                    .sts_roles
                    .iter()
                    .map(|expansion| region_profile(resolved, Some(expansion), credentials_test_state))
                    .collect()
            }
        }));

    let mut profiles: Vec<S3Profile> = Vec::new();
    for profile in candidates {
        if profiles.iter().any(|p| p.id == profile.id) {
            continue;
        }
        profiles.push(profile);
    }

    let flag_index = |pointer: Option<&str>| {
        pointer.and_then(|id| {
            profiles
                .iter()
                .position(|p| p.id == id)
                .or_else(|| profiles.iter().position(S3Profile::is_defined_in_region))
        })
    };

    let default_index = flag_index(from_vault.default_x_onyxia_profile_id.as_deref());
    let explorer_index = flag_index(from_vault.explorer_profile_id.as_deref());

    if let Some(i) = default_index {
        profiles[i].is_x_onyxia_default = true;
    }
    if let Some(i) = explorer_index {
        profiles[i].is_explorer_config = true;
    }

    profiles
}

pub fn is_s3_explorer_enabled(profiles: &[S3Profile]) -> bool {
    profiles.iter().any(|p| p.is_explorer_config)
}
