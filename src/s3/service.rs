// SPDX-License-Identifier: EUPL-1.2

//! Operations on the S3 profiles of the selected project.
//!
//! Profiles are persisted in the `s3Profiles` entry of the project
//! configuration; every mutation goes through
//! [`ProjectConfigStore::modify_config_value`] so it is serialized with the
//! other writers and checked for remote conflicts.

use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use tokio::sync::RwLock;

use super::claims::DecodedIdToken;
use super::client::{S3Client, S3ClientCache, S3ClientFactory};
use super::credentials_test::{CredentialsTestState, CredentialsTestStatus};
use super::profiles::{aggregate_s3_profiles, is_s3_explorer_enabled, S3Profile};
use super::reconcile::update_default_s3_profiles_after_potential_deletion;
use super::region::{resolve_region_profiles, DeploymentRegion, ResolvedRegionProfile};
use super::uri::parse_s3_uri_prefix;
use crate::error::{ConsoleError, Result};
use crate::project::configs::{
    ProjectConfigKey, S3Credentials, S3ProfilesConfig, StoredS3Profile, UserBookmark,
};
use crate::project::store::{ProjectConfigStore, UpdateOutcome};

enum RegionTemplates {
    Uninitialized,
    Ready(Arc<Vec<ResolvedRegionProfile>>),
}

/// Fields of a user-created profile. Without `creation_time` a new profile
/// is created; with it the matching profile is replaced.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct S3ProfileInput {
    #[serde(default)]
    pub creation_time: Option<i64>,
    pub friendly_name: String,
    pub url: String,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub path_style_access: bool,
    #[serde(default)]
    pub credentials: Option<S3Credentials>,
    #[serde(default)]
    pub is_x_onyxia_default: bool,
    #[serde(default)]
    pub is_explorer_config: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum BookmarkAction {
    #[serde(rename_all = "camelCase")]
    CreateOrUpdate {
        #[serde(default)]
        display_name: Option<String>,
        s3_uri_prefix: String,
    },
    #[serde(rename_all = "camelCase")]
    Delete { s3_uri_prefix: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DefaultUsecase {
    DefaultXOnyxia,
    Explorer,
}

fn set_pointer(pointer: &mut Option<String>, id: &str, value: bool) {
    if value {
        *pointer = Some(id.to_string());
    } else if pointer.as_deref() == Some(id) {
        *pointer = None;
    }
}

fn to_config_value(s3: &S3ProfilesConfig) -> Result<serde_json::Value> {
    Ok(serde_json::to_value(s3)?)
}

pub struct S3ProfilesManagement {
    region: Arc<DeploymentRegion>,
    factory: Arc<dyn S3ClientFactory>,
    templates: RwLock<RegionTemplates>,
    credentials_tests: RwLock<CredentialsTestState>,
    clients: S3ClientCache,
}

impl S3ProfilesManagement {
    pub fn new(region: Arc<DeploymentRegion>, factory: Arc<dyn S3ClientFactory>) -> Self {
        Self {
            region,
            factory,
            templates: RwLock::new(RegionTemplates::Uninitialized),
            credentials_tests: RwLock::new(CredentialsTestState::default()),
            clients: S3ClientCache::default(),
        }
    }

    pub async fn is_initialized(&self) -> bool {
        matches!(*self.templates.read().await, RegionTemplates::Ready(_))
    }

    async fn resolved_region(&self) -> Result<Arc<Vec<ResolvedRegionProfile>>> {
        match &*self.templates.read().await {
            RegionTemplates::Ready(resolved) => Ok(resolved.clone()),
            RegionTemplates::Uninitialized => Err(ConsoleError::NotInitialized("S3 profiles")),
        }
    }

    /// Resolve the region templates for the current user, then repair the
    /// stored default pointers of the selected project.
    pub async fn initialize<F, Fut>(&self, store: &ProjectConfigStore, get_decoded_id_token: F) -> Result<()>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<DecodedIdToken>>,
    {
        let generation = store.generation();
        let resolved = resolve_region_profiles(&self.region, get_decoded_id_token).await?;
        if store.generation() != generation {
            return Err(ConsoleError::ContextChanged);
        }

        *self.templates.write().await = RegionTemplates::Ready(Arc::new(resolved));
        self.reconcile_defaults(store).await
    }

    /// Point the default/explorer entries back at existing profiles.
    pub async fn reconcile_defaults(&self, store: &ProjectConfigStore) -> Result<()> {
        let region = self.resolved_region().await?;
        let outcome = store
            .modify_config_value(ProjectConfigKey::S3Profiles, |configs| {
                let mut s3 = configs.s3_profiles.clone();
                update_default_s3_profiles_after_potential_deletion(&region, &s3).apply(&mut s3);
                to_config_value(&s3)
            })
            .await?;
        if outcome == UpdateOutcome::Updated {
            tracing::info!("Default S3 profiles were repaired");
        }
        Ok(())
    }

    /// Drop everything tied to the previous project.
    pub fn on_project_changed(&self) {
        self.clients.clear();
    }

    pub async fn s3_profiles(&self, store: &ProjectConfigStore) -> Result<Vec<S3Profile>> {
        let configs = store.configs().await?;
        let region = self.resolved_region().await?;
        let tests = self.credentials_tests.read().await;
        Ok(aggregate_s3_profiles(&configs.s3_profiles, &region, &tests))
    }

    pub async fn is_s3_explorer_enabled(&self, store: &ProjectConfigStore) -> Result<bool> {
        Ok(is_s3_explorer_enabled(&self.s3_profiles(store).await?))
    }

    /// The region-defined expansions alone, without flags or test results.
    async fn region_profiles(&self) -> Result<Vec<S3Profile>> {
        let region = self.resolved_region().await?;
        Ok(aggregate_s3_profiles(
            &S3ProfilesConfig::default(),
            &region,
            &CredentialsTestState::default(),
        ))
    }

    async fn region_profile_ids(&self) -> Result<Vec<String>> {
        Ok(self.region_profiles().await?.into_iter().map(|p| p.id).collect())
    }

    /// Create a profile, or replace the one with the same creation time.
    /// Returns the profile id.
    pub async fn create_or_update_s3_profile(
        &self,
        store: &ProjectConfigStore,
        input: S3ProfileInput,
    ) -> Result<String> {
        if input.friendly_name.trim().is_empty() {
            return Err(ConsoleError::Validation("friendlyName must not be empty".into()));
        }
        url::Url::parse(&input.url)
            .map_err(|e| ConsoleError::Validation(format!("invalid url '{}': {e}", input.url)))?;

        // Region-defined profile names stay reserved.
        if self
            .region_profiles()
            .await?
            .iter()
            .any(|p| p.profile_name == input.friendly_name)
        {
            return Err(ConsoleError::Validation(format!(
                "'{}' is the name of a region-defined profile",
                input.friendly_name
            )));
        }

        let now = Utc::now().timestamp_millis();
        let mut profile_id = String::new();

        store
            .modify_config_value(ProjectConfigKey::S3Profiles, |configs| {
                let mut s3 = configs.s3_profiles.clone();

                let creation_time = match input.creation_time {
                    Some(t) => {
                        if !s3.profiles.iter().any(|p| p.creation_time == t) {
                            return Err(ConsoleError::ProfileNotFound(t.to_string()));
                        }
                        t
                    }
                    None => {
                        let mut t = now;
                        while s3.profiles.iter().any(|p| p.creation_time == t) {
                            t += 1;
                        }
                        t
                    }
                };

                if s3
                    .profiles
                    .iter()
                    .any(|p| p.creation_time != creation_time && p.friendly_name == input.friendly_name)
                {
                    return Err(ConsoleError::Validation(format!(
                        "a profile named '{}' already exists",
                        input.friendly_name
                    )));
                }

                let existing = s3.profiles.iter().position(|p| p.creation_time == creation_time);
                let profile = StoredS3Profile {
                    creation_time,
                    friendly_name: input.friendly_name.clone(),
                    url: input.url.clone(),
                    region: input.region.clone(),
                    path_style_access: input.path_style_access,
                    credentials: input.credentials.clone(),
                    bookmarks: existing
                        .map(|i| s3.profiles[i].bookmarks.clone())
                        .unwrap_or_default(),
                };

                match existing {
                    Some(i) => s3.profiles[i] = profile,
                    None => s3.profiles.push(profile),
                }

                profile_id = creation_time.to_string();
                set_pointer(&mut s3.default_x_onyxia_profile_id, &profile_id, input.is_x_onyxia_default);
                set_pointer(&mut s3.explorer_profile_id, &profile_id, input.is_explorer_config);

                to_config_value(&s3)
            })
            .await?;

        self.clients.evict(&profile_id).await;

        tracing::info!("Saved S3 profile '{}' ({profile_id})", input.friendly_name);
        Ok(profile_id)
    }

    pub async fn delete_s3_profile(&self, store: &ProjectConfigStore, profile_id: &str) -> Result<()> {
        let region = self.resolved_region().await?;
        let region_ids = self.region_profile_ids().await?;
        let mut deleted_name = None;

        store
            .modify_config_value(ProjectConfigKey::S3Profiles, |configs| {
                let mut s3 = configs.s3_profiles.clone();

                let Some(index) = s3.profiles.iter().position(|p| p.id() == profile_id) else {
                    return Err(if region_ids.iter().any(|id| id == profile_id) {
                        ConsoleError::ReadOnlyProfile(profile_id.to_string())
                    } else {
                        ConsoleError::ProfileNotFound(profile_id.to_string())
                    });
                };

                deleted_name = Some(s3.profiles.remove(index).friendly_name);
                update_default_s3_profiles_after_potential_deletion(&region, &s3).apply(&mut s3);

                to_config_value(&s3)
            })
            .await?;

        if let Some(name) = deleted_name {
            self.clients.evict(profile_id).await;
            tracing::info!("Deleted S3 profile '{name}' ({profile_id})");
        }
        Ok(())
    }

    /// Bookmarks of user-created profiles, keyed by their S3 URI prefix.
    pub async fn create_delete_or_update_bookmark(
        &self,
        store: &ProjectConfigStore,
        profile_id: &str,
        action: BookmarkAction,
    ) -> Result<()> {
        let region_ids = self.region_profile_ids().await?;

        if let BookmarkAction::CreateOrUpdate { s3_uri_prefix, .. } = &action {
            parse_s3_uri_prefix(s3_uri_prefix, true)
                .map_err(|e| ConsoleError::Validation(e.to_string()))?;
        }

        store
            .modify_config_value(ProjectConfigKey::S3Profiles, |configs| {
                let mut s3 = configs.s3_profiles.clone();

                let Some(profile) = s3.profiles.iter_mut().find(|p| p.id() == profile_id) else {
                    return Err(if region_ids.iter().any(|id| id == profile_id) {
                        ConsoleError::ReadOnlyProfile(profile_id.to_string())
                    } else {
                        ConsoleError::ProfileNotFound(profile_id.to_string())
                    });
                };

                match action {
                    BookmarkAction::CreateOrUpdate {
                        display_name,
                        s3_uri_prefix,
                    } => {
                        let bookmark = UserBookmark {
                            display_name,
                            s3_uri_prefix,
                        };
                        match profile
                            .bookmarks
                            .iter_mut()
                            .find(|b| b.s3_uri_prefix == bookmark.s3_uri_prefix)
                        {
                            Some(existing) => *existing = bookmark,
                            None => profile.bookmarks.push(bookmark),
                        }
                    }
                    BookmarkAction::Delete { s3_uri_prefix } => {
                        profile.bookmarks.retain(|b| b.s3_uri_prefix != s3_uri_prefix);
                    }
                }

                to_config_value(&s3)
            })
            .await?;

        Ok(())
    }

    pub async fn change_is_default(
        &self,
        store: &ProjectConfigStore,
        profile_id: &str,
        usecase: DefaultUsecase,
        value: bool,
    ) -> Result<()> {
        if !self.s3_profiles(store).await?.iter().any(|p| p.id == profile_id) {
            return Err(ConsoleError::ProfileNotFound(profile_id.to_string()));
        }

        store
            .modify_config_value(ProjectConfigKey::S3Profiles, |configs| {
                let mut s3 = configs.s3_profiles.clone();
                let pointer = match usecase {
                    DefaultUsecase::DefaultXOnyxia => &mut s3.default_x_onyxia_profile_id,
                    DefaultUsecase::Explorer => &mut s3.explorer_profile_id,
                };
                set_pointer(pointer, profile_id, value);
                to_config_value(&s3)
            })
            .await?;

        Ok(())
    }

    pub async fn get_s3_client(&self, store: &ProjectConfigStore, profile_name: &str) -> Result<Arc<S3Client>> {
        let profile = self
            .s3_profiles(store)
            .await?
            .into_iter()
            .find(|p| p.profile_name == profile_name)
            .ok_or_else(|| ConsoleError::ProfileNotFound(profile_name.to_string()))?;

        self.clients
            .get_or_create(&profile.id, self.factory.as_ref(), &profile.params_of_create_s3_client)
            .await
    }

    pub async fn get_s3_profile_and_client_for_explorer(
        &self,
        store: &ProjectConfigStore,
    ) -> Result<Option<(S3Profile, Arc<S3Client>)>> {
        let Some(profile) = self
            .s3_profiles(store)
            .await?
            .into_iter()
            .find(|p| p.is_explorer_config)
        else {
            return Ok(None);
        };

        let client = self
            .clients
            .get_or_create(
                &profile.id,
                self.factory.as_ref(),
                &profile.params_of_create_s3_client,
            )
            .await?;

        Ok(Some((profile, client)))
    }

    pub async fn test_s3_credentials(
        &self,
        store: &ProjectConfigStore,
        profile_id: &str,
    ) -> Result<CredentialsTestStatus> {
        let params = self
            .s3_profiles(store)
            .await?
            .into_iter()
            .find(|p| p.id == profile_id)
            .map(|p| p.params_of_create_s3_client)
            .ok_or_else(|| ConsoleError::ProfileNotFound(profile_id.to_string()))?;

        self.credentials_tests.write().await.begin(&params);

        let outcome = self
            .factory
            .create(&params)
            .await
            .map(|_| ())
            .map_err(|e| e.to_string());

        let mut tests = self.credentials_tests.write().await;
        tests.complete(&params, outcome);
        Ok(tests.status_of(&params))
    }
}
