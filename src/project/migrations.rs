// SPDX-License-Identifier: EUPL-1.2

//! Forward migrations of the persisted project configuration.
//!
//! | version | changes                                                              |
//! |---------|----------------------------------------------------------------------|
//! | 0       | no `__modelVersion` key; `restorableConfigs` and `s3` (index based)  |
//! | 1       | `restorableConfigs` becomes `restorableServiceConfigs`               |
//! | 2       | `s3` becomes `s3Profiles`, default/explorer pointers are profile ids |
//!
//! Each step reads the legacy keys it knows about (an absent key is treated
//! as the legacy default), writes the new keys, then bumps the version. A
//! failing step clears the whole reserved directory; a version newer than
//! this release knows is an error and nothing is touched.

use serde::Deserialize;
use serde_json::Value;

use super::configs::{
    HelmValuesPatchEntry, ProjectConfigKey, RestorableServiceConfig, S3Credentials,
    S3ProfilesConfig, StoredS3Profile, UserBookmark, CURRENT_MODEL_VERSION,
};
use super::secrets::{Secret, SecretsManager};
use crate::error::{ConsoleError, Result};

const LEGACY_RESTORABLE_CONFIGS: &str = "restorableConfigs";
const LEGACY_S3: &str = "s3";

pub(crate) fn key_path(config_dir: &str, key: &str) -> String {
    format!("{}/{key}", config_dir.trim_end_matches('/'))
}

async fn read_optional(secrets: &dyn SecretsManager, path: &str) -> Result<Option<Value>> {
    match secrets.get(path).await {
        Ok(found) => Ok(Some(found.secret.decode()?)),
        Err(ConsoleError::SecretNotFound(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

async fn read_model_version(secrets: &dyn SecretsManager, config_dir: &str) -> Result<u64> {
    let path = key_path(config_dir, ProjectConfigKey::ModelVersion.as_str());
    match read_optional(secrets, &path).await? {
        None => Ok(0),
        Some(value) => value.as_u64().ok_or_else(|| {
            ConsoleError::Validation(format!("model version is not a number: {value}"))
        }),
    }
}

async fn write_model_version(secrets: &dyn SecretsManager, config_dir: &str, version: u64) -> Result<()> {
    let path = key_path(config_dir, ProjectConfigKey::ModelVersion.as_str());
    secrets.put(&path, Secret::scalar(Value::from(version))).await
}

// ── v0 → v1 ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyFormFieldValue {
    /// Dot-joined path, e.g. `resources.limits.cpu`.
    path: String,
    value: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyRestorableConfig {
    catalog_id: String,
    chart_name: String,
    #[serde(default)]
    chart_version: Option<String>,
    #[serde(default)]
    form_fields_value_different_from_default: Vec<LegacyFormFieldValue>,
}

impl From<LegacyRestorableConfig> for RestorableServiceConfig {
    fn from(legacy: LegacyRestorableConfig) -> Self {
        RestorableServiceConfig {
            friendly_name: legacy.chart_name.clone(),
            is_shared: false,
            catalog_id: legacy.catalog_id,
            chart_name: legacy.chart_name,
            chart_version: legacy.chart_version,
            helm_values_patch: legacy
                .form_fields_value_different_from_default
                .into_iter()
                .map(|field| HelmValuesPatchEntry {
                    path: field.path.split('.').map(str::to_string).collect(),
                    value: field.value,
                })
                .collect(),
        }
    }
}

async fn v0_to_v1(secrets: &dyn SecretsManager, config_dir: &str) -> Result<()> {
    let legacy_path = key_path(config_dir, LEGACY_RESTORABLE_CONFIGS);

    let legacy: Vec<LegacyRestorableConfig> = match read_optional(secrets, &legacy_path).await? {
        None | Some(Value::Null) => Vec::new(),
        Some(value) => serde_json::from_value(value)?,
    };

    let migrated: Vec<RestorableServiceConfig> = legacy.into_iter().map(Into::into).collect();

    secrets
        .put(
            &key_path(config_dir, ProjectConfigKey::RestorableServiceConfigs.as_str()),
            Secret::json(&serde_json::to_value(&migrated)?)?,
        )
        .await?;
    secrets.delete(&legacy_path).await
}

// ── v1 → v2 ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyCustomS3Config {
    creation_time: i64,
    #[serde(default, alias = "accountFriendlyName")]
    friendly_name: Option<String>,
    url: String,
    #[serde(default)]
    region: Option<String>,
    #[serde(default)]
    path_style_access: bool,
    #[serde(default)]
    credentials: Option<S3Credentials>,
    /// `bucket/prefix/`, without scheme.
    #[serde(default)]
    working_directory_path: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyS3 {
    #[serde(default)]
    custom_configs: Vec<LegacyCustomS3Config>,
    #[serde(default)]
    index_for_x_onyxia: Option<usize>,
    #[serde(default)]
    index_for_explorer: Option<usize>,
}

impl From<LegacyS3> for S3ProfilesConfig {
    fn from(legacy: LegacyS3) -> Self {
        let id_at = |index: Option<usize>| {
            index
                .and_then(|i| legacy.custom_configs.get(i))
                .map(|c| c.creation_time.to_string())
        };

        let default_x_onyxia_profile_id = id_at(legacy.index_for_x_onyxia);
        let explorer_profile_id = id_at(legacy.index_for_explorer);

        let profiles = legacy
            .custom_configs
            .into_iter()
            .map(|c| StoredS3Profile {
                friendly_name: c.friendly_name.unwrap_or_else(|| c.url.clone()),
                bookmarks: c
                    .working_directory_path
                    .filter(|p| !p.is_empty())
                    .map(|p| UserBookmark {
                        display_name: None,
                        s3_uri_prefix: format!("s3://{}", p.trim_start_matches('/')),
                    })
                    .into_iter()
                    .collect(),
                creation_time: c.creation_time,
                url: c.url,
                region: c.region,
                path_style_access: c.path_style_access,
                credentials: c.credentials,
            })
            .collect();

        S3ProfilesConfig {
            profiles,
            default_x_onyxia_profile_id,
            explorer_profile_id,
        }
    }
}

async fn v1_to_v2(secrets: &dyn SecretsManager, config_dir: &str) -> Result<()> {
    let legacy_path = key_path(config_dir, LEGACY_S3);

    let legacy: LegacyS3 = match read_optional(secrets, &legacy_path).await? {
        None | Some(Value::Null) => LegacyS3::default(),
        Some(value) => serde_json::from_value(value)?,
    };

    let migrated = S3ProfilesConfig::from(legacy);

    secrets
        .put(
            &key_path(config_dir, ProjectConfigKey::S3Profiles.as_str()),
            Secret::json(&serde_json::to_value(&migrated)?)?,
        )
        .await?;
    secrets.delete(&legacy_path).await
}

// ── Chain ─────────────────────────────────────────────────────────────────────

async fn run_chain(secrets: &dyn SecretsManager, config_dir: &str) -> Result<u64> {
    let mut version = read_model_version(secrets, config_dir).await?;

    if version > CURRENT_MODEL_VERSION {
        return Err(ConsoleError::UnsupportedModelVersion {
            found: version,
            supported: CURRENT_MODEL_VERSION,
        });
    }

    while version < CURRENT_MODEL_VERSION {
        match version {
            0 => v0_to_v1(secrets, config_dir).await?,
            1 => v1_to_v2(secrets, config_dir).await?,
            other => unreachable!("no migration step from version {other}"),
        }
        version += 1;
        write_model_version(secrets, config_dir, version).await?;
        tracing::info!("Migrated project configs in {config_dir} to version {version}");
    }

    Ok(version)
}

/// Delete every secret directly under the reserved directory.
pub async fn clear_config_dir(secrets: &dyn SecretsManager, config_dir: &str) -> Result<()> {
    let listing = secrets.list(config_dir).await?;
    for file in listing.files {
        secrets.delete(&key_path(config_dir, &file)).await?;
    }
    Ok(())
}

/// Bring the reserved directory to the current model version.
///
/// Migration is best effort: on failure the directory is wiped so that the
/// next load starts from defaults. Data written by a newer release is left
/// untouched and reported instead.
pub async fn migrate_project_configs(secrets: &dyn SecretsManager, config_dir: &str) -> Result<()> {
    match run_chain(secrets, config_dir).await {
        Ok(_) => Ok(()),
        Err(e @ ConsoleError::UnsupportedModelVersion { .. }) => Err(e),
        Err(e) => {
            tracing::warn!("Migration of project configs in {config_dir} failed, resetting: {e}");
            clear_config_dir(secrets, config_dir).await
        }
    }
}
