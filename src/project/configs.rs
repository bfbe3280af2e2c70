// SPDX-License-Identifier: EUPL-1.2

//! Per-project settings persisted in the secret store.
//!
//! Each top-level field of [`ProjectConfigs`] is stored as its own secret
//! under the project's reserved directory. Scalars use the `value` slot of
//! the secret, structures are serialized into `valueAsJson`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::{ConsoleError, Result};

pub const CURRENT_MODEL_VERSION: u64 = 2;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct S3Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_token: Option<String>,
}

/// A bookmark added by a user to one of their own profiles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserBookmark {
    #[serde(default)]
    pub display_name: Option<String>,
    pub s3_uri_prefix: String,
}

/// A profile created by the user or a member of the group project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredS3Profile {
    /// Milliseconds since epoch; doubles as the profile id.
    pub creation_time: i64,
    pub friendly_name: String,
    pub url: String,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub path_style_access: bool,
    #[serde(default)]
    pub credentials: Option<S3Credentials>,
    #[serde(default)]
    pub bookmarks: Vec<UserBookmark>,
}

impl StoredS3Profile {
    pub fn id(&self) -> String {
        self.creation_time.to_string()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct S3ProfilesConfig {
    pub profiles: Vec<StoredS3Profile>,
    pub default_x_onyxia_profile_id: Option<String>,
    pub explorer_profile_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HelmValuesPatchEntry {
    pub path: Vec<String>,
    pub value: Value,
}

/// A saved launcher configuration the user can start again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestorableServiceConfig {
    pub friendly_name: String,
    pub is_shared: bool,
    pub catalog_id: String,
    pub chart_name: String,
    #[serde(default)]
    pub chart_version: Option<String>,
    pub helm_values_patch: Vec<HelmValuesPatchEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectConfigs {
    #[serde(rename = "__modelVersion")]
    pub model_version: u64,
    pub service_password: String,
    pub restorable_service_configs: Vec<RestorableServiceConfig>,
    pub s3_profiles: S3ProfilesConfig,
    pub cluster_notification_checkout_time: i64,
}

/// Top-level keys of [`ProjectConfigs`], one secret each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProjectConfigKey {
    ModelVersion,
    ServicePassword,
    RestorableServiceConfigs,
    S3Profiles,
    ClusterNotificationCheckoutTime,
}

impl ProjectConfigKey {
    pub const ALL: [ProjectConfigKey; 5] = [
        ProjectConfigKey::ModelVersion,
        ProjectConfigKey::ServicePassword,
        ProjectConfigKey::RestorableServiceConfigs,
        ProjectConfigKey::S3Profiles,
        ProjectConfigKey::ClusterNotificationCheckoutTime,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectConfigKey::ModelVersion => "__modelVersion",
            ProjectConfigKey::ServicePassword => "servicePassword",
            ProjectConfigKey::RestorableServiceConfigs => "restorableServiceConfigs",
            ProjectConfigKey::S3Profiles => "s3Profiles",
            ProjectConfigKey::ClusterNotificationCheckoutTime => "clusterNotificationCheckoutTime",
        }
    }

    /// Whether the value lives in the `value` slot rather than `valueAsJson`.
    pub fn is_scalar(&self) -> bool {
        matches!(
            self,
            ProjectConfigKey::ModelVersion
                | ProjectConfigKey::ServicePassword
                | ProjectConfigKey::ClusterNotificationCheckoutTime
        )
    }

    pub fn default_value(&self) -> Value {
        match self {
            ProjectConfigKey::ModelVersion => Value::from(CURRENT_MODEL_VERSION),
            ProjectConfigKey::ServicePassword => Value::from(generate_service_password()),
            ProjectConfigKey::RestorableServiceConfigs => Value::Array(Vec::new()),
            ProjectConfigKey::S3Profiles => {
                serde_json::to_value(S3ProfilesConfig::default()).unwrap_or(Value::Null)
            }
            ProjectConfigKey::ClusterNotificationCheckoutTime => Value::from(0),
        }
    }

    /// Round-trip a raw value through its typed form so that equivalent
    /// encodings compare equal.
    pub fn normalize(&self, value: Value) -> Result<Value> {
        fn typed<T: serde::de::DeserializeOwned + Serialize>(value: Value) -> Result<Value> {
            Ok(serde_json::to_value(serde_json::from_value::<T>(value)?)?)
        }

        match self {
            ProjectConfigKey::ModelVersion => typed::<u64>(value),
            ProjectConfigKey::ServicePassword => typed::<String>(value),
            ProjectConfigKey::RestorableServiceConfigs => {
                typed::<Vec<RestorableServiceConfig>>(value)
            }
            ProjectConfigKey::S3Profiles => typed::<S3ProfilesConfig>(value),
            ProjectConfigKey::ClusterNotificationCheckoutTime => typed::<i64>(value),
        }
    }
}

impl fmt::Display for ProjectConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProjectConfigKey {
    type Err = ConsoleError;

    fn from_str(s: &str) -> Result<Self> {
        ProjectConfigKey::ALL
            .into_iter()
            .find(|key| key.as_str() == s)
            .ok_or_else(|| ConsoleError::Validation(format!("unknown project config key '{s}'")))
    }
}

pub fn generate_service_password() -> String {
    Uuid::new_v4().simple().to_string()
}

impl ProjectConfigs {
    /// Validate an assembled key/value map against the full schema.
    pub fn from_map(map: Map<String, Value>) -> Result<Self> {
        let configs: ProjectConfigs = serde_json::from_value(Value::Object(map))?;
        if configs.model_version != CURRENT_MODEL_VERSION {
            return Err(ConsoleError::Validation(format!(
                "expected model version {CURRENT_MODEL_VERSION}, found {}",
                configs.model_version
            )));
        }
        Ok(configs)
    }

    pub fn to_map(&self) -> Result<Map<String, Value>> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            _ => Err(ConsoleError::Internal(anyhow::anyhow!(
                "project configs did not serialize to an object"
            ))),
        }
    }

    pub fn get(&self, key: ProjectConfigKey) -> Result<Value> {
        Ok(self.to_map()?.remove(key.as_str()).unwrap_or(Value::Null))
    }

    /// Copy of `self` with `key` replaced, validated against the schema.
    pub fn with_value(&self, key: ProjectConfigKey, value: Value) -> Result<Self> {
        let mut map = self.to_map()?;
        map.insert(key.as_str().to_string(), value);
        ProjectConfigs::from_map(map).map_err(|e| {
            ConsoleError::Validation(format!("invalid value for '{key}': {e}"))
        })
    }
}
