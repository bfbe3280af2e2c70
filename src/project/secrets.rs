// SPDX-License-Identifier: EUPL-1.2

//! Key-value secret store consumed by the project configuration store.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;

use crate::error::{ConsoleError, Result};

/// Holds either a scalar in `value` or a serialized structure in `valueAsJson`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Secret {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_as_json: Option<String>,
}

impl Secret {
    pub fn scalar(value: Value) -> Self {
        Self {
            value: Some(value),
            value_as_json: None,
        }
    }

    pub fn json(value: &Value) -> Result<Self> {
        Ok(Self {
            value: None,
            value_as_json: Some(serde_json::to_string(value)?),
        })
    }

    /// The stored value; an empty secret reads as `null`.
    pub fn decode(&self) -> Result<Value> {
        match (&self.value_as_json, &self.value) {
            (Some(json), _) => Ok(serde_json::from_str(json)?),
            (None, Some(value)) => Ok(value.clone()),
            (None, None) => Ok(Value::Null),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretMetadata {
    pub created_time: DateTime<Utc>,
    pub updated_time: DateTime<Utc>,
    pub version: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GetSecretResult {
    pub secret: Secret,
    pub metadata: SecretMetadata,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ListResult {
    pub files: Vec<String>,
    pub directories: Vec<String>,
}

#[async_trait]
pub trait SecretsManager: Send + Sync {
    /// Direct children of `path`.
    async fn list(&self, path: &str) -> Result<ListResult>;

    /// Fails with [`ConsoleError::SecretNotFound`] when nothing is stored at `path`.
    async fn get(&self, path: &str) -> Result<GetSecretResult>;

    async fn put(&self, path: &str, secret: Secret) -> Result<()>;

    /// Deleting a missing secret is not an error.
    async fn delete(&self, path: &str) -> Result<()>;
}

pub(crate) fn normalize_dir(path: &str) -> String {
    format!("{}/", path.trim_end_matches('/'))
}

/// Split the paths under `dir` into direct files and sub-directories.
pub(crate) fn children_of<'a>(dir: &str, paths: impl Iterator<Item = &'a str>) -> ListResult {
    let prefix = normalize_dir(dir);
    let mut files = BTreeSet::new();
    let mut directories = BTreeSet::new();

    for rest in paths.filter_map(|p| p.strip_prefix(prefix.as_str())) {
        match rest.split_once('/') {
            Some((dir, _)) => directories.insert(dir.to_string()),
            None => files.insert(rest.to_string()),
        };
    }

    ListResult {
        files: files.into_iter().collect(),
        directories: directories.into_iter().collect(),
    }
}

/// Process-local secret store, used in tests and when no database is configured.
#[derive(Default)]
pub struct MemorySecretsManager {
    entries: RwLock<BTreeMap<String, GetSecretResult>>,
}

impl MemorySecretsManager {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SecretsManager for MemorySecretsManager {
    async fn list(&self, path: &str) -> Result<ListResult> {
        let entries = self.entries.read().await;
        Ok(children_of(path, entries.keys().map(String::as_str)))
    }

    async fn get(&self, path: &str) -> Result<GetSecretResult> {
        self.entries
            .read()
            .await
            .get(path)
            .cloned()
            .ok_or_else(|| ConsoleError::SecretNotFound(path.to_string()))
    }

    async fn put(&self, path: &str, secret: Secret) -> Result<()> {
        let now = Utc::now();
        let mut entries = self.entries.write().await;
        match entries.get_mut(path) {
            Some(existing) => {
                existing.secret = secret;
                existing.metadata.updated_time = now;
                existing.metadata.version += 1;
            }
            None => {
                entries.insert(
                    path.to_string(),
                    GetSecretResult {
                        secret,
                        metadata: SecretMetadata {
                            created_time: now,
                            updated_time: now,
                            version: 1,
                        },
                    },
                );
            }
        }
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.entries.write().await.remove(path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn put_get_delete() {
        let store = MemorySecretsManager::new();
        assert!(matches!(
            store.get("a/b").await,
            Err(ConsoleError::SecretNotFound(_))
        ));

        store.put("a/b", Secret::scalar(json!("x"))).await.unwrap();
        store.put("a/b", Secret::scalar(json!("y"))).await.unwrap();
        let got = store.get("a/b").await.unwrap();
        assert_eq!(got.secret.decode().unwrap(), json!("y"));
        assert_eq!(got.metadata.version, 2);

        store.delete("a/b").await.unwrap();
        store.delete("a/b").await.unwrap();
        assert!(store.get("a/b").await.is_err());
    }

    #[tokio::test]
    async fn list_returns_direct_children() {
        let store = MemorySecretsManager::new();
        for path in ["p/.onyxia/s3Profiles", "p/.onyxia/servicePassword", "p/data/x", "q/y"] {
            store.put(path, Secret::default()).await.unwrap();
        }

        let root = store.list("p").await.unwrap();
        assert!(root.files.is_empty());
        assert_eq!(root.directories, vec![".onyxia", "data"]);

        let reserved = store.list("p/.onyxia/").await.unwrap();
        assert_eq!(reserved.files, vec!["s3Profiles", "servicePassword"]);
    }

    #[test]
    fn json_and_scalar_secrets_decode() {
        let structure = json!({ "profiles": [] });
        assert_eq!(Secret::json(&structure).unwrap().decode().unwrap(), structure);
        assert_eq!(Secret::scalar(json!(2)).decode().unwrap(), json!(2));
        assert_eq!(Secret::default().decode().unwrap(), Value::Null);
    }
}
