// SPDX-License-Identifier: EUPL-1.2

//! Versioned, conflict-detecting store of one user's project configuration.
//!
//! ```text
//! Uninitialized ──change_project──▶ migrate ──▶ load-or-default ──▶ Ready
//!                                                   │      ▲
//!                                          invalid  ▼      │ (once)
//!                                                 clear ───┘
//! ```
//!
//! Every write goes through [`ProjectConfigStore::modify_config_value`],
//! which holds the store mutex across the read-compare-write sequence. When
//! the remote value no longer matches what this store last saw, the write is
//! abandoned, the store drops back to `Uninitialized` and the caller gets
//! [`ConsoleError::ConcurrentModification`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::sync::{Mutex, RwLock};

use super::configs::{generate_service_password, ProjectConfigKey, ProjectConfigs};
use super::migrations::{clear_config_dir, key_path, migrate_project_configs};
use super::secrets::{Secret, SecretsManager};
use super::Project;
use crate::error::{ConsoleError, Result};

/// Sub-directory of a project's vault path reserved for console settings.
pub const RESERVED_DIR: &str = ".onyxia";

pub fn config_dir_of(project: &Project) -> String {
    format!(
        "{}/{RESERVED_DIR}",
        project.vault_top_dir_path.trim_end_matches('/')
    )
}

#[derive(Debug, Clone)]
enum StoreState {
    /// `previous` is the project to reload after a forced reset.
    Uninitialized { previous: Option<Project> },
    Ready {
        project: Project,
        configs: ProjectConfigs,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Unchanged,
    Updated,
}

pub struct ProjectConfigStore {
    secrets: Arc<dyn SecretsManager>,
    state: RwLock<StoreState>,
    update_lock: Mutex<()>,
    /// Bumped on every project switch. Work done outside the store mutex
    /// compares it before committing.
    generation: AtomicU64,
}

impl ProjectConfigStore {
    pub fn new(secrets: Arc<dyn SecretsManager>) -> Self {
        Self {
            secrets,
            state: RwLock::new(StoreState::Uninitialized { previous: None }),
            update_lock: Mutex::new(()),
            generation: AtomicU64::new(0),
        }
    }

    /// Changes whenever another project is selected.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub async fn is_ready(&self) -> bool {
        matches!(*self.state.read().await, StoreState::Ready { .. })
    }

    /// The selected project, or the one to reload after a reset.
    pub async fn current_project(&self) -> Option<Project> {
        match &*self.state.read().await {
            StoreState::Ready { project, .. } => Some(project.clone()),
            StoreState::Uninitialized { previous } => previous.clone(),
        }
    }

    pub async fn configs(&self) -> Result<ProjectConfigs> {
        match &*self.state.read().await {
            StoreState::Ready { configs, .. } => Ok(configs.clone()),
            StoreState::Uninitialized { .. } => Err(ConsoleError::NotInitialized("project configs")),
        }
    }

    /// Select `project`, migrating and loading its configuration.
    pub async fn change_project(&self, project: Project) -> Result<ProjectConfigs> {
        let _guard = self.update_lock.lock().await;
        self.generation.fetch_add(1, Ordering::SeqCst);

        {
            let mut state = self.state.write().await;
            *state = StoreState::Uninitialized {
                previous: Some(project.clone()),
            };
        }

        let config_dir = config_dir_of(&project);
        tracing::info!("Switching to project {} ({config_dir})", project.id);

        migrate_project_configs(self.secrets.as_ref(), &config_dir).await?;
        let configs = self.load_or_default(&config_dir).await?;

        *self.state.write().await = StoreState::Ready {
            project,
            configs: configs.clone(),
        };
        Ok(configs)
    }

    async fn read_or_default(&self, config_dir: &str, key: ProjectConfigKey) -> Result<Value> {
        let path = key_path(config_dir, key.as_str());
        match self.secrets.get(&path).await {
            Ok(found) => found.secret.decode(),
            Err(ConsoleError::SecretNotFound(_)) => {
                let value = key.default_value();
                self.secrets.put(&path, secret_for(key, &value)?).await?;
                tracing::debug!("Initialized {path} with its default");
                Ok(value)
            }
            Err(e) => Err(e),
        }
    }

    async fn load_once(&self, config_dir: &str) -> Result<ProjectConfigs> {
        let mut map = Map::new();
        for key in ProjectConfigKey::ALL {
            map.insert(key.as_str().to_string(), self.read_or_default(config_dir, key).await?);
        }
        ProjectConfigs::from_map(map)
    }

    /// Defaults are schema-valid, so a single clear-and-retry is enough; a
    /// second failure means the store itself is misbehaving.
    async fn load_or_default(&self, config_dir: &str) -> Result<ProjectConfigs> {
        match self.load_once(config_dir).await {
            Ok(configs) => Ok(configs),
            Err(e) if is_schema_error(&e) => {
                tracing::warn!("Project configs in {config_dir} are invalid, resetting: {e}");
                clear_config_dir(self.secrets.as_ref(), config_dir).await?;
                self.load_once(config_dir)
                    .await
                    .map_err(|e| ConsoleError::CorruptProjectConfigs(e.to_string()))
            }
            Err(e) => Err(e),
        }
    }

    /// Replace one top-level value. See [`Self::modify_config_value`].
    pub async fn update_config_value(&self, key: ProjectConfigKey, value: Value) -> Result<UpdateOutcome> {
        self.modify_config_value(key, move |_| Ok(value)).await
    }

    pub async fn renew_service_password(&self) -> Result<String> {
        let password = generate_service_password();
        self.update_config_value(ProjectConfigKey::ServicePassword, Value::from(password.clone()))
            .await?;
        Ok(password)
    }

    /// Compute a new value for `key` from the current configuration and
    /// persist it, all under the store mutex.
    ///
    /// A value structurally equal to the current one is neither dispatched
    /// nor written. If the remote value differs from the one last loaded,
    /// nothing is written and the store is reset.
    pub async fn modify_config_value<F>(&self, key: ProjectConfigKey, f: F) -> Result<UpdateOutcome>
    where
        F: FnOnce(&ProjectConfigs) -> Result<Value>,
    {
        let _guard = self.update_lock.lock().await;

        let (project, configs) = match &*self.state.read().await {
            StoreState::Ready { project, configs } => (project.clone(), configs.clone()),
            StoreState::Uninitialized { .. } => {
                return Err(ConsoleError::NotInitialized("project configs"))
            }
        };

        let current = configs.get(key)?;
        let next = key.normalize(f(&configs)?).map_err(|e| {
            ConsoleError::Validation(format!("invalid value for '{key}': {e}"))
        })?;

        if next == current {
            return Ok(UpdateOutcome::Unchanged);
        }

        let next_configs = configs.with_value(key, next.clone())?;

        let path = key_path(&config_dir_of(&project), key.as_str());
        let remote = match self.secrets.get(&path).await {
            Ok(found) => Some(found.secret.decode().and_then(|v| key.normalize(v))),
            Err(ConsoleError::SecretNotFound(_)) => None,
            Err(e) => return Err(e),
        };

        if !matches!(&remote, Some(Ok(remote)) if *remote == current) {
            tracing::warn!(
                "{path} was modified concurrently, dropping local state of project {}",
                project.id
            );
            *self.state.write().await = StoreState::Uninitialized {
                previous: Some(project),
            };
            return Err(ConsoleError::ConcurrentModification(key.to_string()));
        }

        self.secrets.put(&path, secret_for(key, &next)?).await?;

        *self.state.write().await = StoreState::Ready {
            project,
            configs: next_configs,
        };
        tracing::debug!("Updated {path}");
        Ok(UpdateOutcome::Updated)
    }
}

fn is_schema_error(e: &ConsoleError) -> bool {
    matches!(e, ConsoleError::Json(_) | ConsoleError::Validation(_))
}

fn secret_for(key: ProjectConfigKey, value: &Value) -> Result<Secret> {
    if key.is_scalar() {
        Ok(Secret::scalar(value.clone()))
    } else {
        Secret::json(value)
    }
}
