// SPDX-License-Identifier: EUPL-1.2

//! Projects and their persisted configuration.

pub mod configs;
pub mod migrations;
pub mod pg_secrets;
pub mod secrets;
pub mod store;

use serde::Serialize;

/// A workspace the user can act in: their personal space or a group project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    /// Root of the project's namespace in the secret store.
    pub vault_top_dir_path: String,
}
