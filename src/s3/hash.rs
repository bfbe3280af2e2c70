// SPDX-License-Identifier: EUPL-1.2

//! Stable identifiers for region-defined profiles.

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::{ConsoleError, Result};

/// SHA-256 of the RFC 8785 canonical JSON of `value`, hex-encoded.
///
/// Object keys are sorted by the canonicalization, so the id does not depend
/// on field declaration order.
pub fn stable_id<T: Serialize>(value: &T) -> Result<String> {
    let canonical = serde_jcs::to_vec(value)
        .map_err(|e| ConsoleError::Internal(anyhow::anyhow!("Failed to canonicalize json: {e}")))?;
    Ok(hex::encode(Sha256::digest(&canonical)))
}
