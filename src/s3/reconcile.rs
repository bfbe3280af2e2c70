// SPDX-License-Identifier: EUPL-1.2

//! Repair of the default/explorer pointers after profiles disappear.

use super::credentials_test::CredentialsTestState;
use super::profiles::{aggregate_s3_profiles, S3Profile};
use super::region::ResolvedRegionProfile;
use crate::project::configs::S3ProfilesConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PointerUpdate {
    pub is_update_needed: bool,
    pub new_profile_id: Option<String>,
}

impl PointerUpdate {
    const NOT_NEEDED: PointerUpdate = PointerUpdate {
        is_update_needed: false,
        new_profile_id: None,
    };
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefaultProfilesUpdate {
    pub default_x_onyxia: PointerUpdate,
    pub explorer: PointerUpdate,
}

impl DefaultProfilesUpdate {
    pub fn is_update_needed(&self) -> bool {
        self.default_x_onyxia.is_update_needed || self.explorer.is_update_needed
    }

    /// Write the replacements into `config`. Returns whether anything changed.
    pub fn apply(&self, config: &mut S3ProfilesConfig) -> bool {
        if self.default_x_onyxia.is_update_needed {
            config.default_x_onyxia_profile_id = self.default_x_onyxia.new_profile_id.clone();
        }
        if self.explorer.is_update_needed {
            config.explorer_profile_id = self.explorer.new_profile_id.clone();
        }
        self.is_update_needed()
    }
}

pub fn update_default_s3_profiles_after_potential_deletion(
    from_region: &[ResolvedRegionProfile],
    from_vault: &S3ProfilesConfig,
) -> DefaultProfilesUpdate {
    // Bookmarks and test results play no part in which ids exist.
    let from_region: Vec<_> = from_region
        .iter()
        .map(ResolvedRegionProfile::without_bookmarks)
        .collect();
    let profiles = aggregate_s3_profiles(from_vault, &from_region, &CredentialsTestState::default());

    let fallback_id = profiles
        .iter()
        .find(|p| p.is_defined_in_region())
        .map(|p| p.id.clone());

    let reconcile = |stored: Option<&str>| -> PointerUpdate {
        let Some(stored) = stored else {
            return PointerUpdate::NOT_NEEDED;
        };
        if profiles.iter().any(|p: &S3Profile| p.id == stored) {
            return PointerUpdate::NOT_NEEDED;
        }
        tracing::info!("S3 profile {stored} no longer exists, falling back to {fallback_id:?}");
        PointerUpdate {
            is_update_needed: true,
            new_profile_id: fallback_id.clone(),
        }
    };

    DefaultProfilesUpdate {
        default_x_onyxia: reconcile(from_vault.default_x_onyxia_profile_id.as_deref()),
        explorer: reconcile(from_vault.explorer_profile_id.as_deref()),
    }
}
