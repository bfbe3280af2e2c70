// SPDX-License-Identifier: EUPL-1.2

//! S3 profiles: region templates resolved against the user's identity,
//! merged with the profiles stored in the project configuration.

pub mod bookmarks;
pub mod claims;
pub mod client;
pub mod credentials_test;
pub mod glob;
pub mod hash;
pub mod profiles;
pub mod reconcile;
pub mod region;
pub mod service;
pub mod sts;
pub mod template;
pub mod uri;
