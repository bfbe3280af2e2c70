// SPDX-License-Identifier: EUPL-1.2

//! `s3://bucket/key/prefix/` parsing.

use serde::{Deserialize, Serialize};

use crate::error::{ConsoleError, Result};

const S3_SCHEME: &str = "s3://";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct S3UriPrefixObj {
    pub bucket: String,
    /// Empty, or ending with `/` when parsed in strict mode.
    pub key_prefix: String,
}

impl S3UriPrefixObj {
    pub fn to_uri(&self) -> String {
        format!("{S3_SCHEME}{}/{}", self.bucket, self.key_prefix)
    }
}

/// Parse an S3 URI prefix.
///
/// In strict mode a non-empty key prefix must designate a directory, i.e.
/// end with `/`.
pub fn parse_s3_uri_prefix(s3_uri_prefix: &str, strict: bool) -> Result<S3UriPrefixObj> {
    let malformed = |reason: &str| ConsoleError::MalformedS3Uri {
        uri: s3_uri_prefix.to_string(),
        reason: reason.to_string(),
    };

    let rest = s3_uri_prefix
        .strip_prefix(S3_SCHEME)
        .ok_or_else(|| malformed("must start with s3://"))?;

    let (bucket, key_prefix) = rest.split_once('/').unwrap_or((rest, ""));

    if bucket.is_empty() {
        return Err(malformed("bucket name is empty"));
    }

    if strict && !key_prefix.is_empty() && !key_prefix.ends_with('/') {
        return Err(malformed("key prefix must end with '/'"));
    }

    Ok(S3UriPrefixObj {
        bucket: bucket.to_string(),
        key_prefix: key_prefix.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_only() {
        let obj = parse_s3_uri_prefix("s3://datasets", true).unwrap();
        assert_eq!(obj.bucket, "datasets");
        assert_eq!(obj.key_prefix, "");
    }

    #[test]
    fn bucket_and_directory() {
        let obj = parse_s3_uri_prefix("s3://projet-alpha/shared/data/", true).unwrap();
        assert_eq!(obj.bucket, "projet-alpha");
        assert_eq!(obj.key_prefix, "shared/data/");
        assert_eq!(obj.to_uri(), "s3://projet-alpha/shared/data/");
    }

    #[test]
    fn strict_rejects_file_like_prefix() {
        assert!(parse_s3_uri_prefix("s3://bucket/file", true).is_err());
        assert!(parse_s3_uri_prefix("s3://bucket/file", false).is_ok());
    }

    #[test]
    fn malformed_uris() {
        assert!(matches!(
            parse_s3_uri_prefix("https://bucket/", true),
            Err(ConsoleError::MalformedS3Uri { .. })
        ));
        assert!(parse_s3_uri_prefix("s3:///key/", true).is_err());
    }
}
