use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};
use crate::file::FileBackend;
use crate::traits::PersistenceBackend;

/// Object key used when an `s3://` descriptor names only a bucket.
pub const DEFAULT_OBJECT_KEY: &str = "state.json";

/// Where the document is persisted, parsed from a descriptor string.
///
/// Accepted forms:
/// - `file://<path>` (relative or absolute)
/// - `s3://<bucket>` or `s3://<bucket>/<key>`
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StorageLocation {
    File { path: PathBuf },
    S3 { bucket: String, key: String },
}

impl FromStr for StorageLocation {
    type Err = StoreError;

    fn from_str(descriptor: &str) -> Result<Self, Self::Err> {
        if let Some(path) = descriptor.strip_prefix("file://") {
            if path.is_empty() {
                return Err(StoreError::descriptor(descriptor, "missing file path"));
            }
            return Ok(Self::File { path: PathBuf::from(path) });
        }

        if let Some(rest) = descriptor.strip_prefix("s3://") {
            let (bucket, key) = match rest.split_once('/') {
                Some((bucket, key)) => (bucket, key.trim_matches('/')),
                None => (rest, ""),
            };
            if bucket.is_empty() {
                return Err(StoreError::descriptor(descriptor, "missing bucket name"));
            }
            let key = if key.is_empty() { DEFAULT_OBJECT_KEY } else { key };
            return Ok(Self::S3 {
                bucket: bucket.to_string(),
                key: key.to_string(),
            });
        }

        Err(StoreError::descriptor(
            descriptor,
            "unsupported scheme, expected file:// or s3://",
        ))
    }
}

/// Overrides for the S3 client. Unset fields fall back to the public AWS
/// endpoint and the default region.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct S3Options {
    pub endpoint: Option<String>,
    pub region: Option<String>,
}

impl StorageLocation {
    /// Construct the backend this location points at.
    ///
    /// Fails when the object store client cannot be built, or when an `s3://`
    /// location is requested from a build without the `s3` feature.
    pub async fn open(&self, s3: &S3Options) -> StoreResult<Arc<dyn PersistenceBackend>> {
        match self {
            Self::File { path } => Ok(Arc::new(FileBackend::new(path.clone()))),
            #[cfg(feature = "s3")]
            Self::S3 { bucket, key } => {
                let backend = crate::s3::S3Backend::connect(bucket, key, s3).await?;
                Ok(Arc::new(backend))
            }
            #[cfg(not(feature = "s3"))]
            Self::S3 { .. } => {
                let _ = s3;
                Err(StoreError::descriptor(
                    self.to_string(),
                    "built without S3 support (enable the `s3` feature)",
                ))
            }
        }
    }
}

impl fmt::Display for StorageLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File { path } => write!(f, "file://{}", path.display()),
            Self::S3 { bucket, key } => write!(f, "s3://{bucket}/{key}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_file_paths() {
        let loc: StorageLocation = "file://state.json".parse().unwrap();
        assert_eq!(loc, StorageLocation::File { path: "state.json".into() });

        let loc: StorageLocation = "file:///var/lib/tailpol/state.json".parse().unwrap();
        assert_eq!(
            loc,
            StorageLocation::File { path: "/var/lib/tailpol/state.json".into() }
        );
    }

    #[test]
    fn parses_s3_bucket_and_key() {
        let loc: StorageLocation = "s3://policies/prod/state.json".parse().unwrap();
        assert_eq!(
            loc,
            StorageLocation::S3 { bucket: "policies".into(), key: "prod/state.json".into() }
        );
    }

    #[test]
    fn s3_key_defaults() {
        for descriptor in ["s3://policies", "s3://policies/"] {
            let loc: StorageLocation = descriptor.parse().unwrap();
            assert_eq!(
                loc,
                StorageLocation::S3 { bucket: "policies".into(), key: DEFAULT_OBJECT_KEY.into() }
            );
        }
    }

    #[test]
    fn rejects_bad_descriptors() {
        for descriptor in ["", "state.json", "ftp://host/file", "file://", "s3://", "s3:///key"] {
            let err = descriptor.parse::<StorageLocation>().unwrap_err();
            assert!(matches!(err, StoreError::Descriptor { .. }), "{descriptor}");
        }
    }

    #[tokio::test]
    async fn opens_file_backend() {
        let loc: StorageLocation = "file://some/dir/state.json".parse().unwrap();
        let backend = loc.open(&S3Options::default()).await.unwrap();
        assert_eq!(backend.describe(), "file://some/dir/state.json");
    }

    #[test]
    fn display_round_trips() {
        let loc: StorageLocation = "s3://b/k".parse().unwrap();
        assert_eq!(loc.to_string(), "s3://b/k");
        assert_eq!(loc.to_string().parse::<StorageLocation>().unwrap(), loc);
    }
}
