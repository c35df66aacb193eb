//! Dataset location and metadata loading strategies

use crate::address::{derive_storage_key_from_local_path, metadata_key};
use crate::error::{FrameStoreError, Result};
use crate::io::{read_body_to_end, BlobStore, ObjectMetadata};
use crate::metadata::DatasetMetadata;
use crate::{DATASET_PROPERTIES_NAME, DEFAULT_TRANSFER_SIZE};
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Where a dataset's frame objects live
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DatasetLocation {
    pub bucket: String,
    /// Key prefix shared by all objects of the dataset, no trailing slash
    pub prefix: String,
}

impl DatasetLocation {
    pub fn new(bucket: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            prefix: prefix.into().trim_end_matches('/').to_string(),
        }
    }

    /// Location for a local dataset directory such as `/data/proj/line/shots.js`
    pub fn from_local_path(bucket: impl Into<String>, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let prefix = derive_storage_key_from_local_path(path).ok_or_else(|| {
            FrameStoreError::Configuration(format!(
                "Cannot derive a storage prefix from {}",
                path.display()
            ))
        })?;
        Ok(Self::new(bucket, prefix))
    }

    /// Key of the metadata document
    pub fn metadata_key(&self) -> String {
        metadata_key(&self.prefix)
    }
}

impl fmt::Display for DatasetLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.bucket, self.prefix)
    }
}

/// How a session obtains the dataset metadata document
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataSource {
    /// Read `<prefix>/DatasetProperties.json` from the blob store
    Remote,
    /// Read a JSON file on the local file system
    LocalFile(PathBuf),
}

impl MetadataSource {
    /// Local metadata file inside a dataset directory
    pub fn local_dataset(dataset_dir: impl AsRef<Path>) -> Self {
        MetadataSource::LocalFile(dataset_dir.as_ref().join(DATASET_PROPERTIES_NAME))
    }
}

/// Load and validate the metadata through `source`
pub async fn load_metadata(
    store: &dyn BlobStore,
    location: &DatasetLocation,
    source: &MetadataSource,
) -> Result<DatasetMetadata> {
    match source {
        MetadataSource::Remote => fetch_metadata(store, location).await,
        MetadataSource::LocalFile(path) => read_local_metadata(path).await,
    }
}

/// Read the metadata document stored with the dataset
pub async fn fetch_metadata(
    store: &dyn BlobStore,
    location: &DatasetLocation,
) -> Result<DatasetMetadata> {
    let key = location.metadata_key();
    let mut object = match store.get(&location.bucket, &key).await {
        Ok(object) => object,
        Err(FrameStoreError::NotFound { bucket, key }) => {
            return Err(FrameStoreError::Metadata(format!(
                "No dataset metadata at {}/{}",
                bucket, key
            )))
        }
        Err(e) => return Err(e),
    };
    let size_hint = usize::try_from(object.content_length).unwrap_or(0);
    let bytes = read_body_to_end(object.body.as_mut(), DEFAULT_TRANSFER_SIZE, size_hint).await?;
    DatasetMetadata::from_json(&bytes)
}

/// True if a metadata document exists for the dataset
pub async fn dataset_exists(store: &dyn BlobStore, location: &DatasetLocation) -> Result<bool> {
    store.exists(&location.bucket, &location.metadata_key()).await
}

/// Write the metadata document, refusing to replace one unless `overwrite`
pub async fn store_metadata(
    store: &dyn BlobStore,
    location: &DatasetLocation,
    metadata: &DatasetMetadata,
    overwrite: bool,
) -> Result<()> {
    metadata.validate()?;
    let key = location.metadata_key();
    if !overwrite && store.exists(&location.bucket, &key).await? {
        return Err(FrameStoreError::AlreadyExists(format!(
            "{}/{}",
            location.bucket, key
        )));
    }
    let json = metadata.to_json()?;
    store
        .put(&location.bucket, &key, &json, &ObjectMetadata::new())
        .await
}

/// Read a metadata document from a local file
pub async fn read_local_metadata(path: impl AsRef<Path>) -> Result<DatasetMetadata> {
    let path = path.as_ref();
    let bytes = fs::read(path).await.map_err(|e| {
        FrameStoreError::Metadata(format!("Cannot read {}: {}", path.display(), e))
    })?;
    DatasetMetadata::from_json(&bytes)
}

/// Write a metadata document to a local file, creating parent directories
pub async fn write_local_metadata(path: impl AsRef<Path>, metadata: &DatasetMetadata) -> Result<()> {
    let path = path.as_ref();
    metadata.validate()?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    fs::write(path, metadata.to_json()?).await?;
    Ok(())
}
