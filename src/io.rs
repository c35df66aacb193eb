//! Blob store clients for different storage backends

use crate::error::{FrameStoreError, Result};
use crate::memory::MemoryBlobStore;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Per-object string attributes
pub type ObjectMetadata = HashMap<String, String>;

/// Look up an attribute, falling back to a case-insensitive match
///
/// S3-compatible services lower-case user metadata names on the wire.
pub fn metadata_value<'a>(metadata: &'a ObjectMetadata, name: &str) -> Option<&'a str> {
    metadata
        .get(name)
        .or_else(|| {
            metadata
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v)
        })
        .map(|v| v.as_str())
}

/// Storage backend types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    /// Local file system
    FileSystem,
    /// Process-local memory
    Memory,
    /// S3-compatible REST endpoint
    Http,
}

impl StorageBackend {
    /// Parse storage backend from URL scheme
    pub fn from_url(url: &str) -> Result<Self> {
        if let Some(scheme_end) = url.find("://") {
            let scheme = &url[..scheme_end];
            match scheme {
                "file" => Ok(StorageBackend::FileSystem),
                "mem" => Ok(StorageBackend::Memory),
                "http" | "https" => Ok(StorageBackend::Http),
                _ => Err(FrameStoreError::InvalidUrl(format!(
                    "Unknown scheme: {}",
                    scheme
                ))),
            }
        } else {
            // Assume file system if no scheme
            Ok(StorageBackend::FileSystem)
        }
    }
}

/// Streamed body of a fetched object
///
/// Reads behave like `std::io::Read`: each call may deliver fewer bytes than
/// asked for, and `Ok(0)` marks the end of the stream.
#[async_trait]
pub trait ObjectBody: Send {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize>;
}

/// A fetched object: body stream plus attributes
pub struct BlobObject {
    pub body: Box<dyn ObjectBody>,
    pub metadata: ObjectMetadata,
    pub content_length: u64,
}

impl std::fmt::Debug for BlobObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlobObject")
            .field("metadata", &self.metadata)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// Key/value object storage with per-object string metadata
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Check if an object exists
    async fn exists(&self, bucket: &str, key: &str) -> Result<bool>;

    /// Fetch an object; `FrameStoreError::NotFound` when absent
    async fn get(&self, bucket: &str, key: &str) -> Result<BlobObject>;

    /// Store an object, replacing any existing one
    async fn put(&self, bucket: &str, key: &str, body: &[u8], metadata: &ObjectMetadata)
        -> Result<()>;

    /// Delete an object
    async fn delete(&self, bucket: &str, key: &str) -> Result<()>;

    /// Get the backend type
    fn backend(&self) -> StorageBackend;
}

/// Outcome of streaming a body into a fixed buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamFill {
    /// Bytes placed in the buffer
    pub bytes: usize,
    /// True if the stream held more bytes than the buffer
    pub overflow: bool,
}

/// Stream `body` into `dest` using reads of at most `transfer_size` bytes
///
/// Keeps reading until end-of-stream or until `dest` is full; a full buffer
/// is followed by a one-byte lookahead read to detect oversize objects.
pub async fn fill_from_body(
    body: &mut dyn ObjectBody,
    dest: &mut [u8],
    transfer_size: usize,
) -> Result<StreamFill> {
    let transfer_size = transfer_size.max(1);
    let mut count = 0;
    while count < dest.len() {
        let end = (count + transfer_size).min(dest.len());
        let len = body.read(&mut dest[count..end]).await?;
        if len == 0 {
            return Ok(StreamFill {
                bytes: count,
                overflow: false,
            });
        }
        count += len;
    }
    let mut lookahead = [0u8; 1];
    let overflow = body.read(&mut lookahead).await? > 0;
    Ok(StreamFill {
        bytes: count,
        overflow,
    })
}

/// Read an entire body into a new vector
pub async fn read_body_to_end(
    body: &mut dyn ObjectBody,
    transfer_size: usize,
    size_hint: usize,
) -> Result<Vec<u8>> {
    let mut chunk = vec![0u8; transfer_size.max(1)];
    let mut data = Vec::with_capacity(size_hint);
    loop {
        let len = body.read(&mut chunk).await?;
        if len == 0 {
            return Ok(data);
        }
        data.extend_from_slice(&chunk[..len]);
    }
}

/// Magic number prefixing every object file
const OBJECT_MAGIC: &[u8; 4] = b"FSO\x01";

/// File system blob store
///
/// Each object is one file at `<base>/<bucket>/<key>` holding a small
/// header (magic, metadata length, metadata JSON) followed by the body.
/// Writes go to a sibling `.partial` file renamed into place, so readers
/// see either the old or the new object.
pub struct FileSystemBlobStore {
    base_path: PathBuf,
}

impl FileSystemBlobStore {
    /// Create a new file system blob store
    pub fn new(base_path: impl AsRef<Path>) -> Self {
        Self {
            base_path: base_path.as_ref().to_path_buf(),
        }
    }

    /// Get the full path for an object
    fn full_path(&self, bucket: &str, key: &str) -> Result<PathBuf> {
        let relative = Path::new(bucket).join(key);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if bucket.is_empty() || key.is_empty() || escapes {
            return Err(FrameStoreError::Configuration(format!(
                "Key not usable as a file path: {}/{}",
                bucket, key
            )));
        }
        Ok(self.base_path.join(relative))
    }

    fn map_not_found(err: std::io::Error, bucket: &str, key: &str) -> FrameStoreError {
        if err.kind() == std::io::ErrorKind::NotFound {
            FrameStoreError::not_found(bucket, key)
        } else {
            FrameStoreError::Io(err)
        }
    }
}

struct FileBody {
    file: fs::File,
}

#[async_trait]
impl ObjectBody for FileBody {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        Ok(self.file.read(buf).await?)
    }
}

#[async_trait]
impl BlobStore for FileSystemBlobStore {
    async fn exists(&self, bucket: &str, key: &str) -> Result<bool> {
        let full_path = self.full_path(bucket, key)?;
        match fs::metadata(&full_path).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(FrameStoreError::Io(e)),
        }
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<BlobObject> {
        let full_path = self.full_path(bucket, key)?;
        let mut file = fs::File::open(&full_path)
            .await
            .map_err(|e| Self::map_not_found(e, bucket, key))?;
        let file_len = file.metadata().await?.len();

        let mut preamble = [0u8; 8];
        file.read_exact(&mut preamble).await.map_err(|e| {
            FrameStoreError::StorageBackend(format!("Truncated object {}/{}: {}", bucket, key, e))
        })?;
        if &preamble[..4] != OBJECT_MAGIC {
            return Err(FrameStoreError::StorageBackend(format!(
                "Not an object file: {}",
                full_path.display()
            )));
        }
        let meta_len = u32::from_le_bytes([preamble[4], preamble[5], preamble[6], preamble[7]]);
        let mut meta_bytes = vec![0u8; meta_len as usize];
        file.read_exact(&mut meta_bytes).await?;
        let metadata: ObjectMetadata = serde_json::from_slice(&meta_bytes)?;

        let content_length = file_len.saturating_sub(8 + meta_len as u64);
        Ok(BlobObject {
            body: Box::new(FileBody { file }),
            metadata,
            content_length,
        })
    }

    async fn put(
        &self,
        bucket: &str,
        key: &str,
        body: &[u8],
        metadata: &ObjectMetadata,
    ) -> Result<()> {
        let full_path = self.full_path(bucket, key)?;

        // Create parent directories if they don't exist
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let meta_bytes = serde_json::to_vec(metadata)?;
        let meta_len = u32::try_from(meta_bytes.len()).map_err(|_| {
            FrameStoreError::StorageBackend(format!("Metadata too large for {}/{}", bucket, key))
        })?;

        let mut partial = full_path.clone().into_os_string();
        partial.push(".partial");
        let partial = PathBuf::from(partial);

        let mut file = fs::File::create(&partial).await?;
        file.write_all(OBJECT_MAGIC).await?;
        file.write_all(&meta_len.to_le_bytes()).await?;
        file.write_all(&meta_bytes).await?;
        file.write_all(body).await?;
        file.flush().await?;
        drop(file);

        fs::rename(&partial, &full_path).await?;
        Ok(())
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<()> {
        let full_path = self.full_path(bucket, key)?;
        fs::remove_file(&full_path)
            .await
            .map_err(|e| Self::map_not_found(e, bucket, key))
    }

    fn backend(&self) -> StorageBackend {
        StorageBackend::FileSystem
    }
}

/// Parse URL and create the matching blob store
///
/// `file://` URLs (or bare paths) select the file system backend, `mem://`
/// a fresh in-memory store, and `http(s)://` the REST backend when built
/// with the `http-client` feature.
pub async fn create_blob_store(url: &str) -> Result<Arc<dyn BlobStore>> {
    let backend = StorageBackend::from_url(url)?;

    match backend {
        StorageBackend::FileSystem => {
            // Extract path from file:// URL or use as-is
            let path = url.strip_prefix("file://").unwrap_or(url);
            Ok(Arc::new(FileSystemBlobStore::new(path)))
        }
        StorageBackend::Memory => Ok(Arc::new(MemoryBlobStore::new())),
        #[cfg(feature = "http-client")]
        StorageBackend::Http => Ok(Arc::new(crate::http::HttpBlobStore::new(url)?)),
        #[cfg(not(feature = "http-client"))]
        StorageBackend::Http => Err(FrameStoreError::Configuration(format!(
            "HTTP backend for {} requires the `http-client` feature",
            url
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn trace_metadata(count: usize) -> ObjectMetadata {
        let mut metadata = ObjectMetadata::new();
        metadata.insert("traceCount".to_string(), count.to_string());
        metadata
    }

    #[tokio::test]
    async fn test_file_system_blob_store() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileSystemBlobStore::new(temp_dir.path());

        let data = b"Hello, frames!";
        store
            .put("bucket", "p/Traces/V1/F2", data, &trace_metadata(3))
            .await
            .unwrap();

        assert!(store.exists("bucket", "p/Traces/V1/F2").await.unwrap());
        assert!(!store.exists("bucket", "p/Traces/V1/F4").await.unwrap());

        let mut object = store.get("bucket", "p/Traces/V1/F2").await.unwrap();
        assert_eq!(object.content_length, data.len() as u64);
        assert_eq!(metadata_value(&object.metadata, "traceCount"), Some("3"));
        let body = read_body_to_end(object.body.as_mut(), 4, 0).await.unwrap();
        assert_eq!(&body[..], data);

        store.delete("bucket", "p/Traces/V1/F2").await.unwrap();
        assert!(!store.exists("bucket", "p/Traces/V1/F2").await.unwrap());
        assert!(matches!(
            store.get("bucket", "p/Traces/V1/F2").await,
            Err(FrameStoreError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_file_system_overwrite_leaves_no_partial() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileSystemBlobStore::new(temp_dir.path());
        store.put("b", "k/obj", b"first", &ObjectMetadata::new()).await.unwrap();
        store.put("b", "k/obj", b"second!", &ObjectMetadata::new()).await.unwrap();

        let mut object = store.get("b", "k/obj").await.unwrap();
        let body = read_body_to_end(object.body.as_mut(), 16, 0).await.unwrap();
        assert_eq!(&body[..], b"second!");
        assert!(!temp_dir.path().join("b/k/obj.partial").exists());
    }

    #[tokio::test]
    async fn test_file_system_rejects_escaping_keys() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileSystemBlobStore::new(temp_dir.path());
        assert!(store.exists("b", "../outside").await.is_err());
        assert!(store.exists("", "key").await.is_err());
    }

    #[tokio::test]
    async fn test_fill_from_body_detects_overflow() {
        let store = MemoryBlobStore::new().with_max_chunk(3);
        store.put("b", "k", b"0123456789", &ObjectMetadata::new()).await.unwrap();

        let mut object = store.get("b", "k").await.unwrap();
        let mut exact = [0u8; 10];
        let fill = fill_from_body(object.body.as_mut(), &mut exact, 4).await.unwrap();
        assert_eq!(fill, StreamFill { bytes: 10, overflow: false });
        assert_eq!(&exact, b"0123456789");

        let mut object = store.get("b", "k").await.unwrap();
        let mut short = [0u8; 6];
        let fill = fill_from_body(object.body.as_mut(), &mut short, 4).await.unwrap();
        assert!(fill.overflow);

        let mut object = store.get("b", "k").await.unwrap();
        let mut long = [0u8; 16];
        let fill = fill_from_body(object.body.as_mut(), &mut long, 4).await.unwrap();
        assert_eq!(fill, StreamFill { bytes: 10, overflow: false });
    }

    #[test]
    fn test_metadata_value_case_insensitive() {
        let mut metadata = ObjectMetadata::new();
        metadata.insert("tracecount".to_string(), "7".to_string());
        assert_eq!(metadata_value(&metadata, "traceCount"), Some("7"));
        assert_eq!(metadata_value(&metadata, "other"), None);
    }

    #[test]
    fn test_backend_from_url() {
        assert_eq!(
            StorageBackend::from_url("file:///data/volume").unwrap(),
            StorageBackend::FileSystem
        );
        assert_eq!(
            StorageBackend::from_url("/data/volume").unwrap(),
            StorageBackend::FileSystem
        );
        assert_eq!(StorageBackend::from_url("mem://").unwrap(), StorageBackend::Memory);
        assert_eq!(
            StorageBackend::from_url("https://s3.example.com").unwrap(),
            StorageBackend::Http
        );
        assert!(StorageBackend::from_url("gs://bucket/volume").is_err());
    }

    #[tokio::test]
    async fn test_create_blob_store() {
        let temp_dir = TempDir::new().unwrap();
        let url = format!("file://{}", temp_dir.path().display());
        let store = create_blob_store(&url).await.unwrap();
        assert_eq!(store.backend(), StorageBackend::FileSystem);

        let store = create_blob_store("mem://").await.unwrap();
        assert_eq!(store.backend(), StorageBackend::Memory);
    }
}
