//! In-memory blob store

use crate::error::{FrameStoreError, Result};
use crate::io::{BlobObject, BlobStore, ObjectBody, ObjectMetadata, StorageBackend};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::HashMap;

#[derive(Debug, Clone)]
struct StoredObject {
    body: Bytes,
    metadata: ObjectMetadata,
}

/// Blob store keeping objects in process memory
///
/// `with_max_chunk` caps how many bytes a single body read returns, which
/// mimics remote services that deliver objects in small pieces.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    objects: RwLock<HashMap<(String, String), StoredObject>>,
    max_chunk: Option<usize>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver at most `max_chunk` bytes per body read
    pub fn with_max_chunk(mut self, max_chunk: usize) -> Self {
        self.max_chunk = Some(max_chunk.max(1));
        self
    }

    /// Number of stored objects
    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }

    /// Keys stored in `bucket`, sorted
    pub fn keys(&self, bucket: &str) -> Vec<String> {
        let mut keys: Vec<String> = self
            .objects
            .read()
            .keys()
            .filter(|(b, _)| b == bucket)
            .map(|(_, k)| k.clone())
            .collect();
        keys.sort();
        keys
    }
}

struct MemoryBody {
    data: Bytes,
    max_chunk: usize,
}

#[async_trait]
impl ObjectBody for MemoryBody {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let len = buf.len().min(self.data.len()).min(self.max_chunk);
        let chunk = self.data.split_to(len);
        buf[..len].copy_from_slice(&chunk);
        Ok(len)
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn exists(&self, bucket: &str, key: &str) -> Result<bool> {
        Ok(self
            .objects
            .read()
            .contains_key(&(bucket.to_string(), key.to_string())))
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<BlobObject> {
        let object = self
            .objects
            .read()
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
            .ok_or_else(|| FrameStoreError::not_found(bucket, key))?;

        Ok(BlobObject {
            content_length: object.body.len() as u64,
            body: Box::new(MemoryBody {
                data: object.body,
                max_chunk: self.max_chunk.unwrap_or(usize::MAX),
            }),
            metadata: object.metadata,
        })
    }

    async fn put(
        &self,
        bucket: &str,
        key: &str,
        body: &[u8],
        metadata: &ObjectMetadata,
    ) -> Result<()> {
        let object = StoredObject {
            body: Bytes::copy_from_slice(body),
            metadata: metadata.clone(),
        };
        self.objects
            .write()
            .insert((bucket.to_string(), key.to_string()), object);
        Ok(())
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<()> {
        self.objects
            .write()
            .remove(&(bucket.to_string(), key.to_string()))
            .map(|_| ())
            .ok_or_else(|| FrameStoreError::not_found(bucket, key))
    }

    fn backend(&self) -> StorageBackend {
        StorageBackend::Memory
    }
}
