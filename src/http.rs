//! S3-compatible REST blob store (feature `http-client`)
//!
//! Objects are addressed path-style as `<base>/<bucket>/<key>` and object
//! metadata travels in `x-amz-meta-*` headers. Request signing is left to
//! the endpoint (presigned gateways, local MinIO, public buckets).

use crate::error::{FrameStoreError, Result};
use crate::io::{BlobObject, BlobStore, ObjectBody, ObjectMetadata, StorageBackend};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, Response, StatusCode};

const META_PREFIX: &str = "x-amz-meta-";

/// Blob store speaking plain HTTP verbs to an S3-compatible endpoint
pub struct HttpBlobStore {
    client: Client,
    base_url: String,
}

impl HttpBlobStore {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| FrameStoreError::Configuration(e.to_string()))?;
        Ok(Self::with_client(client, base_url))
    }

    /// Use a preconfigured client (timeouts, proxies, default headers)
    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn object_url(&self, bucket: &str, key: &str) -> String {
        format!("{}/{}/{}", self.base_url, bucket, key)
    }

    fn check_status(response: &Response, bucket: &str, key: &str) -> Result<()> {
        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Err(FrameStoreError::not_found(bucket, key)),
            status => Err(FrameStoreError::StorageBackend(format!(
                "{} {}/{}",
                status, bucket, key
            ))),
        }
    }
}

fn transport_error(err: reqwest::Error) -> FrameStoreError {
    FrameStoreError::StorageBackend(err.to_string())
}

struct HttpBody {
    response: Response,
    pending: Bytes,
}

#[async_trait]
impl ObjectBody for HttpBody {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        while self.pending.is_empty() {
            match self.response.chunk().await.map_err(transport_error)? {
                Some(chunk) => self.pending = chunk,
                None => return Ok(0),
            }
        }
        let len = buf.len().min(self.pending.len());
        buf[..len].copy_from_slice(&self.pending.split_to(len));
        Ok(len)
    }
}

#[async_trait]
impl BlobStore for HttpBlobStore {
    async fn exists(&self, bucket: &str, key: &str) -> Result<bool> {
        let response = self
            .client
            .head(self.object_url(bucket, key))
            .send()
            .await
            .map_err(transport_error)?;
        match Self::check_status(&response, bucket, key) {
            Ok(()) => Ok(true),
            Err(FrameStoreError::NotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<BlobObject> {
        let response = self
            .client
            .get(self.object_url(bucket, key))
            .send()
            .await
            .map_err(transport_error)?;
        Self::check_status(&response, bucket, key)?;

        let metadata: ObjectMetadata = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                let attribute = name.as_str().strip_prefix(META_PREFIX)?;
                Some((attribute.to_string(), value.to_str().ok()?.to_string()))
            })
            .collect();
        let content_length = response.content_length().unwrap_or(0);

        Ok(BlobObject {
            body: Box::new(HttpBody {
                response,
                pending: Bytes::new(),
            }),
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
        let mut request = self
            .client
            .put(self.object_url(bucket, key))
            .body(body.to_vec());
        for (name, value) in metadata {
            request = request.header(
                format!("{}{}", META_PREFIX, name.to_ascii_lowercase()),
                value.as_str(),
            );
        }
        let response = request.send().await.map_err(transport_error)?;
        Self::check_status(&response, bucket, key)
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<()> {
        let response = self
            .client
            .delete(self.object_url(bucket, key))
            .send()
            .await
            .map_err(transport_error)?;
        Self::check_status(&response, bucket, key)
    }

    fn backend(&self) -> StorageBackend {
        StorageBackend::Http
    }
}
