//! Object storage
//!
//! Media originals and variants live in an S3-compatible bucket. The backend
//! is picked from `storage.url`: `s3://bucket/prefix` or `memory://` for an
//! in-process store used in development and tests.

use crate::config::StorageConfig;
use anyhow::{anyhow, bail, Context, Result};
use axum::http::Method;
use chrono::{DateTime, Utc};
use object_store::aws::{AmazonS3, AmazonS3Builder};
use object_store::memory::InMemory;
use object_store::path::Path as ObjectPath;
use object_store::signer::Signer;
use object_store::{ObjectStore, PutPayload};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Where and how a client uploads directly to the bucket
#[derive(Debug, Clone, Serialize)]
pub struct PresignedUpload {
    pub key: String,
    pub url: String,
    pub method: &'static str,
    /// The client must send this `Content-Type` header
    pub content_type: String,
    pub expires_at: DateTime<Utc>,
}

pub struct ObjectStorage {
    store: Arc<dyn ObjectStore>,
    /// Only S3 can sign URLs
    signer: Option<Arc<dyn Signer>>,
    prefix: String,
    public_base_url: String,
    presign_ttl: Duration,
}

impl ObjectStorage {
    pub fn from_config(config: &StorageConfig) -> Result<Self> {
        let url = Url::parse(&config.url).with_context(|| format!("Invalid storage URL '{}'", config.url))?;

        let (store, signer, prefix): (Arc<dyn ObjectStore>, Option<Arc<dyn Signer>>, String) = match url.scheme() {
            "s3" => {
                let s3 = Arc::new(build_s3(&url, config)?);
                let prefix = url.path().trim_matches('/').to_string();
                (s3.clone() as Arc<dyn ObjectStore>, Some(s3 as Arc<dyn Signer>), prefix)
            }
            "memory" => (Arc::new(InMemory::new()) as Arc<dyn ObjectStore>, None, String::new()),
            other => bail!("Unsupported storage scheme '{}'. Supported: s3, memory", other),
        };

        tracing::info!(backend = url.scheme(), prefix = %prefix, "Object storage ready");
        Ok(Self {
            store,
            signer,
            prefix,
            public_base_url: config.public_base_url.trim_end_matches('/').to_string(),
            presign_ttl: Duration::from_secs(config.presign_ttl_seconds),
        })
    }

    /// In-memory storage serving URLs under `/media`
    pub fn in_memory() -> Self {
        Self {
            store: Arc::new(InMemory::new()),
            signer: None,
            prefix: String::new(),
            public_base_url: "/media".to_string(),
            presign_ttl: Duration::from_secs(900),
        }
    }

    fn path(&self, key: &str) -> ObjectPath {
        if self.prefix.is_empty() {
            ObjectPath::from(key)
        } else {
            ObjectPath::from(format!("{}/{}", self.prefix, key))
        }
    }

    pub async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<()> {
        self.store
            .put(&self.path(key), PutPayload::from(bytes))
            .await
            .with_context(|| format!("Failed to upload object {}", key))?;
        Ok(())
    }

    /// Object contents, `None` when the key does not exist
    pub async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match self.store.get(&self.path(key)).await {
            Ok(result) => {
                let bytes = result.bytes().await.with_context(|| format!("Failed to read object {}", key))?;
                Ok(Some(bytes.to_vec()))
            }
            Err(object_store::Error::NotFound { .. }) => Ok(None),
            Err(e) => Err(anyhow!(e).context(format!("Failed to fetch object {}", key))),
        }
    }

    /// Deleting a missing object is not an error
    pub async fn delete(&self, key: &str) -> Result<()> {
        match self.store.delete(&self.path(key)).await {
            Ok(()) | Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(anyhow!(e).context(format!("Failed to delete object {}", key))),
        }
    }

    pub fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.public_base_url, key)
    }

    pub async fn presigned_upload_url(&self, key: &str, content_type: &str) -> Result<PresignedUpload> {
        let signer = self
            .signer
            .as_ref()
            .ok_or_else(|| anyhow!("Presigned uploads require S3 storage"))?;

        let url = signer
            .signed_url(Method::PUT, &self.path(key), self.presign_ttl)
            .await
            .with_context(|| format!("Failed to sign upload URL for {}", key))?;

        Ok(PresignedUpload {
            key: key.to_string(),
            url: url.to_string(),
            method: "PUT",
            content_type: content_type.to_string(),
            expires_at: Utc::now() + chrono::Duration::seconds(self.presign_ttl.as_secs() as i64),
        })
    }

    pub fn supports_presign(&self) -> bool {
        self.signer.is_some()
    }
}

fn build_s3(url: &Url, config: &StorageConfig) -> Result<AmazonS3> {
    let bucket = url.host_str().ok_or_else(|| anyhow!("S3 URL must include the bucket as host"))?;

    let mut builder = AmazonS3Builder::from_env()
        .with_bucket_name(bucket)
        .with_region(&config.region);

    if let Some(key_id) = &config.access_key_id {
        builder = builder.with_access_key_id(key_id);
    }
    if let Some(secret) = &config.secret_access_key {
        builder = builder.with_secret_access_key(secret);
    }
    // MinIO, R2 and friends
    if let Some(endpoint) = &config.endpoint {
        builder = builder.with_endpoint(endpoint).with_virtual_hosted_style_request(false);
        if endpoint.starts_with("http://") {
            builder = builder.with_allow_http(true);
        }
    }

    builder.build().context("Failed to create S3 store")
}
