//! Object-store upload client
//!
//! Thin pass-through to the object store's JSON media-upload endpoint. The
//! client performs exactly one write per call and carries no retry logic of
//! its own; whole-run retry belongs to the orchestrator.

use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use tracing::info;

use crate::error::UploadError;

// ============================================================================
// Object Store Constants
// ============================================================================

/// Default object-store endpoint (GCS JSON API shape).
/// Can be overridden via NDP_OBJECT_STORE_URL, mainly for tests.
pub const DEFAULT_OBJECT_STORE_URL: &str = "https://storage.googleapis.com";

/// Content type used for the compressed pipeline artifact
pub const GZIP_CONTENT_TYPE: &str = "application/gzip";

/// Proof that an object landed in the store
#[derive(Debug, Clone)]
pub struct UploadReceipt {
    /// Destination bucket
    pub bucket: String,
    /// Destination object key
    pub key: String,
    /// Number of bytes written
    pub size: usize,
}

impl UploadReceipt {
    /// Storage URI of the uploaded object, as consumed by the warehouse
    /// loader
    pub fn storage_uri(&self) -> String {
        format!("gs://{}/{}", self.bucket, self.key)
    }
}

/// Client for the external object store
pub struct ObjectStoreClient {
    client: Client,
    base_url: String,
}

impl ObjectStoreClient {
    /// Create a client against the given endpoint
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    /// Create a client from environment variables, falling back to the
    /// public endpoint
    pub fn from_env(client: Client) -> Self {
        let base_url = std::env::var("NDP_OBJECT_STORE_URL")
            .unwrap_or_else(|_| DEFAULT_OBJECT_STORE_URL.to_string());
        Self::new(client, base_url)
    }

    /// Media-upload URL for one object
    fn upload_url(&self, bucket: &str) -> String {
        format!(
            "{}/upload/storage/v1/b/{}/o",
            self.base_url.trim_end_matches('/'),
            bucket
        )
    }

    /// Persist an opaque byte payload under `bucket`/`key`
    ///
    /// Any non-success answer from the store, including transport errors,
    /// surfaces as [`UploadError::TransportFailure`].
    pub async fn upload(
        &self,
        bucket: &str,
        key: &str,
        payload: Vec<u8>,
        content_type: &str,
    ) -> Result<UploadReceipt, UploadError> {
        let size = payload.len();
        let url = self.upload_url(bucket);

        let response = self
            .client
            .post(&url)
            .query(&[("uploadType", "media"), ("name", key)])
            .header(CONTENT_TYPE, content_type)
            .body(payload)
            .send()
            .await
            .map_err(|err| UploadError::TransportFailure(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(UploadError::TransportFailure(format!(
                "object store answered HTTP status {status}"
            )));
        }

        info!(bucket, key, size, "Uploaded object");

        Ok(UploadReceipt {
            bucket: bucket.to_string(),
            key: key.to_string(),
            size,
        })
    }
}
