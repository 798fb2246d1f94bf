//! Pipeline orchestration
//!
//! Sequences the four stages of one run: fetch, transcode, upload, load.
//! Each stage's output feeds the next stage by value; the first stage error
//! aborts the run and surfaces unchanged, tagged with the failing stage.
//!
//! The retrying entry point wraps the *whole run* in a bounded retry with a
//! fixed delay, restarting from the fetch stage every time. The policy is
//! carried over from the scheduler defaults the pipeline was originally
//! driven by; it is deliberately coarse. Whether re-uploading the same
//! object key and resubmitting the load job is always safe to repeat is an
//! open question documented in DESIGN.md.

use reqwest::Client;
use std::num::NonZeroUsize;
use std::time::Duration;
use tracing::{info, warn};
use url::Url;

use crate::error::PipelineError;
use crate::fetch::{fetch, ResourceDescriptor};
use crate::load::{JobHandle, WarehouseClient, DEFAULT_LOCATION, DEFAULT_WAREHOUSE_URL};
use crate::transcode::transcode;
use crate::upload::{ObjectStoreClient, UploadReceipt, GZIP_CONTENT_TYPE};

// ============================================================================
// Run Defaults
// ============================================================================

/// Default number of concurrent chunk writers
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Default number of whole-run retries after a failed attempt
pub const DEFAULT_RETRY_COUNT: u32 = 1;

/// Default fixed delay between run attempts
pub const DEFAULT_RETRY_DELAY_SECS: u64 = 300;

/// Everything one run needs, passed explicitly instead of living at call
/// sites
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Location of the source NDJSON dataset
    pub url: Url,
    /// Destination object-store bucket
    pub bucket: String,
    /// Destination object key
    pub object_key: String,
    /// Destination warehouse dataset
    pub dataset: String,
    /// Destination warehouse table
    pub table: String,
    /// Warehouse load-job location
    pub location: String,
    /// Number of concurrent chunk writers for the fetch stage
    pub concurrency: NonZeroUsize,
    /// Whole-run retries after a failed attempt
    pub retry_count: u32,
    /// Fixed delay between run attempts
    pub retry_delay: Duration,
}

impl RunConfig {
    /// Create a run configuration with default concurrency and retry policy
    pub fn new(
        url: Url,
        bucket: impl Into<String>,
        object_key: impl Into<String>,
        dataset: impl Into<String>,
        table: impl Into<String>,
    ) -> Self {
        Self {
            url,
            bucket: bucket.into(),
            object_key: object_key.into(),
            dataset: dataset.into(),
            table: table.into(),
            location: DEFAULT_LOCATION.to_string(),
            concurrency: NonZeroUsize::new(DEFAULT_CONCURRENCY)
                .unwrap_or(NonZeroUsize::MIN),
            retry_count: DEFAULT_RETRY_COUNT,
            retry_delay: Duration::from_secs(DEFAULT_RETRY_DELAY_SECS),
        }
    }
}

/// Observable run lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Fetching,
    Transcoding,
    Uploading,
    Loading,
    Succeeded,
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunState::Idle => write!(f, "idle"),
            RunState::Fetching => write!(f, "fetching"),
            RunState::Transcoding => write!(f, "transcoding"),
            RunState::Uploading => write!(f, "uploading"),
            RunState::Loading => write!(f, "loading"),
            RunState::Succeeded => write!(f, "succeeded"),
        }
    }
}

/// Summary of one successful run
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Size of the reassembled download in bytes
    pub bytes_fetched: usize,
    /// Size of the compressed artifact in bytes
    pub bytes_uploaded: usize,
    /// Where the artifact landed
    pub receipt: UploadReceipt,
    /// Handle to the submitted (not completed) load job
    pub job: JobHandle,
    /// Number of run attempts it took, 1 for a first-try success
    pub attempts: u32,
}

/// Orchestrator for the four-stage run
pub struct Pipeline {
    http: Client,
    store: ObjectStoreClient,
    warehouse: WarehouseClient,
}

impl Pipeline {
    /// Create an orchestrator from explicit collaborator clients
    pub fn new(http: Client, store: ObjectStoreClient, warehouse: WarehouseClient) -> Self {
        Self {
            http,
            store,
            warehouse,
        }
    }

    /// Create an orchestrator wired from environment variables
    ///
    /// Environment variables:
    /// - `NDP_OBJECT_STORE_URL`: object-store endpoint override
    /// - `NDP_WAREHOUSE_URL`: warehouse endpoint override
    /// - `NDP_WAREHOUSE_PROJECT`: warehouse project identifier
    pub fn from_env(config: &RunConfig) -> Self {
        let http = Client::new();
        let store = ObjectStoreClient::from_env(http.clone());

        let warehouse_url = std::env::var("NDP_WAREHOUSE_URL")
            .unwrap_or_else(|_| DEFAULT_WAREHOUSE_URL.to_string());
        let project =
            std::env::var("NDP_WAREHOUSE_PROJECT").unwrap_or_else(|_| "default".to_string());
        let warehouse = WarehouseClient::new(
            http.clone(),
            warehouse_url,
            project,
            config.location.clone(),
        );

        Self::new(http, store, warehouse)
    }

    /// Execute one run: fetch, transcode, upload, load
    ///
    /// Stages run strictly in order and the first failure aborts the run;
    /// later stages are never entered. No partial artifact is cleaned up on
    /// failure.
    pub async fn run_once(&self, config: &RunConfig) -> Result<RunReport, PipelineError> {
        let descriptor = ResourceDescriptor::new(config.url.clone(), config.concurrency);

        let mut state = RunState::Fetching;
        info!(%state, url = %config.url, "Pipeline stage starting");
        let raw = fetch(&self.http, &descriptor).await?;
        let bytes_fetched = raw.len();

        state = RunState::Transcoding;
        info!(%state, bytes = bytes_fetched, "Pipeline stage starting");
        let artifact = transcode(&raw)?;
        let bytes_uploaded = artifact.len();

        state = RunState::Uploading;
        info!(%state, bucket = %config.bucket, key = %config.object_key, "Pipeline stage starting");
        let receipt = self
            .store
            .upload(
                &config.bucket,
                &config.object_key,
                artifact,
                GZIP_CONTENT_TYPE,
            )
            .await?;

        state = RunState::Loading;
        info!(%state, dataset = %config.dataset, table = %config.table, "Pipeline stage starting");
        let job = self
            .warehouse
            .load(&receipt.storage_uri(), &config.dataset, &config.table)
            .await?;

        state = RunState::Succeeded;
        info!(%state, job_id = %job.job_id, "Pipeline run complete");

        Ok(RunReport {
            bytes_fetched,
            bytes_uploaded,
            receipt,
            job,
            attempts: 1,
        })
    }

    /// Execute a run under the bounded whole-run retry policy
    ///
    /// A failed attempt restarts from the fetch stage after the fixed
    /// delay, never from the failed stage. After `retry_count` retries the
    /// last error becomes terminal for this trigger.
    pub async fn run_with_retry(&self, config: &RunConfig) -> Result<RunReport, PipelineError> {
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            match self.run_once(config).await {
                Ok(mut report) => {
                    report.attempts = attempt;
                    return Ok(report);
                },
                Err(err) if attempt <= config.retry_count => {
                    warn!(
                        attempt,
                        retries = config.retry_count,
                        stage = %err.stage(),
                        error = %err,
                        "Run attempt failed, retrying from the fetch stage"
                    );
                    tokio::time::sleep(config.retry_delay).await;
                },
                Err(err) => return Err(err),
            }
        }
    }
}
