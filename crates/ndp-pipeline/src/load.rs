//! Warehouse bulk-load job submission
//!
//! Submits one asynchronous load job that ingests an object-store file into
//! a warehouse table: CSV input, one header row skipped, schema
//! auto-detected. Submission is fire-and-forget; the returned [`JobHandle`]
//! means the job was accepted, never that the load completed. Callers that
//! need completion confirmation poll the job themselves.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use crate::error::LoadError;

// ============================================================================
// Warehouse Constants
// ============================================================================

/// Default warehouse endpoint (BigQuery jobs API shape).
/// Can be overridden via NDP_WAREHOUSE_URL, mainly for tests.
pub const DEFAULT_WAREHOUSE_URL: &str = "https://bigquery.googleapis.com";

/// Default load-job location when none is configured
pub const DEFAULT_LOCATION: &str = "US";

/// Handle to a submitted bulk-load job
///
/// Holding one proves submission, not completion: the warehouse runs the
/// load asynchronously and this pipeline never blocks on it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobHandle {
    /// Warehouse-assigned job identifier
    pub job_id: String,
    /// Location the job runs in
    pub location: String,
}

#[derive(Debug, Deserialize)]
struct JobReference {
    #[serde(rename = "jobId")]
    job_id: String,
    #[serde(default)]
    location: Option<String>,
}

#[derive(Debug, Deserialize)]
struct JobResponse {
    #[serde(rename = "jobReference")]
    job_reference: JobReference,
}

/// Client for the external warehouse
pub struct WarehouseClient {
    client: Client,
    base_url: String,
    project: String,
    location: String,
}

impl WarehouseClient {
    /// Create a client against the given endpoint
    pub fn new(
        client: Client,
        base_url: impl Into<String>,
        project: impl Into<String>,
        location: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            project: project.into(),
            location: location.into(),
        }
    }

    /// Jobs endpoint for the configured project
    fn jobs_url(&self) -> String {
        format!(
            "{}/bigquery/v2/projects/{}/jobs",
            self.base_url.trim_end_matches('/'),
            self.project
        )
    }

    /// Submit one asynchronous bulk-load job for `storage_uri` into
    /// `dataset`.`table`
    ///
    /// Returns as soon as the warehouse accepts the job. Any rejection or
    /// transport error surfaces as [`LoadError::SubmissionFailure`].
    pub async fn load(
        &self,
        storage_uri: &str,
        dataset: &str,
        table: &str,
    ) -> Result<JobHandle, LoadError> {
        let body = json!({
            "jobReference": {
                "location": self.location,
            },
            "configuration": {
                "load": {
                    "sourceUris": [storage_uri],
                    "destinationTable": {
                        "projectId": self.project,
                        "datasetId": dataset,
                        "tableId": table,
                    },
                    "sourceFormat": "CSV",
                    "skipLeadingRows": 1,
                    "autodetect": true,
                }
            }
        });

        let response = self
            .client
            .post(self.jobs_url())
            .json(&body)
            .send()
            .await
            .map_err(|err| LoadError::SubmissionFailure(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(LoadError::SubmissionFailure(format!(
                "warehouse answered HTTP status {status}"
            )));
        }

        let job: JobResponse = response
            .json()
            .await
            .map_err(|err| LoadError::SubmissionFailure(err.to_string()))?;

        let handle = JobHandle {
            job_id: job.job_reference.job_id,
            location: job
                .job_reference
                .location
                .unwrap_or_else(|| self.location.clone()),
        };

        info!(
            job_id = %handle.job_id,
            dataset,
            table,
            source = storage_uri,
            "Submitted load job"
        );

        Ok(handle)
    }

    /// URL a caller can poll for the state of a submitted job. Polling is
    /// outside the pipeline's responsibility.
    pub fn job_status_url(&self, handle: &JobHandle) -> String {
        format!(
            "{}/bigquery/v2/projects/{}/jobs/{}?location={}",
            self.base_url.trim_end_matches('/'),
            self.project,
            handle.job_id,
            handle.location
        )
    }
}
