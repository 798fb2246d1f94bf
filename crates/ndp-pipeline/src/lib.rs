//! NDP Pipeline Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Moves one NDJSON dataset from a remote HTTP endpoint into a cloud data
//! warehouse through four ordered stages:
//!
//! 1. **Fetch**: concurrent segmented download with in-memory reassembly
//! 2. **Transcode**: NDJSON to gzip-compressed CSV, fully in memory
//! 3. **Upload**: write the artifact to the object store
//! 4. **Load**: submit an asynchronous warehouse bulk-load job
//!
//! The [`pipeline::Pipeline`] orchestrator sequences the stages for one
//! logical run and owns the whole-run retry policy. No run state persists
//! in this crate; job-run history belongs to whatever scheduler triggers
//! the runs.
//!
//! # Example
//!
//! ```no_run
//! use ndp_pipeline::{Pipeline, RunConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = RunConfig::new(
//!         "https://example.com/data.ndjson".parse()?,
//!         "my-bucket",
//!         "data.csv.gz",
//!         "analytics",
//!         "events",
//!     );
//!
//!     let pipeline = Pipeline::from_env(&config);
//!     let report = pipeline.run_with_retry(&config).await?;
//!     println!("loaded via job {}", report.job.job_id);
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod fetch;
pub mod load;
pub mod pipeline;
pub mod transcode;
pub mod upload;

// Re-export commonly used types
pub use error::{FetchError, LoadError, PipelineError, Stage, TranscodeError, UploadError};
pub use fetch::{fetch, ResourceDescriptor, FALLBACK_CHUNK_SIZE};
pub use load::{JobHandle, WarehouseClient};
pub use pipeline::{Pipeline, RunConfig, RunReport, RunState};
pub use transcode::transcode;
pub use upload::{ObjectStoreClient, UploadReceipt, GZIP_CONTENT_TYPE};
