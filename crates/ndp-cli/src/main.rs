//! NDP - NDJSON data pipeline runner
//!
//! One invocation executes one logical run: download, transcode, upload,
//! load. A scheduler that wants daily runs invokes this binary once per
//! trigger; run history stays with the scheduler.

use anyhow::Result;
use clap::Parser;
use ndp_common::logging::{init_logging, LogConfig, LogLevel};
use ndp_pipeline::{Pipeline, RunConfig};
use std::num::NonZeroUsize;
use std::time::Duration;
use tracing::info;
use url::Url;

#[derive(Parser, Debug)]
#[command(name = "ndp")]
#[command(author, version, about = "Move an NDJSON dataset into the warehouse")]
struct Cli {
    /// URL of the source NDJSON dataset
    #[arg(long, env = "NDP_SOURCE_URL")]
    url: Url,

    /// Destination object-store bucket
    #[arg(long, env = "NDP_BUCKET")]
    bucket: String,

    /// Destination object key
    #[arg(long, env = "NDP_OBJECT_KEY", default_value = "data.csv.gz")]
    key: String,

    /// Destination warehouse dataset
    #[arg(long, env = "NDP_DATASET")]
    dataset: String,

    /// Destination warehouse table
    #[arg(long, env = "NDP_TABLE")]
    table: String,

    /// Warehouse load-job location
    #[arg(long, env = "NDP_LOCATION", default_value = "US")]
    location: String,

    /// Number of concurrent chunk writers for the download
    #[arg(long, env = "NDP_CONCURRENCY", default_value = "4")]
    concurrency: NonZeroUsize,

    /// Whole-run retries after a failed attempt
    #[arg(long, env = "NDP_RETRIES", default_value = "1")]
    retries: u32,

    /// Fixed delay between run attempts, in seconds
    #[arg(long, env = "NDP_RETRY_DELAY_SECS", default_value = "300")]
    retry_delay_secs: u64,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Environment configuration first, then the verbose flag on top
    let mut log_config = LogConfig::from_env().unwrap_or_default();
    if cli.verbose {
        log_config.level = LogLevel::Debug;
    }

    init_logging(&log_config)?;

    let mut config = RunConfig::new(cli.url, cli.bucket, cli.key, cli.dataset, cli.table);
    config.location = cli.location;
    config.concurrency = cli.concurrency;
    config.retry_count = cli.retries;
    config.retry_delay = Duration::from_secs(cli.retry_delay_secs);

    info!(
        url = %config.url,
        bucket = %config.bucket,
        dataset = %config.dataset,
        table = %config.table,
        "Starting pipeline run"
    );

    let pipeline = Pipeline::from_env(&config);
    let report = pipeline.run_with_retry(&config).await?;

    info!(
        attempts = report.attempts,
        bytes_fetched = report.bytes_fetched,
        bytes_uploaded = report.bytes_uploaded,
        object = %report.receipt.storage_uri(),
        job_id = %report.job.job_id,
        "Run complete; load job submitted"
    );

    Ok(())
}
