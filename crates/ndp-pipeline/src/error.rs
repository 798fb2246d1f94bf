//! Error types for the NDP pipeline
//!
//! Each stage owns a small error enum; the orchestrator wraps whichever one
//! it sees in [`PipelineError`] so callers learn the failing stage without
//! losing the underlying cause.

use thiserror::Error;

/// Errors produced by the segmented fetcher
#[derive(Error, Debug)]
pub enum FetchError {
    /// The server answered with a non-success status
    #[error("Download failed with HTTP status {status}. Check that the resource URL is correct and reachable.")]
    BadStatus { status: reqwest::StatusCode },

    /// A chunk worker failed to write its bytes into the reassembly buffer
    #[error("Chunk {chunk} was not written into the reassembly buffer. The download must be retried as a whole.")]
    ChunkWriteFailed { chunk: usize },

    /// The HTTP transport failed before or during the body read
    #[error("Network request failed: {0}. Check your internet connection and the resource URL.")]
    Request(#[from] reqwest::Error),
}

/// Errors produced by the NDJSON-to-CSV transcoder
#[derive(Error, Debug)]
pub enum TranscodeError {
    /// A line of the input was not a valid JSON object
    #[error("Malformed NDJSON record on line {line}: {source}")]
    ParseError {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    /// CSV serialization failed
    #[error("CSV serialization error: {0}")]
    Csv(#[from] csv::Error),

    /// Compression or in-memory buffer I/O failed
    #[error("I/O error while encoding output: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors produced by the object-store uploader
#[derive(Error, Debug)]
pub enum UploadError {
    /// The object store rejected the write or was unreachable
    #[error("Object store transport failure: {0}. The object may not have been written; retry the run.")]
    TransportFailure(String),
}

/// Errors produced by the warehouse loader
#[derive(Error, Debug)]
pub enum LoadError {
    /// The warehouse rejected the load-job submission or was unreachable
    #[error("Load job submission failed: {0}. No load job was started; retry the run.")]
    SubmissionFailure(String),
}

/// Pipeline stage identifiers, used to report where a run failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Fetch,
    Transcode,
    Upload,
    Load,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Fetch => write!(f, "fetch"),
            Stage::Transcode => write!(f, "transcode"),
            Stage::Upload => write!(f, "upload"),
            Stage::Load => write!(f, "load"),
        }
    }
}

/// A stage error tagged with the stage that produced it
///
/// The underlying error is carried verbatim; the orchestrator never rewrites
/// a stage's error kind or message.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("fetch stage failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("transcode stage failed: {0}")]
    Transcode(#[from] TranscodeError),

    #[error("upload stage failed: {0}")]
    Upload(#[from] UploadError),

    #[error("load stage failed: {0}")]
    Load(#[from] LoadError),
}

impl PipelineError {
    /// The stage in which the run failed
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::Fetch(_) => Stage::Fetch,
            PipelineError::Transcode(_) => Stage::Transcode,
            PipelineError::Upload(_) => Stage::Upload,
            PipelineError::Load(_) => Stage::Load,
        }
    }
}
