//! Segmented download with in-memory reassembly
//!
//! Opens one streaming GET, slices the body into ordered chunks of roughly
//! `declared_size / concurrency` bytes, and hands each chunk to a bounded
//! pool of writer tasks. Every writer stores its chunk into an
//! index-addressed slot table, so the reassembled payload is the byte-exact
//! concatenation of chunks in arrival order no matter when individual
//! writers finish.
//!
//! The fetcher never retries; a failed run is retried as a whole by the
//! orchestrator.

use bytes::{Bytes, BytesMut};
use futures::stream::{FuturesUnordered, StreamExt};
use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use tracing::debug;
use url::Url;

use crate::error::FetchError;

// ============================================================================
// Fetcher Constants
// ============================================================================

/// Chunk size used when the server does not report a Content-Length.
/// With an unknown total size the concurrency degree is advisory only.
pub const FALLBACK_CHUNK_SIZE: usize = 1024 * 1024;

/// Description of one remote resource to download
#[derive(Debug, Clone)]
pub struct ResourceDescriptor {
    /// Location of the NDJSON dataset
    pub url: Url,

    /// Declared total size in bytes, when known ahead of the request.
    /// Usually left unset; the response Content-Length fills it in.
    pub total_size: Option<u64>,

    /// Number of concurrent chunk writers
    pub concurrency: NonZeroUsize,
}

impl ResourceDescriptor {
    /// Create a descriptor with no declared size
    pub fn new(url: Url, concurrency: NonZeroUsize) -> Self {
        Self {
            url,
            total_size: None,
            concurrency,
        }
    }

    /// Set the declared total size
    pub fn with_total_size(mut self, total_size: u64) -> Self {
        self.total_size = Some(total_size);
        self
    }
}

/// Target chunk size for a download of `declared` bytes split across
/// `concurrency` writers. Falls back to [`FALLBACK_CHUNK_SIZE`] when the
/// size is unknown or zero.
fn target_chunk_size(declared: Option<u64>, concurrency: usize) -> usize {
    match declared {
        Some(total) if total > 0 => ((total as usize) / concurrency).max(1),
        _ => FALLBACK_CHUNK_SIZE,
    }
}

// ============================================================================
// Slot Table
// ============================================================================

/// Index-addressed chunk storage shared by the writer pool
///
/// Each chunk is stored at its 1-based sequence slot, so the payload order
/// is fixed by dispatch order rather than writer completion order.
#[derive(Debug, Default)]
struct SlotTable {
    slots: Mutex<Vec<Option<Bytes>>>,
}

impl SlotTable {
    /// Store a chunk at its sequence slot. Returns the sequence index back
    /// on success, or as the error value when the table is unusable.
    fn store(&self, seq: usize, chunk: Bytes) -> Result<usize, usize> {
        let mut slots = self.slots.lock().map_err(|_| seq)?;
        if slots.len() < seq {
            slots.resize(seq, None);
        }
        slots[seq - 1] = Some(chunk);
        Ok(seq)
    }

    /// Drain the table into one contiguous payload, concatenating slots in
    /// sequence order. Returns the 1-based index of the first empty slot if
    /// any chunk never arrived.
    fn take_payload(&self) -> Result<Vec<u8>, usize> {
        let mut slots = self
            .slots
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let total: usize = slots
            .iter()
            .map(|slot| slot.as_ref().map_or(0, |chunk| chunk.len()))
            .sum();

        let mut payload = Vec::with_capacity(total);
        for (index, slot) in slots.drain(..).enumerate() {
            match slot {
                Some(chunk) => payload.extend_from_slice(&chunk),
                None => return Err(index + 1),
            }
        }

        Ok(payload)
    }
}

/// Spawn a writer task for one chunk and wrap its join handle in a future
/// yielding the chunk's sequence index on either outcome.
fn spawn_chunk_writer(
    slots: Arc<SlotTable>,
    seq: usize,
    chunk: Bytes,
) -> impl Future<Output = Result<usize, usize>> {
    let handle = tokio::spawn(async move { slots.store(seq, chunk) });
    async move {
        match handle.await {
            Ok(stored) => stored,
            Err(_) => Err(seq),
        }
    }
}

// ============================================================================
// Fetch
// ============================================================================

/// Download `descriptor.url` as one reassembled in-memory payload
///
/// Chunks are dispatched to at most `descriptor.concurrency` writer tasks at
/// a time and the caller is blocked until every dispatched write has
/// completed. Any single failed chunk write fails the whole fetch with
/// [`FetchError::ChunkWriteFailed`].
pub async fn fetch(
    client: &reqwest::Client,
    descriptor: &ResourceDescriptor,
) -> Result<Vec<u8>, FetchError> {
    let response = client.get(descriptor.url.clone()).send().await?;

    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::BadStatus { status });
    }

    let concurrency = descriptor.concurrency.get();
    let declared = descriptor.total_size.or_else(|| response.content_length());
    let chunk_size = target_chunk_size(declared, concurrency);

    debug!(
        url = %descriptor.url,
        declared_size = ?declared,
        concurrency,
        chunk_size,
        "Starting segmented download"
    );

    let slots = Arc::new(SlotTable::default());
    let mut writers = FuturesUnordered::new();
    let mut body = response.bytes_stream();
    let mut pending = BytesMut::new();
    let mut next_seq = 0usize;

    while let Some(frame) = body.next().await {
        let frame = frame?;
        pending.extend_from_slice(&frame);

        // The transport decides frame boundaries; coalesce frames into
        // chunks of the target size before dispatching.
        while pending.len() >= chunk_size {
            let chunk = pending.split_to(chunk_size).freeze();
            next_seq += 1;
            writers.push(spawn_chunk_writer(Arc::clone(&slots), next_seq, chunk));

            if writers.len() >= concurrency {
                if let Some(done) = writers.next().await {
                    done.map_err(|chunk| FetchError::ChunkWriteFailed { chunk })?;
                }
            }
        }
    }

    if !pending.is_empty() {
        next_seq += 1;
        writers.push(spawn_chunk_writer(
            Arc::clone(&slots),
            next_seq,
            pending.freeze(),
        ));
    }

    // Join-all: the fetch does not return until every dispatched write landed
    while let Some(done) = writers.next().await {
        done.map_err(|chunk| FetchError::ChunkWriteFailed { chunk })?;
    }

    let payload = slots
        .take_payload()
        .map_err(|chunk| FetchError::ChunkWriteFailed { chunk })?;

    debug!(
        chunks = next_seq,
        bytes = payload.len(),
        "Segmented download complete"
    );

    Ok(payload)
}
