//! Chunked writes to the archive store.
//!
//! Each chunk of at most [`MAX_PUT_SIZE`] records is one atomic multi-put.
//! There is no transaction across chunks: a failure leaves earlier chunks
//! committed, which is safe to retry because every write is a keyed upsert.

use tracing::{debug, info};

use crate::error::Result;
use crate::model::Record;
use crate::storage::{ArchiveStore, MAX_PUT_SIZE};

/// Write `records` in store-sized chunks, returning how many were written.
///
/// # Errors
///
/// Returns the first chunk's write error; later chunks are not attempted.
pub fn persist<S: ArchiveStore + ?Sized>(store: &mut S, records: &[Record]) -> Result<usize> {
    persist_chunked(store, records, MAX_PUT_SIZE)
}

/// [`persist`] with an explicit chunk size (clamped to the store cap).
///
/// # Errors
///
/// Returns the first chunk's write error; later chunks are not attempted.
pub fn persist_chunked<S: ArchiveStore + ?Sized>(
    store: &mut S,
    records: &[Record],
    chunk_size: usize,
) -> Result<usize> {
    let chunk_size = chunk_size.clamp(1, MAX_PUT_SIZE);
    let mut written = 0;

    for (index, chunk) in records.chunks(chunk_size).enumerate() {
        written += store.put_records(chunk)?;
        debug!(chunk = index, size = chunk.len(), "Persisted chunk");
    }

    if written > 0 {
        info!("Saved {} records", written);
    }
    Ok(written)
}
