//! Transfer task: the consumer half of the pipeline.
//!
//! Reads the pipe to end-of-data and feeds it, in order, to an upload on an
//! [`ObjectSink`]. The stream is cut into chunks of `chunk_size` bytes (the
//! last one may be shorter); how the sink stores them is its own business.

use crate::channel::PipeReader;
use crate::error::{MergeError, Result};
use crate::io::cloud::traits::{Destination, ObjectSink, UploadHandle};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

/// Counters from one upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferStats {
    pub bytes: u64,
    pub chunks: usize,
    /// Hex SHA-256 of every byte handed to the sink.
    pub sha256: String,
}

/// Upload everything read from `reader` to `destination`.
///
/// On a producer abort the upload is abandoned and the abort error returned;
/// `complete` is only called after a clean end-of-data. On a sink failure the
/// reader is closed so a producer blocked on a full pipe wakes up.
///
/// # Errors
///
/// Returns [`MergeError::ChannelAborted`] / [`MergeError::ProducerTerminatedUnexpectedly`]
/// when the producer failed, or [`MergeError::TransferFailed`] when the sink
/// rejected the upload.
pub fn transfer(
    mut reader: PipeReader,
    sink: &dyn ObjectSink,
    destination: &Destination,
    chunk_size: usize,
) -> Result<TransferStats> {
    let upload = match sink.begin_upload(destination) {
        Ok(upload) => upload,
        Err(e) => {
            let err = MergeError::TransferFailed(format!("begin upload of {destination}: {e}"));
            reader.close_with_error(err.to_string());
            return Err(err);
        }
    };
    let mut upload = Some(upload);
    let outcome = pump(&mut reader, &mut upload, chunk_size.max(1));

    match outcome {
        Ok(stats) => {
            debug!(bytes = stats.bytes, chunks = stats.chunks, "upload completed");
            Ok(stats)
        }
        Err(err) => {
            if !err.is_consequential() && !matches!(err, MergeError::ProducerTerminatedUnexpectedly)
            {
                reader.close_with_error(err.to_string());
            }
            if let Some(upload) = upload.take()
                && let Err(e) = upload.abort()
            {
                warn!(error = %e, %destination, "failed to abort upload");
            }
            Err(err)
        }
    }
}

/// Move bytes until EOF or the first error. `upload` is taken on `complete`.
fn pump(
    reader: &mut PipeReader,
    upload: &mut Option<Box<dyn UploadHandle>>,
    chunk_size: usize,
) -> Result<TransferStats> {
    let mut chunk = vec![0u8; chunk_size];
    let mut filled = 0;
    let mut hasher = Sha256::new();
    let mut stats = TransferStats {
        bytes: 0,
        chunks: 0,
        sha256: String::new(),
    };

    let mut send = |data: &[u8], stats: &mut TransferStats| -> Result<()> {
        let handle = upload
            .as_mut()
            .ok_or_else(|| MergeError::TransferFailed("upload already finished".into()))?;
        handle
            .write_chunk(data)
            .map_err(|e| MergeError::TransferFailed(format!("chunk {}: {e}", stats.chunks + 1)))?;
        hasher.update(data);
        stats.bytes += data.len() as u64;
        stats.chunks += 1;
        Ok(())
    };

    loop {
        let n = reader.read_bytes(&mut chunk[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
        if filled == chunk_size {
            send(&chunk, &mut stats)?;
            filled = 0;
        }
    }
    if filled > 0 {
        send(&chunk[..filled], &mut stats)?;
    }
    drop(send);

    let handle = upload
        .take()
        .ok_or_else(|| MergeError::TransferFailed("upload already finished".into()))?;
    handle
        .complete()
        .map_err(|e| MergeError::TransferFailed(format!("finalize: {e}")))?;
    stats.sha256 = hex(&hasher.finalize());
    Ok(stats)
}

fn hex(digest: &[u8]) -> String {
    digest.iter().map(|b| format!("{b:02x}")).collect()
}
