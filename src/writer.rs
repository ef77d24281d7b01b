//! Merge writer: the producer half of the pipeline.
//!
//! Partitions are fetched, decoded, and parsed one at a time, in list order.
//! Each partition is fully parsed before any of its rows are written, so a
//! failing partition never leaves half of its rows in the output.
//!
//! Header policy is positional: row 0 of the first partition that has rows is
//! written once; row 0 of every later partition is skipped whatever it holds.

use crate::channel::PipeWriter;
use crate::error::{MergeError, Result};
use crate::io::compression::decode_partition;
use crate::parser::{ParseOptions, Row, parse_rows};
use crate::source::{PartitionId, PartitionSource};
use serde::Serialize;
use std::io::Write;
use tracing::{debug, warn};

/// Counters from one merge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MergeStats {
    pub partitions: usize,
    /// Rows written, header included.
    pub rows: u64,
}

/// Producer that merges partitions from a [`PartitionSource`].
pub struct MergeWriter<'s, S: ?Sized> {
    source: &'s S,
    options: ParseOptions,
    decompress: bool,
}

impl<'s, S: PartitionSource + ?Sized> MergeWriter<'s, S> {
    pub const fn new(source: &'s S) -> Self {
        Self {
            source,
            options: ParseOptions {
                delimiter: b',',
                trim: false,
            },
            decompress: true,
        }
    }

    #[must_use]
    pub const fn with_parse_options(mut self, options: ParseOptions) -> Self {
        self.options = options;
        self
    }

    /// Decode gzip/zstd/bzip2/xz partitions before parsing (on by default).
    #[must_use]
    pub const fn with_decompression(mut self, decompress: bool) -> Self {
        self.decompress = decompress;
        self
    }

    /// Merge `ids` into `out` as CSV.
    ///
    /// `out` is flushed after every partition, so rows already merged reach
    /// it while the next partition is still being fetched.
    ///
    /// # Errors
    ///
    /// Returns the first source, parse, or output error. Output errors that
    /// carry a [`MergeError`] (such as a pipe whose reader stopped) are
    /// returned as that error.
    pub fn write_merged<W: Write>(&self, ids: &[PartitionId], out: W) -> Result<MergeStats> {
        self.merge_into(ids, out, |_| Ok(()))
    }

    /// Merge loop shared by [`write_merged`](Self::write_merged) and
    /// [`run`](Self::run). `consumer_alive` is checked before each fetch.
    fn merge_into<W: Write>(
        &self,
        ids: &[PartitionId],
        out: W,
        consumer_alive: impl Fn(&W) -> Result<()>,
    ) -> Result<MergeStats> {
        let mut wtr = csv::WriterBuilder::new()
            .delimiter(self.options.delimiter)
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(out);

        let mut stats = MergeStats::default();
        let mut header_written = false;
        for id in ids {
            consumer_alive(wtr.get_ref())?;
            let rows = self.load(id)?;
            debug!(partition = %id, rows = rows.len(), "merging partition");
            for (i, row) in rows.iter().enumerate() {
                if i == 0 {
                    if header_written {
                        continue;
                    }
                    header_written = true;
                }
                wtr.write_record(row).map_err(output_error)?;
                stats.rows += 1;
            }
            wtr.flush()
                .map_err(|e| MergeError::from_io(e, MergeError::ConsumerGone))?;
            stats.partitions += 1;
        }
        Ok(stats)
    }

    /// Merge `ids` into `pipe`, then close it, or abort it with the error.
    ///
    /// The pipe is signalled exactly once whatever the outcome. No further
    /// partition is fetched once the reader has gone away.
    ///
    /// # Errors
    ///
    /// Returns the same error the pipe was aborted with.
    pub fn run(&self, ids: &[PartitionId], mut pipe: PipeWriter) -> Result<MergeStats> {
        let merged = self.merge_into(ids, &mut pipe, |p: &&mut PipeWriter| p.ensure_consumer());
        match merged {
            Ok(stats) => {
                pipe.close();
                debug!(
                    partitions = stats.partitions,
                    rows = stats.rows,
                    bytes = pipe.bytes_written(),
                    "merge writer finished"
                );
                Ok(stats)
            }
            Err(err) => {
                warn!(error = %err, "merge writer failed");
                pipe.abort(err.clone());
                Err(err)
            }
        }
    }

    fn load(&self, id: &PartitionId) -> Result<Vec<Row>> {
        let raw = self.source.fetch(id)?;
        let raw = if self.decompress {
            decode_partition(raw, id.as_str()).map_err(|e| MergeError::ParseError {
                partition: id.to_string(),
                reason: e.to_string(),
            })?
        } else {
            raw
        };
        parse_rows(id.as_str(), &raw, &self.options)
    }
}

fn output_error(err: csv::Error) -> MergeError {
    match err.into_kind() {
        csv::ErrorKind::Io(e) => MergeError::from_io(e, MergeError::ConsumerGone),
        other => MergeError::ConsumerGone(format!("{other:?}")),
    }
}
