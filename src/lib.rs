//! # streammerge
//!
//! Merge partitioned CSV sources into one object and stream it to an object
//! store, without ever holding the merged result in memory.
//!
//! ## Key Features
//!
//! - **Bounded memory** - one parsed partition plus a fixed-size pipe at a time
//! - **Positional header deduplication** - the first partition's header is kept, later ones skipped
//! - **Prompt failure** - a source or sink error on either side stops the other
//! - **Pluggable ends** - any [`PartitionSource`] in, any [`ObjectSink`] out
//! - **Transparent decompression** - gzip, zstd, bzip2, xz (optional via feature flags)
//!
//! ## Quick Start
//!
//! ```
//! use streammerge::*;
//! use streammerge::io::cloud::{FakeObjectIO, ObjectIO};
//!
//! # fn main() -> anyhow::Result<()> {
//! let source = InMemorySource::from_pairs([
//!     ("p1", "id,name\n1,Ann"),
//!     ("p2", "id,name\n2,Bo"),
//! ]);
//! let sink = FakeObjectIO::new();
//! let ids = vec![PartitionId::new("p1"), PartitionId::new("p2")];
//!
//! let report = merge_and_upload(
//!     &ids,
//!     &Destination::new("exports", "merged.csv"),
//!     &source,
//!     &sink,
//!     &MergeConfig::default(),
//! )?;
//!
//! assert_eq!(report.rows, 3);
//! assert_eq!(sink.get_object("exports", "merged.csv")?, b"id,name\n1,Ann\n2,Bo\n");
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! A run has two tasks joined by a bounded byte pipe:
//! 1. The [`writer`] fetches, decodes, and parses partitions in list order and
//!    writes CSV into the pipe, blocking while it is full
//! 2. The [`transfer`] task reads the pipe, cuts it into chunks, and uploads them
//! 3. The [`pipeline`] coordinator runs both on their own threads, joins them,
//!    and reports the error that ended the run, or a [`MergeReport`]
//!
//! ## Module Overview
//!
//! - [`source`] - Partition sources (in-memory, directory, object store, retrying)
//! - [`parser`] - CSV parsing of one partition
//! - [`writer`] - Merge writer (producer)
//! - [`channel`] - Bounded pipe with close/abort signalling
//! - [`transfer`] - Upload task (consumer)
//! - [`pipeline`] - Coordinator and the [`merge_and_upload`] entry point
//! - [`io`] - Object store traits, local store, compression, globbing
//! - [`config`] / [`logging`] - Run configuration and subscriber setup
//! - [`testing`] - Fixtures and assertions for tests

pub mod channel;
pub mod config;
pub mod error;
pub mod io;
pub mod logging;
pub mod parser;
pub mod pipeline;
pub mod source;
pub mod testing;
pub mod transfer;
pub mod writer;

// General re-exports
pub use channel::{PipeReader, PipeWriter, pipe};
pub use config::MergeConfig;
pub use error::{MergeError, Result};
pub use io::cloud::{Destination, ObjectSink, UploadHandle};
pub use io::local::LocalObjectStore;
pub use parser::{ParseOptions, Row, parse_rows};
pub use pipeline::{MergePipeline, MergeReport, PipelineState, merge_and_upload};
pub use source::{DirectorySource, InMemorySource, ObjectSource, PartitionId, PartitionSource, RetryingSource};
pub use writer::{MergeStats, MergeWriter};
