//! Test helpers for code built on the merge pipeline.
//!
//! - **Fixtures**: build CSV partitions in memory or on disk
//! - **Assertions**: check merged output and what reached the sink
//!
//! ```
//! use streammerge::io::cloud::{Destination, FakeObjectIO, ObjectIO};
//! use streammerge::pipeline::MergePipeline;
//! use streammerge::source::InMemorySource;
//! use streammerge::testing::*;
//!
//! let parts = sequential_partitions(3, 2);
//! let source = InMemorySource::from_pairs(parts.clone());
//! let sink = FakeObjectIO::new();
//! let ids = partition_ids(&parts);
//!
//! MergePipeline::new(&source, &sink)
//!     .run(&ids, &Destination::new("out", "all.csv"))
//!     .unwrap();
//!
//! let merged = sink.get_object("out", "all.csv").unwrap();
//! assert_eq!(parse_merged(&merged).len(), 1 + 3 * 2);
//! ```

pub mod assertions;
pub mod fixtures;

pub use assertions::*;
pub use fixtures::*;
