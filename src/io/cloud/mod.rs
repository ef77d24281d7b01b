//! Object storage abstractions.
//!
//! The pipeline talks to object stores through two provider-agnostic traits:
//!
//! - [`ObjectIO`] - whole-object access, used to read partitions stored as objects
//! - [`ObjectSink`] / [`UploadHandle`] - chunked uploads, used to deliver the merged stream
//!
//! ## Synchronous by Design
//! Like the rest of the crate these traits block. Implementations backed by an
//! async SDK can drive a runtime internally and expose a blocking interface.
//!
//! ## Testing with Fakes
//! ```
//! use streammerge::io::cloud::*;
//!
//! # fn main() -> CloudResult<()> {
//! let store = FakeObjectIO::new();
//! let mut upload = store.begin_upload(&Destination::new("bucket", "merged.csv"))?;
//! upload.write_chunk(b"id,name\n")?;
//! upload.complete()?;
//!
//! assert!(store.object_exists("bucket", "merged.csv")?);
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! All operations return [`CloudResult<T>`] where the error is [`CloudIOError`],
//! categorized by [`ErrorKind`]. Transient kinds (`Network`, `Timeout`,
//! `ServiceUnavailable`, `RateLimited`) can be retried with
//! [`helpers::retry_with_backoff_if`].
//!
//! ## Module Structure
//!
//! - [`traits`] - Core trait definitions and types
//! - [`fake`] - In-memory fake implementation for testing
//! - [`helpers`] - Retry, URI parsing, and validation utilities

pub mod fake;
pub mod helpers;
pub mod traits;

pub use fake::*;
pub use traits::*;
