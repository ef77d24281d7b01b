//! Core traits for object storage operations.
//!
//! These traits provide synchronous interfaces to an object store. The
//! pipeline only needs two views of it: plain object access ([`ObjectIO`]) for
//! reading partitions, and chunked uploads ([`ObjectSink`]) for delivering the
//! merged stream.

use std::collections::HashMap;
use std::error::Error;
use std::fmt;

// ============================================================================
// Core Error Type
// ============================================================================

/// Generic error type for cloud IO operations
#[derive(Debug, Clone)]
pub struct CloudIOError {
    pub message: String,
    pub kind: ErrorKind,
    pub source: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    Authentication,
    Authorization,
    NotFound,
    AlreadyExists,
    InvalidInput,
    Network,
    Timeout,
    ServiceUnavailable,
    RateLimited,
    InternalError,
    Other,
}

impl fmt::Display for CloudIOError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl Error for CloudIOError {}

impl CloudIOError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind,
            source: None,
        }
    }

    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Whether a retry has a chance of succeeding.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::Network
                | ErrorKind::Timeout
                | ErrorKind::ServiceUnavailable
                | ErrorKind::RateLimited
        )
    }
}

pub type CloudResult<T> = Result<T, CloudIOError>;

// ============================================================================
// Destination
// ============================================================================

/// Bucket and key naming the object produced by a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Destination {
    pub bucket: String,
    pub key: String,
}

impl Destination {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// Parse `scheme://bucket/path/to/key`.
    ///
    /// The scheme is not interpreted; the first path segment is the bucket and
    /// the remainder is the key.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if the URI has no scheme, no bucket, or no key.
    pub fn parse(uri: &str) -> CloudResult<Self> {
        let (_, parts) = crate::io::cloud::helpers::parse_resource_uri(uri)?;
        let Some((bucket, key)) = parts.split_first() else {
            return Err(CloudIOError::new(
                ErrorKind::InvalidInput,
                format!("Missing bucket in {uri}"),
            ));
        };
        let key = key.join("/");
        crate::io::cloud::helpers::validate_resource_name(bucket)?;
        crate::io::cloud::helpers::validate_key_path(&key)?;
        Ok(Self::new(bucket.clone(), key))
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.bucket, self.key)
    }
}

// ============================================================================
// ObjectIO - Object Storage
// ============================================================================

/// Metadata for an object in storage
#[derive(Debug, Clone)]
pub struct ObjectMetadata {
    pub key: String,
    pub size: u64,
    pub content_type: Option<String>,
    pub last_modified: Option<i64>, // Unix timestamp
    pub etag: Option<String>,
    pub custom_metadata: HashMap<String, String>,
}

/// Trait for object storage operations
pub trait ObjectIO: Send + Sync {
    /// Upload data to object storage
    ///
    /// # Errors
    ///
    /// Returns an error if the bucket doesn't exist, permissions are not enough, or the upload fails
    fn put_object(&self, bucket: &str, key: &str, data: &[u8]) -> CloudResult<()>;

    /// Download data from object storage
    ///
    /// # Errors
    ///
    /// Returns an error if the object doesn't exist, permissions are not enough, or the download fails
    fn get_object(&self, bucket: &str, key: &str) -> CloudResult<Vec<u8>>;

    /// Delete an object
    ///
    /// # Errors
    ///
    /// Returns an error if permissions are not enough or the deletion fails
    fn delete_object(&self, bucket: &str, key: &str) -> CloudResult<()>;

    /// List objects with a prefix
    ///
    /// # Errors
    ///
    /// Returns an error if the bucket doesn't exist, permissions are not enough, or the listing fails
    fn list_objects(&self, bucket: &str, prefix: Option<&str>) -> CloudResult<Vec<ObjectMetadata>>;

    /// Check if an object exists
    ///
    /// # Errors
    ///
    /// Returns an error if permissions are not enough or the check fails
    fn object_exists(&self, bucket: &str, key: &str) -> CloudResult<bool>;
}

// ============================================================================
// ObjectSink - Chunked Uploads
// ============================================================================

/// An object store that accepts uploads as an ordered sequence of chunks.
///
/// How chunks map onto the store (multipart parts, appends to a temp file, a
/// single buffered put) is up to the implementation. Retry policy and
/// durability are the implementation's concern as well.
pub trait ObjectSink: Send + Sync {
    /// Start an upload to `destination`.
    ///
    /// # Errors
    ///
    /// Returns an error if the upload cannot be started (missing bucket, permissions, ...)
    fn begin_upload(&self, destination: &Destination) -> CloudResult<Box<dyn UploadHandle>>;
}

/// An in-progress upload started by [`ObjectSink::begin_upload`].
pub trait UploadHandle: Send {
    /// Append the next chunk. Chunks arrive in stream order.
    ///
    /// # Errors
    ///
    /// Returns an error if the store rejects the chunk
    fn write_chunk(&mut self, chunk: &[u8]) -> CloudResult<()>;

    /// Finalize the upload and make the object visible.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot finalize the object
    fn complete(self: Box<Self>) -> CloudResult<()>;

    /// Abandon the upload. Stores without cleanup semantics may ignore this.
    ///
    /// # Errors
    ///
    /// Returns an error if cleanup fails; callers treat this as best effort
    fn abort(self: Box<Self>) -> CloudResult<()> {
        Ok(())
    }
}
