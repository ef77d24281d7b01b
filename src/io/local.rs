//! Filesystem-backed object store.
//!
//! Buckets are directories under a root and keys are `/`-separated paths
//! inside them. Uploads stream into a hidden temp file next to the target and
//! are renamed into place on `complete`, so a reader never observes a
//! partially written object. `abort` removes the temp file.

use crate::io::cloud::helpers::{validate_key_path, validate_resource_name};
use crate::io::cloud::traits::{
    CloudIOError, CloudResult, Destination, ErrorKind, ObjectIO, ObjectMetadata, ObjectSink,
    UploadHandle,
};
use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tempfile::NamedTempFile;
use tracing::debug;

/// Prefix of in-flight upload files; never listed as objects.
const TEMP_PREFIX: &str = ".streammerge-";

#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Filesystem path of `bucket/key`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for bucket or key names that could leave the root.
    pub fn object_path(&self, bucket: &str, key: &str) -> CloudResult<PathBuf> {
        validate_key_path(key)?;
        Ok(self.bucket_path(bucket)?.join(key))
    }

    fn bucket_path(&self, bucket: &str) -> CloudResult<PathBuf> {
        validate_resource_name(bucket)?;
        if bucket.chars().all(|c| c == '.') {
            return Err(CloudIOError::new(
                ErrorKind::InvalidInput,
                format!("Invalid bucket name: {bucket}"),
            ));
        }
        Ok(self.root.join(bucket))
    }
}

fn io_error(context: impl std::fmt::Display, err: &io::Error) -> CloudIOError {
    let kind = match err.kind() {
        io::ErrorKind::NotFound => ErrorKind::NotFound,
        io::ErrorKind::PermissionDenied => ErrorKind::Authorization,
        io::ErrorKind::AlreadyExists => ErrorKind::AlreadyExists,
        io::ErrorKind::InvalidInput => ErrorKind::InvalidInput,
        io::ErrorKind::TimedOut => ErrorKind::Timeout,
        _ => ErrorKind::Other,
    };
    CloudIOError::new(kind, format!("{context}: {err}")).with_source("local")
}

fn create_parent(path: &Path) -> CloudResult<PathBuf> {
    let parent = path
        .parent()
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
    fs::create_dir_all(&parent).map_err(|e| io_error(format!("create {}", parent.display()), &e))?;
    Ok(parent)
}

/// Every regular file under `dir`, as `/`-joined paths relative to `base`.
fn walk(base: &Path, dir: &Path, out: &mut Vec<(String, fs::Metadata)>) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let meta = entry.metadata()?;
        if meta.is_dir() {
            walk(base, &path, out)?;
            continue;
        }
        if entry.file_name().to_string_lossy().starts_with(TEMP_PREFIX) {
            continue;
        }
        if let Ok(rel) = path.strip_prefix(base) {
            let key = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/");
            out.push((key, meta));
        }
    }
    Ok(())
}

impl ObjectIO for LocalObjectStore {
    fn put_object(&self, bucket: &str, key: &str, data: &[u8]) -> CloudResult<()> {
        let mut upload = self.begin_upload(&Destination::new(bucket, key))?;
        upload.write_chunk(data)?;
        upload.complete()
    }

    fn get_object(&self, bucket: &str, key: &str) -> CloudResult<Vec<u8>> {
        let path = self.object_path(bucket, key)?;
        fs::read(&path).map_err(|e| io_error(format!("read {bucket}/{key}"), &e))
    }

    fn delete_object(&self, bucket: &str, key: &str) -> CloudResult<()> {
        let path = self.object_path(bucket, key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error(format!("delete {bucket}/{key}"), &e)),
        }
    }

    fn list_objects(&self, bucket: &str, prefix: Option<&str>) -> CloudResult<Vec<ObjectMetadata>> {
        let dir = self.bucket_path(bucket)?;
        let mut files = Vec::new();
        walk(&dir, &dir, &mut files).map_err(|e| io_error(format!("list {bucket}"), &e))?;

        let mut objects: Vec<ObjectMetadata> = files
            .into_iter()
            .filter(|(key, _)| prefix.is_none_or(|p| key.starts_with(p)))
            .map(|(key, meta)| ObjectMetadata {
                key,
                size: meta.len(),
                content_type: None,
                last_modified: meta
                    .modified()
                    .ok()
                    .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                    .and_then(|d| i64::try_from(d.as_secs()).ok()),
                etag: None,
                custom_metadata: HashMap::new(),
            })
            .collect();
        objects.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(objects)
    }

    fn object_exists(&self, bucket: &str, key: &str) -> CloudResult<bool> {
        Ok(self.object_path(bucket, key)?.is_file())
    }
}

impl ObjectSink for LocalObjectStore {
    fn begin_upload(&self, destination: &Destination) -> CloudResult<Box<dyn UploadHandle>> {
        let target = self.object_path(&destination.bucket, &destination.key)?;
        let parent = create_parent(&target)?;
        let file = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .tempfile_in(&parent)
            .map_err(|e| io_error(format!("begin upload of {destination}"), &e))?;
        debug!(%destination, temp = %file.path().display(), "local upload started");
        Ok(Box::new(LocalUpload {
            file,
            target,
            destination: destination.clone(),
        }))
    }
}

struct LocalUpload {
    file: NamedTempFile,
    target: PathBuf,
    destination: Destination,
}

impl UploadHandle for LocalUpload {
    fn write_chunk(&mut self, chunk: &[u8]) -> CloudResult<()> {
        self.file
            .write_all(chunk)
            .map_err(|e| io_error(format!("write to {}", self.destination), &e))
    }

    fn complete(self: Box<Self>) -> CloudResult<()> {
        let Self {
            mut file,
            target,
            destination,
        } = *self;
        file.flush()
            .map_err(|e| io_error(format!("flush {destination}"), &e))?;
        file.as_file()
            .sync_all()
            .map_err(|e| io_error(format!("sync {destination}"), &e))?;
        file.persist(&target)
            .map_err(|e| io_error(format!("publish {destination}"), &e.error))?;
        Ok(())
    }

    fn abort(self: Box<Self>) -> CloudResult<()> {
        let destination = self.destination.clone();
        self.file
            .close()
            .map_err(|e| io_error(format!("discard upload of {destination}"), &e))
    }
}
