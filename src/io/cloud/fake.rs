//! Fake object store for testing.
//!
//! [`FakeObjectIO`] keeps every bucket in memory and implements both
//! [`ObjectIO`] and [`ObjectSink`]. Failures can be injected deterministically,
//! so tests never depend on timing or randomness.

use crate::io::cloud::traits::{
    CloudIOError, CloudResult, Destination, ErrorKind, ObjectIO, ObjectMetadata, ObjectSink,
    UploadHandle,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

// Type aliases for complex nested types
type BucketStorage = Arc<Mutex<HashMap<String, HashMap<String, Vec<u8>>>>>;
type ObjectFaults = HashMap<(String, String), (ErrorKind, u32)>;

/// Lifecycle of an upload started against a [`FakeObjectIO`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadState {
    InProgress,
    Completed,
    Aborted,
    Failed,
}

/// What a [`FakeObjectIO`] saw for a single upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRecord {
    pub destination: Destination,
    pub chunks: Vec<usize>,
    pub state: UploadState,
}

impl UploadRecord {
    /// Total bytes accepted across all chunks.
    #[must_use]
    pub fn bytes(&self) -> usize {
        self.chunks.iter().sum()
    }
}

#[derive(Debug, Default)]
struct Faults {
    /// 1-based index of the chunk to reject, per upload.
    reject_chunk: Option<usize>,
    reject_complete: bool,
    /// Object reads that fail with the given kind for the next `n` attempts.
    failing_reads: ObjectFaults,
}

// ============================================================================
// FakeObjectIO
// ============================================================================

#[derive(Clone)]
pub struct FakeObjectIO {
    storage: BucketStorage,
    uploads: Arc<Mutex<Vec<UploadRecord>>>,
    faults: Arc<Mutex<Faults>>,
}

impl FakeObjectIO {
    #[must_use]
    pub fn new() -> Self {
        Self {
            storage: Arc::new(Mutex::new(HashMap::new())),
            uploads: Arc::new(Mutex::new(Vec::new())),
            faults: Arc::new(Mutex::new(Faults::default())),
        }
    }

    /// Reject the `n`-th chunk (1-based) of every subsequent upload.
    ///
    /// # Panics
    ///
    /// Panics if the faults mutex is poisoned.
    pub fn reject_chunk(&self, n: usize) {
        self.faults.lock().expect("faults mutex poisoned").reject_chunk = Some(n);
    }

    /// Reject the finalize step of every subsequent upload.
    ///
    /// # Panics
    ///
    /// Panics if the faults mutex is poisoned.
    pub fn reject_complete(&self) {
        self.faults.lock().expect("faults mutex poisoned").reject_complete = true;
    }

    /// Make the next `times` reads of `bucket/key` fail with `kind`.
    ///
    /// # Panics
    ///
    /// Panics if the faults mutex is poisoned.
    pub fn fail_reads(&self, bucket: &str, key: &str, kind: ErrorKind, times: u32) {
        self.faults
            .lock()
            .expect("faults mutex poisoned")
            .failing_reads
            .insert((bucket.to_string(), key.to_string()), (kind, times));
    }

    /// Every upload started so far, in start order.
    ///
    /// # Panics
    ///
    /// Panics if the uploads mutex is poisoned.
    #[must_use]
    pub fn uploads(&self) -> Vec<UploadRecord> {
        self.uploads.lock().expect("uploads mutex poisoned").clone()
    }

    fn update_upload(&self, id: usize, f: impl FnOnce(&mut UploadRecord)) {
        if let Some(record) = self
            .uploads
            .lock()
            .expect("uploads mutex poisoned")
            .get_mut(id)
        {
            f(record);
        }
    }

    fn take_read_fault(&self, bucket: &str, key: &str) -> Option<ErrorKind> {
        let mut faults = self.faults.lock().expect("faults mutex poisoned");
        let slot = (bucket.to_string(), key.to_string());
        let (kind, remaining) = faults.failing_reads.get_mut(&slot)?;
        let kind = kind.clone();
        *remaining = remaining.saturating_sub(1);
        if *remaining == 0 {
            faults.failing_reads.remove(&slot);
        }
        Some(kind)
    }
}

impl Default for FakeObjectIO {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectIO for FakeObjectIO {
    fn put_object(&self, bucket: &str, key: &str, data: &[u8]) -> CloudResult<()> {
        self.storage
            .lock()
            .expect("storage mutex poisoned")
            .entry(bucket.to_string())
            .or_default()
            .insert(key.to_string(), data.to_vec());
        Ok(())
    }

    fn get_object(&self, bucket: &str, key: &str) -> CloudResult<Vec<u8>> {
        if let Some(kind) = self.take_read_fault(bucket, key) {
            return Err(CloudIOError::new(
                kind,
                format!("Injected failure reading {bucket}/{key}"),
            ));
        }
        let storage = self.storage.lock().expect("storage mutex poisoned");
        storage
            .get(bucket)
            .and_then(|b| b.get(key))
            .cloned()
            .ok_or_else(|| {
                CloudIOError::new(
                    ErrorKind::NotFound,
                    format!("Object {bucket}/{key} not found"),
                )
            })
    }

    fn delete_object(&self, bucket: &str, key: &str) -> CloudResult<()> {
        if let Some(bucket_map) = self
            .storage
            .lock()
            .expect("storage mutex poisoned")
            .get_mut(bucket)
        {
            bucket_map.remove(key);
        }
        Ok(())
    }

    fn list_objects(&self, bucket: &str, prefix: Option<&str>) -> CloudResult<Vec<ObjectMetadata>> {
        let storage = self.storage.lock().expect("storage mutex poisoned");
        let bucket_map = storage.get(bucket).ok_or_else(|| {
            CloudIOError::new(ErrorKind::NotFound, format!("Bucket {bucket} not found"))
        })?;

        let mut objects: Vec<ObjectMetadata> = bucket_map
            .iter()
            .filter(|(key, _)| prefix.is_none_or(|p| key.starts_with(p)))
            .map(|(key, data)| ObjectMetadata {
                key: key.clone(),
                size: data.len() as u64,
                content_type: Some("text/csv".to_string()),
                last_modified: Some(0),
                etag: Some(format!("etag-{key}")),
                custom_metadata: HashMap::new(),
            })
            .collect();

        drop(storage);
        objects.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(objects)
    }

    fn object_exists(&self, bucket: &str, key: &str) -> CloudResult<bool> {
        let storage = self.storage.lock().expect("storage mutex poisoned");
        Ok(storage.get(bucket).is_some_and(|b| b.contains_key(key)))
    }
}

impl ObjectSink for FakeObjectIO {
    fn begin_upload(&self, destination: &Destination) -> CloudResult<Box<dyn UploadHandle>> {
        let mut uploads = self.uploads.lock().expect("uploads mutex poisoned");
        uploads.push(UploadRecord {
            destination: destination.clone(),
            chunks: Vec::new(),
            state: UploadState::InProgress,
        });
        let id = uploads.len() - 1;
        drop(uploads);
        Ok(Box::new(FakeUpload {
            store: self.clone(),
            id,
            destination: destination.clone(),
            buffer: Vec::new(),
        }))
    }
}

/// Upload handle that buffers chunks and publishes the object on `complete`.
struct FakeUpload {
    store: FakeObjectIO,
    id: usize,
    destination: Destination,
    buffer: Vec<u8>,
}

impl UploadHandle for FakeUpload {
    fn write_chunk(&mut self, chunk: &[u8]) -> CloudResult<()> {
        let reject = self
            .store
            .faults
            .lock()
            .expect("faults mutex poisoned")
            .reject_chunk;
        let mut index = 0;
        self.store.update_upload(self.id, |r| index = r.chunks.len() + 1);
        if reject == Some(index) {
            self.store
                .update_upload(self.id, |r| r.state = UploadState::Failed);
            return Err(CloudIOError::new(
                ErrorKind::ServiceUnavailable,
                format!("Chunk {index} of {} rejected", self.destination),
            ));
        }
        self.buffer.extend_from_slice(chunk);
        self.store
            .update_upload(self.id, |r| r.chunks.push(chunk.len()));
        Ok(())
    }

    fn complete(self: Box<Self>) -> CloudResult<()> {
        let reject = self
            .store
            .faults
            .lock()
            .expect("faults mutex poisoned")
            .reject_complete;
        if reject {
            self.store
                .update_upload(self.id, |r| r.state = UploadState::Failed);
            return Err(CloudIOError::new(
                ErrorKind::InternalError,
                format!("Finalize of {} rejected", self.destination),
            ));
        }
        self.store
            .put_object(&self.destination.bucket, &self.destination.key, &self.buffer)?;
        self.store
            .update_upload(self.id, |r| r.state = UploadState::Completed);
        Ok(())
    }

    fn abort(self: Box<Self>) -> CloudResult<()> {
        self.store.update_upload(self.id, |r| {
            if r.state == UploadState::InProgress {
                r.state = UploadState::Aborted;
            }
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_publishes_on_complete() {
        let store = FakeObjectIO::new();
        let dest = Destination::new("bucket", "out.csv");
        let mut upload = store.begin_upload(&dest).unwrap();
        upload.write_chunk(b"id,name\n").unwrap();
        upload.write_chunk(b"1,Ann\n").unwrap();
        assert!(!store.object_exists("bucket", "out.csv").unwrap());
        upload.complete().unwrap();

        assert_eq!(store.get_object("bucket", "out.csv").unwrap(), b"id,name\n1,Ann\n");
        let record = &store.uploads()[0];
        assert_eq!(record.state, UploadState::Completed);
        assert_eq!(record.chunks, vec![8, 6]);
        assert_eq!(record.bytes(), 14);
    }

    #[test]
    fn rejected_chunk_marks_upload_failed() {
        let store = FakeObjectIO::new();
        store.reject_chunk(2);
        let mut upload = store
            .begin_upload(&Destination::new("bucket", "k"))
            .unwrap();
        upload.write_chunk(b"a").unwrap();
        assert!(upload.write_chunk(b"b").is_err());
        assert_eq!(store.uploads()[0].state, UploadState::Failed);
    }

    #[test]
    fn abort_leaves_no_object() {
        let store = FakeObjectIO::new();
        let mut upload = store
            .begin_upload(&Destination::new("bucket", "k"))
            .unwrap();
        upload.write_chunk(b"partial").unwrap();
        upload.abort().unwrap();
        assert!(!store.object_exists("bucket", "k").unwrap());
        assert_eq!(store.uploads()[0].state, UploadState::Aborted);
    }

    #[test]
    fn injected_read_failures_run_out() {
        let store = FakeObjectIO::new();
        store.put_object("b", "k", b"x").unwrap();
        store.fail_reads("b", "k", ErrorKind::Network, 2);
        assert_eq!(store.get_object("b", "k").unwrap_err().kind, ErrorKind::Network);
        assert!(store.get_object("b", "k").is_err());
        assert_eq!(store.get_object("b", "k").unwrap(), b"x");
    }
}
