//! Partition sources.
//!
//! A [`PartitionSource`] turns a partition identifier into the raw bytes of
//! that partition. The pipeline calls it once per identifier, in merge order,
//! from the producer thread.
//!
//! - [`InMemorySource`] - deterministic map, with failure injection and gates for tests
//! - [`DirectorySource`] - files under a root directory
//! - [`ObjectSource`] - objects under a bucket prefix of any [`ObjectIO`]
//! - [`RetryingSource`] - retries transient failures of another source

use crate::error::{MergeError, Result};
use crate::io::cloud::helpers::{RetryConfig, retry_with_backoff_if};
use crate::io::cloud::traits::{ErrorKind, ObjectIO};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex, PoisonError};

/// Opaque name of a partition. List order, not identifier order, drives the merge.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PartitionId(String);

impl PartitionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PartitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PartitionId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for PartitionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Supplies the raw bytes of a partition.
pub trait PartitionSource: Send + Sync {
    /// Fetch the complete payload of `id`.
    ///
    /// # Errors
    ///
    /// Returns [`MergeError::PartitionNotFound`] if `id` does not exist and
    /// [`MergeError::PartitionRetrievalFailed`] for any other failure.
    fn fetch(&self, id: &PartitionId) -> Result<Vec<u8>>;
}

impl<S: PartitionSource + ?Sized> PartitionSource for &S {
    fn fetch(&self, id: &PartitionId) -> Result<Vec<u8>> {
        (**self).fetch(id)
    }
}

impl<S: PartitionSource + ?Sized> PartitionSource for Arc<S> {
    fn fetch(&self, id: &PartitionId) -> Result<Vec<u8>> {
        (**self).fetch(id)
    }
}

fn retrieval_failed(id: &PartitionId, reason: impl fmt::Display) -> MergeError {
    MergeError::PartitionRetrievalFailed {
        partition: id.to_string(),
        reason: reason.to_string(),
    }
}

// ============================================================================
// InMemorySource
// ============================================================================

/// A one-shot latch a test can use to hold a fetch until it is released.
#[derive(Debug, Clone, Default)]
pub struct Gate {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl Gate {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Let every current and future waiter through.
    pub fn open(&self) {
        let (lock, cvar) = &*self.inner;
        *lock.lock().unwrap_or_else(PoisonError::into_inner) = true;
        cvar.notify_all();
    }

    fn wait(&self) {
        let (lock, cvar) = &*self.inner;
        let mut open = lock.lock().unwrap_or_else(PoisonError::into_inner);
        while !*open {
            open = cvar.wait(open).unwrap_or_else(PoisonError::into_inner);
        }
    }
}

#[derive(Debug, Default)]
struct Script {
    failures: HashMap<PartitionId, (MergeError, u32)>,
    gates: HashMap<PartitionId, Gate>,
    fetched: Vec<PartitionId>,
}

/// Deterministic in-memory source.
///
/// Failures and gates are keyed by partition, so a test decides exactly which
/// fetch fails or stalls without relying on timing.
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    partitions: Arc<HashMap<PartitionId, Vec<u8>>>,
    script: Arc<Mutex<Script>>,
}

impl InMemorySource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a source from `(id, payload)` pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<PartitionId>,
        V: Into<Vec<u8>>,
    {
        Self {
            partitions: Arc::new(
                pairs
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
            script: Arc::default(),
        }
    }

    /// Make the next `times` fetches of `id` fail with `err`.
    pub fn fail(&self, id: impl Into<PartitionId>, err: MergeError, times: u32) {
        self.script()
            .failures
            .insert(id.into(), (err, times));
    }

    /// Block fetches of `id` until the returned gate is opened.
    pub fn gate(&self, id: impl Into<PartitionId>) -> Gate {
        let gate = Gate::new();
        self.script().gates.insert(id.into(), gate.clone());
        gate
    }

    /// Every fetch attempted so far, in call order.
    #[must_use]
    pub fn fetched(&self) -> Vec<PartitionId> {
        self.script().fetched.clone()
    }

    fn script(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl PartitionSource for InMemorySource {
    fn fetch(&self, id: &PartitionId) -> Result<Vec<u8>> {
        let gate = {
            let mut script = self.script();
            script.fetched.push(id.clone());
            script.gates.get(id).cloned()
        };
        if let Some(gate) = gate {
            gate.wait();
        }

        let injected = {
            let mut script = self.script();
            match script.failures.get_mut(id) {
                Some((err, remaining)) if *remaining > 0 => {
                    *remaining -= 1;
                    Some(err.clone())
                }
                _ => None,
            }
        };
        if let Some(err) = injected {
            return Err(err);
        }

        self.partitions
            .get(id)
            .cloned()
            .ok_or_else(|| MergeError::PartitionNotFound(id.to_string()))
    }
}

// ============================================================================
// DirectorySource
// ============================================================================

/// Partitions stored as files under a root directory.
///
/// The identifier is the file's path relative to the root, `/`-separated.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Identifiers of all files under the root matching `pattern`, sorted.
    ///
    /// # Errors
    ///
    /// Returns an error if the pattern is invalid or matches nothing.
    pub fn discover(&self, pattern: &str) -> anyhow::Result<Vec<PartitionId>> {
        Ok(crate::io::glob::expand_relative(&self.root, pattern)?
            .into_iter()
            .map(PartitionId::from)
            .collect())
    }

    fn path_of(&self, id: &PartitionId) -> Result<PathBuf> {
        let rel = Path::new(id.as_str());
        let escapes = rel.is_absolute()
            || rel
                .components()
                .any(|c| matches!(c, std::path::Component::ParentDir));
        if escapes {
            return Err(retrieval_failed(id, "identifier escapes the source root"));
        }
        Ok(self.root.join(rel))
    }
}

impl PartitionSource for DirectorySource {
    fn fetch(&self, id: &PartitionId) -> Result<Vec<u8>> {
        let path = self.path_of(id)?;
        std::fs::read(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => MergeError::PartitionNotFound(id.to_string()),
            _ => retrieval_failed(id, format!("read {}: {e}", path.display())),
        })
    }
}

// ============================================================================
// ObjectSource
// ============================================================================

/// Partitions stored as objects `prefix + id` in one bucket.
pub struct ObjectSource<O> {
    store: O,
    bucket: String,
    prefix: String,
}

impl<O: ObjectIO> ObjectSource<O> {
    pub fn new(store: O, bucket: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            store,
            bucket: bucket.into(),
            prefix: prefix.into(),
        }
    }

    /// Identifiers of every object under the prefix, in key order.
    ///
    /// # Errors
    ///
    /// Returns an error if the bucket cannot be listed.
    pub fn discover(&self) -> Result<Vec<PartitionId>> {
        let objects = self
            .store
            .list_objects(&self.bucket, Some(&self.prefix))
            .map_err(|e| retrieval_failed(&PartitionId::new(&self.prefix), e))?;
        Ok(objects
            .into_iter()
            .filter_map(|o| o.key.strip_prefix(&self.prefix).map(PartitionId::from))
            .collect())
    }
}

impl<O: ObjectIO> PartitionSource for ObjectSource<O> {
    fn fetch(&self, id: &PartitionId) -> Result<Vec<u8>> {
        let key = format!("{}{id}", self.prefix);
        self.store
            .get_object(&self.bucket, &key)
            .map_err(|e| match e.kind {
                ErrorKind::NotFound => MergeError::PartitionNotFound(id.to_string()),
                _ => retrieval_failed(id, e),
            })
    }
}

// ============================================================================
// RetryingSource
// ============================================================================

/// Retries [`MergeError::PartitionRetrievalFailed`] from the wrapped source.
///
/// Missing partitions are reported immediately.
pub struct RetryingSource<S> {
    inner: S,
    config: RetryConfig,
}

impl<S: PartitionSource> RetryingSource<S> {
    pub const fn new(inner: S, config: RetryConfig) -> Self {
        Self { inner, config }
    }
}

impl<S: PartitionSource> PartitionSource for RetryingSource<S> {
    fn fetch(&self, id: &PartitionId) -> Result<Vec<u8>> {
        retry_with_backoff_if(
            &self.config,
            |e| matches!(e, MergeError::PartitionRetrievalFailed { .. }),
            || self.inner.fetch(id),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::cloud::FakeObjectIO;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn in_memory_source_serves_and_records() {
        let src = InMemorySource::from_pairs([("p1", "id\n1")]);
        assert_eq!(src.fetch(&"p1".into()).unwrap(), b"id\n1");
        assert_eq!(
            src.fetch(&"p2".into()).unwrap_err(),
            MergeError::PartitionNotFound("p2".into())
        );
        assert_eq!(src.fetched(), vec![PartitionId::new("p1"), PartitionId::new("p2")]);
    }

    #[test]
    fn directory_source_maps_missing_files() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.csv"), "id\n1\n").unwrap();
        let src = DirectorySource::new(dir.path());

        assert_eq!(src.fetch(&"a.csv".into()).unwrap(), b"id\n1\n");
        assert_eq!(
            src.fetch(&"b.csv".into()).unwrap_err(),
            MergeError::PartitionNotFound("b.csv".into())
        );
        assert!(matches!(
            src.fetch(&"../a.csv".into()),
            Err(MergeError::PartitionRetrievalFailed { .. })
        ));
    }

    #[test]
    fn object_source_uses_prefix() {
        let store = FakeObjectIO::new();
        store.put_object("in", "daily/p1.csv", b"id\n1").unwrap();
        store.put_object("in", "daily/p2.csv", b"id\n2").unwrap();
        store.put_object("in", "other/p3.csv", b"id\n3").unwrap();
        let src = ObjectSource::new(store, "in", "daily/");

        assert_eq!(
            src.discover().unwrap(),
            vec![PartitionId::new("p1.csv"), PartitionId::new("p2.csv")]
        );
        assert_eq!(src.fetch(&"p2.csv".into()).unwrap(), b"id\n2");
        assert!(matches!(
            src.fetch(&"p3.csv".into()),
            Err(MergeError::PartitionNotFound(_))
        ));
    }

    #[test]
    fn retrying_source_retries_transient_failures_only() {
        let src = InMemorySource::from_pairs([("p1", "id\n1")]);
        src.fail(
            "p1",
            MergeError::PartitionRetrievalFailed {
                partition: "p1".into(),
                reason: "connection reset".into(),
            },
            2,
        );
        let config = RetryConfig {
            initial_delay_ms: 0,
            ..RetryConfig::default()
        };
        let retrying = RetryingSource::new(src.clone(), config);

        assert_eq!(retrying.fetch(&"p1".into()).unwrap(), b"id\n1");
        assert_eq!(src.fetched().len(), 3);

        assert!(matches!(
            retrying.fetch(&"missing".into()),
            Err(MergeError::PartitionNotFound(_))
        ));
        assert_eq!(src.fetched().len(), 4);
    }
}
