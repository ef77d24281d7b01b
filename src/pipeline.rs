//! Pipeline coordinator.
//!
//! [`MergePipeline`] wires a [`MergeWriter`] and the [`transfer`] task to the
//! two ends of a bounded [`pipe`], runs them on two named threads inside a
//! thread scope, and joins both before returning. Either side failing tears
//! the other down through the pipe:
//!
//! - a producer failure aborts the pipe, so the transfer task abandons its
//!   upload and never calls `complete`;
//! - a sink failure closes the read end, so a producer blocked on a full pipe
//!   wakes up with [`MergeError::ConsumerGone`].
//!
//! The error returned is the one that caused the run to fail, never the
//! consequence observed by the other side.
//!
//! ```
//! use streammerge::io::cloud::{Destination, FakeObjectIO, ObjectIO};
//! use streammerge::pipeline::MergePipeline;
//! use streammerge::source::{InMemorySource, PartitionId};
//!
//! let source = InMemorySource::from_pairs([("p1", "id,name\n1,Ann"), ("p2", "id,name\n2,Bo")]);
//! let sink = FakeObjectIO::new();
//! let ids: Vec<PartitionId> = vec!["p1".into(), "p2".into()];
//!
//! let report = MergePipeline::new(&source, &sink)
//!     .run(&ids, &Destination::new("out", "merged.csv"))
//!     .unwrap();
//! assert_eq!(report.rows, 3);
//! assert_eq!(sink.get_object("out", "merged.csv").unwrap(), b"id,name\n1,Ann\n2,Bo\n");
//! ```

use crate::channel::pipe;
use crate::config::MergeConfig;
use crate::error::{MergeError, Result};
use crate::io::cloud::traits::{Destination, ObjectSink};
use crate::source::{PartitionId, PartitionSource};
use crate::transfer::{TransferStats, transfer};
use crate::writer::{MergeStats, MergeWriter};
use serde::Serialize;
use std::any::Any;
use std::thread;
use tracing::{debug, error, info, info_span, warn};

/// Lifecycle of a [`MergePipeline`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PipelineState {
    Idle,
    Running,
    Succeeded,
    Failed,
    Closed,
}

impl PipelineState {
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::Running | Self::Failed)
                | (Self::Running, Self::Succeeded | Self::Failed)
                | (Self::Succeeded | Self::Failed, Self::Closed)
        )
    }
}

/// Outcome of a successful run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergeReport {
    pub destination: String,
    pub partitions: usize,
    /// Rows written, header included.
    pub rows: u64,
    pub bytes: u64,
    pub chunks: usize,
    /// Hex SHA-256 of the uploaded bytes.
    pub sha256: String,
}

impl MergeReport {
    fn new(destination: &Destination, merged: MergeStats, transferred: TransferStats) -> Self {
        Self {
            destination: destination.to_string(),
            partitions: merged.partitions,
            rows: merged.rows,
            bytes: transferred.bytes,
            chunks: transferred.chunks,
            sha256: transferred.sha256,
        }
    }
}

/// One merge-and-upload run over a source and a sink.
pub struct MergePipeline<'a, S: ?Sized> {
    source: &'a S,
    sink: &'a dyn ObjectSink,
    config: MergeConfig,
    state: PipelineState,
}

impl<'a, S: PartitionSource + ?Sized> MergePipeline<'a, S> {
    pub fn new(source: &'a S, sink: &'a dyn ObjectSink) -> Self {
        Self {
            source,
            sink,
            config: MergeConfig::default(),
            state: PipelineState::Idle,
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: MergeConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub const fn with_channel_capacity(mut self, bytes: usize) -> Self {
        self.config.channel_capacity = bytes;
        self
    }

    #[must_use]
    pub const fn with_chunk_size(mut self, bytes: usize) -> Self {
        self.config.chunk_size = bytes;
        self
    }

    #[must_use]
    pub const fn config(&self) -> &MergeConfig {
        &self.config
    }

    #[must_use]
    pub const fn state(&self) -> PipelineState {
        self.state
    }

    /// Merge `ids` in order and upload the result to `destination`.
    ///
    /// A pipeline runs once; it is [`PipelineState::Closed`] afterwards.
    ///
    /// # Errors
    ///
    /// Returns the error that ended the run: a source, parse, or sink failure,
    /// [`MergeError::InvalidConfig`], or a task that died without reporting.
    pub fn run(&mut self, ids: &[PartitionId], destination: &Destination) -> Result<MergeReport> {
        if self.state != PipelineState::Idle {
            return Err(MergeError::InvalidConfig(format!(
                "pipeline cannot run from state {:?}",
                self.state
            )));
        }
        let span = info_span!("merge_and_upload", %destination, partitions = ids.len());
        let _entered = span.enter();

        if let Err(err) = self.config.validate() {
            self.transition(PipelineState::Failed);
            self.transition(PipelineState::Closed);
            return Err(err);
        }

        self.transition(PipelineState::Running);
        let outcome = self.execute(ids, destination);
        match &outcome {
            Ok(report) => {
                self.transition(PipelineState::Succeeded);
                info!(
                    rows = report.rows,
                    bytes = report.bytes,
                    chunks = report.chunks,
                    "merge uploaded"
                );
            }
            Err(err) => {
                self.transition(PipelineState::Failed);
                error!(error = %err, "merge failed");
            }
        }
        self.transition(PipelineState::Closed);
        outcome
    }

    fn execute(&self, ids: &[PartitionId], destination: &Destination) -> Result<MergeReport> {
        let (writer, reader) = pipe(self.config.channel_capacity);
        let merge = MergeWriter::new(self.source)
            .with_parse_options(self.config.parse_options())
            .with_decompression(self.config.decompress);
        let sink = self.sink;
        let chunk_size = self.config.chunk_size;
        let parent = tracing::Span::current();

        let (merged, transferred) = thread::scope(|scope| {
            let producer_span = info_span!(parent: &parent, "merge_writer");
            let producer = thread::Builder::new()
                .name("merge-writer".into())
                .spawn_scoped(scope, move || {
                    let _entered = producer_span.enter();
                    merge.run(ids, writer)
                });

            let consumer_span = info_span!(parent: &parent, "transfer");
            let consumer = thread::Builder::new()
                .name("transfer".into())
                .spawn_scoped(scope, move || {
                    let _entered = consumer_span.enter();
                    transfer(reader, sink, destination, chunk_size)
                });

            let merged = match producer {
                Ok(handle) => handle.join().unwrap_or_else(|panic| {
                    warn!(panic = %panic_message(&*panic), "merge writer panicked");
                    Err(MergeError::ProducerTerminatedUnexpectedly)
                }),
                Err(e) => {
                    warn!(error = %e, "failed to spawn merge writer");
                    Err(MergeError::ProducerTerminatedUnexpectedly)
                }
            };
            let transferred = match consumer {
                Ok(handle) => handle.join().unwrap_or_else(|panic| {
                    Err(MergeError::TransferFailed(format!(
                        "transfer task panicked: {}",
                        panic_message(&*panic)
                    )))
                }),
                Err(e) => Err(MergeError::TransferFailed(format!(
                    "spawn transfer task: {e}"
                ))),
            };
            (merged, transferred)
        });

        let (merged, transferred) = first_error(merged, transferred)?;
        Ok(MergeReport::new(destination, merged, transferred))
    }

    fn transition(&mut self, next: PipelineState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "invalid transition {:?} -> {next:?}",
            self.state
        );
        debug!(from = ?self.state, to = ?next, "pipeline state");
        self.state = next;
    }
}

/// Merge `ids` from `source` into `destination` on `sink`.
///
/// # Errors
///
/// See [`MergePipeline::run`].
pub fn merge_and_upload<S: PartitionSource + ?Sized>(
    ids: &[PartitionId],
    destination: &Destination,
    source: &S,
    sink: &dyn ObjectSink,
    config: &MergeConfig,
) -> Result<MergeReport> {
    MergePipeline::new(source, sink)
        .with_config(config.clone())
        .run(ids, destination)
}

/// Pick the error that ended the run.
///
/// A side that failed only because the other one did (`ConsumerGone` on the
/// producer, `ChannelAborted` on the consumer) never hides the original cause.
fn first_error(
    merged: Result<MergeStats>,
    transferred: Result<TransferStats>,
) -> Result<(MergeStats, TransferStats)> {
    match (merged, transferred) {
        (Ok(m), Ok(t)) => Ok((m, t)),
        (Err(p), Ok(_)) => Err(p),
        (Ok(_), Err(c)) => Err(c),
        (Err(p), Err(c)) => {
            if p.is_consequential() && !c.is_consequential() {
                Err(c)
            } else {
                Err(p)
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::cloud::{CloudResult, FakeObjectIO, ObjectIO, UploadHandle, UploadState};
    use crate::source::InMemorySource;

    fn ids(names: &[&str]) -> Vec<PartitionId> {
        names.iter().copied().map(PartitionId::from).collect()
    }

    fn dest() -> Destination {
        Destination::new("out", "merged.csv")
    }

    struct PanickingSource;

    impl PartitionSource for PanickingSource {
        fn fetch(&self, _id: &PartitionId) -> Result<Vec<u8>> {
            panic!("source blew up")
        }
    }

    struct PanickingSink;

    impl ObjectSink for PanickingSink {
        fn begin_upload(&self, _destination: &Destination) -> CloudResult<Box<dyn UploadHandle>> {
            panic!("sink blew up")
        }
    }

    #[test]
    fn report_counts_rows_bytes_and_chunks() {
        let source = InMemorySource::from_pairs([("p1", "id,name\n1,Ann"), ("p2", "id,name\n2,Bo")]);
        let sink = FakeObjectIO::new();
        let mut pipeline = MergePipeline::new(&source, &sink).with_chunk_size(8);

        let report = pipeline.run(&ids(&["p1", "p2"]), &dest()).unwrap();

        assert_eq!(pipeline.state(), PipelineState::Closed);
        assert_eq!(report.partitions, 2);
        assert_eq!(report.rows, 3);
        assert_eq!(report.bytes, 19);
        assert_eq!(report.chunks, 3);
        assert_eq!(report.destination, "out/merged.csv");
        assert_eq!(sink.uploads()[0].chunks, vec![8, 8, 3]);
    }

    #[test]
    fn pipeline_runs_only_once() {
        let source = InMemorySource::from_pairs([("p1", "id\n1\n")]);
        let sink = FakeObjectIO::new();
        let mut pipeline = MergePipeline::new(&source, &sink);
        pipeline.run(&ids(&["p1"]), &dest()).unwrap();

        let err = pipeline.run(&ids(&["p1"]), &dest()).unwrap_err();
        assert!(matches!(err, MergeError::InvalidConfig(_)));
        assert_eq!(sink.uploads().len(), 1);
    }

    #[test]
    fn invalid_config_fails_before_any_upload() {
        let source = InMemorySource::from_pairs([("p1", "id\n1\n")]);
        let sink = FakeObjectIO::new();
        let mut pipeline = MergePipeline::new(&source, &sink).with_channel_capacity(0);

        let err = pipeline.run(&ids(&["p1"]), &dest()).unwrap_err();
        assert!(matches!(err, MergeError::InvalidConfig(_)));
        assert!(sink.uploads().is_empty());
        assert!(source.fetched().is_empty());
        assert_eq!(pipeline.state(), PipelineState::Closed);
    }

    #[test]
    fn empty_partition_list_uploads_an_empty_object() {
        let source = InMemorySource::new();
        let sink = FakeObjectIO::new();
        let report = merge_and_upload(&[], &dest(), &source, &sink, &MergeConfig::default()).unwrap();

        assert_eq!(report.rows, 0);
        assert_eq!(report.chunks, 0);
        assert_eq!(sink.get_object("out", "merged.csv").unwrap(), b"");
    }

    #[test]
    fn producer_panic_is_reported_as_termination() {
        let sink = FakeObjectIO::new();
        let err = merge_and_upload(
            &ids(&["p1"]),
            &dest(),
            &PanickingSource,
            &sink,
            &MergeConfig::default(),
        )
        .unwrap_err();

        assert_eq!(err, MergeError::ProducerTerminatedUnexpectedly);
        assert_eq!(sink.uploads()[0].state, UploadState::Aborted);
        assert!(!sink.object_exists("out", "merged.csv").unwrap());
    }

    #[test]
    fn consumer_panic_is_reported_as_transfer_failure() {
        let source = InMemorySource::from_pairs([("p1", "id\n1\n")]);
        let err = merge_and_upload(
            &ids(&["p1"]),
            &dest(),
            &source,
            &PanickingSink,
            &MergeConfig::default(),
        )
        .unwrap_err();

        match err {
            MergeError::TransferFailed(msg) => assert!(msg.contains("sink blew up")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn original_cause_beats_its_consequence() {
        let stats = TransferStats {
            bytes: 0,
            chunks: 0,
            sha256: String::new(),
        };
        let not_found = MergeError::PartitionNotFound("p2".into());

        let err = first_error(Err(not_found.clone()), Err(not_found.clone().into_aborted())).unwrap_err();
        assert_eq!(err, not_found);

        let rejected = MergeError::TransferFailed("chunk 2".into());
        let err = first_error(
            Err(MergeError::ConsumerGone("chunk 2".into())),
            Err(rejected.clone()),
        )
        .unwrap_err();
        assert_eq!(err, rejected);

        let err = first_error(Ok(MergeStats::default()), Err(rejected.clone())).unwrap_err();
        assert_eq!(err, rejected);
        assert!(first_error(Ok(MergeStats::default()), Ok(stats)).is_ok());
    }

    #[test]
    fn state_machine_transitions() {
        use PipelineState::*;
        assert!(Idle.can_transition_to(Running));
        assert!(Idle.can_transition_to(Failed));
        assert!(Running.can_transition_to(Succeeded));
        assert!(Failed.can_transition_to(Closed));
        assert!(!Idle.can_transition_to(Succeeded));
        assert!(!Closed.can_transition_to(Running));
        assert!(!Succeeded.can_transition_to(Failed));
    }
}
