//! Error type for the merge-and-upload pipeline.
//!
//! Every failure is fatal to a run. The coordinator reports the first error it
//! observes, so the variants are `Clone`: the producer hands its error to the
//! channel as an abort reason and also returns it to the coordinator.

use crate::io::cloud::traits::{CloudIOError, ErrorKind};
use thiserror::Error;

/// Errors produced by sources, the parser, the channel, and the transfer task.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MergeError {
    /// The partition source has no data for this identifier.
    #[error("partition {0} not found")]
    PartitionNotFound(String),

    /// The partition source failed to produce data for this identifier.
    #[error("failed to retrieve partition {partition}: {reason}")]
    PartitionRetrievalFailed { partition: String, reason: String },

    /// The partition text is not well-formed CSV.
    #[error("failed to parse partition {partition}: {reason}")]
    ParseError { partition: String, reason: String },

    /// Consumer-side view of an abort signalled by the producer.
    #[error("stream aborted by producer: {0}")]
    ChannelAborted(Box<MergeError>),

    /// The remote sink rejected a chunk or the finalize step.
    #[error("transfer failed: {0}")]
    TransferFailed(String),

    /// The producer went away without closing or aborting the channel.
    #[error("producer terminated unexpectedly")]
    ProducerTerminatedUnexpectedly,

    /// Producer-side view of a consumer that stopped reading.
    #[error("consumer stopped reading: {0}")]
    ConsumerGone(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl MergeError {
    /// Wrap `self` as the error a consumer observes after an abort.
    ///
    /// Errors that already describe the channel are passed through unchanged so
    /// the consumer never sees a doubly wrapped abort.
    #[must_use]
    pub fn into_aborted(self) -> Self {
        match self {
            Self::ChannelAborted(_) | Self::ProducerTerminatedUnexpectedly => self,
            other => Self::ChannelAborted(Box::new(other)),
        }
    }

    /// The producer-side error underneath a `ChannelAborted`, or `self`.
    #[must_use]
    pub fn root_cause(&self) -> &Self {
        match self {
            Self::ChannelAborted(inner) => inner.root_cause(),
            other => other,
        }
    }

    /// `true` for errors that are a side effect of the other task failing.
    #[must_use]
    pub const fn is_consequential(&self) -> bool {
        matches!(self, Self::ChannelAborted(_) | Self::ConsumerGone(_))
    }

    /// Carry this error through an `std::io::Error`, e.g. across `io::Write`.
    #[must_use]
    pub fn into_io(self) -> std::io::Error {
        let kind = match &self {
            Self::ConsumerGone(_) => std::io::ErrorKind::BrokenPipe,
            Self::ChannelAborted(_) | Self::ProducerTerminatedUnexpectedly => {
                std::io::ErrorKind::ConnectionAborted
            }
            _ => std::io::ErrorKind::Other,
        };
        std::io::Error::new(kind, self)
    }

    /// Recover a `MergeError` previously packed with [`MergeError::into_io`].
    ///
    /// Plain I/O errors become `fallback(message)`.
    pub fn from_io(err: std::io::Error, fallback: impl FnOnce(String) -> Self) -> Self {
        if err.get_ref().is_some_and(|inner| inner.is::<Self>()) {
            if let Some(inner) = err.into_inner()
                && let Ok(merge) = inner.downcast::<Self>()
            {
                return *merge;
            }
            return fallback("unreadable I/O error".to_string());
        }
        fallback(err.to_string())
    }
}

impl From<CloudIOError> for MergeError {
    fn from(err: CloudIOError) -> Self {
        match err.kind {
            ErrorKind::InvalidInput => Self::InvalidConfig(err.to_string()),
            _ => Self::TransferFailed(err.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, MergeError>;
