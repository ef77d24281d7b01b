//! Bounded in-process byte pipe between the merge writer and the transfer task.
//!
//! [`pipe`] returns a connected [`PipeWriter`] / [`PipeReader`] pair sharing a
//! fixed-capacity buffer:
//!
//! - `write` blocks while the buffer is full; `read` blocks while it is empty.
//! - The producer ends the stream exactly once, with [`PipeWriter::close`]
//!   (clean end-of-data) or [`PipeWriter::abort`] (the consumer's next read
//!   fails with [`MergeError::ChannelAborted`], then sees end-of-data).
//!   Dropping an unsignalled writer aborts with
//!   [`MergeError::ProducerTerminatedUnexpectedly`]. Later signals are no-ops.
//! - An abort is delivered ahead of any bytes still buffered.
//! - Once the reader is dropped or [`PipeReader::close_with_error`] is called,
//!   blocked and future writes fail with [`MergeError::ConsumerGone`].
//!
//! Both ends also implement the `std::io` traits so the CSV writer and any
//! `Read`-based upload code can sit directly on the pipe.

use crate::error::{MergeError, Result};
use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use tracing::trace;

#[derive(Debug)]
enum Producer {
    Open,
    Closed,
    /// `Some` until the error has been handed to the reader.
    Aborted(Option<MergeError>),
}

#[derive(Debug)]
struct State {
    buf: VecDeque<u8>,
    producer: Producer,
    consumer_gone: Option<String>,
}

#[derive(Debug)]
struct Shared {
    capacity: usize,
    state: Mutex<State>,
    readable: Condvar,
    writable: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Create a pipe holding at most `capacity` unread bytes (minimum 1).
#[must_use]
pub fn pipe(capacity: usize) -> (PipeWriter, PipeReader) {
    let capacity = capacity.max(1);
    let shared = Arc::new(Shared {
        capacity,
        state: Mutex::new(State {
            buf: VecDeque::with_capacity(capacity),
            producer: Producer::Open,
            consumer_gone: None,
        }),
        readable: Condvar::new(),
        writable: Condvar::new(),
    });
    (
        PipeWriter {
            shared: Arc::clone(&shared),
            bytes_written: 0,
        },
        PipeReader {
            shared,
            bytes_read: 0,
        },
    )
}

/// Producer end of a [`pipe`].
#[derive(Debug)]
pub struct PipeWriter {
    shared: Arc<Shared>,
    bytes_written: u64,
}

impl PipeWriter {
    /// Copy as much of `data` as fits, blocking until at least one byte fits.
    ///
    /// # Errors
    ///
    /// Returns [`MergeError::ConsumerGone`] once the reader has stopped.
    pub fn write_bytes(&mut self, data: &[u8]) -> Result<usize> {
        if data.is_empty() {
            return Ok(0);
        }
        let shared = &*self.shared;
        let mut state = shared.lock();
        loop {
            if let Some(reason) = &state.consumer_gone {
                return Err(MergeError::ConsumerGone(reason.clone()));
            }
            if !matches!(state.producer, Producer::Open) {
                return Err(MergeError::ConsumerGone(
                    "stream already ended".to_string(),
                ));
            }
            let space = shared.capacity - state.buf.len();
            if space > 0 {
                let n = space.min(data.len());
                state.buf.extend(&data[..n]);
                drop(state);
                shared.readable.notify_one();
                self.bytes_written += n as u64;
                return Ok(n);
            }
            state = shared
                .writable
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Check the reader is still consuming, without writing anything.
    ///
    /// # Errors
    ///
    /// Returns [`MergeError::ConsumerGone`] once the reader has stopped.
    pub fn ensure_consumer(&self) -> Result<()> {
        match &self.shared.lock().consumer_gone {
            Some(reason) => Err(MergeError::ConsumerGone(reason.clone())),
            None => Ok(()),
        }
    }

    /// End the stream cleanly. The reader drains what is buffered, then sees EOF.
    pub fn close(&mut self) {
        self.finish(Producer::Closed);
    }

    /// End the stream with `err`; the reader's next read fails with it.
    pub fn abort(&mut self, err: MergeError) {
        self.finish(Producer::Aborted(Some(err)));
    }

    /// Total bytes accepted by the pipe so far.
    #[must_use]
    pub const fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    fn finish(&mut self, signal: Producer) {
        let mut state = self.shared.lock();
        if !matches!(state.producer, Producer::Open) {
            return;
        }
        trace!(signal = ?signal, bytes = self.bytes_written, "producer ended stream");
        state.producer = signal;
        drop(state);
        self.shared.readable.notify_all();
        self.shared.writable.notify_all();
    }
}

impl Drop for PipeWriter {
    fn drop(&mut self) {
        self.finish(Producer::Aborted(Some(
            MergeError::ProducerTerminatedUnexpectedly,
        )));
    }
}

impl io::Write for PipeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_bytes(buf).map_err(MergeError::into_io)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Consumer end of a [`pipe`].
#[derive(Debug)]
pub struct PipeReader {
    shared: Arc<Shared>,
    bytes_read: u64,
}

impl PipeReader {
    /// Read up to `out.len()` bytes, blocking while the pipe is empty and open.
    ///
    /// Returns `Ok(0)` at end-of-data.
    ///
    /// # Errors
    ///
    /// Returns [`MergeError::ChannelAborted`] (or
    /// [`MergeError::ProducerTerminatedUnexpectedly`]) once, after the producer
    /// aborted.
    pub fn read_bytes(&mut self, out: &mut [u8]) -> Result<usize> {
        if out.is_empty() {
            return Ok(0);
        }
        let shared = &*self.shared;
        let mut state = shared.lock();
        loop {
            if let Producer::Aborted(pending) = &mut state.producer {
                let Some(err) = pending.take() else {
                    return Ok(0);
                };
                state.buf.clear();
                drop(state);
                shared.writable.notify_all();
                return Err(err.into_aborted());
            }
            if !state.buf.is_empty() {
                let n = out.len().min(state.buf.len());
                for (slot, byte) in out.iter_mut().zip(state.buf.drain(..n)) {
                    *slot = byte;
                }
                drop(state);
                shared.writable.notify_one();
                self.bytes_read += n as u64;
                return Ok(n);
            }
            if matches!(state.producer, Producer::Closed) {
                return Ok(0);
            }
            state = shared
                .readable
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Stop consuming. Buffered bytes are discarded and the producer's pending
    /// and future writes fail with [`MergeError::ConsumerGone`] carrying `reason`.
    pub fn close_with_error(&mut self, reason: impl Into<String>) {
        let mut state = self.shared.lock();
        if state.consumer_gone.is_some() {
            return;
        }
        let reason = reason.into();
        trace!(%reason, bytes = self.bytes_read, "consumer stopped reading");
        state.consumer_gone = Some(reason);
        state.buf.clear();
        drop(state);
        self.shared.writable.notify_all();
    }

    /// Total bytes handed out so far.
    #[must_use]
    pub const fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// Bytes currently buffered and unread.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.shared.lock().buf.len()
    }
}

impl Drop for PipeReader {
    fn drop(&mut self) {
        self.close_with_error("reader dropped");
    }
}

impl io::Read for PipeReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.read_bytes(buf).map_err(MergeError::into_io)
    }
}
