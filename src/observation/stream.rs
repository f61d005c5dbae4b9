//! Channel-backed change streams.

use std::time::Duration;

use crossbeam_channel::{Receiver, RecvError, RecvTimeoutError, TryRecvError};

use super::registry::Observation;
use super::types::ChangeRecord;

/// Max buffered records before the stream starts shedding deliveries.
pub(crate) const STREAM_BUFFER: usize = 1024;

/// A pull-based stream of typed changes for one key.
///
/// Backed by a bounded channel fed from the observation's handler; when the
/// buffer is full the oldest unread deliveries win and new ones are shed.
/// Dropping the stream invalidates the underlying observation.
pub struct ChangeStream<T> {
    observation: Observation,
    receiver: Receiver<ChangeRecord<T>>,
}

impl<T> ChangeStream<T> {
    pub(crate) fn new(observation: Observation, receiver: Receiver<ChangeRecord<T>>) -> Self {
        Self {
            observation,
            receiver,
        }
    }

    pub fn observation(&self) -> &Observation {
        &self.observation
    }

    /// Receive the next change (blocking).
    pub fn recv(&self) -> Result<ChangeRecord<T>, RecvError> {
        self.receiver.recv()
    }

    /// Try to receive a change (non-blocking).
    pub fn try_recv(&self) -> Result<ChangeRecord<T>, TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<ChangeRecord<T>, RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Collapses consecutive deliveries whose new value is unchanged.
    pub fn deduped(self) -> DedupedStream<T>
    where
        T: PartialEq + Clone,
    {
        DedupedStream {
            inner: self,
            last: None,
        }
    }
}

impl<T> Drop for ChangeStream<T> {
    fn drop(&mut self) {
        self.observation.invalidate();
    }
}

/// [`ChangeStream`] transform that skips repeated new values.
pub struct DedupedStream<T> {
    inner: ChangeStream<T>,
    last: Option<T>,
}

impl<T: PartialEq + Clone> DedupedStream<T> {
    fn accept(&mut self, record: &ChangeRecord<T>) -> bool {
        if self.last.as_ref() == Some(&record.new_value) {
            return false;
        }
        self.last = Some(record.new_value.clone());
        true
    }

    /// Receive the next distinct change (blocking).
    pub fn recv(&mut self) -> Result<ChangeRecord<T>, RecvError> {
        loop {
            let record = self.inner.recv()?;
            if self.accept(&record) {
                return Ok(record);
            }
        }
    }

    /// Try to receive a distinct change (non-blocking).
    pub fn try_recv(&mut self) -> Result<ChangeRecord<T>, TryRecvError> {
        loop {
            let record = self.inner.try_recv()?;
            if self.accept(&record) {
                return Ok(record);
            }
        }
    }

    /// Receive a distinct change, giving up after `timeout` without one.
    pub fn recv_timeout(&mut self, timeout: Duration) -> Result<ChangeRecord<T>, RecvTimeoutError> {
        let deadline = std::time::Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(std::time::Instant::now());
            let record = self.inner.recv_timeout(remaining)?;
            if self.accept(&record) {
                return Ok(record);
            }
        }
    }

    pub fn observation(&self) -> &Observation {
        self.inner.observation()
    }
}
