//! Job handles and results

use super::JobId;
use crate::error::{Error, Result};
use crate::protocol::ParameterValue;
use crossbeam::channel::{Receiver, RecvTimeoutError, TryRecvError};
use std::time::Duration;

/// Result values of one completed segment
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentResult {
    /// Offset of the segment's first unit within the job
    pub first: usize,
    /// Units in the segment
    pub size: usize,
    /// Name of the system that computed it
    pub system: String,
    /// Values the worker reported, in order
    pub values: Vec<ParameterValue>,
}

/// Every segment result of a finished job, ordered by `first`
#[derive(Debug, Clone)]
pub struct JobOutcome {
    pub job: JobId,
    /// Offset of the job's first unit; 0 unless it re-splits a received segment
    pub first: usize,
    pub total: usize,
    pub results: Vec<SegmentResult>,
}

impl JobOutcome {
    /// Units covered by the results
    pub fn covered(&self) -> usize {
        self.results.iter().map(|r| r.size).sum()
    }
}

/// Caller's side of a running job
///
/// Merging the partial results is left to the caller.
#[derive(Debug)]
pub struct JobHandle {
    job: JobId,
    total: usize,
    receiver: Receiver<Result<JobOutcome>>,
}

impl JobHandle {
    pub(super) fn new(job: JobId, total: usize, receiver: Receiver<Result<JobOutcome>>) -> Self {
        Self { job, total, receiver }
    }

    pub fn id(&self) -> JobId {
        self.job
    }

    pub fn total(&self) -> usize {
        self.total
    }

    /// Block until the job completes or aborts
    pub fn wait(self) -> Result<JobOutcome> {
        self.receiver.recv().unwrap_or_else(|_| Err(self.dropped()))
    }

    /// Wait at most `timeout`; `None` if the job is still running
    ///
    /// Timing out does not cancel the job.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Result<JobOutcome>> {
        match self.receiver.recv_timeout(timeout) {
            Ok(outcome) => Some(outcome),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(Err(self.dropped())),
        }
    }

    /// The outcome if the job already finished
    pub fn try_result(&self) -> Option<Result<JobOutcome>> {
        match self.receiver.try_recv() {
            Ok(outcome) => Some(outcome),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(self.dropped())),
        }
    }

    fn dropped(&self) -> Error {
        Error::JobAborted {
            job: self.job,
            reason: "system array was dropped".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam::channel::bounded;

    #[test]
    fn test_wait_receives_outcome() {
        let (tx, rx) = bounded(1);
        let handle = JobHandle::new(3, 10, rx);
        assert!(handle.try_result().is_none());

        tx.send(Ok(JobOutcome { job: 3, first: 0, total: 10, results: Vec::new() })).unwrap();
        let outcome = handle.wait().unwrap();
        assert_eq!(outcome.job, 3);
        assert_eq!(outcome.covered(), 0);
    }

    #[test]
    fn test_dropped_sender_aborts() {
        let (tx, rx) = bounded::<Result<JobOutcome>>(1);
        let handle = JobHandle::new(4, 1, rx);
        assert!(handle.wait_timeout(Duration::from_millis(10)).is_none());

        drop(tx);
        let err = handle.wait_timeout(Duration::from_millis(10)).unwrap().unwrap_err();
        assert!(matches!(err, Error::JobAborted { job: 4, .. }));
    }
}
