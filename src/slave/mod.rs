//! Worker side of a parallel session
//!
//! A [`SlaveSystem`] represents the master as seen from a worker process. It
//! answers handshakes, runs every segment it receives through a
//! [`SegmentWorker`], and reports the outcome back. Anything else is forwarded
//! up its link, typically to a [`Dispatcher`](crate::protocol::Dispatcher).

use crate::error::Result;
use crate::external::ExternalSystem;
use crate::parallel::{
    ERROR_MESSAGE, HANDSHAKE, HANDSHAKE_REPLY, HISTORY_UID, PIECE_FIRST, PIECE_SIZE,
    REPORT_SEGMENT, REPORT_SEGMENT_ERROR,
};
use crate::protocol::{Invoke, InvokeParameter, Link, ParameterValue, Protocol, Transport};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// One segment as handed to a worker
#[derive(Debug, Clone)]
pub struct SegmentRequest {
    /// Segment identifier assigned by the master
    pub uid: u64,
    /// The job's invoke without the segment parameters
    pub invoke: Invoke,
    /// Offset of the first unit within the job
    pub first: usize,
    /// Units to compute
    pub size: usize,
}

impl SegmentRequest {
    /// Read the segment parameters off an inbound invoke
    pub fn from_invoke(invoke: &Invoke) -> Result<Self> {
        Ok(Self {
            uid: invoke.named(HISTORY_UID)?.as_u64()?,
            first: invoke.named(PIECE_FIRST)?.as_usize()?,
            size: invoke.named(PIECE_SIZE)?.as_usize()?,
            invoke: invoke.without_parameters(&[HISTORY_UID, PIECE_FIRST, PIECE_SIZE]),
        })
    }

    /// Unit offsets covered by this segment
    pub fn range(&self) -> std::ops::Range<usize> {
        self.first..self.first + self.size
    }
}

/// Computation behind a worker
pub trait SegmentWorker: Send + Sync {
    /// Compute one segment; the returned values travel back to the master in order
    fn process(&self, request: &SegmentRequest) -> anyhow::Result<Vec<ParameterValue>>;
}

impl<F> SegmentWorker for F
where
    F: Fn(&SegmentRequest) -> anyhow::Result<Vec<ParameterValue>> + Send + Sync,
{
    fn process(&self, request: &SegmentRequest) -> anyhow::Result<Vec<ParameterValue>> {
        self(request)
    }
}

/// The master, seen from a worker
pub struct SlaveSystem {
    base: ExternalSystem,
    worker: Box<dyn SegmentWorker>,
}

impl SlaveSystem {
    pub fn new(
        name: impl Into<String>,
        transport: Arc<dyn Transport>,
        worker: impl SegmentWorker + 'static,
    ) -> Self {
        Self {
            base: ExternalSystem::new(name, transport),
            worker: Box::new(worker),
        }
    }

    pub fn name(&self) -> &str {
        self.base.name()
    }

    pub fn base(&self) -> &ExternalSystem {
        &self.base
    }

    /// Link to the role that receives listeners other than segments
    pub fn link(&self) -> &Link {
        self.base.link()
    }

    fn run_segment(&self, invoke: &Invoke) -> Result<()> {
        let request = SegmentRequest::from_invoke(invoke)?;
        debug!(
            uid = request.uid,
            listener = request.invoke.listener(),
            first = request.first,
            size = request.size,
            "Processing segment"
        );

        let reply = match self.worker.process(&request) {
            Ok(values) => {
                let mut reply = Invoke::new(REPORT_SEGMENT).with_named(HISTORY_UID, request.uid);
                for value in values {
                    reply.push(InvokeParameter::new(value));
                }
                reply
            }
            Err(e) => {
                warn!(uid = request.uid, error = %format!("{:#}", e), "Segment failed");
                Invoke::new(REPORT_SEGMENT_ERROR)
                    .with_named(HISTORY_UID, request.uid)
                    .with_named(ERROR_MESSAGE, format!("{:#}", e))
            }
        };
        self.base.send_data(Arc::new(reply))
    }
}

impl Protocol for SlaveSystem {
    fn send_data(&self, invoke: Arc<Invoke>) -> Result<()> {
        self.base.send_data(invoke)
    }

    fn reply_data(&self, invoke: Arc<Invoke>) -> Result<()> {
        if invoke.listener() == HANDSHAKE {
            return self.base.send_data(Arc::new(Invoke::new(HANDSHAKE_REPLY)));
        }
        if invoke.has_named(HISTORY_UID) {
            return self.run_segment(&invoke);
        }
        self.base.reply_data(invoke)
    }
}

impl fmt::Debug for SlaveSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlaveSystem").field("base", &self.base).finish_non_exhaustive()
    }
}

/// Name a worker reports when none is configured: the host name
pub fn default_name() -> String {
    hostname::get()
        .ok()
        .and_then(|name| name.into_string().ok())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "slave".to_string())
}
