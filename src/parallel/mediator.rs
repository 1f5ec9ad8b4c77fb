//! Arrays that work for an upstream master
//!
//! A [`Mediator`] joins a [`ParallelSystemArray`] to a [`SlaveSystem`]
//! connected to some other master. Segments arriving from upstream are
//! re-split over the array's own members by a [`PieceWorker`] and answered
//! once every piece is back. Other envelopes relay in both directions:
//! downward to every member, upward to the upstream master.
//!
//! ```text
//!  upstream master ─► SlaveSystem ─► PieceWorker ─► ParallelSystemArray ─► members
//!                         link ──────relay down──────► send_data
//!                     send_data ◄────relay up──────── link
//! ```
//!
//! The segment is answered on the thread that delivered it, so one upstream
//! connection handles one segment at a time.

use super::{ParallelSystemArray, SYSTEM_JOINED, SYSTEM_LEFT};
use crate::error::{Error, Result};
use crate::protocol::{Invoke, ParameterValue, Protocol};
use crate::slave::{SegmentRequest, SegmentWorker, SlaveSystem};
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::debug;

/// Membership events stay with the array that raised them
const LOCAL_EVENTS: &[&str] = &[SYSTEM_JOINED, SYSTEM_LEFT];

/// Computes a received segment by splitting it over an array
pub struct PieceWorker {
    array: Arc<ParallelSystemArray>,
}

impl PieceWorker {
    pub fn new(array: Arc<ParallelSystemArray>) -> Self {
        Self { array }
    }
}

impl SegmentWorker for PieceWorker {
    fn process(&self, request: &SegmentRequest) -> anyhow::Result<Vec<ParameterValue>> {
        let outcome = self
            .array
            .send_piece_data(request.invoke.clone(), request.first, request.size)?
            .wait()?;
        debug!(
            job = outcome.job,
            first = outcome.first,
            pieces = outcome.results.len(),
            "Segment re-split and collected"
        );

        Ok(outcome
            .results
            .into_iter()
            .flat_map(|result| result.values)
            .collect())
    }
}

/// Passes envelopes from one link to another role's `send_data`
struct Relay {
    target: Weak<dyn Protocol>,
    label: &'static str,
    skip: &'static [&'static str],
}

impl Protocol for Relay {
    fn send_data(&self, invoke: Arc<Invoke>) -> Result<()> {
        if self.skip.iter().any(|skipped| *skipped == invoke.listener()) {
            return Ok(());
        }
        match self.target.upgrade() {
            Some(target) => target.send_data(invoke),
            None => Err(Error::Disconnected(self.label.to_string())),
        }
    }

    fn reply_data(&self, invoke: Arc<Invoke>) -> Result<()> {
        debug!(listener = invoke.listener(), direction = self.label, "Relaying invoke");
        self.send_data(invoke)
    }
}

/// An array serving as one worker of an upstream master
///
/// Relaying stops when the mediator is dropped.
pub struct Mediator {
    array: Arc<ParallelSystemArray>,
    upstream: Arc<SlaveSystem>,
    downward: Arc<Relay>,
    upward: Arc<Relay>,
}

impl Mediator {
    /// Relay between `upstream` and `array`
    ///
    /// `upstream` should have been built with a [`PieceWorker`] over the same
    /// array. Replaces whatever parent either link had.
    pub fn new(array: Arc<ParallelSystemArray>, upstream: Arc<SlaveSystem>) -> Self {
        let target = Arc::downgrade(&array);
        let downward = Arc::new(Relay {
            target,
            label: "members",
            skip: &[],
        });
        let target = Arc::downgrade(&upstream);
        let upward = Arc::new(Relay {
            target,
            label: "upstream",
            skip: LOCAL_EVENTS,
        });

        upstream.link().attach(&downward);
        array.link().attach(&upward);
        Self {
            array,
            upstream,
            downward,
            upward,
        }
    }

    pub fn array(&self) -> &Arc<ParallelSystemArray> {
        &self.array
    }

    pub fn upstream(&self) -> &Arc<SlaveSystem> {
        &self.upstream
    }
}

impl Drop for Mediator {
    fn drop(&mut self) {
        self.upstream.link().detach();
        self.array.link().detach();
    }
}

impl fmt::Debug for Mediator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mediator")
            .field("upstream", &self.upstream.name())
            .field("members", &self.array.len())
            .field("relaying", &(self.downward.target.strong_count() > 0 && self.upward.target.strong_count() > 0))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SegmentationConfig;
    use crate::parallel::{HISTORY_UID, PIECE_FIRST, PIECE_SIZE, REPORT_SEGMENT};
    use crate::protocol::channel::{pair, ChannelEndpoint};
    use crate::protocol::{wire, Dispatcher};
    use crossbeam::channel::unbounded;
    use std::time::Duration;

    fn squares(request: &SegmentRequest) -> anyhow::Result<Vec<ParameterValue>> {
        Ok(request.range().map(|i| ParameterValue::from((i * i) as f64)).collect())
    }

    /// A leaf worker bound to a fresh member of `array`
    fn attach_leaf(array: &Arc<ParallelSystemArray>, name: &str) -> Arc<SlaveSystem> {
        let (member_side, leaf_side) = pair(("mid", name));
        let leaf = Arc::new(SlaveSystem::new(name, leaf_side.transport(), squares));
        let member = array.add_system(name, member_side.transport());

        let role: Arc<dyn Protocol> = leaf.clone();
        leaf_side.bind(Arc::downgrade(&role), None);
        let role: Arc<dyn Protocol> = member;
        member_side.bind(Arc::downgrade(&role), None);
        leaf
    }

    fn received(top: &ChannelEndpoint) -> Invoke {
        wire::decode_invoke(&top.recv().unwrap()).unwrap()
    }

    #[test]
    fn test_segment_resplit_and_relayed() {
        let array = ParallelSystemArray::new(SegmentationConfig::default());
        let leaf = attach_leaf(&array, "leaf-1");

        let (top, mid_side) = pair(("top", "mid"));
        let mid = Arc::new(SlaveSystem::new(
            "mid",
            mid_side.transport(),
            PieceWorker::new(Arc::clone(&array)),
        ));
        let _mediator = Mediator::new(Arc::clone(&array), Arc::clone(&mid));

        // Segment 10..14 from upstream, computed by the leaf
        mid.reply_data(Arc::new(
            Invoke::new("square")
                .with_named(HISTORY_UID, 5u64)
                .with_named(PIECE_FIRST, 10usize)
                .with_named(PIECE_SIZE, 4usize),
        ))
        .unwrap();
        let report = received(&top);
        assert_eq!(report.listener(), REPORT_SEGMENT);
        assert_eq!(report.named(HISTORY_UID).unwrap().as_u64().unwrap(), 5);
        let values: Vec<f64> = (1..5).map(|i| report.value(i).unwrap().as_number().unwrap()).collect();
        assert_eq!(values, vec![100.0, 121.0, 144.0, 169.0]);

        // Downward: unknown listeners reach every member
        let app = Arc::new(Dispatcher::new("leaf-app"));
        let (tx, rx) = unbounded();
        app.on("configure", move |invoke| {
            tx.send(invoke.value(0)?.as_str()?.to_string()).ok();
            Ok(())
        });
        leaf.link().attach(&app);
        mid.reply_data(Arc::new(Invoke::new("configure").with("fast"))).unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), "fast");

        // Upward: a join is not relayed, a leaf's own message is
        let _other = attach_leaf(&array, "leaf-2");
        leaf.send_data(Arc::new(Invoke::new("progress").with(0.5))).unwrap();
        let progress = received(&top);
        assert_eq!(progress.listener(), "progress");
        assert_eq!(progress.value(0).unwrap().as_number().unwrap(), 0.5);
    }

    #[test]
    fn test_drop_detaches() {
        let array = ParallelSystemArray::new(SegmentationConfig::default());
        let (_top, mid_side) = pair(("top", "mid"));
        let mid = Arc::new(SlaveSystem::new(
            "mid",
            mid_side.transport(),
            PieceWorker::new(Arc::clone(&array)),
        ));

        let mediator = Mediator::new(Arc::clone(&array), Arc::clone(&mid));
        assert!(array.link().parent().is_some());
        drop(mediator);
        assert!(array.link().parent().is_none());
        assert!(matches!(
            mid.reply_data(Arc::new(Invoke::new("configure"))),
            Err(Error::Unhandled(_))
        ));
    }

    #[test]
    fn test_empty_array_reports_error_upstream() {
        let array = ParallelSystemArray::new(SegmentationConfig::default());
        let (top, mid_side) = pair(("top", "mid"));
        let mid = Arc::new(SlaveSystem::new(
            "mid",
            mid_side.transport(),
            PieceWorker::new(Arc::clone(&array)),
        ));
        let _mediator = Mediator::new(Arc::clone(&array), Arc::clone(&mid));

        mid.reply_data(Arc::new(
            Invoke::new("square")
                .with_named(HISTORY_UID, 1u64)
                .with_named(PIECE_FIRST, 0usize)
                .with_named(PIECE_SIZE, 3usize),
        ))
        .unwrap();
        assert_eq!(received(&top).listener(), crate::parallel::REPORT_SEGMENT_ERROR);
    }
}
