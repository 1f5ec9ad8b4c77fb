//! Parallel system array

use super::history::{HistoryEntry, PerformanceHistory};
use super::job::{JobHandle, JobOutcome, SegmentResult};
use super::segmentation::{allocate, performance_index};
use super::system::ParallelSystem;
use super::{
    JobId, SystemId, HANDSHAKE, HISTORY_UID, PIECE_FIRST, PIECE_SIZE, SYSTEM_JOINED, SYSTEM_LEFT,
};
use crate::config::SegmentationConfig;
use crate::entity::Entity;
use crate::error::{Error, Result};
use crate::external::ExternalSystem;
use crate::markup::XmlNode;
use crate::protocol::{Invoke, InvokeParameter, Link, ParameterValue, Protocol, Transport};
use crate::sync::{RwLock, RwMutex};
use crossbeam::channel::{bounded, Sender};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// A contiguous range of a job in flight on one member
#[derive(Debug, Clone)]
struct Piece {
    uid: u64,
    job: JobId,
    system: SystemId,
    first: usize,
    size: usize,
    sent_at: Instant,
}

/// A range of a job still to be placed
#[derive(Debug, Clone, Copy)]
struct Work {
    job: JobId,
    first: usize,
    size: usize,
}

impl From<&Piece> for Work {
    fn from(piece: &Piece) -> Self {
        Self {
            job: piece.job,
            first: piece.first,
            size: piece.size,
        }
    }
}

struct JobState {
    invoke: Arc<Invoke>,
    first: usize,
    total: usize,
    completed: usize,
    results: Vec<SegmentResult>,
    reply: Sender<Result<JobOutcome>>,
}

#[derive(Default)]
struct JobBook {
    jobs: HashMap<JobId, JobState>,
    pieces: HashMap<u64, Piece>,
}

/// Live set of workers for one master session
///
/// Created inside an `Arc` (see [`new`](Self::new)) because members keep a
/// weak reference back to it for their segment reports.
///
/// Lock order is `members` then `jobs`: pieces are registered while the
/// membership they were planned against is still held, so a member cannot
/// leave between planning and registration.
pub struct ParallelSystemArray {
    me: Weak<ParallelSystemArray>,
    config: SegmentationConfig,
    members: RwLock<Vec<Arc<ParallelSystem>>>,
    jobs: RwLock<JobBook>,
    // one index recomputation at a time
    rounds: RwMutex,
    next_system: AtomicU64,
    next_job: AtomicU64,
    next_uid: AtomicU64,
    link: Link,
}

impl ParallelSystemArray {
    pub fn new(config: SegmentationConfig) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            config,
            members: RwLock::new(Vec::new()),
            jobs: RwLock::new(JobBook::default()),
            rounds: RwMutex::new(),
            next_system: AtomicU64::new(1),
            next_job: AtomicU64::new(1),
            next_uid: AtomicU64::new(1),
            link: Link::new(),
        })
    }

    pub fn config(&self) -> &SegmentationConfig {
        &self.config
    }

    /// Link to the role that receives membership events and listeners no
    /// member handles
    pub fn link(&self) -> &Link {
        &self.link
    }

    // === Membership ===

    /// Add a worker that takes part in segmentation right away
    pub fn add_system(&self, name: impl Into<String>, transport: Arc<dyn Transport>) -> Arc<ParallelSystem> {
        self.admit(name.into(), transport, true)
    }

    /// Add a worker that is held back until it answers a handshake
    pub fn add_pending_system(
        &self,
        name: impl Into<String>,
        transport: Arc<dyn Transport>,
    ) -> Arc<ParallelSystem> {
        let system = self.admit(name.into(), transport, false);
        if let Err(e) = self.handshake(system.id()) {
            warn!(system = system.id(), error = %e, "Failed to send handshake");
        }
        system
    }

    fn admit(&self, name: String, transport: Arc<dyn Transport>, available: bool) -> Arc<ParallelSystem> {
        let id = self.next_system.fetch_add(1, Ordering::Relaxed);

        let base = ExternalSystem::new(name, transport);
        let parent: Weak<dyn Protocol> = self.me.clone();
        base.link().attach_weak(parent);

        let system = Arc::new(ParallelSystem::new(id, base, self.me.clone(), &self.config, available));
        self.members.write().push(Arc::clone(&system));

        info!(
            system = id,
            name = system.name(),
            address = system.base().address(),
            available,
            "System joined"
        );
        self.announce(SYSTEM_JOINED, &system);
        system
    }

    /// Remove a member, handing its outstanding segments to the others
    pub fn remove_system(&self, id: SystemId) -> Option<Arc<ParallelSystem>> {
        let (removed, work) = {
            let mut members = self.members.write();
            let position = members.iter().position(|system| system.id() == id)?;
            let removed = members.remove(position);
            // Still under the membership lock, so no piece can be planned for it afterwards
            (removed, self.withdraw(id))
        };
        info!(system = id, name = removed.name(), "System left");
        self.announce(SYSTEM_LEFT, &removed);

        if !work.is_empty() {
            warn!(system = id, segments = work.len(), "Redistributing segments of departed system");
            self.distribute(work);
        }
        Some(removed)
    }

    /// Tell the application a member joined or left
    fn announce(&self, listener: &str, system: &ParallelSystem) {
        let event = Invoke::new(listener)
            .with(system.to_xml())
            .with_named("id", system.id());
        if let Err(e) = self.link.forward(Arc::new(event)) {
            debug!(listener, system = system.id(), error = %e, "Membership event not handled");
        }
    }

    pub fn member(&self, id: SystemId) -> Option<Arc<ParallelSystem>> {
        self.members.read().iter().find(|system| system.id() == id).cloned()
    }

    /// Snapshot of the members in join order
    pub fn members(&self) -> Vec<Arc<ParallelSystem>> {
        self.members.read().clone()
    }

    pub fn len(&self) -> usize {
        self.members.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.read().is_empty()
    }

    /// Ask a member to prove it is alive
    pub fn handshake(&self, id: SystemId) -> Result<()> {
        let system = self
            .member(id)
            .ok_or_else(|| Error::NotFound(format!("system {}", id)))?;
        system.send_data(Arc::new(Invoke::new(HANDSHAKE)))
    }

    /// Let a member that answered a handshake take segments again
    pub fn readmit(&self, id: SystemId) -> Result<()> {
        let system = self
            .member(id)
            .ok_or_else(|| Error::NotFound(format!("system {}", id)))?;
        if !system.set_available(true) {
            info!(system = id, name = system.name(), "System readmitted");
        }
        Ok(())
    }

    // === Performance ===

    /// Current index of every member, in join order
    pub fn performance_indices(&self) -> Vec<(SystemId, f64)> {
        self.members
            .read()
            .iter()
            .map(|system| (system.id(), system.performance_index()))
            .collect()
    }

    /// Record a finished round trip and recompute that member's index
    ///
    /// The history entry and the new index replace the member's record in one
    /// write. Returns the new index.
    pub fn record_round_trip(&self, id: SystemId, uid: u64, size: usize, elapsed: Duration) -> Result<f64> {
        let system = self
            .member(id)
            .ok_or_else(|| Error::NotFound(format!("system {}", id)))?;
        let _round = self.rounds.write();

        let mut history: PerformanceHistory = system.record().history;
        history.push(HistoryEntry::new(uid, size, elapsed));
        let own = history.mean_throughput();

        let population: Vec<f64> = self
            .members
            .read()
            .iter()
            .filter_map(|member| {
                if member.id() == id {
                    own
                } else {
                    member.mean_throughput()
                }
            })
            .collect();
        let index = performance_index(own, &population, &self.config);
        system.commit_round_trip(history, index);

        debug!(system = id, size, elapsed_us = elapsed.as_micros() as u64, index, "Recorded round trip");
        Ok(index)
    }

    /// Available members and their current weights
    fn available_targets(&self) -> Vec<(Arc<ParallelSystem>, f64)> {
        available_in(&self.members.read())
    }

    /// How a job of `size` units would be split right now
    pub fn segment_plan(&self, size: usize) -> Result<Vec<(SystemId, usize)>> {
        let targets = self.available_targets();
        if targets.is_empty() {
            return Err(Error::Segmentation("no available systems".to_string()));
        }

        let weights: Vec<f64> = targets.iter().map(|(_, index)| *index).collect();
        let counts = allocate(size, &weights)?;
        Ok(targets
            .iter()
            .map(|(system, _)| system.id())
            .zip(counts)
            .collect())
    }

    // === Jobs ===

    /// Split a job of `size` units over the available members
    ///
    /// Each member receives a copy of `invoke` carrying its segment. The handle
    /// yields every segment's result once all units have been reported.
    pub fn send_segment_data(&self, invoke: Invoke, size: usize) -> Result<JobHandle> {
        self.send_piece_data(invoke, 0, size)
    }

    /// Split the units `first..first + size` over the available members
    ///
    /// Used by a mediator to re-split a segment it received from upstream;
    /// segment offsets and result offsets stay relative to the whole job.
    pub fn send_piece_data(&self, invoke: Invoke, first: usize, size: usize) -> Result<JobHandle> {
        if size == 0 {
            return Err(Error::Segmentation("a job needs at least one unit".to_string()));
        }
        if invoke.listener().is_empty() {
            return Err(Error::structural("cannot send an invoke without a listener"));
        }
        if self.available_targets().is_empty() {
            return Err(Error::Segmentation("no available systems".to_string()));
        }

        let job = self.next_job.fetch_add(1, Ordering::Relaxed);
        let (reply, receiver) = bounded(1);
        info!(job, first, size, listener = invoke.listener(), "Job started");

        self.jobs.write().jobs.insert(
            job,
            JobState {
                invoke: Arc::new(invoke),
                first,
                total: size,
                completed: 0,
                results: Vec::new(),
                reply,
            },
        );

        self.distribute(vec![Work { job, first, size }]);
        Ok(JobHandle::new(job, size, receiver))
    }

    /// Jobs still waiting for results
    pub fn active_jobs(&self) -> usize {
        self.jobs.read().jobs.len()
    }

    /// Segments sent and not yet reported
    pub fn outstanding_segments(&self) -> usize {
        self.jobs.read().pieces.len()
    }

    /// Place each range of work on the available members
    ///
    /// Ranges a member cannot be sent to are put back in the queue together
    /// with everything else that member held.
    fn distribute(&self, work: Vec<Work>) {
        let mut queue: VecDeque<Work> = work.into();

        while let Some(work) = queue.pop_front() {
            let members = self.members.read();
            let targets = available_in(&members);
            let weights: Vec<f64> = targets.iter().map(|(_, index)| *index).collect();
            let counts = match allocate(work.size, &weights) {
                Ok(counts) => counts,
                Err(_) => {
                    drop(members);
                    self.abort_job(work.job, "no available systems remain");
                    continue;
                }
            };

            // Register before sending so a fast reply finds its piece
            let mut planned = Vec::new();
            let invoke = {
                let mut book = self.jobs.write();
                let Some(job) = book.jobs.get(&work.job) else {
                    continue;
                };
                let invoke = Arc::clone(&job.invoke);

                let mut first = work.first;
                for ((system, _), count) in targets.iter().zip(counts) {
                    if count == 0 {
                        continue;
                    }
                    let piece = Piece {
                        uid: self.next_uid.fetch_add(1, Ordering::Relaxed),
                        job: work.job,
                        system: system.id(),
                        first,
                        size: count,
                        sent_at: Instant::now(),
                    };
                    first += count;
                    book.pieces.insert(piece.uid, piece.clone());
                    planned.push((Arc::clone(system), piece));
                }
                invoke
            };
            drop(members);

            for (system, piece) in planned {
                debug!(
                    job = piece.job,
                    system = system.id(),
                    uid = piece.uid,
                    first = piece.first,
                    size = piece.size,
                    "Sending segment"
                );
                if let Err(e) = system.send_data(Arc::new(segment_invoke(&invoke, &piece))) {
                    warn!(system = system.id(), error = %e, "Segment send failed, marking system unavailable");
                    system.set_available(false);
                    queue.extend(self.withdraw(system.id()));
                }
            }
        }
    }

    /// Take every outstanding piece of a member out of the book
    fn withdraw(&self, id: SystemId) -> Vec<Work> {
        let mut book = self.jobs.write();
        let mut work: Vec<Work> = book
            .pieces
            .values()
            .filter(|piece| piece.system == id)
            .map(Work::from)
            .collect();
        book.pieces.retain(|_, piece| piece.system != id);

        work.sort_by_key(|w| (w.job, w.first));
        work
    }

    fn abort_job(&self, job: JobId, reason: &str) {
        let state = {
            let mut book = self.jobs.write();
            book.pieces.retain(|_, piece| piece.job != job);
            book.jobs.remove(&job)
        };

        if let Some(state) = state {
            warn!(job, reason, "Job aborted");
            state
                .reply
                .send(Err(Error::JobAborted { job, reason: reason.to_string() }))
                .ok();
        }
    }

    /// Mark a member unavailable and hand its outstanding work to the others
    fn fail_system(&self, id: SystemId) {
        if let Some(system) = self.member(id) {
            system.set_available(false);
        }
        let work = self.withdraw(id);
        if !work.is_empty() {
            self.distribute(work);
        }
    }

    /// Accept the result of one segment
    ///
    /// Reports for segments that were already reassigned, or that belong to a
    /// different member, are ignored.
    pub fn complete_segment(&self, id: SystemId, uid: u64, values: Vec<ParameterValue>) -> Result<()> {
        let name = self
            .member(id)
            .map(|system| system.name().to_string())
            .unwrap_or_default();

        let (piece, finished) = {
            let mut book = self.jobs.write();
            let Some(piece) = book.pieces.remove(&uid) else {
                debug!(system = id, uid, "Ignoring report for a segment no longer outstanding");
                return Ok(());
            };
            if piece.system != id {
                warn!(system = id, uid, owner = piece.system, "Ignoring report from a system that does not own the segment");
                book.pieces.insert(uid, piece);
                return Ok(());
            }

            let mut done = false;
            if let Some(job) = book.jobs.get_mut(&piece.job) {
                job.completed += piece.size;
                job.results.push(SegmentResult {
                    first: piece.first,
                    size: piece.size,
                    system: name,
                    values,
                });
                done = job.completed >= job.total;
            }
            let finished = if done { book.jobs.remove(&piece.job) } else { None };
            (piece, finished)
        };

        if let Err(e) = self.record_round_trip(id, uid, piece.size, piece.sent_at.elapsed()) {
            debug!(system = id, uid, error = %e, "Round trip not recorded");
        }

        if let Some(mut state) = finished {
            state.results.sort_by_key(|result| result.first);
            info!(job = piece.job, segments = state.results.len(), "Job complete");
            state
                .reply
                .send(Ok(JobOutcome {
                    job: piece.job,
                    first: state.first,
                    total: state.total,
                    results: state.results,
                }))
                .ok();
        }
        Ok(())
    }

    /// Handle a worker's report that it could not compute a segment
    pub fn fail_segment(&self, id: SystemId, uid: u64, message: &str) -> Result<()> {
        let owned = matches!(self.jobs.read().pieces.get(&uid), Some(piece) if piece.system == id);
        if !owned {
            debug!(system = id, uid, "Ignoring error for a segment no longer outstanding");
            return Ok(());
        }

        warn!(system = id, uid, error = message, "Worker failed a segment, marking system unavailable");
        self.fail_system(id);
        Ok(())
    }

    /// Monitoring snapshot of every member
    pub fn to_xml(&self) -> XmlNode {
        let mut xml = XmlNode::new("systems");
        for system in self.members.read().iter() {
            xml.push_child(system.to_xml());
        }
        xml
    }
}

fn available_in(members: &[Arc<ParallelSystem>]) -> Vec<(Arc<ParallelSystem>, f64)> {
    members
        .iter()
        .filter_map(|system| {
            let record = system.record();
            record.available.then(|| (Arc::clone(system), record.index))
        })
        .collect()
}

/// Copy of the job's invoke addressed to one piece
fn segment_invoke(invoke: &Invoke, piece: &Piece) -> Invoke {
    let mut message = invoke.clone();
    message.push(InvokeParameter::named(HISTORY_UID, piece.uid));
    message.push(InvokeParameter::named(PIECE_FIRST, piece.first));
    message.push(InvokeParameter::named(PIECE_SIZE, piece.size));
    message
}

impl Protocol for ParallelSystemArray {
    /// Send to every available member
    ///
    /// Fails only if no member could be reached.
    fn send_data(&self, invoke: Arc<Invoke>) -> Result<()> {
        let targets = self.available_targets();
        if targets.is_empty() {
            return Err(Error::Disconnected("no available systems".to_string()));
        }

        let mut failed = Vec::new();
        for (system, _) in &targets {
            if let Err(e) = system.send_data(Arc::clone(&invoke)) {
                warn!(system = system.id(), error = %e, "Broadcast failed, marking system unavailable");
                failed.push(system.id());
            }
        }
        let delivered = targets.len() - failed.len();
        for id in failed {
            self.fail_system(id);
        }

        if delivered == 0 {
            return Err(Error::Disconnected(format!(
                "'{}' reached none of {} systems",
                invoke.listener(),
                targets.len()
            )));
        }
        Ok(())
    }

    fn reply_data(&self, invoke: Arc<Invoke>) -> Result<()> {
        self.link.forward(invoke)
    }
}
