//! Parallel processing over a pool of workers
//!
//! A [`ParallelSystemArray`] owns the live [`ParallelSystem`] members of one
//! master session. [`ParallelSystemArray::send_segment_data`] splits a job of
//! `size` units into contiguous segments, one per available member, weighted
//! by each member's performance index. Every segment travels as a copy of the
//! caller's invoke with three named parameters appended:
//!
//! | name            | value                         |
//! |-----------------|-------------------------------|
//! | `_history_uid`  | identifier of this segment    |
//! | `_piece_first`  | offset of the first unit      |
//! | `_piece_size`   | number of units               |
//!
//! A worker answers with `_report_segment` (the `_history_uid`, then its result
//! values) or `_report_segment_error` (the `_history_uid` and an `_error`
//! message). Each answer records a round trip in the member's history and
//! recomputes its index.
//!
//! A member that disconnects, cannot be sent to, or reports an error loses its
//! outstanding segments to the remaining available members. Failed members
//! stay out of segmentation until they answer `_handshake` with
//! `_handshake_reply`. When no member is left, the job aborts.
//!
//! Joins and departures are reported up the array's link as `_system_joined`
//! and `_system_left`. A [`Mediator`] lets an array serve as one worker of an
//! upstream master, re-splitting every segment it receives.

pub mod array;
pub mod history;
pub mod job;
pub mod mediator;
pub mod segmentation;
pub mod system;

pub use array::ParallelSystemArray;
pub use history::{HistoryEntry, PerformanceHistory};
pub use job::{JobHandle, JobOutcome, SegmentResult};
pub use mediator::{Mediator, PieceWorker};
pub use system::{ParallelSystem, PerformanceRecord};

/// Identifier of a member within its array
pub type SystemId = u64;

/// Identifier of a job within its array
pub type JobId = u64;

/// Segment identifier parameter
pub const HISTORY_UID: &str = "_history_uid";

/// Segment offset parameter
pub const PIECE_FIRST: &str = "_piece_first";

/// Segment size parameter
pub const PIECE_SIZE: &str = "_piece_size";

/// Worker to master: segment finished
pub const REPORT_SEGMENT: &str = "_report_segment";

/// Worker to master: segment failed
pub const REPORT_SEGMENT_ERROR: &str = "_report_segment_error";

/// Error message parameter of [`REPORT_SEGMENT_ERROR`]
pub const ERROR_MESSAGE: &str = "_error";

/// Master to worker: prove you are alive
pub const HANDSHAKE: &str = "_handshake";

/// Worker to master: handshake answer
pub const HANDSHAKE_REPLY: &str = "_handshake_reply";

/// Array to application: a member joined (system element, then named `id`)
pub const SYSTEM_JOINED: &str = "_system_joined";

/// Array to application: a member left (system element, then named `id`)
pub const SYSTEM_LEFT: &str = "_system_left";
