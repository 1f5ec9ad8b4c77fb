//! Parallax - master/slave parallel computation framework
//!
//! Parallax connects a master process to a pool of worker (slave) processes
//! and splits jobs over them in proportion to how fast each one has been.
//!
//! # Architecture
//!
//! - **Markup & entities**: a small XML tree ([`markup`]) and the [`entity`]
//!   contract for objects that round-trip through it
//! - **Invoke envelope**: every message is a listener name plus typed
//!   parameters ([`protocol::Invoke`])
//! - **Chain of responsibility**: roles implement [`protocol::Protocol`] and
//!   forward what they do not recognize up a [`protocol::Link`]
//! - **Parallel segmentation**: [`parallel::ParallelSystemArray`] weights
//!   segments by each member's performance index and reassigns the work of
//!   members that fail
//! - **Mediation**: an array can serve as one worker of an upstream master
//!   ([`parallel::Mediator`])
//! - **Transports**: in-process channels ([`protocol::channel`]) and TCP
//!   ([`net`])
//! - **Synchronization**: writer-preferring reader-writer lock with a shareable
//!   write acquisition ([`sync`])

pub mod config;
pub mod entity;
pub mod error;
pub mod external;
pub mod logging;
pub mod markup;
pub mod net;
pub mod parallel;
pub mod protocol;
pub mod slave;
pub mod sync;

// Re-export commonly used types
pub use config::Config;
pub use error::{Error, Result};
