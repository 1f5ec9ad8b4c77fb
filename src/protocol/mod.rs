//! Message routing
//!
//! Every network-facing role implements [`Protocol`]:
//!
//! - `send_data` hands an outbound envelope to a transport or to the roles below
//! - `reply_data` handles an inbound envelope whose listener the role recognizes,
//!   or forwards the same envelope to the next role up through its [`Link`]
//!
//! A message injected at one boundary therefore relays through any number of
//! intermediate roles without them understanding its parameters. A new message
//! type only touches the role that finally handles it.
//!
//! ```text
//!  bytes ─► deliver ─► ExternalSystem ──forward──► ParallelSystemArray ──forward──► Dispatcher
//!                        reply_data                  reply_data                     reply_data
//! ```

pub mod channel;
pub mod dispatcher;
pub mod invoke;
pub mod wire;

pub use dispatcher::Dispatcher;
pub use invoke::{Invoke, InvokeParameter, ParameterValue};

use crate::error::{Error, Result};
use crate::sync::RwLock;
use std::sync::{Arc, Weak};
use tracing::debug;

/// Two-operation contract shared by every role
pub trait Protocol: Send + Sync {
    /// Send an envelope toward the peer(s) this role represents
    fn send_data(&self, invoke: Arc<Invoke>) -> Result<()>;

    /// Handle an inbound envelope or forward it unchanged
    fn reply_data(&self, invoke: Arc<Invoke>) -> Result<()>;
}

/// Raw byte channel to one peer
pub trait Transport: Send + Sync {
    /// Queue one message for the peer
    fn send(&self, bytes: &[u8]) -> Result<()>;

    /// Stop sending and let the peer observe the disconnect
    fn close(&self) {}

    /// Human-readable peer address
    fn peer(&self) -> String {
        String::new()
    }
}

/// Decode one inbound message and hand it to `role`
pub fn deliver(role: &dyn Protocol, bytes: &[u8]) -> Result<()> {
    let invoke = wire::decode_invoke(bytes)?;
    debug!(listener = invoke.listener(), parameters = invoke.len(), "Delivering invoke");
    role.reply_data(Arc::new(invoke))
}

/// Reference from a role to the next role up the chain
///
/// The reference is weak: the owner of the topology keeps the parent alive.
#[derive(Default)]
pub struct Link {
    parent: RwLock<Option<Weak<dyn Protocol>>>,
}

impl Link {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach<P: Protocol + 'static>(&self, parent: &Arc<P>) {
        let parent: Arc<dyn Protocol> = parent.clone();
        self.attach_dyn(&parent);
    }

    pub fn attach_dyn(&self, parent: &Arc<dyn Protocol>) {
        *self.parent.write() = Some(Arc::downgrade(parent));
    }

    /// Attach a parent held elsewhere only as a weak reference
    pub fn attach_weak(&self, parent: Weak<dyn Protocol>) {
        *self.parent.write() = Some(parent);
    }

    pub fn detach(&self) {
        *self.parent.write() = None;
    }

    /// The parent, if attached and still alive
    pub fn parent(&self) -> Option<Arc<dyn Protocol>> {
        self.parent.read().as_ref().and_then(Weak::upgrade)
    }

    /// Pass an unrecognized envelope to the parent
    pub fn forward(&self, invoke: Arc<Invoke>) -> Result<()> {
        // The read guard is dropped before the parent runs
        match self.parent() {
            Some(parent) => parent.reply_data(invoke),
            None => Err(Error::Unhandled(invoke.listener().to_string())),
        }
    }
}

impl std::fmt::Debug for Link {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Link").field("attached", &self.parent().is_some()).finish()
    }
}
