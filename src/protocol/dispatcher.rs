//! Business-logic role
//!
//! A [`Dispatcher`] sits at the end of a chain (or in the middle of one) and
//! maps listeners to handlers. It owns the peer it sends through, so an
//! application only has to register handlers and call `send_data`.

use super::{Invoke, Link, Protocol};
use crate::error::{Error, Result};
use crate::sync::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Callback for one listener
pub type Handler = Arc<dyn Fn(&Invoke) -> Result<()> + Send + Sync>;

/// Listener-to-handler table with parent forwarding
pub struct Dispatcher {
    name: String,
    handlers: RwLock<HashMap<String, Handler>>,
    outbound: RwLock<Option<Arc<dyn Protocol>>>,
    link: Link,
}

impl Dispatcher {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            handlers: RwLock::new(HashMap::new()),
            outbound: RwLock::new(None),
            link: Link::new(),
        }
    }

    /// Register (or replace) the handler for `listener`
    pub fn on<F>(&self, listener: impl Into<String>, handler: F)
    where
        F: Fn(&Invoke) -> Result<()> + Send + Sync + 'static,
    {
        self.handlers.write().insert(listener.into(), Arc::new(handler));
    }

    pub fn handles(&self, listener: &str) -> bool {
        self.handlers.read().contains_key(listener)
    }

    /// Role that `send_data` goes through
    pub fn connect(&self, peer: Arc<dyn Protocol>) {
        *self.outbound.write() = Some(peer);
    }

    pub fn disconnect(&self) {
        self.outbound.write().take();
    }

    /// Link to the next role up, for listeners without a handler
    pub fn link(&self) -> &Link {
        &self.link
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Protocol for Dispatcher {
    fn send_data(&self, invoke: Arc<Invoke>) -> Result<()> {
        let peer = self.outbound.read().clone();
        match peer {
            Some(peer) => peer.send_data(invoke),
            None => Err(Error::Disconnected(format!("{} has no peer", self.name))),
        }
    }

    fn reply_data(&self, invoke: Arc<Invoke>) -> Result<()> {
        // Handlers run without the table locked; they may register others
        let handler = self.handlers.read().get(invoke.listener()).cloned();
        match handler {
            Some(handler) => {
                debug!(dispatcher = %self.name, listener = invoke.listener(), "Handling invoke");
                handler(&invoke)
            }
            None => self.link.forward(invoke),
        }
    }
}
