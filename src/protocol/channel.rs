//! In-process transport
//!
//! [`pair`] returns two connected endpoints backed by crossbeam channels. Each
//! endpoint offers a [`Transport`] for sending to the other side and a reader
//! thread that delivers what the other side sends, one message at a time in
//! arrival order. Closing (or dropping) every transport of one side ends the
//! other side's reader thread, which is how a disconnect is observed.

use super::{deliver, Protocol, Transport};
use crate::error::{Error, Result};
use crossbeam::channel::{unbounded, Receiver, Sender};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::thread::{self, JoinHandle};
use tracing::{debug, error, warn};

/// Sending half of one endpoint
#[derive(Debug)]
pub struct ChannelTransport {
    label: String,
    sender: Mutex<Option<Sender<Vec<u8>>>>,
}

impl Transport for ChannelTransport {
    fn send(&self, bytes: &[u8]) -> Result<()> {
        let sender = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        match sender.as_ref() {
            Some(sender) => sender
                .send(bytes.to_vec())
                .map_err(|_| Error::Disconnected(self.label.clone())),
            None => Err(Error::Disconnected(self.label.clone())),
        }
    }

    fn close(&self) {
        self.sender.lock().unwrap_or_else(PoisonError::into_inner).take();
    }

    fn peer(&self) -> String {
        self.label.clone()
    }
}

/// One side of an in-process connection
pub struct ChannelEndpoint {
    transport: Arc<ChannelTransport>,
    receiver: Receiver<Vec<u8>>,
}

/// Create two connected endpoints
///
/// `labels` name the two sides; each transport reports the other side's label
/// as its peer.
pub fn pair(labels: (&str, &str)) -> (ChannelEndpoint, ChannelEndpoint) {
    let (to_second, from_first) = unbounded();
    let (to_first, from_second) = unbounded();

    let first = ChannelEndpoint {
        transport: Arc::new(ChannelTransport {
            label: labels.1.to_string(),
            sender: Mutex::new(Some(to_second)),
        }),
        receiver: from_second,
    };
    let second = ChannelEndpoint {
        transport: Arc::new(ChannelTransport {
            label: labels.0.to_string(),
            sender: Mutex::new(Some(to_first)),
        }),
        receiver: from_first,
    };
    (first, second)
}

impl ChannelEndpoint {
    /// Transport sending to the other side
    pub fn transport(&self) -> Arc<ChannelTransport> {
        Arc::clone(&self.transport)
    }

    /// Start delivering inbound messages to `role`
    ///
    /// The thread stops when the other side closes or when `role` is dropped.
    /// `on_close` runs once after the loop ends.
    pub fn bind(
        self,
        role: Weak<dyn Protocol>,
        on_close: Option<Box<dyn FnOnce() + Send>>,
    ) -> JoinHandle<()> {
        let peer = self.transport.peer();
        let receiver = self.receiver;

        thread::spawn(move || {
            for bytes in receiver.iter() {
                let Some(target) = role.upgrade() else {
                    break;
                };
                match deliver(&*target, &bytes) {
                    Ok(()) => {}
                    Err(e) if e.is_per_message() => warn!(peer = %peer, error = %e, "Rejected message"),
                    Err(e) => error!(peer = %peer, error = %e, "Failed to handle message"),
                }
            }

            debug!(peer = %peer, "Channel closed");
            if let Some(on_close) = on_close {
                on_close();
            }
        })
    }

    /// Block for the next inbound message
    pub fn recv(&self) -> Result<Vec<u8>> {
        self.receiver
            .recv()
            .map_err(|_| Error::Disconnected(self.transport.peer()))
    }
}
