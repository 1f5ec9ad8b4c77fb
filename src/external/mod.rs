//! External system role
//!
//! An [`ExternalSystem`] stands for one connected peer. Sending encodes the
//! envelope and writes it to the peer's transport; anything the peer sends
//! that this role does not handle itself is forwarded up its [`Link`].

use crate::entity::Entity;
use crate::error::{Error, Result};
use crate::markup::XmlNode;
use crate::protocol::{wire, Invoke, Link, Protocol, Transport};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Tag every system exports to
pub const SYSTEM_TAG: &str = "system";

/// One connected peer
#[derive(Default)]
pub struct ExternalSystem {
    name: String,
    address: String,
    transport: Option<Arc<dyn Transport>>,
    link: Link,
}

impl ExternalSystem {
    /// Peer reachable through `transport`; the address is taken from the transport
    pub fn new(name: impl Into<String>, transport: Arc<dyn Transport>) -> Self {
        Self {
            name: name.into(),
            address: transport.peer(),
            transport: Some(transport),
            link: Link::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_some()
    }

    /// Link to the role unhandled messages are forwarded to
    pub fn link(&self) -> &Link {
        &self.link
    }

    /// Close the transport so the peer observes the disconnect
    pub fn close(&self) {
        if let Some(transport) = &self.transport {
            transport.close();
        }
    }
}

impl Protocol for ExternalSystem {
    fn send_data(&self, invoke: Arc<Invoke>) -> Result<()> {
        let transport = self
            .transport
            .as_ref()
            .ok_or_else(|| Error::Disconnected(format!("{} has no transport", self.name)))?;

        let bytes = wire::encode_invoke(&invoke)?;
        debug!(system = %self.name, listener = invoke.listener(), bytes = bytes.len(), "Sending invoke");
        transport.send(&bytes)
    }

    fn reply_data(&self, invoke: Arc<Invoke>) -> Result<()> {
        self.link.forward(invoke)
    }
}

impl Entity for ExternalSystem {
    fn tag(&self) -> &str {
        SYSTEM_TAG
    }

    fn key(&self) -> String {
        self.name.clone()
    }

    fn construct(&mut self, xml: &XmlNode) -> Result<()> {
        self.name = xml.require_attribute("name")?.to_string();
        self.address = xml.attribute("address").unwrap_or_default().to_string();
        Ok(())
    }

    fn to_xml(&self) -> XmlNode {
        let mut xml = XmlNode::new(SYSTEM_TAG);
        xml.set_attribute("name", &self.name);
        xml.set_attribute("address", &self.address);
        xml
    }
}

impl fmt::Debug for ExternalSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExternalSystem")
            .field("name", &self.name)
            .field("address", &self.address)
            .field("connected", &self.is_connected())
            .finish()
    }
}
