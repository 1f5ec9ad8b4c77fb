//! Envelope text encoding
//!
//! An envelope travels as the UTF-8 text of its markup tree. Framing (length
//! prefixes, message boundaries) belongs to the transport.

use super::Invoke;
use crate::entity::Entity;
use crate::error::{Error, Result};
use crate::markup::XmlNode;

/// Encode an envelope to bytes
pub fn encode_invoke(invoke: &Invoke) -> Result<Vec<u8>> {
    if invoke.listener().is_empty() {
        return Err(Error::structural("cannot send an invoke without a listener"));
    }
    Ok(invoke.to_xml().to_string().into_bytes())
}

/// Decode an envelope from bytes
pub fn decode_invoke(bytes: &[u8]) -> Result<Invoke> {
    let text = std::str::from_utf8(bytes).map_err(|e| Error::Parse {
        position: e.valid_up_to(),
        message: "payload is not valid UTF-8".to_string(),
    })?;

    let xml = XmlNode::parse(text)?;
    Invoke::from_xml(&xml)
}
