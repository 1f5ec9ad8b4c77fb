//! Entity serialization contract
//!
//! Every stateful domain object exchanged between nodes implements [`Entity`]:
//! it names its tag, exposes an identity key, rebuilds its own scalar fields
//! from a markup tree and exports them back.
//!
//! Objects that own typed children hold an [`EntityGroup`] field instead of
//! inheriting container behavior. The group locates children under a declared
//! child tag, allocates each one through a [`ChildFactory`] and constructs it
//! recursively, preserving document order.
//!
//! # Example
//!
//! ```
//! use parallax::entity::{Entity, EntityGroup};
//! use parallax::markup::XmlNode;
//!
//! #[derive(Debug, Clone, Default)]
//! struct Pet {
//!     name: String,
//! }
//!
//! impl Entity for Pet {
//!     fn tag(&self) -> &str {
//!         "pet"
//!     }
//!
//!     fn key(&self) -> String {
//!         self.name.clone()
//!     }
//!
//!     fn construct(&mut self, xml: &XmlNode) -> parallax::Result<()> {
//!         self.name = xml.require_attribute("name")?.to_string();
//!         Ok(())
//!     }
//!
//!     fn to_xml(&self) -> XmlNode {
//!         let mut xml = XmlNode::new("pet");
//!         xml.set_attribute("name", &self.name);
//!         xml
//!     }
//! }
//!
//! let mut pets: EntityGroup<Pet> = EntityGroup::new("pet").nested_in("pets");
//! let xml = XmlNode::parse(r#"<person><pets><pet name="Rex"/></pets></person>"#).unwrap();
//! pets.construct(&xml).unwrap();
//!
//! assert!(pets.has("Rex"));
//! assert_eq!(pets.get("Rex").unwrap().name, "Rex");
//! ```
//!
//! # Ownership
//!
//! A group owns its children by value, so a node can never contain itself:
//! the type system rejects the cycle before anything runs. Nothing checks for
//! it at runtime.

pub mod factory;
pub mod group;

pub use factory::ChildFactory;
pub use group::EntityGroup;

use crate::error::Result;
use crate::markup::XmlNode;

/// Serializable domain object with a symmetric construct/export contract
pub trait Entity {
    /// Tag of the element this entity exports to
    fn tag(&self) -> &str;

    /// Identity used by [`EntityGroup::has`] and [`EntityGroup::get`]
    fn key(&self) -> String {
        String::new()
    }

    /// Rebuild own scalar fields from `xml`
    ///
    /// Fails with [`Error::Structural`](crate::Error::Structural) when a required
    /// attribute is missing or a value cannot be read.
    fn construct(&mut self, xml: &XmlNode) -> Result<()>;

    /// Export own state to a new tree
    fn to_xml(&self) -> XmlNode;
}

impl<E: Entity + ?Sized> Entity for Box<E> {
    fn tag(&self) -> &str {
        (**self).tag()
    }

    fn key(&self) -> String {
        (**self).key()
    }

    fn construct(&mut self, xml: &XmlNode) -> Result<()> {
        (**self).construct(xml)
    }

    fn to_xml(&self) -> XmlNode {
        (**self).to_xml()
    }
}
