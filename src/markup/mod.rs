//! Tree markup
//!
//! This module provides the markup tree every [`Entity`](crate::entity::Entity)
//! and [`Invoke`](crate::protocol::Invoke) is exported to and constructed from.
//!
//! A node has a tag, a text value, ordered attributes and ordered children.
//! Attribute order is the insertion order, so exporting the same state twice
//! always produces the same text.
//!
//! # Text Format
//!
//! Serialization is compact: no indentation, no declaration, empty elements
//! are self-closed. The five reserved characters (`& < > " '`) and every
//! control character below 0x20 are written as references, so any string
//! survives a parse/serialize round trip.
//!
//! ```
//! use parallax::markup::XmlNode;
//!
//! let xml = XmlNode::parse(r#"<person name="Ann"><pets><pet name="Rex"/></pets></person>"#).unwrap();
//! assert_eq!(xml.attribute("name"), Some("Ann"));
//! assert_eq!(xml.child("pets").unwrap().children_named("pet").count(), 1);
//! assert_eq!(xml.to_string(), r#"<person name="Ann"><pets><pet name="Rex"/></pets></person>"#);
//! ```

pub mod escape;
pub mod parser;

use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// A node of the markup tree
#[derive(Debug, Clone, Default, PartialEq)]
pub struct XmlNode {
    tag: String,
    value: String,
    attributes: Vec<(String, String)>,
    children: Vec<XmlNode>,
}

impl XmlNode {
    /// Create an empty node with the given tag
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Default::default()
        }
    }

    /// Parse markup text into a tree
    pub fn parse(text: &str) -> Result<Self> {
        parser::parse(text)
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn set_tag(&mut self, tag: impl Into<String>) {
        self.tag = tag.into();
    }

    /// Text content of the node
    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn set_value(&mut self, value: impl Into<String>) {
        self.value = value.into();
    }

    /// Parse the text content into `T`
    pub fn value_as<T: FromStr>(&self) -> Result<T> {
        self.value.trim().parse().map_err(|_| {
            Error::Structural(format!(
                "<{}> value {:?} is not a valid {}",
                self.tag,
                self.value,
                std::any::type_name::<T>()
            ))
        })
    }

    // === Attributes ===

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.attribute(name).is_some()
    }

    /// Get an attribute that must be present
    pub fn require_attribute(&self, name: &str) -> Result<&str> {
        self.attribute(name).ok_or_else(|| {
            Error::Structural(format!("<{}> is missing required attribute '{}'", self.tag, name))
        })
    }

    /// Get a required attribute parsed into `T`
    pub fn attribute_as<T: FromStr>(&self, name: &str) -> Result<T> {
        let raw = self.require_attribute(name)?;
        raw.trim().parse().map_err(|_| {
            Error::Structural(format!(
                "<{}> attribute '{}' = {:?} is not a valid {}",
                self.tag,
                name,
                raw,
                std::any::type_name::<T>()
            ))
        })
    }

    /// Set an attribute, keeping its position if it already exists
    pub fn set_attribute(&mut self, name: impl Into<String>, value: impl ToString) {
        let name = name.into();
        let value = value.to_string();
        match self.attributes.iter_mut().find(|(key, _)| *key == name) {
            Some(entry) => entry.1 = value,
            None => self.attributes.push((name, value)),
        }
    }

    pub fn remove_attribute(&mut self, name: &str) -> Option<String> {
        let position = self.attributes.iter().position(|(key, _)| key == name)?;
        Some(self.attributes.remove(position).1)
    }

    /// Attributes in insertion order
    pub fn attributes(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attributes.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    // === Children ===

    pub fn children(&self) -> &[XmlNode] {
        &self.children
    }

    pub fn children_mut(&mut self) -> &mut Vec<XmlNode> {
        &mut self.children
    }

    pub fn push_child(&mut self, child: XmlNode) {
        self.children.push(child);
    }

    /// Children carrying the given tag, in document order
    pub fn children_named<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = &'a XmlNode> + 'a {
        self.children.iter().filter(move |child| child.tag == tag)
    }

    /// First child carrying the given tag
    pub fn child(&self, tag: &str) -> Option<&XmlNode> {
        self.children.iter().find(|child| child.tag == tag)
    }

    pub fn has_child(&self, tag: &str) -> bool {
        self.child(tag).is_some()
    }

    pub fn clear_children(&mut self) {
        self.children.clear();
    }

    /// Serialize into compact markup text
    pub fn write_to(&self, out: &mut String) {
        out.push('<');
        out.push_str(&self.tag);
        for (name, value) in &self.attributes {
            out.push(' ');
            out.push_str(name);
            out.push_str("=\"");
            escape::escape_into(value, out);
            out.push('"');
        }

        if self.value.is_empty() && self.children.is_empty() {
            out.push_str("/>");
            return;
        }

        out.push('>');
        escape::escape_into(&self.value, out);
        for child in &self.children {
            child.write_to(out);
        }
        out.push_str("</");
        out.push_str(&self.tag);
        out.push('>');
    }
}

impl fmt::Display for XmlNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        self.write_to(&mut out);
        f.write_str(&out)
    }
}

impl FromStr for XmlNode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_attribute_keeps_position() {
        let mut xml = XmlNode::new("system");
        xml.set_attribute("name", "alpha");
        xml.set_attribute("performance", 1.5);
        xml.set_attribute("name", "beta");

        let attrs: Vec<_> = xml.attributes().collect();
        assert_eq!(attrs, vec![("name", "beta"), ("performance", "1.5")]);
    }

    #[test]
    fn test_require_attribute_missing() {
        let xml = XmlNode::new("invoke");
        let err = xml.require_attribute("listener").unwrap_err();
        assert!(matches!(err, Error::Structural(_)));
    }

    #[test]
    fn test_attribute_as() {
        let mut xml = XmlNode::new("history");
        xml.set_attribute("size", "42");
        xml.set_attribute("elapsed_us", "abc");

        assert_eq!(xml.attribute_as::<usize>("size").unwrap(), 42);
        assert!(xml.attribute_as::<u64>("elapsed_us").is_err());
    }

    #[test]
    fn test_serialize_empty_element() {
        let mut xml = XmlNode::new("pet");
        xml.set_attribute("name", "Rex");
        assert_eq!(xml.to_string(), r#"<pet name="Rex"/>"#);
    }

    #[test]
    fn test_serialize_value_and_children() {
        let mut root = XmlNode::new("parameter");
        root.set_attribute("type", "number");
        root.set_value("3");
        assert_eq!(root.to_string(), r#"<parameter type="number">3</parameter>"#);

        let mut outer = XmlNode::new("outer");
        outer.push_child(root);
        outer.push_child(XmlNode::new("empty"));
        assert_eq!(
            outer.to_string(),
            r#"<outer><parameter type="number">3</parameter><empty/></outer>"#
        );
    }

    #[test]
    fn test_children_named_preserves_order() {
        let xml = XmlNode::parse("<list><a id=\"1\"/><b/><a id=\"2\"/><a id=\"3\"/></list>").unwrap();
        let ids: Vec<_> = xml
            .children_named("a")
            .map(|child| child.attribute("id").unwrap())
            .collect();
        assert_eq!(ids, vec!["1", "2", "3"]);
        assert!(xml.has_child("b"));
        assert!(!xml.has_child("c"));
    }
}
