//! Ordered collection of typed child entities

use super::{ChildFactory, Entity};
use crate::error::{Error, Result};
use crate::markup::XmlNode;

/// Ordered collection of child entities located under a declared tag
///
/// The group is held as a field of the entity that owns the children. Children
/// are read from elements named `child_tag`, either directly under the owner's
/// element or inside a collection wrapper set with [`nested_in`](Self::nested_in).
#[derive(Debug, Clone)]
pub struct EntityGroup<T> {
    child_tag: String,
    collection_tag: Option<String>,
    factory: ChildFactory<T>,
    children: Vec<T>,
}

impl<T: Entity + Default> EntityGroup<T> {
    /// Group whose children are allocated with `T::default()`
    pub fn new(child_tag: impl Into<String>) -> Self {
        Self::with_factory(child_tag, ChildFactory::of_default())
    }
}

impl<T: Entity> EntityGroup<T> {
    /// Group whose children are allocated by `factory`
    pub fn with_factory(child_tag: impl Into<String>, factory: ChildFactory<T>) -> Self {
        Self {
            child_tag: child_tag.into(),
            collection_tag: None,
            factory,
            children: Vec::new(),
        }
    }

    /// Look for children inside a wrapper element instead of directly under the owner
    pub fn nested_in(mut self, collection_tag: impl Into<String>) -> Self {
        self.collection_tag = Some(collection_tag.into());
        self
    }

    pub fn child_tag(&self) -> &str {
        &self.child_tag
    }

    pub fn collection_tag(&self) -> Option<&str> {
        self.collection_tag.as_deref()
    }

    /// Replace the children with the ones described by `xml`
    ///
    /// `xml` is the owner's element. A missing wrapper or no matching child
    /// elements yields an empty group. On failure the previous children are kept.
    pub fn construct(&mut self, xml: &XmlNode) -> Result<()> {
        let container = match &self.collection_tag {
            Some(tag) => match xml.child(tag) {
                Some(container) => container,
                None => {
                    self.children.clear();
                    return Ok(());
                }
            },
            None => xml,
        };

        let mut children = Vec::new();
        for child_xml in container.children_named(&self.child_tag) {
            let mut child = self.factory.create(child_xml)?;
            child.construct(child_xml)?;
            children.push(child);
        }

        self.children = children;
        Ok(())
    }

    /// Append the children, in order, to the owner's element
    pub fn export_into(&self, xml: &mut XmlNode) {
        match &self.collection_tag {
            Some(tag) => {
                let mut container = XmlNode::new(tag.as_str());
                for child in &self.children {
                    container.push_child(child.to_xml());
                }
                xml.push_child(container);
            }
            None => {
                for child in &self.children {
                    xml.push_child(child.to_xml());
                }
            }
        }
    }

    // === Accessors ===

    pub fn has(&self, key: &str) -> bool {
        self.children.iter().any(|child| child.key() == key)
    }

    /// Child with the given key
    pub fn get(&self, key: &str) -> Result<&T> {
        self.children
            .iter()
            .find(|child| child.key() == key)
            .ok_or_else(|| Error::NotFound(format!("no <{}> keyed {:?}", self.child_tag, key)))
    }

    pub fn get_mut(&mut self, key: &str) -> Result<&mut T> {
        let tag = &self.child_tag;
        self.children
            .iter_mut()
            .find(|child| child.key() == key)
            .ok_or_else(|| Error::NotFound(format!("no <{}> keyed {:?}", tag, key)))
    }

    /// Child at a position
    pub fn at(&self, index: usize) -> Option<&T> {
        self.children.get(index)
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.children.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, T> {
        self.children.iter_mut()
    }

    pub fn push(&mut self, child: T) {
        self.children.push(child);
    }

    /// Remove and return the first child with the given key
    pub fn remove(&mut self, key: &str) -> Option<T> {
        let position = self.children.iter().position(|child| child.key() == key)?;
        Some(self.children.remove(position))
    }

    /// Remove and return the first child
    pub fn pop_front(&mut self) -> Option<T> {
        if self.children.is_empty() {
            None
        } else {
            Some(self.children.remove(0))
        }
    }

    pub fn clear(&mut self) {
        self.children.clear();
    }
}

impl<'a, T> IntoIterator for &'a EntityGroup<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.children.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Member {
        id: String,
        weight: u32,
    }

    impl Entity for Member {
        fn tag(&self) -> &str {
            "member"
        }

        fn key(&self) -> String {
            self.id.clone()
        }

        fn construct(&mut self, xml: &XmlNode) -> Result<()> {
            self.id = xml.require_attribute("id")?.to_string();
            self.weight = xml.attribute_as("weight")?;
            Ok(())
        }

        fn to_xml(&self) -> XmlNode {
            let mut xml = XmlNode::new("member");
            xml.set_attribute("id", &self.id);
            xml.set_attribute("weight", self.weight);
            xml
        }
    }

    fn member(id: &str, weight: u32) -> Member {
        Member { id: id.to_string(), weight }
    }

    #[test]
    fn test_order_preserved_through_round_trip() {
        let mut group = EntityGroup::new("member");
        group.push(member("c", 3));
        group.push(member("a", 1));
        group.push(member("b", 2));

        let mut xml = XmlNode::new("team");
        group.export_into(&mut xml);

        let mut rebuilt: EntityGroup<Member> = EntityGroup::new("member");
        rebuilt.construct(&XmlNode::parse(&xml.to_string()).unwrap()).unwrap();

        let keys: Vec<_> = rebuilt.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(keys, vec!["c", "a", "b"]);
        assert_eq!(rebuilt.get("b").unwrap(), &member("b", 2));
    }

    #[test]
    fn test_has_unchanged_after_failed_get() {
        let mut group = EntityGroup::new("member");
        group.push(member("a", 1));

        let before = (group.has("a"), group.has("z"));
        assert!(matches!(group.get("z"), Err(Error::NotFound(_))));
        assert_eq!((group.has("a"), group.has("z")), before);
        assert_eq!(group.len(), 1);
    }

    #[test]
    fn test_ignores_other_tags() {
        let xml = XmlNode::parse(
            r#"<team name="x"><member id="a" weight="1"/><coach id="q"/><member id="b" weight="2"/></team>"#,
        )
        .unwrap();

        let mut group: EntityGroup<Member> = EntityGroup::new("member");
        group.construct(&xml).unwrap();
        assert_eq!(group.len(), 2);
        assert!(!group.has("q"));
    }

    #[test]
    fn test_failed_construct_keeps_previous_children() {
        let mut group = EntityGroup::new("member");
        group.push(member("keep", 7));

        let xml = XmlNode::parse(r#"<team><member id="a" weight="heavy"/></team>"#).unwrap();
        assert!(group.construct(&xml).is_err());
        assert_eq!(group.at(0), Some(&member("keep", 7)));
    }

    #[test]
    fn test_nested_export_always_emits_wrapper() {
        let group: EntityGroup<Member> = EntityGroup::new("member").nested_in("members");
        let mut xml = XmlNode::new("team");
        group.export_into(&mut xml);
        assert_eq!(xml.to_string(), "<team><members/></team>");
    }

    #[test]
    fn test_remove_and_mutate() {
        let mut group = EntityGroup::new("member");
        group.push(member("a", 1));
        group.push(member("b", 2));

        group.get_mut("b").unwrap().weight = 20;
        assert_eq!(group.remove("a"), Some(member("a", 1)));
        assert_eq!(group.remove("a"), None);
        assert_eq!(group.pop_front(), Some(member("b", 20)));
        assert!(group.is_empty());
    }
}
