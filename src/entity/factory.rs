//! Registry-based child allocation
//!
//! A [`ChildFactory`] decides which concrete value to allocate for a child
//! element before it is constructed. Constructors are registered under a value
//! of a discriminant attribute (`type` unless configured otherwise); elements
//! whose discriminant is missing or unregistered fall back to the default
//! constructor when one is set.

use crate::error::{Error, Result};
use crate::markup::XmlNode;
use std::fmt;
use std::sync::Arc;

/// Allocates an unconstructed child from its element
pub type Constructor<T> = Arc<dyn Fn(&XmlNode) -> T + Send + Sync>;

/// Registry of child constructors keyed by a discriminant attribute
pub struct ChildFactory<T> {
    discriminant: String,
    registry: Vec<(String, Constructor<T>)>,
    fallback: Option<Constructor<T>>,
}

impl<T> ChildFactory<T> {
    /// Empty factory keyed by the `type` attribute
    pub fn new() -> Self {
        Self::keyed_by("type")
    }

    /// Empty factory keyed by a custom attribute
    pub fn keyed_by(discriminant: impl Into<String>) -> Self {
        Self {
            discriminant: discriminant.into(),
            registry: Vec::new(),
            fallback: None,
        }
    }

    /// Register a constructor for elements whose discriminant equals `value`
    pub fn register<F>(mut self, value: impl Into<String>, constructor: F) -> Self
    where
        F: Fn(&XmlNode) -> T + Send + Sync + 'static,
    {
        let value = value.into();
        self.registry.retain(|(existing, _)| *existing != value);
        self.registry.push((value, Arc::new(constructor)));
        self
    }

    /// Constructor used when no registered value matches
    pub fn fallback<F>(mut self, constructor: F) -> Self
    where
        F: Fn(&XmlNode) -> T + Send + Sync + 'static,
    {
        self.fallback = Some(Arc::new(constructor));
        self
    }

    pub fn discriminant(&self) -> &str {
        &self.discriminant
    }

    /// Allocate the child for `xml`
    pub fn create(&self, xml: &XmlNode) -> Result<T> {
        let value = xml.attribute(&self.discriminant);
        let registered = value.and_then(|value| {
            self.registry
                .iter()
                .find(|(key, _)| key == value)
                .map(|(_, constructor)| constructor)
        });

        match registered.or(self.fallback.as_ref()) {
            Some(constructor) => Ok(constructor(xml)),
            None => Err(Error::Structural(format!(
                "no constructor for <{}> with {}={:?}",
                xml.tag(),
                self.discriminant,
                value.unwrap_or_default()
            ))),
        }
    }
}

impl<T: Default> ChildFactory<T> {
    /// Factory that allocates `T::default()` for every element
    pub fn of_default() -> Self {
        Self::new().fallback(|_| T::default())
    }
}

impl<T> Default for ChildFactory<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for ChildFactory<T> {
    fn clone(&self) -> Self {
        Self {
            discriminant: self.discriminant.clone(),
            registry: self.registry.clone(),
            fallback: self.fallback.clone(),
        }
    }
}

impl<T> fmt::Debug for ChildFactory<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChildFactory")
            .field("discriminant", &self.discriminant)
            .field("registered", &self.registry.iter().map(|(k, _)| k).collect::<Vec<_>>())
            .field("fallback", &self.fallback.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{Entity, EntityGroup};

    trait Shape: Entity + Send + Sync {
        fn area(&self) -> f64;
    }

    #[derive(Default)]
    struct Circle {
        id: String,
        radius: f64,
    }

    #[derive(Default)]
    struct Square {
        id: String,
        side: f64,
    }

    impl Entity for Circle {
        fn tag(&self) -> &str {
            "shape"
        }

        fn key(&self) -> String {
            self.id.clone()
        }

        fn construct(&mut self, xml: &XmlNode) -> Result<()> {
            self.id = xml.require_attribute("id")?.to_string();
            self.radius = xml.attribute_as("radius")?;
            Ok(())
        }

        fn to_xml(&self) -> XmlNode {
            let mut xml = XmlNode::new("shape");
            xml.set_attribute("type", "circle");
            xml.set_attribute("id", &self.id);
            xml.set_attribute("radius", self.radius);
            xml
        }
    }

    impl Shape for Circle {
        fn area(&self) -> f64 {
            std::f64::consts::PI * self.radius * self.radius
        }
    }

    impl Entity for Square {
        fn tag(&self) -> &str {
            "shape"
        }

        fn key(&self) -> String {
            self.id.clone()
        }

        fn construct(&mut self, xml: &XmlNode) -> Result<()> {
            self.id = xml.require_attribute("id")?.to_string();
            self.side = xml.attribute_as("side")?;
            Ok(())
        }

        fn to_xml(&self) -> XmlNode {
            let mut xml = XmlNode::new("shape");
            xml.set_attribute("type", "square");
            xml.set_attribute("id", &self.id);
            xml.set_attribute("side", self.side);
            xml
        }
    }

    impl Shape for Square {
        fn area(&self) -> f64 {
            self.side * self.side
        }
    }

    fn shape_factory() -> ChildFactory<Box<dyn Shape>> {
        ChildFactory::new()
            .register("circle", |_| Box::new(Circle::default()) as Box<dyn Shape>)
            .register("square", |_| Box::new(Square::default()) as Box<dyn Shape>)
    }

    #[test]
    fn test_polymorphic_children() {
        let xml = XmlNode::parse(
            r#"<canvas><shape type="square" id="a" side="2"/><shape type="circle" id="b" radius="1"/></canvas>"#,
        )
        .unwrap();

        let mut shapes = EntityGroup::with_factory("shape", shape_factory());
        shapes.construct(&xml).unwrap();

        assert_eq!(shapes.len(), 2);
        assert_eq!(shapes.get("a").unwrap().area(), 4.0);
        assert!((shapes.get("b").unwrap().area() - std::f64::consts::PI).abs() < 1e-12);

        let mut canvas = XmlNode::new("canvas");
        shapes.export_into(&mut canvas);
        assert_eq!(canvas, xml);
    }

    #[test]
    fn test_unregistered_without_fallback() {
        let xml = XmlNode::parse(r#"<shape type="hexagon" id="h"/>"#).unwrap();
        let err = shape_factory().create(&xml).err().unwrap();
        assert!(matches!(err, Error::Structural(_)));
    }

    #[test]
    fn test_fallback_and_custom_discriminant() {
        let factory: ChildFactory<String> = ChildFactory::keyed_by("kind")
            .register("special", |_| "special".to_string())
            .fallback(|xml| format!("plain {}", xml.tag()));

        let special = XmlNode::parse(r#"<item kind="special"/>"#).unwrap();
        let other = XmlNode::parse(r#"<item type="special"/>"#).unwrap();
        assert_eq!(factory.create(&special).unwrap(), "special");
        assert_eq!(factory.create(&other).unwrap(), "plain item");
        assert_eq!(factory.discriminant(), "kind");
    }
}
