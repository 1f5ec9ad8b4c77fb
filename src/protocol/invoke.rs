//! Invoke message envelope
//!
//! Every message between two nodes is an [`Invoke`]: a listener naming the
//! operation plus an ordered list of parameters.
//!
//! # Markup Format
//!
//! ```text
//! <invoke listener="optimize">
//!   <parameter type="XML"><population size="40"/></parameter>
//!   <parameter type="number">3</parameter>
//!   <parameter type="string" name="mode">fast</parameter>
//!   <parameter type="ByteArray">AAEC</parameter>
//! </invoke>
//! ```
//!
//! Scalars travel as element text, `XML` parameters carry exactly one nested
//! element and `ByteArray` text is standard base64. A parameter may be named;
//! position is still what defines order.

use crate::entity::{Entity, EntityGroup};
use crate::error::{Error, Result};
use crate::markup::XmlNode;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

/// Root tag of every envelope
pub const INVOKE_TAG: &str = "invoke";

/// Tag of each parameter element
pub const PARAMETER_TAG: &str = "parameter";

/// Value carried by one parameter
#[derive(Debug, Clone, PartialEq)]
pub enum ParameterValue {
    Number(f64),
    String(String),
    Xml(XmlNode),
    ByteArray(Vec<u8>),
}

impl ParameterValue {
    /// Wire name of the value's type
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::Xml(_) => "XML",
            Self::ByteArray(_) => "ByteArray",
        }
    }

    pub fn as_number(&self) -> Result<f64> {
        match self {
            Self::Number(n) => Ok(*n),
            other => Err(other.mismatch("number")),
        }
    }

    /// Read a number that must be a non-negative integer
    pub fn as_usize(&self) -> Result<usize> {
        let n = self.as_number()?;
        if n.is_finite() && n >= 0.0 && n.fract() == 0.0 && n <= usize::MAX as f64 {
            Ok(n as usize)
        } else {
            Err(Error::Structural(format!("{} is not a non-negative integer", n)))
        }
    }

    /// Read a number that must be a non-negative integer
    pub fn as_u64(&self) -> Result<u64> {
        self.as_usize().map(|n| n as u64)
    }

    pub fn as_str(&self) -> Result<&str> {
        match self {
            Self::String(s) => Ok(s),
            other => Err(other.mismatch("string")),
        }
    }

    pub fn as_xml(&self) -> Result<&XmlNode> {
        match self {
            Self::Xml(xml) => Ok(xml),
            other => Err(other.mismatch("XML")),
        }
    }

    pub fn as_bytes(&self) -> Result<&[u8]> {
        match self {
            Self::ByteArray(bytes) => Ok(bytes),
            other => Err(other.mismatch("ByteArray")),
        }
    }

    fn mismatch(&self, expected: &str) -> Error {
        Error::Structural(format!(
            "expected a {} parameter, found {}",
            expected,
            self.type_name()
        ))
    }
}

impl Default for ParameterValue {
    fn default() -> Self {
        Self::Number(0.0)
    }
}

macro_rules! number_from {
    ($($t:ty),*) => {
        $(
            impl From<$t> for ParameterValue {
                fn from(value: $t) -> Self {
                    Self::Number(value as f64)
                }
            }
        )*
    };
}

number_from!(f64, f32, i32, i64, u32, u64, usize);

impl From<&str> for ParameterValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for ParameterValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<XmlNode> for ParameterValue {
    fn from(value: XmlNode) -> Self {
        Self::Xml(value)
    }
}

impl From<Vec<u8>> for ParameterValue {
    fn from(value: Vec<u8>) -> Self {
        Self::ByteArray(value)
    }
}

impl From<&[u8]> for ParameterValue {
    fn from(value: &[u8]) -> Self {
        Self::ByteArray(value.to_vec())
    }
}

/// One parameter of an invoke message
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InvokeParameter {
    pub name: Option<String>,
    pub value: ParameterValue,
}

impl InvokeParameter {
    pub fn new(value: impl Into<ParameterValue>) -> Self {
        Self { name: None, value: value.into() }
    }

    pub fn named(name: impl Into<String>, value: impl Into<ParameterValue>) -> Self {
        Self { name: Some(name.into()), value: value.into() }
    }
}

impl Entity for InvokeParameter {
    fn tag(&self) -> &str {
        PARAMETER_TAG
    }

    fn key(&self) -> String {
        self.name.clone().unwrap_or_default()
    }

    fn construct(&mut self, xml: &XmlNode) -> Result<()> {
        self.name = xml.attribute("name").map(str::to_string);
        self.value = match xml.require_attribute("type")? {
            "number" => ParameterValue::Number(xml.value_as()?),
            "string" => ParameterValue::String(xml.value().to_string()),
            "XML" => {
                let nested = xml.children().first().ok_or_else(|| {
                    Error::structural("XML parameter carries no nested element")
                })?;
                ParameterValue::Xml(nested.clone())
            }
            "ByteArray" => {
                let bytes = STANDARD.decode(xml.value().trim()).map_err(|e| {
                    Error::Structural(format!("ByteArray parameter is not valid base64: {}", e))
                })?;
                ParameterValue::ByteArray(bytes)
            }
            other => {
                return Err(Error::Structural(format!("unknown parameter type {:?}", other)));
            }
        };
        Ok(())
    }

    fn to_xml(&self) -> XmlNode {
        let mut xml = XmlNode::new(PARAMETER_TAG);
        xml.set_attribute("type", self.value.type_name());
        if let Some(name) = &self.name {
            xml.set_attribute("name", name);
        }

        match &self.value {
            ParameterValue::Number(n) => xml.set_value(n.to_string()),
            ParameterValue::String(s) => xml.set_value(s.as_str()),
            ParameterValue::Xml(nested) => xml.push_child(nested.clone()),
            ParameterValue::ByteArray(bytes) => xml.set_value(STANDARD.encode(bytes)),
        }
        xml
    }
}

/// Message envelope: listener plus ordered parameters
///
/// Built once on the sending side, then shared read-only (as `Arc<Invoke>`)
/// through every role that relays it.
#[derive(Debug, Clone)]
pub struct Invoke {
    listener: String,
    parameters: EntityGroup<InvokeParameter>,
}

impl Invoke {
    pub fn new(listener: impl Into<String>) -> Self {
        Self {
            listener: listener.into(),
            parameters: EntityGroup::new(PARAMETER_TAG),
        }
    }

    /// Decode an envelope from its tree
    pub fn from_xml(xml: &XmlNode) -> Result<Self> {
        let mut invoke = Self::new(String::new());
        invoke.construct(xml)?;
        Ok(invoke)
    }

    /// Append a positional parameter
    pub fn with(mut self, value: impl Into<ParameterValue>) -> Self {
        self.push(InvokeParameter::new(value));
        self
    }

    /// Append a named parameter
    pub fn with_named(mut self, name: impl Into<String>, value: impl Into<ParameterValue>) -> Self {
        self.push(InvokeParameter::named(name, value));
        self
    }

    pub fn push(&mut self, parameter: InvokeParameter) {
        self.parameters.push(parameter);
    }

    pub fn listener(&self) -> &str {
        &self.listener
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    pub fn parameters(&self) -> impl Iterator<Item = &InvokeParameter> {
        self.parameters.iter()
    }

    /// Value of the parameter at `index`
    pub fn value(&self, index: usize) -> Result<&ParameterValue> {
        self.parameters
            .at(index)
            .map(|parameter| &parameter.value)
            .ok_or_else(|| {
                Error::Structural(format!(
                    "'{}' has no parameter #{} ({} present)",
                    self.listener,
                    index,
                    self.len()
                ))
            })
    }

    /// Value of the first parameter named `name`
    pub fn named(&self, name: &str) -> Result<&ParameterValue> {
        self.parameters
            .iter()
            .find(|parameter| parameter.name.as_deref() == Some(name))
            .map(|parameter| &parameter.value)
            .ok_or_else(|| {
                Error::Structural(format!("'{}' has no parameter named '{}'", self.listener, name))
            })
    }

    pub fn has_named(&self, name: &str) -> bool {
        self.parameters.iter().any(|parameter| parameter.name.as_deref() == Some(name))
    }

    /// Copy of this envelope without the parameters whose name is in `names`
    pub fn without_parameters(&self, names: &[&str]) -> Self {
        let mut copy = Self::new(self.listener.clone());
        for parameter in self.parameters.iter() {
            let excluded = parameter
                .name
                .as_deref()
                .map_or(false, |name| names.contains(&name));
            if !excluded {
                copy.push(parameter.clone());
            }
        }
        copy
    }
}

impl Entity for Invoke {
    fn tag(&self) -> &str {
        INVOKE_TAG
    }

    fn key(&self) -> String {
        self.listener.clone()
    }

    fn construct(&mut self, xml: &XmlNode) -> Result<()> {
        if xml.tag() != INVOKE_TAG {
            return Err(Error::Structural(format!(
                "expected <{}>, found <{}>",
                INVOKE_TAG,
                xml.tag()
            )));
        }

        let listener = xml.require_attribute("listener")?;
        if listener.is_empty() {
            return Err(Error::structural("invoke listener is empty"));
        }

        self.parameters.construct(xml)?;
        self.listener = listener.to_string();
        Ok(())
    }

    fn to_xml(&self) -> XmlNode {
        let mut xml = XmlNode::new(INVOKE_TAG);
        xml.set_attribute("listener", &self.listener);
        self.parameters.export_into(&mut xml);
        xml
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_markup() {
        let mut population = XmlNode::new("population");
        population.set_attribute("size", 40);

        let invoke = Invoke::new("optimize").with(population).with(3);
        assert_eq!(
            invoke.to_xml().to_string(),
            r#"<invoke listener="optimize"><parameter type="XML"><population size="40"/></parameter><parameter type="number">3</parameter></invoke>"#
        );
    }

    #[test]
    fn test_decode_every_type() {
        let xml = XmlNode::parse(
            r#"<invoke listener="mixed">
                 <parameter type="number">-2.5</parameter>
                 <parameter type="string" name="mode"> fast </parameter>
                 <parameter type="XML"><tree depth="2"/></parameter>
                 <parameter type="ByteArray">AAEC/w==</parameter>
               </invoke>"#,
        )
        .unwrap();

        let invoke = Invoke::from_xml(&xml).unwrap();
        assert_eq!(invoke.listener(), "mixed");
        assert_eq!(invoke.len(), 4);
        assert_eq!(invoke.value(0).unwrap().as_number().unwrap(), -2.5);
        assert_eq!(invoke.named("mode").unwrap().as_str().unwrap(), " fast ");
        assert_eq!(invoke.value(2).unwrap().as_xml().unwrap().attribute("depth"), Some("2"));
        assert_eq!(invoke.value(3).unwrap().as_bytes().unwrap(), &[0, 1, 2, 255]);
    }

    #[test]
    fn test_round_trip_preserves_order_and_text() {
        let invoke = Invoke::new("process")
            .with("first <&> line\nsecond")
            .with_named("count", 7u32)
            .with(vec![9u8, 8, 7])
            .with(0.125);

        let text = invoke.to_xml().to_string();
        let decoded = Invoke::from_xml(&XmlNode::parse(&text).unwrap()).unwrap();
        assert_eq!(decoded.to_xml().to_string(), text);

        let types: Vec<_> = decoded.parameters().map(|p| p.value.type_name()).collect();
        assert_eq!(types, vec!["string", "number", "ByteArray", "number"]);
    }

    #[test]
    fn test_missing_or_empty_listener() {
        let missing = XmlNode::parse("<invoke/>").unwrap();
        assert!(matches!(Invoke::from_xml(&missing), Err(Error::Structural(_))));

        let empty = XmlNode::parse(r#"<invoke listener=""/>"#).unwrap();
        assert!(matches!(Invoke::from_xml(&empty), Err(Error::Structural(_))));
    }

    #[test]
    fn test_wrong_root_and_bad_parameters() {
        let wrong_root = XmlNode::parse(r#"<call listener="x"/>"#).unwrap();
        assert!(Invoke::from_xml(&wrong_root).is_err());

        for body in [
            r#"<parameter>1</parameter>"#,
            r#"<parameter type="number">one</parameter>"#,
            r#"<parameter type="XML"></parameter>"#,
            r#"<parameter type="ByteArray">***</parameter>"#,
            r#"<parameter type="date">today</parameter>"#,
        ] {
            let text = format!(r#"<invoke listener="x">{}</invoke>"#, body);
            let xml = XmlNode::parse(&text).unwrap();
            assert!(matches!(Invoke::from_xml(&xml), Err(Error::Structural(_))), "{}", body);
        }
    }

    #[test]
    fn test_typed_accessor_mismatch() {
        let invoke = Invoke::new("x").with("text");
        assert!(invoke.value(0).unwrap().as_number().is_err());
        assert!(invoke.value(1).is_err());
        assert!(invoke.named("missing").is_err());
    }

    #[test]
    fn test_as_usize() {
        assert_eq!(ParameterValue::from(12u64).as_usize().unwrap(), 12);
        assert!(ParameterValue::from(-1).as_usize().is_err());
        assert!(ParameterValue::from(1.5).as_usize().is_err());
    }

    #[test]
    fn test_without_parameters() {
        let invoke = Invoke::new("work")
            .with(1)
            .with_named("_piece_first", 10)
            .with_named("label", "a")
            .with_named("_piece_size", 5);

        let stripped = invoke.without_parameters(&["_piece_first", "_piece_size"]);
        assert_eq!(stripped.len(), 2);
        assert!(stripped.has_named("label"));
        assert!(!stripped.has_named("_piece_first"));
    }
}
