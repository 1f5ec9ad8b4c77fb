//! Markup text parser
//!
//! A small recursive-descent parser producing an [`XmlNode`] tree. It accepts
//! an optional prolog (declaration, comments, doctype), exactly one root element,
//! comments and CDATA sections inside elements, and resolves the standard entity
//! references plus decimal and hexadecimal character references.
//!
//! Text that sits between child elements and consists only of whitespace is
//! formatting, not content, and is dropped.

use super::{escape, XmlNode};
use crate::error::{Error, Result};

/// Maximum element nesting accepted from the wire
pub const MAX_DEPTH: usize = 512;

/// Parse markup text into a tree
pub fn parse(text: &str) -> Result<XmlNode> {
    let mut parser = Parser {
        src: text,
        bytes: text.as_bytes(),
        pos: 0,
    };

    parser.skip_misc()?;
    if parser.peek().is_none() {
        return Err(parser.error("no root element"));
    }
    let root = parser.parse_element(0)?;
    parser.skip_misc()?;
    if parser.pos < parser.bytes.len() {
        return Err(parser.error("trailing content after root element"));
    }

    Ok(root)
}

struct Parser<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn starts_with(&self, prefix: &str) -> bool {
        self.bytes[self.pos..].starts_with(prefix.as_bytes())
    }

    fn error(&self, message: impl Into<String>) -> Error {
        Error::Parse {
            position: self.pos,
            message: message.into(),
        }
    }

    fn expect(&mut self, byte: u8) -> Result<()> {
        if self.peek() == Some(byte) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(format!("expected '{}'", byte as char)))
        }
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t' | b'\r' | b'\n')) {
            self.pos += 1;
        }
    }

    /// Advance past the next occurrence of `terminator`
    fn skip_past(&mut self, terminator: &str) -> Result<()> {
        match self.src[self.pos..].find(terminator) {
            Some(offset) => {
                self.pos += offset + terminator.len();
                Ok(())
            }
            None => Err(self.error(format!("missing '{}'", terminator))),
        }
    }

    /// Skip whitespace, declarations, comments and doctype outside the root element
    fn skip_misc(&mut self) -> Result<()> {
        loop {
            self.skip_whitespace();
            if self.starts_with("<?") {
                self.skip_past("?>")?;
            } else if self.starts_with("<!--") {
                self.skip_past("-->")?;
            } else if self.starts_with("<!DOCTYPE") {
                self.skip_past(">")?;
            } else {
                return Ok(());
            }
        }
    }

    fn parse_name(&mut self) -> Result<String> {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if matches!(b, b' ' | b'\t' | b'\r' | b'\n' | b'/' | b'>' | b'=' | b'<' | b'"' | b'\'') {
                break;
            }
            self.pos += 1;
        }

        if self.pos == start {
            return Err(self.error("expected a name"));
        }
        Ok(self.src[start..self.pos].to_string())
    }

    fn parse_attribute(&mut self) -> Result<(String, String)> {
        let name = self.parse_name()?;
        self.skip_whitespace();
        self.expect(b'=')?;
        self.skip_whitespace();

        let quote = match self.peek() {
            Some(q @ (b'"' | b'\'')) => q as char,
            _ => return Err(self.error(format!("attribute '{}' value must be quoted", name))),
        };
        self.pos += 1;

        let start = self.pos;
        let len = self.src[start..]
            .find(quote)
            .ok_or_else(|| self.error(format!("unterminated value for attribute '{}'", name)))?;
        let raw = &self.src[start..start + len];
        if raw.contains('<') {
            return Err(self.error(format!("'<' inside value of attribute '{}'", name)));
        }

        let value = escape::unescape(raw, start)?;
        self.pos = start + len + 1;
        Ok((name, value))
    }

    fn parse_element(&mut self, depth: usize) -> Result<XmlNode> {
        if depth >= MAX_DEPTH {
            return Err(self.error(format!("elements nested deeper than {}", MAX_DEPTH)));
        }

        self.expect(b'<')?;
        let mut node = XmlNode::new(self.parse_name()?);

        // Start tag
        loop {
            self.skip_whitespace();
            match self.peek() {
                Some(b'/') => {
                    self.pos += 1;
                    self.expect(b'>')?;
                    return Ok(node);
                }
                Some(b'>') => {
                    self.pos += 1;
                    break;
                }
                Some(_) => {
                    let at = self.pos;
                    let (name, value) = self.parse_attribute()?;
                    if node.has_attribute(&name) {
                        return Err(Error::Parse {
                            position: at,
                            message: format!("duplicate attribute '{}'", name),
                        });
                    }
                    node.set_attribute(name, value);
                }
                None => return Err(self.error("unexpected end of input inside start tag")),
            }
        }

        // Content
        let mut text = String::new();
        loop {
            match self.peek() {
                None => {
                    return Err(self.error(format!("unclosed element <{}>", node.tag())));
                }
                Some(b'<') if self.starts_with("</") => {
                    self.pos += 2;
                    let at = self.pos;
                    let name = self.parse_name()?;
                    if name != node.tag() {
                        return Err(Error::Parse {
                            position: at,
                            message: format!("mismatched closing tag </{}> for <{}>", name, node.tag()),
                        });
                    }
                    self.skip_whitespace();
                    self.expect(b'>')?;
                    break;
                }
                Some(b'<') if self.starts_with("<!--") => self.skip_past("-->")?,
                Some(b'<') if self.starts_with("<?") => self.skip_past("?>")?,
                Some(b'<') if self.starts_with("<![CDATA[") => {
                    self.pos += "<![CDATA[".len();
                    let len = self.src[self.pos..]
                        .find("]]>")
                        .ok_or_else(|| self.error("unterminated CDATA section"))?;
                    text.push_str(&self.src[self.pos..self.pos + len]);
                    self.pos += len + 3;
                }
                Some(b'<') => {
                    let child = self.parse_element(depth + 1)?;
                    node.push_child(child);
                }
                Some(_) => {
                    let start = self.pos;
                    let end = self.src[start..]
                        .find('<')
                        .map(|offset| start + offset)
                        .unwrap_or(self.bytes.len());
                    text.push_str(&escape::unescape(&self.src[start..end], start)?);
                    self.pos = end;
                }
            }
        }

        if node.children().is_empty() || !text.trim().is_empty() {
            node.set_value(text);
        }
        Ok(node)
    }
}
