//! A small fail-closed DOM and destructuring walker for EBICS/ISO 20022
//! response bodies, where we need to pick specific elements out of a
//! document whose full shape we don't want to model with serde.
//!
//! Missing required structure is an error; unexpected extra children are
//! silently ignored, per `spec.md` §4.2.

use quick_xml::events::Event;
use quick_xml::Reader;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum XmlError {
    #[error("XML parse error: {0}")]
    Parse(String),

    #[error("XML shape error at {path}: {reason}")]
    Shape { path: String, reason: String },

    #[error("XML schema validation error: {0}")]
    Schema(String),
}

#[derive(Debug, Clone, Default)]
pub struct Element {
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<Element>,
    pub text: String,
}

impl Element {
    /// Parses a full document into its root element, stripping namespace
    /// prefixes from tag/attribute names (EBICS/ISO 20022 dialects vary in
    /// prefix choice but never in local name).
    pub fn parse(xml: &str) -> Result<Element, XmlError> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut stack: Vec<Element> = vec![Element { name: "#root".to_string(), ..Default::default() }];

        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) => {
                    let name = local_name(&e.name().as_ref().to_vec());
                    let mut elem = Element { name, ..Default::default() };
                    for attr in e.attributes().flatten() {
                        let key = local_name(attr.key.as_ref());
                        let value = attr
                            .decode_and_unescape_value(reader.decoder())
                            .unwrap_or_default()
                            .to_string();
                        elem.attrs.push((key, value));
                    }
                    stack.push(elem);
                }
                Ok(Event::Empty(e)) => {
                    let name = local_name(&e.name().as_ref().to_vec());
                    let mut elem = Element { name, ..Default::default() };
                    for attr in e.attributes().flatten() {
                        let key = local_name(attr.key.as_ref());
                        let value = attr
                            .decode_and_unescape_value(reader.decoder())
                            .unwrap_or_default()
                            .to_string();
                        elem.attrs.push((key, value));
                    }
                    let parent = stack.last_mut().expect("root always present");
                    parent.children.push(elem);
                }
                Ok(Event::Text(t)) => {
                    let text = t.unescape().map_err(|e| XmlError::Parse(e.to_string()))?;
                    if let Some(top) = stack.last_mut() {
                        top.text.push_str(text.trim());
                    }
                }
                Ok(Event::End(_)) => {
                    let finished = stack.pop().expect("balanced by construction");
                    let parent = stack.last_mut().expect("root always present");
                    parent.children.push(finished);
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(e) => return Err(XmlError::Parse(e.to_string())),
            }
        }

        let root = stack
            .pop()
            .expect("root always present")
            .children
            .into_iter()
            .next()
            .ok_or_else(|| XmlError::Parse("document has no root element".to_string()))?;

        Ok(root)
    }

    pub fn require_child(&self, name: &str) -> Result<&Element, XmlError> {
        self.children.iter().find(|c| c.name == name).ok_or_else(|| XmlError::Shape {
            path: format!("{}/{}", self.name, name),
            reason: "required child element missing".to_string(),
        })
    }

    pub fn optional_child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn all_children(&self, name: &str) -> Vec<&Element> {
        self.children.iter().filter(|c| c.name == name).collect()
    }

    pub fn require_attr(&self, name: &str) -> Result<&str, XmlError> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
            .ok_or_else(|| XmlError::Shape {
                path: format!("{}@{}", self.name, name),
                reason: "required attribute missing".to_string(),
            })
    }

    pub fn optional_attr(&self, name: &str) -> Option<&str> {
        self.attrs.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn require_text_child(&self, name: &str) -> Result<String, XmlError> {
        Ok(self.require_child(name)?.text().to_string())
    }

    pub fn optional_text_child(&self, name: &str) -> Option<String> {
        self.optional_child(name).map(|c| c.text().to_string())
    }
}

fn local_name(qualified: &[u8]) -> String {
    let s = String::from_utf8_lossy(qualified);
    match s.split_once(':') {
        Some((_, local)) => local.to_string(),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_strips_namespace_prefixes() {
        let xml = r#"<ns:Document xmlns:ns="urn:x"><ns:Foo a="1">bar</ns:Foo></ns:Document>"#;
        let root = Element::parse(xml).unwrap();
        assert_eq!(root.name, "Document");
        let foo = root.require_child("Foo").unwrap();
        assert_eq!(foo.text(), "bar");
        assert_eq!(foo.require_attr("a").unwrap(), "1");
    }

    #[test]
    fn missing_required_child_is_shape_error() {
        let root = Element::parse("<Document><Other/></Document>").unwrap();
        let err = root.require_child("Foo").unwrap_err();
        assert!(matches!(err, XmlError::Shape { .. }));
    }

    #[test]
    fn unexpected_extra_children_are_ignored() {
        let root = Element::parse("<Document><Foo>x</Foo><Unexpected/></Document>").unwrap();
        assert!(root.require_child("Foo").is_ok());
    }

    #[test]
    fn all_children_collects_repeated_elements() {
        let root = Element::parse("<Document><Ntry>1</Ntry><Ntry>2</Ntry></Document>").unwrap();
        let entries = root.all_children("Ntry");
        assert_eq!(entries.len(), 2);
    }
}
