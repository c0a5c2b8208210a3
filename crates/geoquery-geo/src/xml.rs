//! Minimal element tree built from `quick-xml` events.
//!
//! The reader never resolves DTDs or external entities: a `<!DOCTYPE>` is a
//! parse error and only the five predefined XML entities plus character
//! references are unescaped. Element and attribute names are stored without
//! their namespace prefix.

use geoquery_core::error::{GeoqueryError, Result};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct XmlElement {
    /// Local name, prefix stripped
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlElement>,
    /// Concatenated character data directly inside this element
    pub text: String,
}

impl XmlElement {
    /// Parse a document into its root element
    ///
    /// `max_depth` bounds element nesting so hostile documents cannot exhaust
    /// the stack of the recursive consumers.
    pub fn parse(input: &str, max_depth: usize) -> Result<XmlElement> {
        let mut reader = Reader::from_str(input);
        reader.config_mut().trim_text(true);

        let mut stack: Vec<XmlElement> = Vec::new();
        let mut root: Option<XmlElement> = None;

        loop {
            let position = reader.buffer_position();
            let locator = || format!("byte {}", position);
            let event = reader
                .read_event()
                .map_err(|e| GeoqueryError::parse(format!("Malformed XML: {}", e), locator()))?;

            match event {
                Event::DocType(_) => {
                    return Err(GeoqueryError::parse(
                        "DTD declarations are not allowed in filter documents",
                        locator(),
                    ));
                }
                Event::Start(start) => {
                    if stack.len() >= max_depth {
                        return Err(GeoqueryError::parse(
                            format!("XML nesting exceeds {} levels", max_depth),
                            locator(),
                        ));
                    }
                    stack.push(element_from_start(&start, &locator)?);
                }
                Event::Empty(start) => {
                    let element = element_from_start(&start, &locator)?;
                    attach(&mut stack, &mut root, element, &locator)?;
                }
                Event::End(_) => {
                    let element = stack.pop().ok_or_else(|| {
                        GeoqueryError::parse("Unexpected closing tag", locator())
                    })?;
                    attach(&mut stack, &mut root, element, &locator)?;
                }
                Event::Text(text) => {
                    let value = text.unescape().map_err(|e| {
                        GeoqueryError::parse(format!("Invalid character data: {}", e), locator())
                    })?;
                    if let Some(current) = stack.last_mut() {
                        current.text.push_str(&value);
                    }
                }
                Event::CData(data) => {
                    let value = std::str::from_utf8(&data).map_err(|e| {
                        GeoqueryError::parse(format!("Invalid CDATA: {}", e), locator())
                    })?;
                    if let Some(current) = stack.last_mut() {
                        current.text.push_str(value);
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if !stack.is_empty() {
            return Err(GeoqueryError::parse(
                format!("Unclosed element <{}>", stack.last().map(|e| e.name.as_str()).unwrap_or("")),
                "end of document",
            ));
        }
        root.ok_or_else(|| GeoqueryError::parse("Document has no root element", "byte 0"))
    }

    /// Attribute value by local name, case-sensitive
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.iter().find(|(key, _)| key == name).map(|(_, value)| value.as_str())
    }

    /// First child with the given local name
    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlElement> {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Trimmed character data
    pub fn text(&self) -> &str {
        self.text.trim()
    }

    /// Height of the element tree; a leaf is 1
    pub fn depth(&self) -> usize {
        1 + self.children.iter().map(XmlElement::depth).max().unwrap_or(0)
    }
}

fn element_from_start(start: &BytesStart, locator: &dyn Fn() -> String) -> Result<XmlElement> {
    let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
    let mut attributes = Vec::new();

    for attr in start.attributes() {
        let attr = attr.map_err(|e| {
            GeoqueryError::parse(format!("Malformed attribute on <{}>: {}", name, e), locator())
        })?;
        // Namespace declarations carry no filter semantics
        if attr.key.as_namespace_binding().is_some() {
            continue;
        }
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        let value = attr.unescape_value().map_err(|e| {
            GeoqueryError::parse(format!("Invalid attribute value '{}': {}", key, e), locator())
        })?;
        attributes.push((key, value.into_owned()));
    }

    Ok(XmlElement { name, attributes, children: Vec::new(), text: String::new() })
}

fn attach(
    stack: &mut [XmlElement],
    root: &mut Option<XmlElement>,
    element: XmlElement,
    locator: &dyn Fn() -> String,
) -> Result<()> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None if root.is_none() => *root = Some(element),
        None => return Err(GeoqueryError::parse("Multiple root elements", locator())),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_namespaced_tree() {
        let doc = r#"<?xml version="1.0"?>
            <fes:Filter xmlns:fes="http://www.opengis.net/fes/2.0">
              <fes:PropertyIsEqualTo matchCase="false">
                <fes:ValueReference>name</fes:ValueReference>
                <fes:Literal>Caf&amp;eacute; &lt;x&gt;</fes:Literal>
              </fes:PropertyIsEqualTo>
            </fes:Filter>"#;
        let root = XmlElement::parse(doc, 32).unwrap();
        assert_eq!(root.name, "Filter");
        assert!(root.attributes.is_empty());

        let cmp = root.child("PropertyIsEqualTo").unwrap();
        assert_eq!(cmp.attribute("matchCase"), Some("false"));
        assert_eq!(cmp.child("ValueReference").unwrap().text(), "name");
        assert_eq!(cmp.child("Literal").unwrap().text(), "Caf&eacute; <x>");
        assert_eq!(root.depth(), 3);
    }

    #[test]
    fn test_rejects_doctype() {
        let doc = r#"<?xml version="1.0"?>
            <!DOCTYPE foo [ <!ENTITY xxe SYSTEM "file:///etc/passwd"> ]>
            <Filter><Literal>&xxe;</Literal></Filter>"#;
        let err = XmlElement::parse(doc, 32).unwrap_err();
        assert!(err.to_string().contains("DTD"));
    }

    #[test]
    fn test_rejects_unknown_entity() {
        let err = XmlElement::parse("<Filter><Literal>&xxe;</Literal></Filter>", 32).unwrap_err();
        assert_eq!(err.kind(), geoquery_core::ErrorKind::Parse);
    }

    #[test]
    fn test_depth_cap() {
        let doc = format!("{}{}", "<a>".repeat(50), "</a>".repeat(50));
        assert!(XmlElement::parse(&doc, 20).is_err());
        assert!(XmlElement::parse(&doc, 60).is_ok());
    }

    #[test]
    fn test_rejects_unclosed_and_empty() {
        assert!(XmlElement::parse("<Filter><And>", 32).is_err());
        assert!(XmlElement::parse("", 32).is_err());
    }
}
