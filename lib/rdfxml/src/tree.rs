//! XML element-tree loading on top of `quick_xml`.
//!
//! The RDF/XML grammar needs lookahead (first-child object selection,
//! `rdf:parseType="Collection"` sizing) that a pure event stream makes
//! painful, so the whole document is materialized as a tree first. The tree
//! keeps namespace-resolved names next to the raw qualified names and
//! attribute order, which lets `rdf:parseType="Literal"` contents be
//! re-serialized verbatim.
//!
//! Only `<!ENTITY>` declarations found literally in the document prologue are
//! resolved; there is no DTD fetching and no external entity lookup of any
//! kind.

use crate::error::RdfXmlSyntaxError;
use quick_xml::escape::unescape_with;
use quick_xml::events::attributes::Attribute;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::name::{LocalName, QName, ResolveResult};
use quick_xml::{Error, NsReader, Writer};
use std::collections::{BTreeMap, HashMap};

/// Hard cap on element nesting. Keeps the recursive loader and the recursive
/// grammar walk within stack bounds on hostile input.
pub(crate) const MAX_NESTING_DEPTH: usize = 1000;

pub(crate) const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";
pub(crate) const XMLNS_NAMESPACE: &str = "http://www.w3.org/2000/xmlns/";

/// A loaded XML document: its root element plus the namespace prefixes
/// declared anywhere in it.
#[derive(Debug)]
pub(crate) struct XmlTree {
    root: XmlElement,
    namespaces: BTreeMap<String, String>,
}

impl XmlTree {
    pub(crate) fn load(data: &[u8]) -> Result<Self, RdfXmlSyntaxError> {
        let mut reader = NsReader::from_reader(data);
        reader.expand_empty_elements(true);
        let mut builder = TreeBuilder {
            reader,
            custom_entities: HashMap::new(),
            namespaces: BTreeMap::new(),
        };
        let root = builder.read_document()?;
        Ok(Self {
            root,
            namespaces: builder.namespaces,
        })
    }

    pub(crate) fn root(&self) -> &XmlElement {
        &self.root
    }

    pub(crate) fn namespaces(&self) -> &BTreeMap<String, String> {
        &self.namespaces
    }
}

/// An element with namespace-resolved naming, attributes in document order
/// and ordered children.
#[derive(Debug)]
pub(crate) struct XmlElement {
    qualified_name: String,
    namespace: String,
    local_name: String,
    attributes: Vec<XmlAttribute>,
    children: Vec<XmlNode>,
}

#[derive(Debug)]
pub(crate) enum XmlNode {
    Element(XmlElement),
    Text(String),
}

#[derive(Debug)]
pub(crate) struct XmlAttribute {
    qualified_name: String,
    namespace: String,
    local_name: String,
    value: String,
}

impl XmlAttribute {
    pub(crate) fn namespace(&self) -> &str {
        &self.namespace
    }

    pub(crate) fn local_name(&self) -> &str {
        &self.local_name
    }

    pub(crate) fn value(&self) -> &str {
        &self.value
    }
}

impl XmlElement {
    /// The name as written in the document, prefix included.
    pub(crate) fn qualified_name(&self) -> &str {
        &self.qualified_name
    }

    /// The namespace IRI the name resolved to, empty when unqualified.
    pub(crate) fn namespace(&self) -> &str {
        &self.namespace
    }

    pub(crate) fn local_name(&self) -> &str {
        &self.local_name
    }

    /// The namespace IRI and local name concatenated, the way RDF/XML turns
    /// element names into IRIs.
    pub(crate) fn expanded_name(&self) -> String {
        format!("{}{}", self.namespace, self.local_name)
    }

    pub(crate) fn is(&self, namespace: &str, local_name: &str) -> bool {
        self.namespace == namespace && self.local_name == local_name
    }

    pub(crate) fn attributes(&self) -> impl Iterator<Item = &XmlAttribute> {
        self.attributes.iter()
    }

    pub(crate) fn attribute(&self, namespace: &str, local_name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.namespace == namespace && a.local_name == local_name)
            .map(|a| a.value.as_str())
    }

    pub(crate) fn element_children(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(|child| match child {
            XmlNode::Element(element) => Some(element),
            XmlNode::Text(_) => None,
        })
    }

    /// Concatenation of the direct text children.
    pub(crate) fn text_content(&self) -> String {
        let mut text = String::new();
        for child in &self.children {
            if let XmlNode::Text(t) = child {
                text.push_str(t);
            }
        }
        text
    }

    /// Re-serializes the element content, markup included, without the outer
    /// tag. Used for `rdf:parseType="Literal"` lexical forms.
    pub(crate) fn inner_xml(&self) -> Result<String, RdfXmlSyntaxError> {
        let mut writer = Writer::new(Vec::new());
        for child in &self.children {
            write_node(child, &mut writer)?;
        }
        String::from_utf8(writer.into_inner()).map_err(|_| {
            RdfXmlSyntaxError::InvalidXml("the XML literal is not valid UTF-8".to_owned())
        })
    }
}

fn write_node(node: &XmlNode, writer: &mut Writer<Vec<u8>>) -> Result<(), RdfXmlSyntaxError> {
    match node {
        XmlNode::Text(text) => {
            writer.write_event(Event::Text(BytesText::new(text.as_str())))?;
        }
        XmlNode::Element(element) => {
            let mut start = BytesStart::new(element.qualified_name.as_str());
            for attribute in &element.attributes {
                start.push_attribute((attribute.qualified_name.as_str(), attribute.value.as_str()));
            }
            writer.write_event(Event::Start(start))?;
            for child in &element.children {
                write_node(child, writer)?;
            }
            writer.write_event(Event::End(BytesEnd::new(element.qualified_name.as_str())))?;
        }
    }
    Ok(())
}

struct TreeBuilder<'a> {
    reader: NsReader<&'a [u8]>,
    custom_entities: HashMap<String, String>,
    namespaces: BTreeMap<String, String>,
}

impl TreeBuilder<'_> {
    fn read_document(&mut self) -> Result<XmlElement, RdfXmlSyntaxError> {
        let mut buffer = Vec::new();
        let mut root = None;
        loop {
            buffer.clear();
            match self.reader.read_event_into(&mut buffer)? {
                Event::Decl(declaration) => self.check_declaration(&declaration)?,
                Event::DocType(doctype) => self.parse_doctype(&doctype)?,
                Event::Comment(_) | Event::PI(_) => (),
                Event::Text(text) => {
                    if !text.iter().copied().all(is_whitespace) {
                        return Err(RdfXmlSyntaxError::InvalidXml(
                            "text content is not allowed outside of the root element".to_owned(),
                        ));
                    }
                }
                Event::CData(_) => {
                    return Err(RdfXmlSyntaxError::InvalidXml(
                        "CDATA sections are not allowed outside of the root element".to_owned(),
                    ));
                }
                event @ (Event::Start(_) | Event::Empty(_)) => {
                    if root.is_some() {
                        return Err(RdfXmlSyntaxError::InvalidXml(
                            "documents must have a single root element".to_owned(),
                        ));
                    }
                    root = Some(self.read_element(&event, 1)?);
                }
                Event::End(_) => {
                    return Err(RdfXmlSyntaxError::InvalidXml(
                        "unexpected closing tag outside of the root element".to_owned(),
                    ));
                }
                Event::Eof => {
                    return root.ok_or_else(|| {
                        RdfXmlSyntaxError::InvalidXml("no root element found".to_owned())
                    });
                }
            }
        }
    }

    /// Builds the element opened by `event`, consuming events up to and
    /// including its closing tag.
    fn read_element(
        &mut self,
        event: &Event<'_>,
        depth: usize,
    ) -> Result<XmlElement, RdfXmlSyntaxError> {
        if depth > MAX_NESTING_DEPTH {
            return Err(RdfXmlSyntaxError::InvalidXml(
                "too many nested XML elements".to_owned(),
            ));
        }
        match event {
            Event::Start(start) => {
                let mut element = self.begin_element(start)?;
                self.read_children(&mut element, depth)?;
                Ok(element)
            }
            // expand_empty_elements is on, but keep the direct rendition too
            Event::Empty(start) => self.begin_element(start),
            _ => Err(RdfXmlSyntaxError::InvalidXml(
                "expected an element start tag".to_owned(),
            )),
        }
    }

    fn read_children(
        &mut self,
        element: &mut XmlElement,
        depth: usize,
    ) -> Result<(), RdfXmlSyntaxError> {
        let mut buffer = Vec::new();
        loop {
            buffer.clear();
            match self.reader.read_event_into(&mut buffer)? {
                event @ (Event::Start(_) | Event::Empty(_)) => {
                    let child = self.read_element(&event, depth + 1)?;
                    element.children.push(XmlNode::Element(child));
                }
                Event::End(_) => return Ok(()),
                Event::Text(text) => {
                    let text = text
                        .unescape_with(|entity| self.resolve_entity(entity))?
                        .into_owned();
                    if !text.is_empty() {
                        element.children.push(XmlNode::Text(text));
                    }
                }
                Event::CData(cdata) => {
                    let text = self.reader.decoder().decode(&cdata)?.into_owned();
                    if !text.is_empty() {
                        element.children.push(XmlNode::Text(text));
                    }
                }
                Event::Comment(_) | Event::PI(_) => (),
                Event::Decl(_) | Event::DocType(_) => {
                    return Err(RdfXmlSyntaxError::InvalidXml(
                        "misplaced XML declaration".to_owned(),
                    ));
                }
                Event::Eof => {
                    return Err(RdfXmlSyntaxError::InvalidXml(
                        "unexpected end of file: the XML is not balanced".to_owned(),
                    ));
                }
            }
        }
    }

    fn begin_element(&mut self, start: &BytesStart<'_>) -> Result<XmlElement, RdfXmlSyntaxError> {
        let qualified_name = self
            .reader
            .decoder()
            .decode(start.name().as_ref())?
            .into_owned();
        let (namespace, local_name) = self.resolve_element_name(start.name())?;
        let mut attributes = Vec::new();
        for attribute in start.attributes() {
            let attribute = attribute.map_err(Error::InvalidAttr)?;
            let qualified = self
                .reader
                .decoder()
                .decode(attribute.key.as_ref())?
                .into_owned();
            let value = self.unescape_attribute(&attribute)?;
            if qualified == "xmlns" {
                self.namespaces
                    .entry(String::new())
                    .or_insert_with(|| value.clone());
                attributes.push(XmlAttribute {
                    qualified_name: qualified,
                    namespace: XMLNS_NAMESPACE.to_owned(),
                    local_name: "xmlns".to_owned(),
                    value,
                });
            } else if let Some(prefix) = qualified.strip_prefix("xmlns:") {
                let local_name = prefix.to_owned();
                self.namespaces
                    .entry(local_name.clone())
                    .or_insert_with(|| value.clone());
                attributes.push(XmlAttribute {
                    qualified_name: qualified,
                    namespace: XMLNS_NAMESPACE.to_owned(),
                    local_name,
                    value,
                });
            } else {
                let (namespace, local_name) = self.resolve_attribute_name(attribute.key)?;
                attributes.push(XmlAttribute {
                    qualified_name: qualified,
                    namespace,
                    local_name,
                    value,
                });
            }
        }
        Ok(XmlElement {
            qualified_name,
            namespace,
            local_name,
            attributes,
            children: Vec::new(),
        })
    }

    fn resolve_element_name(&self, name: QName<'_>) -> Result<(String, String), RdfXmlSyntaxError> {
        let (namespace, local_name) = self.reader.resolve_element(name);
        self.resolve_ns_name(namespace, local_name)
    }

    fn resolve_attribute_name(
        &self,
        name: QName<'_>,
    ) -> Result<(String, String), RdfXmlSyntaxError> {
        let (namespace, local_name) = self.reader.resolve_attribute(name);
        self.resolve_ns_name(namespace, local_name)
    }

    fn resolve_ns_name(
        &self,
        namespace: ResolveResult<'_>,
        local_name: LocalName<'_>,
    ) -> Result<(String, String), RdfXmlSyntaxError> {
        let local_name = self
            .reader
            .decoder()
            .decode(local_name.as_ref())?
            .into_owned();
        match namespace {
            ResolveResult::Bound(namespace) => Ok((
                self.reader.decoder().decode(namespace.as_ref())?.into_owned(),
                local_name,
            )),
            ResolveResult::Unbound => Ok((String::new(), local_name)),
            ResolveResult::Unknown(prefix) => Err(RdfXmlSyntaxError::InvalidXml(format!(
                "Unknown prefix {}:",
                self.reader.decoder().decode(&prefix)?
            ))),
        }
    }

    fn check_declaration(&self, declaration: &BytesDecl<'_>) -> Result<(), RdfXmlSyntaxError> {
        if let Some(encoding) = declaration.encoding() {
            if !declares_utf8(&encoding?) {
                return Err(RdfXmlSyntaxError::InvalidXml(
                    "Only UTF-8 is supported by the RDF/XML parser".to_owned(),
                ));
            }
        }
        Ok(())
    }

    /// Collects the entity declarations of an inline DTD so `&name;`
    /// references resolve later. Nothing is ever fetched from outside the
    /// document.
    fn parse_doctype(&mut self, doctype: &BytesText<'_>) -> Result<(), RdfXmlSyntaxError> {
        let dtd = self.reader.decoder().decode(doctype.as_ref())?.into_owned();
        let mut rest = dtd.as_str();
        while let Some(position) = rest.find("<!ENTITY") {
            rest = self.read_entity_declaration(&rest[position + "<!ENTITY".len()..])?;
        }
        Ok(())
    }

    /// Reads a single declaration body, everything after `<!ENTITY`, and
    /// returns the DTD text following it. A value may reference entities
    /// declared before it. Parameter entities are stored under their bare
    /// name.
    fn read_entity_declaration<'d>(
        &mut self,
        declaration: &'d str,
    ) -> Result<&'d str, RdfXmlSyntaxError> {
        let declaration = declaration.trim_start();
        let declaration = match declaration.strip_prefix('%') {
            Some(rest) => rest.trim_start(),
            None => declaration,
        };
        let name_end = declaration
            .find(|c: char| c.is_ascii_whitespace())
            .ok_or_else(|| malformed_entity("missing entity name"))?;
        let (name, declaration) = declaration.split_at(name_end);
        let declaration = declaration.trim_start();
        let quote = declaration
            .chars()
            .next()
            .filter(|&c| c == '"' || c == '\'')
            .ok_or_else(|| malformed_entity("entity values must be quoted"))?;
        let declaration = &declaration[1..];
        let value_end = declaration
            .find(quote)
            .ok_or_else(|| malformed_entity("unterminated entity value"))?;
        let (value, declaration) = declaration.split_at(value_end);
        let declaration = declaration[1..]
            .trim_start()
            .strip_prefix('>')
            .ok_or_else(|| malformed_entity("expected > after the entity value"))?;
        let value = unescape_with(value, |e| self.resolve_entity(e))
            .map_err(Error::from)?
            .into_owned();
        self.custom_entities.insert(name.to_owned(), value);
        Ok(declaration)
    }

    fn unescape_attribute(&self, attribute: &Attribute<'_>) -> Result<String, RdfXmlSyntaxError> {
        Ok(attribute
            .decode_and_unescape_value_with(&self.reader, |e| self.resolve_entity(e))?
            .into_owned())
    }

    fn resolve_entity(&self, entity: &str) -> Option<&str> {
        self.custom_entities.get(entity).map(String::as_str)
    }
}

pub(crate) fn is_whitespace(c: u8) -> bool {
    matches!(c, b' ' | b'\t' | b'\n' | b'\r')
}

/// Encoding labels accepted in an XML declaration, all of them aliases the
/// WHATWG encoding standard maps to UTF-8.
const UTF8_ENCODING_LABELS: &[&str] = &[
    "utf-8",
    "utf8",
    "unicode-1-1-utf-8",
    "unicode11utf8",
    "unicode20utf8",
    "x-unicode20utf8",
];

fn declares_utf8(label: &[u8]) -> bool {
    let label = String::from_utf8_lossy(label).to_ascii_lowercase();
    UTF8_ENCODING_LABELS.contains(&label.as_str())
}

fn malformed_entity(detail: &str) -> RdfXmlSyntaxError {
    RdfXmlSyntaxError::InvalidXml(format!("malformed <!ENTITY declaration: {detail}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_a_simple_tree() {
        let tree = XmlTree::load(
            br#"<a xmlns="http://example.org/ns#" xmlns:b="http://example.org/b#"><b:c d="1">text</b:c></a>"#,
        )
        .unwrap();
        let root = tree.root();
        assert_eq!(root.namespace(), "http://example.org/ns#");
        assert_eq!(root.local_name(), "a");
        let child = root.element_children().next().unwrap();
        assert_eq!(child.expanded_name(), "http://example.org/b#c");
        assert_eq!(child.attribute("", "d"), Some("1"));
        assert_eq!(child.text_content(), "text");
        assert_eq!(
            tree.namespaces().get("b").map(String::as_str),
            Some("http://example.org/b#")
        );
    }

    #[test]
    fn resolves_inline_entities() {
        let tree = XmlTree::load(
            br#"<!DOCTYPE a [<!ENTITY e "http://example.org/"><!ENTITY f 'frag'>]><a href="&e;x">&e;&f;</a>"#,
        )
        .unwrap();
        assert_eq!(tree.root().attribute("", "href"), Some("http://example.org/x"));
        assert_eq!(tree.root().text_content(), "http://example.org/frag");
    }

    #[test]
    fn rejects_malformed_entity_declarations() {
        assert!(XmlTree::load(b"<!DOCTYPE a [<!ENTITY e unquoted>]><a/>").is_err());
        assert!(XmlTree::load(br#"<!DOCTYPE a [<!ENTITY e "open>]><a/>"#).is_err());
    }

    #[test]
    fn rejects_deep_nesting() {
        let mut document = String::new();
        for _ in 0..=MAX_NESTING_DEPTH {
            document.push_str("<a>");
        }
        for _ in 0..=MAX_NESTING_DEPTH {
            document.push_str("</a>");
        }
        let error = XmlTree::load(document.as_bytes()).unwrap_err();
        assert!(error.to_string().contains("nested"));
    }

    #[test]
    fn rejects_undeclared_prefixes() {
        assert!(XmlTree::load(b"<x:a/>").is_err());
    }

    #[test]
    fn rejects_non_utf8_encodings() {
        assert!(
            XmlTree::load(br#"<?xml version="1.0" encoding="ISO-8859-1"?><a/>"#).is_err()
        );
    }

    #[test]
    fn inner_xml_keeps_markup() {
        let tree = XmlTree::load(
            br#"<a xmlns:b="http://example.org/b#"><b:c>x <b:d e="1"/> y</b:c></a>"#,
        )
        .unwrap();
        let child = tree.root().element_children().next().unwrap();
        assert_eq!(child.inner_xml().unwrap(), r#"x <b:d e="1"></b:d> y"#);
    }
}
