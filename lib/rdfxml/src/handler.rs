//! Format detection and the top-level parse entry point.

use crate::error::{RdfXmlParseError, RdfXmlSyntaxError};
use crate::parser::{RdfXmlParser, RDF_NAMESPACE};
use crate::tree::{XmlTree, XML_NAMESPACE};
use oxrdf::Graph;
use std::collections::BTreeMap;

/// Canonical name of the format this crate handles.
pub const FORMAT_NAME: &str = "rdf/xml";

/// The name of the format [`parse`] handles.
#[inline]
pub fn format_name() -> &'static str {
    FORMAT_NAME
}

/// Cheap check whether `data` is plausibly RDF/XML.
///
/// This is a deliberately loose pre-filter: a `true` here can still fail in
/// [`parse`], which is the authority.
///
/// ```
/// assert!(rdfxml::can_handle(b"<?xml version=\"1.0\"?><rdf:RDF/>"));
/// assert!(rdfxml::can_handle(b"  <rdf:RDF></rdf:RDF>"));
/// assert!(!rdfxml::can_handle(b"@prefix eg: <http://example.org/> ."));
/// ```
pub fn can_handle(data: &[u8]) -> bool {
    let content = String::from_utf8_lossy(data);
    let content = content.trim_start();
    content.starts_with("<?xml")
        || content.contains("<rdf:RDF")
        || (content.contains("<RDF") && content.contains(RDF_NAMESPACE))
}

/// A successfully parsed RDF/XML document.
#[derive(Debug)]
pub struct ParsedDocument {
    /// The triples of the document.
    pub graph: Graph,
    /// Always [`FORMAT_NAME`].
    pub format: &'static str,
    /// The bytes the document was parsed from.
    pub raw_content: Vec<u8>,
    /// What the document declared about itself.
    pub metadata: DocumentMetadata,
}

/// Document-scoped facts collected during a parse.
///
/// Namespace knowledge never outlives the parse that discovered it; callers
/// that want the document's prefixes must take them from here.
#[derive(Debug, Default, Clone)]
pub struct DocumentMetadata {
    /// Namespace prefixes declared anywhere in the document, the default
    /// namespace under the empty prefix.
    pub namespaces: BTreeMap<String, String>,
    /// The `xml:base` declared on the document root, if any.
    pub base_iri: Option<String>,
}

/// Parses an RDF/XML document into a [`Graph`].
///
/// The input is sniffed first: content that does not look like XML at all, or
/// that looks like HTML, is rejected without being parsed. Every failure is
/// reported as a [`RdfXmlParseError`] carrying the underlying
/// [`RdfXmlSyntaxError`](crate::RdfXmlSyntaxError) as its source.
///
/// ```
/// let document = rdfxml::parse(br#"<?xml version="1.0"?>
/// <rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#" xmlns:schema="http://schema.org/">
///   <schema:Person rdf:about="http://example.com/foo" schema:name="Foo" />
/// </rdf:RDF>"#)?;
/// assert_eq!(document.format, "rdf/xml");
/// assert_eq!(document.graph.len(), 2);
/// assert_eq!(
///     document.metadata.namespaces.get("schema").map(String::as_str),
///     Some("http://schema.org/")
/// );
/// # Result::<_, rdfxml::RdfXmlParseError>::Ok(())
/// ```
pub fn parse(data: &[u8]) -> Result<ParsedDocument, RdfXmlParseError> {
    Ok(parse_document(data)?)
}

fn parse_document(data: &[u8]) -> Result<ParsedDocument, RdfXmlSyntaxError> {
    if !can_handle(data) || !starts_with_markup(data) || looks_like_html(data) {
        return Err(RdfXmlSyntaxError::NotRdfXml);
    }
    let tree = XmlTree::load(data)?;
    let mut graph = Graph::new();
    RdfXmlParser::new().parse_tree(&tree, &mut graph)?;
    let metadata = DocumentMetadata {
        namespaces: tree.namespaces().clone(),
        base_iri: tree
            .root()
            .attribute(XML_NAMESPACE, "base")
            .map(ToOwned::to_owned),
    };
    Ok(ParsedDocument {
        graph,
        format: FORMAT_NAME,
        raw_content: data.to_vec(),
        metadata,
    })
}

fn starts_with_markup(data: &[u8]) -> bool {
    data.iter()
        .find(|b| !crate::tree::is_whitespace(**b))
        .is_some_and(|b| *b == b'<')
}

/// HTML sniff over the first kibibyte, the common case being an error page
/// served where a document was expected.
fn looks_like_html(data: &[u8]) -> bool {
    let head = data[..data.len().min(1024)].to_ascii_lowercase();
    contains_subslice(&head, b"<!doctype html") || contains_subslice(&head, b"<html")
}

fn contains_subslice(haystack: &[u8], needle: &[u8]) -> bool {
    haystack
        .windows(needle.len())
        .any(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detection_accepts_the_usual_signatures() {
        assert!(can_handle(b"<?xml version=\"1.0\"?><x/>"));
        assert!(can_handle(b"\n\t <rdf:RDF xmlns:rdf=\"x\"/>"));
        assert!(can_handle(
            b"<RDF xmlns=\"http://www.w3.org/1999/02/22-rdf-syntax-ns#\"/>"
        ));
    }

    #[test]
    fn detection_rejects_other_formats() {
        assert!(!can_handle(b""));
        assert!(!can_handle(b"@prefix eg: <http://example.org/> ."));
        assert!(!can_handle(b"{\"@context\": {}}"));
        assert!(!can_handle(b"<RDF/>"));
    }

    #[test]
    fn html_is_rejected_before_xml_parsing() {
        let error = parse(b"<?xml version=\"1.0\"?>\n<!DOCTYPE HTML><HTML></HTML>").unwrap_err();
        assert_eq!(
            error.to_string(),
            "RDF/XML parsing failed: Content does not appear to be valid RDF/XML"
        );
    }

    #[test]
    fn non_rdf_xml_yields_an_empty_graph() {
        let document = parse(b"<?xml version=\"1.0\"?><unrelated xmlns=\"http://example.org/\"/>")
            .unwrap();
        assert!(document.graph.is_empty());
        assert_eq!(document.format, "rdf/xml");
    }

    #[test]
    fn raw_content_is_echoed_back() {
        let data: &[u8] = b"<?xml version=\"1.0\"?><x/>";
        assert_eq!(parse(data).unwrap().raw_content, data);
    }
}
