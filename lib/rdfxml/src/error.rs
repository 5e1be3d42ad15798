use oxilangtag::LanguageTagParseError;
use std::fmt;

/// An error in the syntax or the grammar of an RDF/XML document.
#[derive(Debug, thiserror::Error)]
pub enum RdfXmlSyntaxError {
    /// The content sniff rejected the input before any XML parsing happened.
    #[error("Content does not appear to be valid RDF/XML")]
    NotRdfXml,
    /// XML well-formedness parsing failed.
    #[error("Invalid RDF/XML content: {0}")]
    InvalidXml(String),
    /// The value of `rdf:ID` or `rdf:nodeID` is not an XML NCName.
    #[error("{value} is not a valid {attribute} value")]
    InvalidNCName {
        /// The attribute carrying the value (`rdf:ID` or `rdf:nodeID`).
        attribute: &'static str,
        /// The rejected value.
        value: String,
    },
    /// The same resolved `rdf:ID` IRI was introduced twice in one document.
    #[error("{0} has already been used as rdf:ID value")]
    DuplicateRdfId(String),
    /// An RDF core name used in an element position where it is not allowed.
    #[error("Invalid {position} element tag name: {name}")]
    ForbiddenElement {
        /// Whether the name appeared in node or property position.
        position: ElementPosition,
        /// The offending qualified name as written in the document.
        name: String,
    },
    /// An RDF 1.0 attribute that was removed from the grammar.
    #[error("{0} is not supported as an attribute anymore")]
    DeprecatedAttribute(String),
    /// An attribute combination the grammar rejects.
    #[error("Not both {first} and {second} could be set at the same time")]
    ConflictingAttributes {
        first: &'static str,
        second: &'static str,
    },
    /// `rdf:li` only exists as an element name.
    #[error("rdf:li is not allowed as an attribute")]
    IllegalLiAttribute,
    /// An ill-formed `xml:lang` value.
    #[error("error while parsing language tag '{tag}': {error}")]
    InvalidLanguageTag {
        tag: String,
        #[source]
        error: LanguageTagParseError,
    },
}

impl From<quick_xml::Error> for RdfXmlSyntaxError {
    #[inline]
    fn from(error: quick_xml::Error) -> Self {
        Self::InvalidXml(error.to_string())
    }
}

/// The element position an RDF core name was misused in.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ElementPosition {
    /// Subject/resource position.
    Node,
    /// Predicate position.
    Property,
}

impl fmt::Display for ElementPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Node => f.write_str("node"),
            Self::Property => f.write_str("property"),
        }
    }
}

/// Error returned by the top-level [`parse`](crate::parse) entry point.
///
/// Wraps the underlying [`RdfXmlSyntaxError`], which stays reachable through
/// [`source`](std::error::Error::source) and [`syntax`](RdfXmlParseError::syntax).
#[derive(Debug, thiserror::Error)]
#[error("RDF/XML parsing failed: {0}")]
pub struct RdfXmlParseError(#[from] RdfXmlSyntaxError);

impl RdfXmlParseError {
    /// The syntax error this parse failure wraps.
    pub fn syntax(&self) -> &RdfXmlSyntaxError {
        &self.0
    }
}
