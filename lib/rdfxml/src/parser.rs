//! The RDF/XML grammar walk: node and property elements, alternating, over a
//! loaded element tree.

use crate::error::{ElementPosition, RdfXmlSyntaxError};
use crate::ncname::validate_nc_name;
use crate::resolve::resolve;
use crate::tree::{is_whitespace, XmlElement, XmlTree, XMLNS_NAMESPACE, XML_NAMESPACE};
use oxilangtag::LanguageTag;
use oxiri::{Iri, IriParseError};
use oxrdf::vocab::rdf;
use oxrdf::{BlankNode, Graph, Literal, NamedNode, Subject, Triple};
use std::collections::{HashMap, HashSet};

pub(crate) const RDF_NAMESPACE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#";

/// RDF local names that cannot name a node element.
const FORBIDDEN_NODE_ELEMENTS: [&str; 11] = [
    "RDF",
    "ID",
    "about",
    "bagID",
    "parseType",
    "resource",
    "nodeID",
    "datatype",
    "li",
    "aboutEach",
    "aboutEachPrefix",
];

/// RDF local names that cannot name a property element. `li` is absent: it is
/// the container membership shorthand.
const FORBIDDEN_PROPERTY_ELEMENTS: [&str; 11] = [
    "Description",
    "RDF",
    "ID",
    "about",
    "bagID",
    "parseType",
    "resource",
    "nodeID",
    "datatype",
    "aboutEach",
    "aboutEachPrefix",
];

/// RDF 1.0 attributes that were removed from the grammar.
const DEPRECATED_ATTRIBUTES: [&str; 3] = ["aboutEach", "aboutEachPrefix", "bagID"];

/// Unqualified attribute names still interpreted as RDF attributes, a leniency
/// RDF/XML inherited from its earliest serializations.
const BARE_RDF_ATTRIBUTES: [&str; 9] = [
    "about",
    "resource",
    "ID",
    "nodeID",
    "parseType",
    "datatype",
    "bagID",
    "aboutEach",
    "aboutEachPrefix",
];

/// Receives the triples produced by a parse.
///
/// The parser never inspects what it already emitted, so any container works:
/// [`oxrdf::Graph`] deduplicates, `Vec<Triple>` keeps document order.
pub trait TripleSink {
    /// A triple whose object is an IRI or a blank node.
    fn add_resource(&mut self, subject: Subject, predicate: NamedNode, object: Subject);

    /// A triple whose object is a literal.
    fn add_literal(&mut self, subject: Subject, predicate: NamedNode, literal: Literal);
}

impl TripleSink for Graph {
    fn add_resource(&mut self, subject: Subject, predicate: NamedNode, object: Subject) {
        self.insert(&Triple::new(subject, predicate, object));
    }

    fn add_literal(&mut self, subject: Subject, predicate: NamedNode, literal: Literal) {
        self.insert(&Triple::new(subject, predicate, literal));
    }
}

impl TripleSink for Vec<Triple> {
    fn add_resource(&mut self, subject: Subject, predicate: NamedNode, object: Subject) {
        self.push(Triple::new(subject, predicate, object));
    }

    fn add_literal(&mut self, subject: Subject, predicate: NamedNode, literal: Literal) {
        self.push(Triple::new(subject, predicate, literal));
    }
}

/// A [RDF/XML](https://www.w3.org/TR/rdf-syntax-grammar/) parser.
///
/// It loads the document into an element tree and then walks the RDF/XML
/// grammar over it, keeping a set of all seen `rdf:ID`s to detect duplicate
/// ids and fail according to the specification.
///
/// Count the number of people:
/// ```
/// use oxrdf::vocab::rdf;
/// use oxrdf::NamedNodeRef;
/// use rdfxml::RdfXmlParser;
///
/// let file = br#"<?xml version="1.0"?>
/// <rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#" xmlns:schema="http://schema.org/">
///  <rdf:Description rdf:about="http://example.com/foo">
///    <rdf:type rdf:resource="http://schema.org/Person" />
///    <schema:name>Foo</schema:name>
///  </rdf:Description>
///  <schema:Person rdf:about="http://example.com/bar" schema:name="Bar" />
/// </rdf:RDF>"#;
///
/// let schema_person = NamedNodeRef::new("http://schema.org/Person")?;
/// let mut count = 0;
/// for triple in RdfXmlParser::new().parse_slice(file)? {
///     if triple.predicate == rdf::TYPE && triple.object == schema_person.into() {
///         count += 1;
///     }
/// }
/// assert_eq!(2, count);
/// # Result::<_,Box<dyn std::error::Error>>::Ok(())
/// ```
#[derive(Default, Clone)]
#[must_use]
pub struct RdfXmlParser {
    base: Option<Iri<String>>,
}

impl RdfXmlParser {
    /// Builds a new [`RdfXmlParser`].
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the base IRI the document root resolves against when it carries
    /// no `xml:base` of its own.
    #[inline]
    pub fn with_base_iri(mut self, base_iri: impl Into<String>) -> Result<Self, IriParseError> {
        self.base = Some(Iri::parse(base_iri.into())?);
        Ok(self)
    }

    /// Parses a complete RDF/XML document and returns its triples in document
    /// order.
    pub fn parse_slice(&self, slice: &[u8]) -> Result<Vec<Triple>, RdfXmlSyntaxError> {
        let mut triples = Vec::new();
        self.parse_into(slice, &mut triples)?;
        Ok(triples)
    }

    /// Parses a complete RDF/XML document into the given sink.
    pub fn parse_into(
        &self,
        slice: &[u8],
        sink: &mut impl TripleSink,
    ) -> Result<(), RdfXmlSyntaxError> {
        let tree = XmlTree::load(slice)?;
        self.parse_tree(&tree, sink)
    }

    pub(crate) fn parse_tree(
        &self,
        tree: &XmlTree,
        sink: &mut impl TripleSink,
    ) -> Result<(), RdfXmlSyntaxError> {
        let mut driver = TreeDriver {
            sink,
            blank_counter: 0,
            used_rdf_ids: HashSet::new(),
        };
        driver.drive(
            tree.root(),
            self.base.as_ref().map_or("", |base| base.as_str()),
        )
    }
}

/// The object of the single triple a property element emits.
#[derive(Clone)]
enum NodeOrLiteral {
    Node(Subject),
    Literal(Literal),
}

struct TreeDriver<'a, S> {
    sink: &'a mut S,
    blank_counter: u64,
    used_rdf_ids: HashSet<String>,
}

impl<S: TripleSink> TreeDriver<'_, S> {
    fn drive(&mut self, root: &XmlElement, initial_base: &str) -> Result<(), RdfXmlSyntaxError> {
        if !root.is(RDF_NAMESPACE, "RDF") {
            // Well-formed XML that is not an RDF document: empty graph.
            return Ok(());
        }
        let attributes = classify_attributes(root)?;
        let base = element_base(&attributes, initial_base);
        for child in root.element_children() {
            self.process_node(child, &base)?;
        }
        Ok(())
    }

    fn mint(&mut self) -> BlankNode {
        self.blank_counter += 1;
        BlankNode::new_unchecked(format!("genid{}", self.blank_counter))
    }

    /// Validates an `rdf:ID` value, resolves it against `base` and claims the
    /// resulting IRI for the rest of the document.
    fn register_rdf_id(&mut self, id: &str, base: &str) -> Result<String, RdfXmlSyntaxError> {
        validate_nc_name(id, "rdf:ID")?;
        let iri = resolve(&format!("#{id}"), base);
        if !self.used_rdf_ids.insert(iri.clone()) {
            return Err(RdfXmlSyntaxError::DuplicateRdfId(iri));
        }
        Ok(iri)
    }

    /// Processes a node element and returns the subject it denotes.
    fn process_node(
        &mut self,
        element: &XmlElement,
        parent_base: &str,
    ) -> Result<Subject, RdfXmlSyntaxError> {
        if element.namespace().is_empty() {
            return Err(namespaces_required());
        }
        if element.namespace() == RDF_NAMESPACE
            && FORBIDDEN_NODE_ELEMENTS.contains(&element.local_name())
        {
            return Err(RdfXmlSyntaxError::ForbiddenElement {
                position: ElementPosition::Node,
                name: element.qualified_name().to_owned(),
            });
        }
        let attributes = classify_attributes(element)?;
        check_node_attribute_conflicts(&attributes)?;
        let base = element_base(&attributes, parent_base);

        let id_iri = match attributes.rdf("ID") {
            Some(id) => Some(self.register_rdf_id(id, &base)?),
            None => None,
        };
        let subject: Subject = if let Some(about) = attributes.rdf("about") {
            NamedNode::new_unchecked(resolve(about, &base)).into()
        } else if let Some(iri) = id_iri {
            NamedNode::new_unchecked(iri).into()
        } else if let Some(node_id) = attributes.rdf("nodeID") {
            validate_nc_name(node_id, "rdf:nodeID")?;
            BlankNode::new_unchecked(node_id).into()
        } else {
            self.mint().into()
        };

        if !element.is(RDF_NAMESPACE, "Description") {
            self.sink.add_resource(
                subject.clone(),
                rdf::TYPE.into(),
                NamedNode::new_unchecked(element.expanded_name()).into(),
            );
        }
        for (predicate, value) in &attributes.properties {
            self.sink.add_literal(
                subject.clone(),
                NamedNode::new_unchecked(predicate.clone()),
                Literal::new_simple_literal(value.clone()),
            );
        }

        let mut li_counter = 1;
        for child in element.element_children() {
            self.process_property(child, &subject, &base, &mut li_counter)?;
        }
        Ok(subject)
    }

    /// Processes a property element of `subject`, emitting its triple and, if
    /// `rdf:ID` is present, the reification of that triple.
    fn process_property(
        &mut self,
        element: &XmlElement,
        subject: &Subject,
        parent_base: &str,
        li_counter: &mut u64,
    ) -> Result<(), RdfXmlSyntaxError> {
        if element.namespace().is_empty() {
            return Err(namespaces_required());
        }
        if element.namespace() == RDF_NAMESPACE
            && FORBIDDEN_PROPERTY_ELEMENTS.contains(&element.local_name())
        {
            return Err(RdfXmlSyntaxError::ForbiddenElement {
                position: ElementPosition::Property,
                name: element.qualified_name().to_owned(),
            });
        }
        let predicate = if element.is(RDF_NAMESPACE, "li") {
            let iri = format!("{RDF_NAMESPACE}_{li_counter}");
            *li_counter += 1;
            NamedNode::new_unchecked(iri)
        } else {
            NamedNode::new_unchecked(element.expanded_name())
        };

        let attributes = classify_attributes(element)?;
        check_property_attribute_conflicts(&attributes)?;
        let base = element_base(&attributes, parent_base);

        let id_iri = match attributes.rdf("ID") {
            Some(id) => Some(self.register_rdf_id(id, &base)?),
            None => None,
        };
        if let Some(node_id) = attributes.rdf("nodeID") {
            validate_nc_name(node_id, "rdf:nodeID")?;
        }

        if let Some(parse_type) = attributes.rdf("parseType") {
            return self.process_parse_type(
                parse_type, element, subject, &predicate, &base, id_iri,
            );
        }

        let object = if let Some(resource) = attributes.rdf("resource") {
            NodeOrLiteral::Node(NamedNode::new_unchecked(resolve(resource, &base)).into())
        } else if let Some(node_id) = attributes.rdf("nodeID") {
            NodeOrLiteral::Node(BlankNode::new_unchecked(node_id).into())
        } else if let Some(child) = element.element_children().next() {
            // The first child node element provides the object; later
            // siblings are ignored.
            NodeOrLiteral::Node(self.process_node(child, &base)?)
        } else {
            NodeOrLiteral::Literal(leaf_literal(element, &attributes, &base)?)
        };
        self.emit(subject, &predicate, &object);
        if let Some(id) = id_iri {
            self.reify(&id, subject, &predicate, &object);
        }
        Ok(())
    }

    fn process_parse_type(
        &mut self,
        parse_type: &str,
        element: &XmlElement,
        subject: &Subject,
        predicate: &NamedNode,
        base: &str,
        id_iri: Option<String>,
    ) -> Result<(), RdfXmlSyntaxError> {
        let object = match parse_type {
            "Resource" => {
                let node = Subject::from(self.mint());
                self.sink
                    .add_resource(subject.clone(), predicate.clone(), node.clone());
                let mut li_counter = 1;
                for child in element.element_children() {
                    self.process_property(child, &node, base, &mut li_counter)?;
                }
                NodeOrLiteral::Node(node)
            }
            "Collection" => {
                let children: Vec<&XmlElement> = element.element_children().collect();
                if children.is_empty() {
                    let nil = Subject::from(NamedNode::from(rdf::NIL));
                    self.sink
                        .add_resource(subject.clone(), predicate.clone(), nil.clone());
                    NodeOrLiteral::Node(nil)
                } else {
                    let head = Subject::from(self.mint());
                    self.sink
                        .add_resource(subject.clone(), predicate.clone(), head.clone());
                    let mut current = head.clone();
                    let last = children.len() - 1;
                    for (index, child) in children.iter().enumerate() {
                        let node = self.process_node(child, base)?;
                        self.sink
                            .add_resource(current.clone(), rdf::FIRST.into(), node);
                        if index < last {
                            let next = Subject::from(self.mint());
                            self.sink
                                .add_resource(current, rdf::REST.into(), next.clone());
                            current = next;
                        } else {
                            self.sink.add_resource(
                                current.clone(),
                                rdf::REST.into(),
                                NamedNode::from(rdf::NIL).into(),
                            );
                        }
                    }
                    NodeOrLiteral::Node(head)
                }
            }
            // "Literal" and any unrecognized parse type
            _ => {
                let inner = element.inner_xml()?;
                let literal = Literal::new_typed_literal(inner.trim(), rdf::XML_LITERAL);
                self.sink
                    .add_literal(subject.clone(), predicate.clone(), literal.clone());
                NodeOrLiteral::Literal(literal)
            }
        };
        if let Some(id) = id_iri {
            self.reify(&id, subject, predicate, &object);
        }
        Ok(())
    }

    fn emit(&mut self, subject: &Subject, predicate: &NamedNode, object: &NodeOrLiteral) {
        match object {
            NodeOrLiteral::Node(node) => {
                self.sink
                    .add_resource(subject.clone(), predicate.clone(), node.clone());
            }
            NodeOrLiteral::Literal(literal) => {
                self.sink
                    .add_literal(subject.clone(), predicate.clone(), literal.clone());
            }
        }
    }

    /// Emits the four reification triples for a statement identified by a
    /// property-element `rdf:ID`.
    fn reify(
        &mut self,
        statement_iri: &str,
        subject: &Subject,
        predicate: &NamedNode,
        object: &NodeOrLiteral,
    ) {
        let statement = Subject::from(NamedNode::new_unchecked(statement_iri));
        self.sink.add_resource(
            statement.clone(),
            rdf::TYPE.into(),
            NamedNode::from(rdf::STATEMENT).into(),
        );
        self.sink
            .add_resource(statement.clone(), rdf::SUBJECT.into(), subject.clone());
        self.sink.add_resource(
            statement.clone(),
            rdf::PREDICATE.into(),
            predicate.clone().into(),
        );
        match object {
            NodeOrLiteral::Node(node) => {
                self.sink
                    .add_resource(statement, rdf::OBJECT.into(), node.clone());
            }
            NodeOrLiteral::Literal(literal) => {
                self.sink
                    .add_literal(statement, rdf::OBJECT.into(), literal.clone());
            }
        }
    }
}

/// The attributes of an element split the way the grammar reads them: RDF
/// attributes by local name, `xml:base`/`xml:lang`, and property attributes
/// carrying literal statements.
struct ClassifiedAttributes {
    rdf: HashMap<String, String>,
    base: Option<String>,
    lang: Option<String>,
    properties: Vec<(String, String)>,
}

impl ClassifiedAttributes {
    fn rdf(&self, local_name: &str) -> Option<&str> {
        self.rdf.get(local_name).map(String::as_str)
    }
}

fn classify_attributes(element: &XmlElement) -> Result<ClassifiedAttributes, RdfXmlSyntaxError> {
    let mut rdf = HashMap::new();
    let mut bare = Vec::new();
    let mut base = None;
    let mut lang = None;
    let mut properties = Vec::new();
    for attribute in element.attributes() {
        let local_name = attribute.local_name();
        match attribute.namespace() {
            RDF_NAMESPACE => {
                if local_name == "li" {
                    return Err(RdfXmlSyntaxError::IllegalLiAttribute);
                }
                rdf.insert(local_name.to_owned(), attribute.value().to_owned());
            }
            XML_NAMESPACE => match local_name {
                "base" => base = Some(attribute.value().to_owned()),
                "lang" => lang = Some(attribute.value().to_owned()),
                _ => (),
            },
            XMLNS_NAMESPACE => (),
            "" => {
                if BARE_RDF_ATTRIBUTES.contains(&local_name) {
                    bare.push((local_name.to_owned(), attribute.value().to_owned()));
                }
                // Other unqualified attributes carry no RDF meaning.
            }
            namespace => {
                properties.push((
                    format!("{namespace}{local_name}"),
                    attribute.value().to_owned(),
                ));
            }
        }
    }
    // Unqualified names only fill gaps the RDF-namespaced attributes left.
    for (local_name, value) in bare {
        rdf.entry(local_name).or_insert(value);
    }
    for deprecated in DEPRECATED_ATTRIBUTES {
        if rdf.contains_key(deprecated) {
            return Err(RdfXmlSyntaxError::DeprecatedAttribute(format!(
                "rdf:{deprecated}"
            )));
        }
    }
    Ok(ClassifiedAttributes {
        rdf,
        base,
        lang,
        properties,
    })
}

/// `xml:base` on the element resolved against the inherited base, or the
/// inherited base itself.
fn element_base(attributes: &ClassifiedAttributes, parent_base: &str) -> String {
    match &attributes.base {
        Some(base) => resolve(base, parent_base),
        None => parent_base.to_owned(),
    }
}

fn check_node_attribute_conflicts(
    attributes: &ClassifiedAttributes,
) -> Result<(), RdfXmlSyntaxError> {
    let about = attributes.rdf("about").is_some();
    let id = attributes.rdf("ID").is_some();
    let node_id = attributes.rdf("nodeID").is_some();
    if id && node_id {
        Err(conflict("rdf:ID", "rdf:nodeID"))
    } else if about && id {
        Err(conflict("rdf:about", "rdf:ID"))
    } else if about && node_id {
        Err(conflict("rdf:about", "rdf:nodeID"))
    } else {
        Ok(())
    }
}

fn check_property_attribute_conflicts(
    attributes: &ClassifiedAttributes,
) -> Result<(), RdfXmlSyntaxError> {
    let resource = attributes.rdf("resource").is_some();
    let node_id = attributes.rdf("nodeID").is_some();
    let parse_type = attributes.rdf("parseType").is_some();
    if resource && node_id {
        Err(conflict("rdf:resource", "rdf:nodeID"))
    } else if parse_type && resource {
        Err(conflict("rdf:parseType", "rdf:resource"))
    } else if parse_type && node_id {
        Err(conflict("rdf:parseType", "rdf:nodeID"))
    } else {
        Ok(())
    }
}

fn conflict(first: &'static str, second: &'static str) -> RdfXmlSyntaxError {
    RdfXmlSyntaxError::ConflictingAttributes { first, second }
}

fn namespaces_required() -> RdfXmlSyntaxError {
    RdfXmlSyntaxError::InvalidXml("XML namespaces are required in RDF/XML".to_owned())
}

/// The literal object of a property element without children: text content,
/// tagged by the element's own `xml:lang` or typed by `rdf:datatype`.
fn leaf_literal(
    element: &XmlElement,
    attributes: &ClassifiedAttributes,
    base: &str,
) -> Result<Literal, RdfXmlSyntaxError> {
    let text = element.text_content();
    let lexical = if text.bytes().all(is_whitespace) {
        String::new()
    } else {
        text
    };
    let language = match attributes.lang.as_deref() {
        None | Some("") => None,
        Some(tag) => Some(
            LanguageTag::parse(tag.to_ascii_lowercase())
                .map_err(|error| RdfXmlSyntaxError::InvalidLanguageTag {
                    tag: tag.to_owned(),
                    error,
                })?
                .into_inner(),
        ),
    };
    Ok(if let Some(language) = language {
        Literal::new_language_tagged_literal_unchecked(lexical, language)
    } else if let Some(datatype) = attributes.rdf("datatype") {
        Literal::new_typed_literal(lexical, NamedNode::new_unchecked(resolve(datatype, base)))
    } else {
        Literal::new_simple_literal(lexical)
    })
}
