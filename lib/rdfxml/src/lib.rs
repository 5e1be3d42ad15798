#![doc = include_str!("../README.md")]
#![doc(test(attr(deny(warnings))))]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

mod error;
mod handler;
mod ncname;
mod parser;
mod resolve;
mod tree;

pub use crate::error::{ElementPosition, RdfXmlParseError, RdfXmlSyntaxError};
pub use crate::handler::{
    can_handle, format_name, parse, DocumentMetadata, ParsedDocument, FORMAT_NAME,
};
pub use crate::parser::{RdfXmlParser, TripleSink};
