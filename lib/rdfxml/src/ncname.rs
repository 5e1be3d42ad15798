//! XML Namespaces NCName validation for `rdf:ID` and `rdf:nodeID` values.

use crate::error::RdfXmlSyntaxError;

/// Inclusive ranges of `NameStartChar` from Namespaces in XML. The colon is
/// left out, which makes the same tables serve the NCName production
/// directly.
const NAME_START_CHAR_RANGES: [(char, char); 15] = [
    ('A', 'Z'),
    ('_', '_'),
    ('a', 'z'),
    ('\u{C0}', '\u{D6}'),
    ('\u{D8}', '\u{F6}'),
    ('\u{F8}', '\u{2FF}'),
    ('\u{370}', '\u{37D}'),
    ('\u{37F}', '\u{1FFF}'),
    ('\u{200C}', '\u{200D}'),
    ('\u{2070}', '\u{218F}'),
    ('\u{2C00}', '\u{2FEF}'),
    ('\u{3001}', '\u{D7FF}'),
    ('\u{F900}', '\u{FDCF}'),
    ('\u{FDF0}', '\u{FFFD}'),
    ('\u{10000}', '\u{EFFFF}'),
];

/// What `NameChar` allows on top of `NameStartChar`.
const NAME_EXTRA_CHAR_RANGES: [(char, char); 6] = [
    ('-', '-'),
    ('.', '.'),
    ('0', '9'),
    ('\u{B7}', '\u{B7}'),
    ('\u{300}', '\u{36F}'),
    ('\u{203F}', '\u{2040}'),
];

/// Checks `value` against the NCName production and reports which attribute
/// carried it on failure.
pub(crate) fn validate_nc_name(
    value: &str,
    attribute: &'static str,
) -> Result<(), RdfXmlSyntaxError> {
    if is_nc_name(value) {
        Ok(())
    } else {
        Err(RdfXmlSyntaxError::InvalidNCName {
            attribute,
            value: value.to_owned(),
        })
    }
}

/// `NameStartChar (NameChar)*`, colon excluded everywhere.
pub(crate) fn is_nc_name(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    is_name_start_char(first) && chars.all(is_name_char)
}

fn is_name_start_char(c: char) -> bool {
    in_ranges(c, &NAME_START_CHAR_RANGES)
}

fn is_name_char(c: char) -> bool {
    is_name_start_char(c) || in_ranges(c, &NAME_EXTRA_CHAR_RANGES)
}

fn in_ranges(c: char, ranges: &[(char, char)]) -> bool {
    ranges.iter().any(|&(low, high)| low <= c && c <= high)
}
