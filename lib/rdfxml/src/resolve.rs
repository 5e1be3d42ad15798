//! Reference resolution against a base IRI.
//!
//! This is a total function: every input maps to a string. A reference that
//! already carries a scheme is returned unchanged and an unparseable base
//! falls back to returning the reference itself, so resolution can never
//! abort a parse on its own.

/// Resolves `reference` against `base` following RFC 3986 section 5.
pub(crate) fn resolve(reference: &str, base: &str) -> String {
    if reference.is_empty() {
        return strip_fragment(base).to_owned();
    }
    if reference.contains("://") {
        return reference.to_owned();
    }
    if reference.starts_with('#') {
        let mut target = strip_fragment(base).to_owned();
        target.push_str(reference);
        return target;
    }
    let Some(parts) = BaseParts::split(base) else {
        return reference.to_owned();
    };
    if reference.starts_with("//") {
        format!("{}:{}", parts.scheme, reference)
    } else if reference.starts_with('/') {
        format!("{}://{}{}", parts.scheme, parts.authority, reference)
    } else {
        // Merge: the base path up to and including its last slash, then the
        // reference, then dot-segment removal over the merged path.
        let prefix = match parts.path.rfind('/') {
            Some(index) => &parts.path[..=index],
            None => "/",
        };
        let merged = format!("{prefix}{reference}");
        format!(
            "{}://{}{}",
            parts.scheme,
            parts.authority,
            remove_dot_segments(&merged)
        )
    }
}

fn strip_fragment(iri: &str) -> &str {
    match iri.find('#') {
        Some(index) => &iri[..index],
        None => iri,
    }
}

/// The pieces of a base IRI needed for resolution. Query and fragment are
/// dropped: they never participate in merging.
struct BaseParts<'a> {
    scheme: &'a str,
    /// Everything between `://` and the path, including `user@` and `:port`.
    authority: &'a str,
    path: &'a str,
}

impl<'a> BaseParts<'a> {
    fn split(base: &'a str) -> Option<Self> {
        let (scheme, rest) = base.split_once("://")?;
        let rest = strip_fragment(rest);
        let rest = match rest.find('?') {
            Some(index) => &rest[..index],
            None => rest,
        };
        let (authority, path) = match rest.find('/') {
            Some(index) => rest.split_at(index),
            None => (rest, ""),
        };
        Some(Self {
            scheme,
            authority,
            path,
        })
    }
}

/// The iterative dot-segment removal of RFC 3986 section 5.2.4.
fn remove_dot_segments(path: &str) -> String {
    let mut input = path;
    let mut output = String::with_capacity(path.len());
    while !input.is_empty() {
        if let Some(rest) = input.strip_prefix("../") {
            input = rest;
        } else if let Some(rest) = input.strip_prefix("./") {
            input = rest;
        } else if input.starts_with("/./") {
            input = &input[2..];
        } else if input == "/." {
            input = "/";
        } else if input.starts_with("/../") {
            input = &input[3..];
            pop_last_segment(&mut output);
        } else if input == "/.." {
            input = "/";
            pop_last_segment(&mut output);
        } else if input == "." || input == ".." {
            input = "";
        } else {
            let start = usize::from(input.starts_with('/'));
            let end = input[start..].find('/').map_or(input.len(), |i| i + start);
            output.push_str(&input[..end]);
            input = &input[end..];
        }
    }
    output
}

fn pop_last_segment(output: &mut String) {
    let len = output.rfind('/').unwrap_or(0);
    output.truncate(len);
}
