//! Manifest serialization
//!
//! Entries that still carry their source line are written back verbatim.
//! Only entries an upsert touched (and the ancestors it created) are
//! rendered, using the indentation recorded on each mapping.

use log::warn;

use super::preprocess::escape_double;
use super::{
    Document, Entry, ManifestDocument, Mapping, Node, Quote, QuotingPolicy, Scalar,
    BYTE_ORDER_MARK,
};

/// Write a manifest back to text.
///
/// Lines are joined with `\n` and the output ends with a newline unless it
/// is empty.
pub fn dump(document: &ManifestDocument) -> String {
    let mut lines = Vec::new();
    for doc in document.documents() {
        emit_document(doc, &mut lines);
    }
    if lines.is_empty() {
        return String::new();
    }
    let mut text = String::new();
    if document.bom {
        text.push(BYTE_ORDER_MARK);
    }
    text.push_str(&lines.join("\n"));
    text.push('\n');
    text
}

fn emit_document(doc: &Document, out: &mut Vec<String>) {
    out.extend(doc.prologue.iter().cloned());
    match &doc.root {
        Node::Mapping(mapping) => emit_mapping(mapping, out),
        Node::Sequence(block) | Node::Raw(block) => out.extend(block.lines.iter().cloned()),
        Node::Scalar(scalar) if !scalar.raw.is_empty() => out.push(scalar.raw.clone()),
        Node::Scalar(_) => {}
    }
    out.extend(doc.epilogue.iter().cloned());
}

fn emit_mapping(mapping: &Mapping, out: &mut Vec<String>) {
    for entry in &mapping.entries {
        out.extend(entry.leading.iter().cloned());
        match &entry.source {
            Some(line) => out.push(line.clone()),
            None => out.push(render_head(entry)),
        }
        match &entry.value {
            Node::Mapping(child) => emit_mapping(child, out),
            Node::Sequence(block) | Node::Raw(block) => out.extend(block.lines.iter().cloned()),
            Node::Scalar(_) => {}
        }
    }
    out.extend(mapping.trailing.iter().cloned());
}

/// Render the `key: value` line of a rewritten entry.
fn render_head(entry: &Entry) -> String {
    let mut line = " ".repeat(entry.indent);
    line.push_str(&entry.key_text);
    line.push(':');

    let value = match &entry.value {
        Node::Scalar(scalar) if !scalar.raw.is_empty() => Some(scalar.raw.as_str()),
        Node::Mapping(mapping) if mapping.is_empty() => Some("{}"),
        _ => None,
    };

    if entry.properties.is_some() || value.is_some() {
        line.push_str(&entry.gap);
    }
    if let Some(properties) = &entry.properties {
        line.push_str(properties);
        if value.is_some() {
            line.push(' ');
        }
    }
    if let Some(value) = value {
        line.push_str(value);
    }
    if let Some(comment) = &entry.comment {
        line.push_str(comment);
    }
    line
}

/// Render the scalar an upsert writes, following `policy`.
pub fn render_scalar(value: &str, policy: QuotingPolicy) -> Scalar {
    let quoted = match policy {
        QuotingPolicy::Always => true,
        QuotingPolicy::IfNeeded => needs_quotes(value),
        QuotingPolicy::Never => {
            let unsafe_plain = breaks_plain(value);
            if unsafe_plain {
                warn!(
                    "Value {:?} cannot be written as a plain scalar; using double quotes",
                    value
                );
            }
            unsafe_plain
        }
    };

    if quoted {
        Scalar {
            raw: format!("\"{}\"", escape_double(value)),
            quote: Quote::Double,
        }
    } else {
        Scalar {
            raw: value.to_string(),
            quote: Quote::None,
        }
    }
}

/// Render a mapping key, quoting it only when the plain form would not read
/// back as the same string.
pub fn render_key(key: &str) -> String {
    if needs_quotes(key) {
        format!("\"{}\"", escape_double(key))
    } else {
        key.to_string()
    }
}

/// Whether a plain scalar would fail to parse or be read as something other
/// than this exact string.
pub fn needs_quotes(value: &str) -> bool {
    breaks_plain(value) || is_ambiguous(value)
}

/// Plain-scalar rules: characters and positions YAML gives a meaning to.
fn breaks_plain(value: &str) -> bool {
    let Some(first) = value.chars().next() else {
        return true;
    };
    if value.trim() != value {
        return true;
    }
    if value.chars().any(char::is_control) {
        return true;
    }
    if matches!(
        first,
        '-' | '?' | ':' | ',' | '[' | ']' | '{' | '}' | '#' | '&' | '*' | '!' | '|' | '>' | '\''
            | '"' | '%' | '@' | '`'
    ) {
        return true;
    }
    value.contains(": ") || value.contains(" #") || value.ends_with(':')
}

/// Strings a YAML reader turns into booleans, nulls or numbers.
fn is_ambiguous(value: &str) -> bool {
    const KEYWORDS: [&str; 10] = ["y", "yes", "n", "no", "true", "false", "on", "off", "null", "~"];

    let lower = value.to_ascii_lowercase();
    if KEYWORDS.contains(&lower.as_str()) {
        return true;
    }
    let unsigned = lower.trim_start_matches(['+', '-']);
    if matches!(unsigned, ".inf" | ".nan") {
        return true;
    }
    if unsigned.starts_with("0x") || unsigned.starts_with("0o") || unsigned.starts_with("0b") {
        return true;
    }
    lower.parse::<f64>().is_ok() || (lower.contains('_') && lower.replace('_', "").parse::<f64>().is_ok())
}
