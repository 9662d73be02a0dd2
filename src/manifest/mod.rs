//! Manifest editing engine
//!
//! This module loads a YAML-family manifest into a lossless tree, applies a
//! single field upsert, and writes the tree back so that only the lines
//! belonging to the edited field change.
//!
//! ## Pipeline
//!
//! - [`preprocess`] protects scalar values that the YAML parser would reject
//!   or reinterpret (`owner: @team` becomes `owner: "@team"`).
//! - [`loader`] validates the text with `serde_yaml` and builds a
//!   [`ManifestDocument`] that remembers every source line.
//! - [`upsert`] walks a [`FieldPath`], creating or coercing intermediate
//!   mappings, and sets the leaf scalar.
//! - [`serializer`] emits untouched entries verbatim and renders only the
//!   entries the upsert rewrote.
//!
//! ## Example
//!
//! ```
//! use manifest_sweep::manifest::{edit, FieldPath, QuotingPolicy, UpsertOptions, Action};
//!
//! let path: FieldPath = "application.stack".parse().unwrap();
//! let options = UpsertOptions {
//!     quoting: QuotingPolicy::Always,
//!     ..Default::default()
//! };
//! let (text, result) = edit("application:\n  name: foo\n", &path, "python", options).unwrap();
//! assert_eq!(text, "application:\n  name: foo\n  stack: \"python\"\n");
//! assert_eq!(result.action, Action::Inserted);
//! ```

pub mod loader;
pub mod path;
pub mod preprocess;
pub mod serializer;
pub mod upsert;

use std::fmt;
use std::str::FromStr;

pub use loader::load;
pub use path::FieldPath;
pub use serializer::dump;
pub use upsert::{upsert, UpsertOptions};

use crate::error::Result;

/// Default number of spaces per nesting level when a document gives no hint.
pub const DEFAULT_INDENT_STEP: usize = 2;

pub(crate) const BYTE_ORDER_MARK: char = '\u{feff}';

/// Quoting style of an inline scalar as written in the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Quote {
    #[default]
    None,
    Single,
    Double,
}

/// How the scalar written by an upsert is quoted.
///
/// This is a per-run, file-level setting: it applies to the one value the
/// run writes and never to untouched scalars, which keep their source style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QuotingPolicy {
    /// Write plain scalars, falling back to double quotes only when the plain
    /// form would not parse back to the same string.
    Never,
    /// Double-quote when the plain form would fail to parse or would be read
    /// as a boolean, null or number.
    #[default]
    IfNeeded,
    /// Always double-quote.
    Always,
}

impl FromStr for QuotingPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "never" => Ok(QuotingPolicy::Never),
            "if-needed" | "if_needed" | "auto" => Ok(QuotingPolicy::IfNeeded),
            "always" => Ok(QuotingPolicy::Always),
            _ => Err(format!(
                "Unknown quoting policy '{}'. Use: never, if-needed, or always",
                s
            )),
        }
    }
}

impl fmt::Display for QuotingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            QuotingPolicy::Never => "never",
            QuotingPolicy::IfNeeded => "if-needed",
            QuotingPolicy::Always => "always",
        })
    }
}

/// What to do when a path segment currently holds data that is not a mapping
/// (or when the leaf currently holds a container).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CoercionPolicy {
    /// Fail the edit with `Error::CoercionRejected`.
    #[default]
    Reject,
    /// Discard the old value, log a warning and record a [`Coercion`].
    Replace,
}

impl FromStr for CoercionPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "reject" => Ok(CoercionPolicy::Reject),
            "replace" => Ok(CoercionPolicy::Replace),
            _ => Err(format!(
                "Unknown coercion policy '{}'. Use: reject or replace",
                s
            )),
        }
    }
}

impl fmt::Display for CoercionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CoercionPolicy::Reject => "reject",
            CoercionPolicy::Replace => "replace",
        })
    }
}

/// Whether the upsert created the leaf or overwrote an existing key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Inserted,
    Updated,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Action::Inserted => "inserted",
            Action::Updated => "updated",
        })
    }
}

/// A value that was discarded so the path could be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Coercion {
    /// Dotted path of the replaced node.
    pub path: String,
    /// Kind of node that was there before (see [`Node::kind_name`]).
    pub found: &'static str,
}

/// Outcome of a single upsert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationResult {
    pub path: String,
    /// Decoded previous scalar, when the leaf existed and held one.
    pub previous: Option<String>,
    pub value: String,
    pub action: Action,
    pub coercions: Vec<Coercion>,
    /// False when the leaf already held `value` and nothing was rewritten.
    pub changed: bool,
}

/// A parsed manifest file: one tree per YAML document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestDocument {
    pub(crate) documents: Vec<Document>,
    pub(crate) indent_step: usize,
    /// The source started with a UTF-8 byte order mark.
    pub(crate) bom: bool,
}

impl ManifestDocument {
    /// All documents in file order.
    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    /// Spaces per nesting level, detected from the source.
    pub fn indent_step(&self) -> usize {
        self.indent_step
    }

    /// Root node of the first document.
    pub fn root(&self) -> Option<&Node> {
        self.documents.first().map(|doc| &doc.root)
    }

    /// Look up the node at `path` in the first document.
    pub fn get(&self, path: &FieldPath) -> Option<&Node> {
        let mut node = self.root()?;
        for segment in path.segments() {
            node = node.as_mapping()?.get(segment)?;
        }
        Some(node)
    }

    pub(crate) fn primary_mut(&mut self) -> &mut Document {
        if self.documents.is_empty() {
            self.documents.push(Document::empty());
        }
        &mut self.documents[0]
    }
}

/// One YAML document, with the marker and directive lines around it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// Directives, `---` marker and any comments before the marker.
    pub(crate) prologue: Vec<String>,
    pub(crate) root: Node,
    /// The `...` end marker, if present.
    pub(crate) epilogue: Vec<String>,
}

impl Document {
    pub(crate) fn empty() -> Self {
        Self {
            prologue: Vec::new(),
            root: Node::Mapping(Mapping::block(0)),
            epilogue: Vec::new(),
        }
    }

    pub fn root(&self) -> &Node {
        &self.root
    }
}

/// A node of the manifest tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Mapping(Mapping),
    /// A block sequence, kept as its source lines.
    Sequence(RawBlock),
    Scalar(Scalar),
    /// Block scalars, multi-line flow collections and multi-line plain or
    /// quoted scalars, kept as their source lines.
    Raw(RawBlock),
}

impl Node {
    /// Human-readable kind, used in logs and coercion reports.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Node::Mapping(_) => "Mapping",
            Node::Sequence(_) => "Sequence",
            Node::Scalar(_) => "Scalar",
            Node::Raw(block) => match block.kind {
                RawKind::BlockScalar => "BlockScalar",
                RawKind::MultilineScalar => "Scalar",
                RawKind::FlowCollection => "FlowCollection",
                RawKind::Other => "Block",
            },
        }
    }

    pub fn as_mapping(&self) -> Option<&Mapping> {
        match self {
            Node::Mapping(mapping) => Some(mapping),
            _ => None,
        }
    }

    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            Node::Scalar(scalar) => Some(scalar),
            _ => None,
        }
    }

    /// True for an absent value (`key:`), `~` or `null`.
    pub fn is_null(&self) -> bool {
        matches!(self, Node::Scalar(scalar) if scalar.is_null())
    }

    /// True for nodes holding a single scalar value, inline or block.
    pub(crate) fn is_scalar_like(&self) -> bool {
        match self {
            Node::Scalar(_) => true,
            Node::Raw(block) => matches!(
                block.kind,
                RawKind::BlockScalar | RawKind::MultilineScalar
            ),
            _ => false,
        }
    }

    /// Replace this node with an empty block mapping unless it already is a
    /// mapping, and return the mapping.
    pub(crate) fn make_mapping(&mut self, indent: usize) -> &mut Mapping {
        if !matches!(self, Node::Mapping(_)) {
            *self = Node::Mapping(Mapping::block(indent));
        }
        match self {
            Node::Mapping(mapping) => mapping,
            _ => unreachable!("node was just replaced with a mapping"),
        }
    }
}

/// An ordered block mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mapping {
    pub(crate) indent: usize,
    pub(crate) entries: Vec<Entry>,
    /// Comments and blank lines after the last entry.
    pub(crate) trailing: Vec<String>,
    /// Written as `{}` in the source and still empty.
    pub(crate) flow_empty: bool,
}

impl Mapping {
    pub(crate) fn block(indent: usize) -> Self {
        Self {
            indent,
            entries: Vec::new(),
            trailing: Vec::new(),
            flow_empty: false,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keys in document order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.key.as_str())
    }

    pub fn get(&self, key: &str) -> Option<&Node> {
        self.entries
            .iter()
            .find(|entry| entry.key == key)
            .map(|entry| &entry.value)
    }

    pub(crate) fn position(&self, key: &str) -> Option<usize> {
        self.entries.iter().position(|entry| entry.key == key)
    }
}

/// One `key: value` pair of a block mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Comments and blank lines directly above the key.
    pub(crate) leading: Vec<String>,
    pub(crate) indent: usize,
    /// Decoded key.
    pub(crate) key: String,
    /// Key as written, quotes included.
    pub(crate) key_text: String,
    /// Anchor and tag tokens in front of the value.
    pub(crate) properties: Option<String>,
    /// Whitespace between the `:` and an inline value.
    pub(crate) gap: String,
    /// Trailing comment with its leading whitespace.
    pub(crate) comment: Option<String>,
    /// The original key line; `None` once the entry has been rewritten.
    pub(crate) source: Option<String>,
    pub(crate) value: Node,
}

impl Entry {
    pub(crate) fn new(key: &str, indent: usize, value: Node) -> Self {
        Self {
            leading: Vec::new(),
            indent,
            key: key.to_string(),
            key_text: serializer::render_key(key),
            properties: None,
            gap: " ".to_string(),
            comment: None,
            source: None,
            value,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn value(&self) -> &Node {
        &self.value
    }

    /// Replace the value and mark the key line for re-rendering.
    pub(crate) fn set_value(&mut self, value: Node) {
        if self.gap.is_empty() {
            self.gap = " ".to_string();
        }
        self.source = None;
        self.value = value;
    }
}

/// An inline scalar together with its source quoting.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Scalar {
    /// Text as written, quotes included.
    pub(crate) raw: String,
    pub(crate) quote: Quote,
}

impl Scalar {
    pub(crate) fn null() -> Self {
        Self::default()
    }

    /// Build a scalar from the value text of a line (comment already removed).
    pub(crate) fn parse(text: &str) -> Self {
        let quote = if text.len() >= 2 && text.starts_with('"') && text.ends_with('"') {
            Quote::Double
        } else if text.len() >= 2 && text.starts_with('\'') && text.ends_with('\'') {
            Quote::Single
        } else {
            Quote::None
        };
        Self {
            raw: text.to_string(),
            quote,
        }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn quote(&self) -> Quote {
        self.quote
    }

    /// The decoded string value.
    pub fn value(&self) -> String {
        match self.quote {
            Quote::None => self.raw.clone(),
            Quote::Single => self.raw[1..self.raw.len() - 1].replace("''", "'"),
            Quote::Double => unescape_double(&self.raw[1..self.raw.len() - 1]),
        }
    }

    pub fn is_null(&self) -> bool {
        self.quote == Quote::None && matches!(self.raw.as_str(), "" | "~" | "null" | "Null" | "NULL")
    }
}

/// Source lines of a node the engine never descends into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawBlock {
    pub(crate) kind: RawKind,
    pub(crate) lines: Vec<String>,
}

impl RawBlock {
    pub fn lines(&self) -> &[String] {
        &self.lines
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawKind {
    BlockScalar,
    MultilineScalar,
    FlowCollection,
    Other,
}

/// Load `text`, upsert `value` at `path` and return the new text together
/// with the mutation report.
pub fn edit(
    text: &str,
    path: &FieldPath,
    value: &str,
    options: UpsertOptions,
) -> Result<(String, MutationResult)> {
    let mut document = load(text)?;
    let result = upsert(&mut document, path, value, options)?;
    Ok((dump(&document), result))
}

fn unescape_double(inner: &str) -> String {
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some('"') => out.push('"'),
            Some('\\') => out.push('\\'),
            Some('/') => out.push('/'),
            Some(' ') => out.push(' '),
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                    Some(decoded) => out.push(decoded),
                    None => {
                        out.push_str("\\u");
                        out.push_str(&hex);
                    }
                }
            }
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}
