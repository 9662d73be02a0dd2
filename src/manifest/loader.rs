//! Manifest loading
//!
//! Turns manifest text into a [`ManifestDocument`]. The text is first run
//! through [`preprocess`](super::preprocess), then validated by `serde_yaml`
//! (every document, aliases allowed), and finally split into a tree that
//! keeps each source line so the serializer can reproduce it verbatim.

use log::debug;
use serde::Deserialize;

use super::preprocess::{find_separator, preprocess, split_comment};
use super::{
    Document, Entry, ManifestDocument, Mapping, Node, RawBlock, RawKind, Scalar,
    BYTE_ORDER_MARK, DEFAULT_INDENT_STEP,
};
use crate::error::{Error, Result};

/// Load a manifest from raw file contents.
///
/// A leading byte order mark is stripped and remembered so that
/// [`dump`](super::dump) writes it back.
pub fn load(raw: &str) -> Result<ManifestDocument> {
    let (raw, bom) = match raw.strip_prefix(BYTE_ORDER_MARK) {
        Some(rest) => (rest, true),
        None => (raw, false),
    };
    let text = preprocess(raw);
    validate(&text)?;
    let mut document = parse_structure(&text)?;
    document.bom = bom;
    Ok(document)
}

/// Check that every document in `text` parses as YAML.
pub fn validate(text: &str) -> Result<()> {
    for document in serde_yaml::Deserializer::from_str(text) {
        serde_yaml::Value::deserialize(document).map_err(|err| parse_error(text, err))?;
    }
    Ok(())
}

fn parse_error(text: &str, err: serde_yaml::Error) -> Error {
    let line = err.location().map(|location| location.line());
    let snippet = line
        .and_then(|number| text.lines().nth(number.saturating_sub(1)))
        .map(str::to_string);
    Error::Parse {
        line,
        snippet,
        message: err.to_string(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineKind {
    /// Blank or comment-only.
    Trivia,
    DocumentStart,
    DocumentEnd,
    Directive,
    SequenceItem,
    Entry,
    Other,
}

/// How [`Parser::collect_block`] treats comment-looking and blank lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockBody {
    /// Nested structure: comments and blank lines belong to no value.
    Structure,
    /// Scalar text: `#` lines at the content indentation are text.
    Text,
    /// A block scalar with the `+` chomping indicator, which also owns its
    /// trailing blank lines.
    KeptText,
}

#[derive(Debug, Clone, Copy)]
struct Line<'a> {
    number: usize,
    text: &'a str,
    indent: usize,
    kind: LineKind,
}

impl<'a> Line<'a> {
    fn classify(number: usize, text: &'a str) -> Self {
        let content = text.trim_start_matches(' ');
        let indent = text.len() - content.len();
        let trimmed = content.trim();

        let kind = if trimmed.is_empty() || trimmed.starts_with('#') {
            LineKind::Trivia
        } else if indent == 0 && is_marker(text, "---") {
            LineKind::DocumentStart
        } else if indent == 0 && is_marker(text, "...") {
            LineKind::DocumentEnd
        } else if indent == 0 && text.starts_with('%') {
            LineKind::Directive
        } else if content == "-" || content.starts_with("- ") || content.starts_with("-\t") {
            LineKind::SequenceItem
        } else if find_separator(content).is_some() {
            LineKind::Entry
        } else {
            LineKind::Other
        };

        Self {
            number,
            text,
            indent,
            kind,
        }
    }

    fn content(&self) -> &'a str {
        &self.text[self.indent..]
    }

    fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }

    fn unexpected(&self, message: &str) -> Error {
        Error::Parse {
            line: Some(self.number),
            snippet: Some(self.text.to_string()),
            message: message.to_string(),
        }
    }
}

fn is_marker(line: &str, marker: &str) -> bool {
    line.strip_prefix(marker)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with(char::is_whitespace))
}

/// Whether a `---` line carries content beyond an optional comment.
fn marker_has_content(line: &str) -> bool {
    let rest = line[3..].trim();
    !rest.is_empty() && !rest.starts_with('#')
}

fn parse_structure(text: &str) -> Result<ManifestDocument> {
    let lines: Vec<Line> = text
        .lines()
        .enumerate()
        .map(|(index, line)| Line::classify(index + 1, line))
        .collect();

    let mut step = None;
    let mut documents = Vec::new();
    for chunk in split_documents(&lines) {
        let root = if chunk.inline_root {
            Node::Raw(RawBlock {
                kind: RawKind::Other,
                lines: chunk.body.iter().map(|line| line.text.to_string()).collect(),
            })
        } else {
            let mut parser = Parser {
                lines: &chunk.body,
                pos: 0,
                step: &mut step,
            };
            parser.parse_root()?
        };
        documents.push(Document {
            prologue: chunk.prologue,
            root,
            epilogue: chunk.epilogue,
        });
    }

    let indent_step = step.unwrap_or(DEFAULT_INDENT_STEP);
    debug!(
        "loaded manifest: {} document(s), indent step {}",
        documents.len(),
        indent_step
    );
    Ok(ManifestDocument {
        documents,
        indent_step,
        bom: false,
    })
}

struct Chunk<'a> {
    prologue: Vec<String>,
    body: Vec<Line<'a>>,
    epilogue: Vec<String>,
    inline_root: bool,
}

impl<'a> Chunk<'a> {
    fn new() -> Self {
        Self {
            prologue: Vec::new(),
            body: Vec::new(),
            epilogue: Vec::new(),
            inline_root: false,
        }
    }

    fn has_content(&self) -> bool {
        self.body.iter().any(|line| line.kind != LineKind::Trivia)
    }

    fn is_started(&self) -> bool {
        !self.prologue.is_empty() || self.has_content()
    }
}

fn split_documents<'a>(lines: &[Line<'a>]) -> Vec<Chunk<'a>> {
    let mut chunks = Vec::new();
    let mut current = Chunk::new();
    let mut marker_seen = false;

    for line in lines {
        match line.kind {
            LineKind::Directive | LineKind::DocumentStart => {
                if marker_seen || current.has_content() {
                    chunks.push(std::mem::replace(&mut current, Chunk::new()));
                    marker_seen = false;
                }
                // Comments ahead of the marker stay in front of it.
                let leading = std::mem::take(&mut current.body);
                current
                    .prologue
                    .extend(leading.iter().map(|line| line.text.to_string()));
                current.prologue.push(line.text.to_string());
                if line.kind == LineKind::DocumentStart {
                    marker_seen = true;
                    current.inline_root = marker_has_content(line.text);
                }
            }
            LineKind::DocumentEnd => {
                current.epilogue.push(line.text.to_string());
                chunks.push(std::mem::replace(&mut current, Chunk::new()));
                marker_seen = false;
            }
            _ => current.body.push(*line),
        }
    }

    if current.is_started() || chunks.is_empty() || !current.body.is_empty() {
        chunks.push(current);
    }
    chunks
}

struct Parser<'l, 'a> {
    lines: &'l [Line<'a>],
    pos: usize,
    step: &'l mut Option<usize>,
}

impl<'l, 'a> Parser<'l, 'a> {
    fn peek(&self) -> Option<Line<'a>> {
        self.lines.get(self.pos).copied()
    }

    /// Next line that is not a comment or blank, without consuming anything.
    fn peek_content(&self) -> Option<Line<'a>> {
        self.lines[self.pos..]
            .iter()
            .find(|line| line.kind != LineKind::Trivia)
            .copied()
    }

    fn parse_root(&mut self) -> Result<Node> {
        let Some(first) = self.peek_content() else {
            let mut mapping = Mapping::block(0);
            mapping.trailing = self.lines.iter().map(|line| line.text.to_string()).collect();
            return Ok(Node::Mapping(mapping));
        };

        match first.kind {
            LineKind::Entry => {
                let mapping = self.parse_mapping(first.indent)?;
                if let Some(line) = self.peek() {
                    return Err(line.unexpected("unexpected indentation"));
                }
                Ok(Node::Mapping(mapping))
            }
            LineKind::SequenceItem => Ok(Node::Sequence(self.take_all(RawKind::Other))),
            LineKind::Other if first.content().starts_with(['{', '[']) => {
                Ok(Node::Raw(self.take_all(RawKind::FlowCollection)))
            }
            _ => Ok(Node::Raw(self.take_all(RawKind::Other))),
        }
    }

    fn take_all(&mut self, kind: RawKind) -> RawBlock {
        let lines = self.lines[self.pos..]
            .iter()
            .map(|line| line.text.to_string())
            .collect();
        self.pos = self.lines.len();
        RawBlock { kind, lines }
    }

    fn parse_mapping(&mut self, indent: usize) -> Result<Mapping> {
        let mut mapping = Mapping::block(indent);
        let mut pending = Vec::new();

        while let Some(line) = self.peek() {
            if line.kind == LineKind::Trivia {
                pending.push(line.text.to_string());
                self.pos += 1;
                continue;
            }
            if line.indent < indent {
                break;
            }
            if line.indent > indent {
                return Err(line.unexpected("unexpected indentation"));
            }
            if line.kind != LineKind::Entry {
                return Err(line.unexpected("expected a `key: value` entry"));
            }

            self.pos += 1;
            let entry = self.parse_entry(line, std::mem::take(&mut pending))?;
            if mapping.position(&entry.key).is_some() {
                return Err(line.unexpected(&format!("duplicate key '{}'", entry.key)));
            }
            mapping.entries.push(entry);
        }

        mapping.trailing = pending;
        Ok(mapping)
    }

    fn parse_entry(&mut self, line: Line<'a>, leading: Vec<String>) -> Result<Entry> {
        let content = line.content();
        let separator = find_separator(content)
            .ok_or_else(|| line.unexpected("expected a `key: value` entry"))?;
        let key_text = content[..separator].trim_end().to_string();
        let key = decode_key(&key_text);

        let inline = InlineValue::split(&content[separator + 1..]);
        let mut entry = Entry {
            leading,
            indent: line.indent,
            key,
            key_text,
            properties: inline.properties.map(str::to_string),
            gap: inline.gap.to_string(),
            comment: inline.comment.map(str::to_string),
            source: Some(line.text.to_string()),
            value: Node::Scalar(Scalar::null()),
        };

        let continues = self
            .peek_content()
            .is_some_and(|next| next.indent > line.indent);

        if inline.value.is_empty() {
            let Some(next) = self.peek_content() else {
                return Ok(entry);
            };
            if next.kind == LineKind::SequenceItem && next.indent >= line.indent {
                entry.value = Node::Sequence(self.collect_block(
                    line.indent,
                    true,
                    RawKind::Other,
                    BlockBody::Structure,
                ));
            } else if next.indent > line.indent && next.kind == LineKind::Entry {
                if self.step.is_none() {
                    *self.step = Some(next.indent - line.indent);
                }
                entry.value = Node::Mapping(self.parse_mapping(next.indent)?);
            } else if next.indent > line.indent {
                // The value starts on the next line.
                let (kind, body) = continuation(next.content());
                entry.value = Node::Raw(self.collect_block(line.indent, false, kind, body));
            }
        } else if inline.value.starts_with(['|', '>']) {
            let header = inline.value.split_whitespace().next().unwrap_or_default();
            let body = if header.contains('+') {
                BlockBody::KeptText
            } else {
                BlockBody::Text
            };
            entry.value = Node::Raw(self.collect_block(
                line.indent,
                false,
                RawKind::BlockScalar,
                body,
            ));
        } else if continues {
            let (kind, body) = continuation(inline.value);
            entry.value = Node::Raw(self.collect_block(line.indent, false, kind, body));
        } else if inline.value == "{}" {
            let mut mapping = Mapping::block(line.indent);
            mapping.flow_empty = true;
            entry.value = Node::Mapping(mapping);
        } else if inline.value.starts_with(['{', '[']) {
            entry.value = Node::Raw(RawBlock {
                kind: RawKind::FlowCollection,
                lines: Vec::new(),
            });
        } else {
            entry.value = Node::Scalar(Scalar::parse(inline.value));
        }

        Ok(entry)
    }

    /// Consume the lines nested under a key at `base` indentation.
    ///
    /// Trailing comments and blank lines are left for the enclosing mapping,
    /// except where `body` makes them part of a scalar.
    fn collect_block(
        &mut self,
        base: usize,
        same_indent_items: bool,
        kind: RawKind,
        body: BlockBody,
    ) -> RawBlock {
        let mut end = self.pos;
        let mut index = self.pos;
        let mut text_indent = None;
        while let Some(line) = self.lines.get(index) {
            if line.kind == LineKind::Trivia {
                let owned = match body {
                    BlockBody::Structure => false,
                    BlockBody::Text => {
                        !line.is_blank() && line.indent >= text_indent.unwrap_or(base + 1)
                    }
                    BlockBody::KeptText => {
                        line.is_blank() || line.indent >= text_indent.unwrap_or(base + 1)
                    }
                };
                index += 1;
                if owned {
                    if !line.is_blank() {
                        text_indent.get_or_insert(line.indent);
                    }
                    end = index;
                }
                continue;
            }
            let nested = line.indent > base
                || (same_indent_items
                    && line.indent == base
                    && line.kind == LineKind::SequenceItem);
            if !nested {
                break;
            }
            text_indent.get_or_insert(line.indent);
            index += 1;
            end = index;
        }

        let lines = self.lines[self.pos..end]
            .iter()
            .map(|line| line.text.to_string())
            .collect();
        self.pos = end;
        RawBlock { kind, lines }
    }
}

/// Kind of a value continued on further lines, judged by its first text.
///
/// Inside a quoted scalar a `#` line is text; after a plain one it is a
/// comment.
fn continuation(first: &str) -> (RawKind, BlockBody) {
    if first.starts_with(['{', '[']) {
        (RawKind::FlowCollection, BlockBody::Structure)
    } else if first.starts_with(['"', '\'']) {
        (RawKind::MultilineScalar, BlockBody::Text)
    } else {
        (RawKind::MultilineScalar, BlockBody::Structure)
    }
}

/// The parts of the text after a key's `:`.
struct InlineValue<'a> {
    gap: &'a str,
    properties: Option<&'a str>,
    value: &'a str,
    comment: Option<&'a str>,
}

impl<'a> InlineValue<'a> {
    fn split(rest: &'a str) -> Self {
        let body = rest.trim_start();
        let gap = &rest[..rest.len() - body.len()];

        if body.is_empty() {
            return Self {
                gap: "",
                properties: None,
                value: "",
                comment: None,
            };
        }
        if body.starts_with('#') {
            return Self {
                gap: "",
                properties: None,
                value: "",
                comment: Some(rest),
            };
        }

        // Anchor and tag tokens in front of the value.
        let mut value_start = 0;
        while body[value_start..].starts_with(['&', '!']) {
            let token_end = body[value_start..]
                .find(char::is_whitespace)
                .map(|offset| value_start + offset)
                .unwrap_or(body.len());
            value_start = token_end;
            let skipped = body[value_start..].trim_start();
            value_start = body.len() - skipped.len();
        }
        let properties = if value_start > 0 {
            Some(body[..value_start].trim_end())
        } else {
            None
        };
        let remainder = &body[value_start..];

        let (value, tail) = match remainder.chars().next() {
            Some(quote @ ('"' | '\'')) => match closing_quote(remainder, quote) {
                Some(close) => {
                    let (value, tail) = remainder.split_at(close + 1);
                    (value, tail)
                }
                None => (remainder.trim_end(), ""),
            },
            Some('#') => ("", remainder),
            _ => split_comment(remainder),
        };
        let comment = if tail.trim().is_empty() {
            None
        } else {
            Some(tail)
        };

        Self {
            gap,
            properties,
            value,
            comment,
        }
    }
}

/// Byte index of the quote closing a scalar that starts at index 0.
fn closing_quote(text: &str, quote: char) -> Option<usize> {
    let bytes = text.as_bytes();
    let quote = quote as u8;
    let mut index = 1;
    while index < bytes.len() {
        if quote == b'"' && bytes[index] == b'\\' {
            index += 2;
            continue;
        }
        if bytes[index] == quote {
            if quote == b'\'' && bytes.get(index + 1) == Some(&b'\'') {
                index += 2;
                continue;
            }
            return Some(index);
        }
        index += 1;
    }
    None
}

fn decode_key(key_text: &str) -> String {
    Scalar::parse(key_text).value()
}
