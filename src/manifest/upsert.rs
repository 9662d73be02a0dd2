//! Field upsert
//!
//! Walks a [`FieldPath`] through the first document of a manifest, creating
//! missing mappings on the way, and writes the leaf scalar. Existing keys
//! keep their position; new keys are appended to the end of their mapping.

use log::{debug, warn};

use serde_yaml::Value;

use super::serializer::{needs_quotes, render_scalar};
use super::{
    Action, Coercion, CoercionPolicy, Entry, FieldPath, ManifestDocument, Mapping,
    MutationResult, Node, Quote, QuotingPolicy, RawBlock, RawKind, Scalar,
};
use crate::error::{Error, Result};

/// Path label used when the document root itself has to be replaced.
const ROOT_LABEL: &str = "<root>";

/// Kind reported for flow mappings that cannot be rewritten in block style.
const NESTED_FLOW_MAPPING: &str = "flow mapping with nested values";

/// Options controlling a single upsert.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertOptions {
    pub quoting: QuotingPolicy,
    pub coercion: CoercionPolicy,
}

/// Set `value` at `path` in the first document of `document`.
pub fn upsert(
    document: &mut ManifestDocument,
    path: &FieldPath,
    value: &str,
    options: UpsertOptions,
) -> Result<MutationResult> {
    let segments = path.segments();
    let Some((leaf, parents)) = segments.split_last() else {
        return Err(Error::InvalidPath {
            path: String::new(),
            reason: "path is empty".to_string(),
        });
    };

    let step = document.indent_step();
    let mut coercions = Vec::new();

    let root = &mut document.primary_mut().root;
    prepare_root(root, options.coercion, &mut coercions)?;
    let mut mapping = root.make_mapping(0);

    for (depth, segment) in parents.iter().enumerate() {
        let walked = segments[..=depth].join(".");
        let indent = mapping.indent;
        let child_indent = indent + step;

        let index = match mapping.position(segment) {
            Some(index) => index,
            None => {
                debug!("Creating mapping '{}'", walked);
                let entry = Entry::new(segment, indent, Node::Mapping(Mapping::block(child_indent)));
                insert_entry(mapping, entry)
            }
        };

        let entry = &mut mapping.entries[index];
        prepare_intermediate(entry, child_indent, &walked, options.coercion, &mut coercions)?;
        mapping = entry.value.make_mapping(child_indent);
    }

    let display = path.to_string();
    let rendered = render_scalar(value, options.quoting);

    let Some(index) = mapping.position(leaf) else {
        let entry = Entry::new(leaf, mapping.indent, Node::Scalar(rendered));
        insert_entry(mapping, entry);
        debug!("Inserted '{}' = '{}'", display, value);
        return Ok(MutationResult {
            path: display,
            previous: None,
            value: value.to_string(),
            action: Action::Inserted,
            coercions,
            changed: true,
        });
    };

    let entry = &mut mapping.entries[index];
    let string_tagged = entry
        .properties
        .as_deref()
        .is_some_and(|properties| properties.split_whitespace().any(|token| token == "!!str"));
    let previous = match &entry.value {
        Node::Scalar(scalar) if scalar.is_null() => None,
        Node::Scalar(scalar) => {
            let current = scalar.value();
            let same_type = scalar.quote() != Quote::None
                || string_tagged
                || options.quoting == QuotingPolicy::Never
                || !needs_quotes(value);
            if current == value && same_type {
                debug!("'{}' already set to '{}'", display, value);
                return Ok(unchanged(display, current, coercions));
            }
            Some(current)
        }
        Node::Raw(block) if entry.value.is_scalar_like() => {
            let current = decode_block(entry, block);
            if current.as_deref() == Some(value) {
                debug!("'{}' already set to '{}'", display, value);
                return Ok(unchanged(display, value.to_string(), coercions));
            }
            current
        }
        node if is_empty_container(node) => None,
        node => {
            coerce(&display, node.kind_name(), options.coercion, &mut coercions)?;
            None
        }
    };

    entry.properties = entry.properties.as_deref().and_then(anchors_only);
    entry.set_value(Node::Scalar(rendered));
    debug!(
        "Updated '{}': {:?} -> '{}'",
        display,
        previous.as_deref().unwrap_or("null"),
        value
    );

    Ok(MutationResult {
        path: display,
        previous,
        value: value.to_string(),
        action: Action::Updated,
        coercions,
        changed: true,
    })
}

fn unchanged(path: String, previous: String, coercions: Vec<Coercion>) -> MutationResult {
    MutationResult {
        path,
        value: previous.clone(),
        previous: Some(previous),
        action: Action::Updated,
        coercions,
        changed: false,
    }
}

/// What has to happen to a node before the walk can descend into it.
enum Preparation {
    Descend,
    Reset,
    Coerce(&'static str),
}

fn classify(node: &Node) -> Preparation {
    match node {
        Node::Mapping(mapping) if mapping.flow_empty => Preparation::Reset,
        Node::Mapping(_) => Preparation::Descend,
        node if is_empty_container(node) => Preparation::Reset,
        node => Preparation::Coerce(node.kind_name()),
    }
}

fn prepare_root(
    root: &mut Node,
    policy: CoercionPolicy,
    coercions: &mut Vec<Coercion>,
) -> Result<()> {
    match expand_flow_root(root) {
        Some(FlowMapping::Block(mapping)) => {
            debug!("Rewriting flow mapping at the document root in block style");
            *root = Node::Mapping(mapping);
            return Ok(());
        }
        Some(FlowMapping::Nested) => {
            return Err(Error::UneditableValue {
                path: ROOT_LABEL.to_string(),
                found: NESTED_FLOW_MAPPING.to_string(),
            });
        }
        None => {}
    }

    match classify(root) {
        Preparation::Descend => {}
        Preparation::Reset => {
            debug!("Replacing empty document root with a mapping");
            let mut mapping = Mapping::block(0);
            if let Node::Raw(block) = &*root {
                mapping.trailing = trivia_lines(&block.lines);
            }
            *root = Node::Mapping(mapping);
        }
        Preparation::Coerce(found) => {
            coerce(ROOT_LABEL, found, policy, coercions)?;
            *root = Node::Mapping(Mapping::block(0));
        }
    }
    Ok(())
}

fn prepare_intermediate(
    entry: &mut Entry,
    child_indent: usize,
    walked: &str,
    policy: CoercionPolicy,
    coercions: &mut Vec<Coercion>,
) -> Result<()> {
    let expansion = match &entry.value {
        Node::Raw(block) if block.kind == RawKind::FlowCollection => {
            entry_value(entry, block).and_then(|value| block_mapping(value, child_indent))
        }
        _ => None,
    };
    match expansion {
        Some(FlowMapping::Block(mapping)) => {
            debug!("Rewriting flow mapping at '{}' in block style", walked);
            entry.properties = entry.properties.as_deref().and_then(anchors_only);
            entry.set_value(Node::Mapping(mapping));
            return Ok(());
        }
        Some(FlowMapping::Nested) => {
            return Err(Error::UneditableValue {
                path: walked.to_string(),
                found: NESTED_FLOW_MAPPING.to_string(),
            });
        }
        None => {}
    }

    match classify(&entry.value) {
        Preparation::Descend => {}
        Preparation::Reset => {
            debug!("Replacing empty value at '{}' with a mapping", walked);
            entry.set_value(Node::Mapping(Mapping::block(child_indent)));
        }
        Preparation::Coerce(found) => {
            coerce(walked, found, policy, coercions)?;
            entry.properties = entry.properties.as_deref().and_then(anchors_only);
            entry.set_value(Node::Mapping(Mapping::block(child_indent)));
        }
    }
    Ok(())
}

/// Null, an empty string, or an empty flow mapping.
fn is_empty_container(node: &Node) -> bool {
    match node {
        Node::Scalar(scalar) => scalar.is_null() || scalar.value().is_empty(),
        Node::Mapping(mapping) => mapping.is_empty(),
        Node::Raw(block) => is_flow_empty(block),
        Node::Sequence(_) => false,
    }
}

fn is_flow_empty(block: &RawBlock) -> bool {
    if block.kind != RawKind::FlowCollection {
        return false;
    }
    let content: Vec<&str> = block
        .lines
        .iter()
        .map(|line| line.trim())
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .collect();
    content == ["{}"]
}

fn coerce(
    path: &str,
    found: &'static str,
    policy: CoercionPolicy,
    coercions: &mut Vec<Coercion>,
) -> Result<()> {
    match policy {
        CoercionPolicy::Reject => Err(Error::CoercionRejected {
            path: path.to_string(),
            found: found.to_string(),
        }),
        CoercionPolicy::Replace => {
            warn!("Discarding {} at '{}' so the field can be written", found, path);
            coercions.push(Coercion {
                path: path.to_string(),
                found,
            });
            Ok(())
        }
    }
}

/// Keep anchor tokens, drop tags that may not fit the new value.
fn anchors_only(properties: &str) -> Option<String> {
    let anchors: Vec<&str> = properties
        .split_whitespace()
        .filter(|token| token.starts_with('&'))
        .collect();
    if anchors.is_empty() {
        None
    } else {
        Some(anchors.join(" "))
    }
}

fn insert_entry(mapping: &mut Mapping, mut entry: Entry) -> usize {
    // Comments in an otherwise empty mapping belong above its first key.
    if mapping.entries.is_empty() {
        entry.leading = std::mem::take(&mut mapping.trailing);
    }
    mapping.entries.push(entry);
    mapping.entries.len() - 1
}

/// Parse the value of an entry kept as raw source lines.
fn entry_value(entry: &Entry, block: &RawBlock) -> Option<Value> {
    let head = entry.source.as_deref()?;
    let mut snippet = String::new();
    for line in std::iter::once(head).chain(block.lines.iter().map(String::as_str)) {
        let spaces = line.len() - line.trim_start_matches(' ').len();
        snippet.push_str(&line[spaces.min(entry.indent)..]);
        snippet.push('\n');
    }

    let parsed: serde_yaml::Mapping = serde_yaml::from_str(&snippet).ok()?;
    parsed.into_iter().next().map(|(_, value)| value)
}

/// Decode a block or multi-line scalar from its source lines.
fn decode_block(entry: &Entry, block: &RawBlock) -> Option<String> {
    scalar_text(&entry_value(entry, block)?)
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

/// A flow mapping (`{name: web}`) met on the way to the leaf.
enum FlowMapping {
    /// Only scalar keys and values: rewritten as a block mapping.
    Block(Mapping),
    /// Holds nested collections or non-string keys.
    Nested,
}

/// Rewrite a parsed flow mapping as a block mapping at `indent`.
///
/// Returns `None` when `value` is not a mapping at all.
fn block_mapping(value: Value, indent: usize) -> Option<FlowMapping> {
    let Value::Mapping(pairs) = value else {
        return None;
    };
    let mut mapping = Mapping::block(indent);
    for (key, value) in pairs {
        let Value::String(key) = key else {
            return Some(FlowMapping::Nested);
        };
        let scalar = match &value {
            Value::Null => Scalar::null(),
            Value::String(text) => render_scalar(text, QuotingPolicy::IfNeeded),
            other => match scalar_text(other) {
                Some(text) => Scalar::parse(&text),
                None => return Some(FlowMapping::Nested),
            },
        };
        mapping.entries.push(Entry::new(&key, indent, Node::Scalar(scalar)));
    }
    Some(FlowMapping::Block(mapping))
}

/// Expand a document root written as a flow mapping.
///
/// Comment lines around the mapping are kept above and below it.
fn expand_flow_root(root: &Node) -> Option<FlowMapping> {
    let Node::Raw(block) = root else {
        return None;
    };
    if block.kind != RawKind::FlowCollection {
        return None;
    }
    let value: Value = serde_yaml::from_str(&block.lines.join("\n")).ok()?;
    let FlowMapping::Block(mut mapping) = block_mapping(value, 0)? else {
        return Some(FlowMapping::Nested);
    };

    let lines = &block.lines;
    match mapping.entries.first_mut() {
        Some(first) => {
            let head = lines.iter().take_while(|line| is_trivia(line)).count();
            let tail = lines.iter().rev().take_while(|line| is_trivia(line)).count();
            first.leading = lines[..head].to_vec();
            mapping.trailing = lines[lines.len() - tail..].to_vec();
        }
        None => mapping.trailing = trivia_lines(lines),
    }
    Some(FlowMapping::Block(mapping))
}

fn is_trivia(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.is_empty() || trimmed.starts_with('#')
}

fn trivia_lines(lines: &[String]) -> Vec<String> {
    lines.iter().filter(|line| is_trivia(line)).cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::{dump, load};

    fn path(text: &str) -> FieldPath {
        text.parse().unwrap()
    }

    fn replace() -> UpsertOptions {
        UpsertOptions {
            coercion: CoercionPolicy::Replace,
            ..Default::default()
        }
    }

    #[test]
    fn test_insert_appends_last() {
        let mut doc = load("b: 1\na: 2\n").unwrap();
        let result = upsert(&mut doc, &path("c"), "3", UpsertOptions::default()).unwrap();
        assert_eq!(result.action, Action::Inserted);
        assert_eq!(result.previous, None);
        assert!(result.changed);
        assert_eq!(dump(&doc), "b: 1\na: 2\nc: \"3\"\n");
    }

    #[test]
    fn test_update_keeps_position() {
        let text = "applications:\n  stack: cflinuxfs3\n  name: web\n  memory: 1G\n";
        let mut doc = load(text).unwrap();
        let result =
            upsert(&mut doc, &path("applications.stack"), "cflinuxfs4", UpsertOptions::default())
                .unwrap();
        assert_eq!(result.action, Action::Updated);
        assert_eq!(result.previous.as_deref(), Some("cflinuxfs3"));
        assert_eq!(
            dump(&doc),
            "applications:\n  stack: cflinuxfs4\n  name: web\n  memory: 1G\n"
        );
    }

    #[test]
    fn test_second_upsert_is_a_no_op() {
        let text = "# header\napp:\n  name: web   # keep\n\n  env:\n    A: 1\n";
        let mut doc = load(text).unwrap();
        upsert(&mut doc, &path("app.stack"), "python", UpsertOptions::default()).unwrap();
        let first = dump(&doc);

        let mut again = load(&first).unwrap();
        let result = upsert(&mut again, &path("app.stack"), "python", UpsertOptions::default())
            .unwrap();
        assert_eq!(result.action, Action::Updated);
        assert_eq!(result.previous.as_deref(), Some("python"));
        assert!(!result.changed);
        assert_eq!(dump(&again), first);
    }

    #[test]
    fn test_creates_missing_intermediates() {
        let mut doc = load("name: web\n").unwrap();
        let result =
            upsert(&mut doc, &path("deploy.env.STACK"), "python", UpsertOptions::default())
                .unwrap();
        assert_eq!(result.action, Action::Inserted);
        assert!(result.coercions.is_empty());
        assert_eq!(dump(&doc), "name: web\ndeploy:\n  env:\n    STACK: python\n");
    }

    #[test]
    fn test_null_intermediate_is_replaced_silently() {
        let mut doc = load("app:\nname: web\n").unwrap();
        let result = upsert(&mut doc, &path("app.stack"), "python", UpsertOptions::default())
            .unwrap();
        assert!(result.coercions.is_empty());
        assert_eq!(dump(&doc), "app:\n  stack: python\nname: web\n");
    }

    #[test]
    fn test_coercion_rejected_by_default() {
        let mut doc = load("applications:\n- name: web\n").unwrap();
        let err = upsert(&mut doc, &path("applications.stack"), "python", UpsertOptions::default())
            .unwrap_err();
        match err {
            Error::CoercionRejected { path, found } => {
                assert_eq!(path, "applications");
                assert_eq!(found, "Sequence");
            }
            other => panic!("expected CoercionRejected, got {:?}", other),
        }
    }

    #[test]
    fn test_coercion_replace_records_and_logs() {
        testing_logger::setup();
        let mut doc = load("applications:\n- name: web\nowner: ops\n").unwrap();
        let result = upsert(&mut doc, &path("applications.stack"), "python", replace()).unwrap();

        assert_eq!(
            result.coercions,
            vec![Coercion {
                path: "applications".to_string(),
                found: "Sequence",
            }]
        );
        assert_eq!(dump(&doc), "applications:\n  stack: python\nowner: ops\n");
        testing_logger::validate(|captured| {
            assert!(captured
                .iter()
                .any(|log| log.level == log::Level::Warn && log.body.contains("applications")));
        });
    }

    #[test]
    fn test_scalar_intermediate_coercion() {
        let mut doc = load("app: web\n").unwrap();
        let result = upsert(&mut doc, &path("app.stack"), "python", replace()).unwrap();
        assert_eq!(result.coercions[0].found, "Scalar");
        assert_eq!(dump(&doc), "app:\n  stack: python\n");
    }

    #[test]
    fn test_container_at_leaf_is_a_coercion() {
        let text = "stack:\n  name: cflinuxfs3\n";
        let mut doc = load(text).unwrap();
        assert!(matches!(
            upsert(&mut doc, &path("stack"), "python", UpsertOptions::default()),
            Err(Error::CoercionRejected { .. })
        ));

        let mut doc = load(text).unwrap();
        let result = upsert(&mut doc, &path("stack"), "python", replace()).unwrap();
        assert_eq!(result.action, Action::Updated);
        assert_eq!(result.coercions[0].found, "Mapping");
        assert_eq!(dump(&doc), "stack: python\n");
    }

    #[test]
    fn test_non_mapping_root() {
        let mut doc = load("- a\n- b\n").unwrap();
        assert!(upsert(&mut doc, &path("stack"), "python", UpsertOptions::default()).is_err());

        let mut doc = load("- a\n- b\n").unwrap();
        let result = upsert(&mut doc, &path("stack"), "python", replace()).unwrap();
        assert_eq!(result.coercions[0].path, ROOT_LABEL);
        assert_eq!(dump(&doc), "stack: python\n");
    }

    #[test]
    fn test_empty_document_becomes_mapping() {
        let mut doc = load("").unwrap();
        upsert(&mut doc, &path("a.b"), "c", UpsertOptions::default()).unwrap();
        assert_eq!(dump(&doc), "a:\n  b: c\n");
    }

    #[test]
    fn test_comment_only_document_keeps_header() {
        let mut doc = load("# managed by platform\n").unwrap();
        upsert(&mut doc, &path("stack"), "python", UpsertOptions::default()).unwrap();
        assert_eq!(dump(&doc), "# managed by platform\nstack: python\n");
    }

    #[test]
    fn test_block_scalar_leaf_is_updated() {
        let text = "notes: |\n  first\n  second\nname: web\n";
        let mut doc = load(text).unwrap();
        let result = upsert(&mut doc, &path("notes"), "short", UpsertOptions::default()).unwrap();
        assert_eq!(result.action, Action::Updated);
        assert_eq!(result.previous.as_deref(), Some("first\nsecond\n"));
        assert_eq!(dump(&doc), "notes: short\nname: web\n");
    }

    #[test]
    fn test_insert_after_block_scalar_keeps_its_hash_lines() {
        let text = "app:\n  script: |\n    echo hi\n    # done\n";
        let mut doc = load(text).unwrap();
        upsert(&mut doc, &path("app.stack"), "python", UpsertOptions::default()).unwrap();
        let output = dump(&doc);
        assert_eq!(output, "app:\n  script: |\n    echo hi\n    # done\n  stack: python\n");

        let parsed: serde_yaml::Value = serde_yaml::from_str(&output).unwrap();
        assert_eq!(parsed["app"]["script"].as_str(), Some("echo hi\n# done\n"));
    }

    #[test]
    fn test_next_line_scalar_leaf_is_updated() {
        let text = "description:\n  a long\n  text\nname: web\n";
        let mut doc = load(text).unwrap();
        let result =
            upsert(&mut doc, &path("description"), "short", UpsertOptions::default()).unwrap();
        assert_eq!(result.action, Action::Updated);
        assert_eq!(result.previous.as_deref(), Some("a long text"));
        assert!(result.coercions.is_empty());
        assert_eq!(dump(&doc), "description: short\nname: web\n");
    }

    #[test]
    fn test_next_line_scalar_with_same_value_is_a_no_op() {
        let text = "description:\n  a long\n  text\nname: web\n";
        let mut doc = load(text).unwrap();
        let result =
            upsert(&mut doc, &path("description"), "a long text", UpsertOptions::default())
                .unwrap();
        assert!(!result.changed);
        assert_eq!(result.previous.as_deref(), Some("a long text"));
        assert_eq!(dump(&doc), text);
    }

    #[test]
    fn test_flow_mapping_intermediate_is_rewritten_in_block_style() {
        let text = "app: {name: web, memory: 1G, port: '8080'}  # inline\nowner: ops\n";
        let mut doc = load(text).unwrap();
        let result = upsert(&mut doc, &path("app.stack"), "python", UpsertOptions::default())
            .unwrap();
        assert_eq!(result.action, Action::Inserted);
        assert!(result.coercions.is_empty());
        assert_eq!(
            dump(&doc),
            "app:  # inline\n  name: web\n  memory: 1G\n  port: \"8080\"\n  stack: python\nowner: ops\n"
        );
    }

    #[test]
    fn test_flow_mapping_leaf_sibling_is_updated() {
        let mut doc = load("app: {name: web, stack: cflinuxfs3}\n").unwrap();
        let result = upsert(&mut doc, &path("app.stack"), "cflinuxfs4", replace()).unwrap();
        assert_eq!(result.action, Action::Updated);
        assert_eq!(result.previous.as_deref(), Some("cflinuxfs3"));
        assert!(result.coercions.is_empty());
        assert_eq!(dump(&doc), "app:\n  name: web\n  stack: cflinuxfs4\n");
    }

    #[test]
    fn test_nested_flow_mapping_is_never_discarded() {
        let text = "app: {name: web, env: {A: 1}}\n";
        for options in [UpsertOptions::default(), replace()] {
            let mut doc = load(text).unwrap();
            let err = upsert(&mut doc, &path("app.stack"), "python", options).unwrap_err();
            match err {
                Error::UneditableValue { path, .. } => assert_eq!(path, "app"),
                other => panic!("expected UneditableValue, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_flow_mapping_root_is_rewritten_in_block_style() {
        let mut doc = load("# header\n{name: web}\n").unwrap();
        upsert(&mut doc, &path("stack"), "python", UpsertOptions::default()).unwrap();
        assert_eq!(dump(&doc), "# header\nname: web\nstack: python\n");
    }

    #[test]
    fn test_string_tagged_scalar_with_same_value_is_a_no_op() {
        let text = "port: !!str 8080\n";
        let mut doc = load(text).unwrap();
        let result = upsert(&mut doc, &path("port"), "8080", UpsertOptions::default()).unwrap();
        assert!(!result.changed);
        assert_eq!(dump(&doc), text);
    }

    #[test]
    fn test_typed_scalar_is_rewritten_as_string() {
        let mut doc = load("version: 1.10\n").unwrap();
        let result = upsert(&mut doc, &path("version"), "1.10", UpsertOptions::default()).unwrap();
        assert!(result.changed);
        assert_eq!(dump(&doc), "version: \"1.10\"\n");
    }

    #[test]
    fn test_tag_dropped_anchor_kept_on_rewrite() {
        let mut doc = load("port: !!int 8080\n").unwrap();
        upsert(&mut doc, &path("port"), "http", UpsertOptions::default()).unwrap();
        assert_eq!(dump(&doc), "port: http\n");
    }

    #[test]
    fn test_only_first_document_is_edited() {
        let text = "---\na: 1\n---\na: 1\n";
        let mut doc = load(text).unwrap();
        upsert(&mut doc, &path("a"), "2", UpsertOptions::default()).unwrap();
        assert_eq!(dump(&doc), "---\na: \"2\"\n---\na: 1\n");
    }

    #[test]
    fn test_siblings_keep_their_quoting() {
        let text = "app:\n  owner: '@ops'\n  team: \"core\"\n  region: eu\n";
        let mut doc = load(text).unwrap();
        upsert(&mut doc, &path("app.stack"), "python", UpsertOptions::default()).unwrap();
        assert_eq!(
            dump(&doc),
            "app:\n  owner: '@ops'\n  team: \"core\"\n  region: eu\n  stack: python\n"
        );
    }
}
