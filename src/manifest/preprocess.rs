//! Line preprocessing ahead of YAML parsing
//!
//! YAML refuses plain scalars that start with `@` or a backtick, and silently
//! reinterprets values starting with `!`, `&`, `*` or `#` as tags, anchors,
//! aliases or comments. Manifests written by hand often contain exactly such
//! values (`owner: @platform-team`). This pass wraps them in double quotes
//! before the text reaches the parser.
//!
//! The pass is line-local: it never tracks indentation or block boundaries.
//! It only rewrites the value part of lines that contain a key/value
//! separator, and it is idempotent because a quoted value is never touched
//! again.

use std::borrow::Cow;
use std::collections::HashSet;
use std::sync::OnceLock;

use log::debug;
use regex::Regex;

/// First characters that force a value to be quoted.
pub const RESERVED_LEADING: [char; 6] = ['@', '`', '!', '&', '*', '#'];

fn anchor_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r#"&([^\s,\[\]{}"'\\]+)"#).expect("valid anchor regex"))
}

fn alias_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r#"\*([^\s,\[\]{}"'\\]+)"#).expect("valid alias regex"))
}

/// Anchor and alias names that occur anywhere in a file.
///
/// Collected from the raw text (quoted or not), so quoting a value never
/// changes the sets and a second pass takes the same decisions.
struct NodeReferences {
    anchors: HashSet<String>,
    aliases: HashSet<String>,
}

impl NodeReferences {
    fn scan(text: &str) -> Self {
        let collect = |pattern: &Regex| {
            pattern
                .captures_iter(text)
                .map(|caps| caps[1].to_string())
                .collect::<HashSet<_>>()
        };
        Self {
            anchors: collect(anchor_pattern()),
            aliases: collect(alias_pattern()),
        }
    }
}

/// Preprocess a whole manifest and return the normalized text.
///
/// Line endings are normalized to `\n` and the result always ends with a
/// newline unless it is empty.
pub fn preprocess(raw: &str) -> String {
    let lines = preprocess_lines(raw);
    if lines.is_empty() {
        return String::new();
    }
    let mut text = lines.join("\n");
    text.push('\n');
    text
}

/// Preprocess a manifest into individual lines (without terminators).
pub fn preprocess_lines(raw: &str) -> Vec<String> {
    let references = NodeReferences::scan(raw);
    raw.lines()
        .enumerate()
        .map(|(index, line)| match protect_line(line, &references) {
            Cow::Borrowed(line) => line.to_string(),
            Cow::Owned(fixed) => {
                debug!("line {}: quoted value: {}", index + 1, fixed.trim());
                fixed
            }
        })
        .collect()
}

fn protect_line<'a>(line: &'a str, references: &NodeReferences) -> Cow<'a, str> {
    let content = line.trim_start();
    if content.is_empty() || content.starts_with('#') {
        return Cow::Borrowed(line);
    }
    if content.len() == line.len()
        && (is_marker(line, "---") || is_marker(line, "...") || line.starts_with('%'))
    {
        return Cow::Borrowed(line);
    }

    let prefix_len = line.len() - strip_list_markers(content).len();
    let content = &line[prefix_len..];
    let Some(separator) = find_separator(content) else {
        return Cow::Borrowed(line);
    };

    let after = &content[separator + 1..];
    let body = after.trim_start();
    let value_start = prefix_len + separator + 1 + (after.len() - body.len());
    if body.is_empty() || body.starts_with('"') || body.starts_with('\'') {
        return Cow::Borrowed(line);
    }

    let Some(first) = body.chars().next() else {
        return Cow::Borrowed(line);
    };
    if !RESERVED_LEADING.contains(&first) {
        return Cow::Borrowed(line);
    }

    let rest = &body[first.len_utf8()..];
    let keep = match first {
        // `key: # note` is a null value with a comment
        '#' => rest.is_empty() || rest.starts_with(char::is_whitespace),
        '!' => rest.starts_with('!'),
        '&' => {
            let name = leading_name(rest);
            !name.is_empty() && references.aliases.contains(name)
        }
        '*' => {
            let (value, _) = split_comment(body);
            let name = &value[1..];
            !name.is_empty()
                && !name.contains(char::is_whitespace)
                && references.anchors.contains(name)
        }
        _ => false,
    };
    if keep {
        return Cow::Borrowed(line);
    }

    // A value starting with `#` has no inline comment before it.
    let (value, tail) = if first == '#' {
        let (value, tail) = split_comment(rest);
        (&body[..1 + value.len()], tail)
    } else {
        split_comment(body)
    };

    let mut fixed = String::with_capacity(line.len() + 2);
    fixed.push_str(&line[..value_start]);
    fixed.push('"');
    fixed.push_str(&escape_double(value));
    fixed.push('"');
    fixed.push_str(tail);
    Cow::Owned(fixed)
}

fn leading_name(text: &str) -> &str {
    let end = text
        .find(|c: char| c.is_whitespace() || matches!(c, ',' | '[' | ']' | '{' | '}'))
        .unwrap_or(text.len());
    &text[..end]
}

fn is_marker(line: &str, marker: &str) -> bool {
    line.strip_prefix(marker)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with(char::is_whitespace))
}

/// Strip `- ` list markers (possibly nested, as in `- - key: v`).
pub(crate) fn strip_list_markers(mut content: &str) -> &str {
    while let Some(rest) = content.strip_prefix('-') {
        if rest.starts_with(' ') || rest.starts_with('\t') {
            content = rest.trim_start();
        } else {
            break;
        }
    }
    content
}

/// Byte index of the key/value separator in `content`, which must start at
/// the key.
///
/// The separator is a `:` followed by whitespace or the end of the line,
/// outside a quoted key. Flow collections and comments have no separator.
pub(crate) fn find_separator(content: &str) -> Option<usize> {
    let bytes = content.as_bytes();
    let mut index = 0;

    match bytes.first()? {
        b'"' | b'\'' => {
            let quote = bytes[0];
            index = 1;
            while index < bytes.len() {
                if bytes[index] == b'\\' && quote == b'"' {
                    index += 2;
                    continue;
                }
                if bytes[index] == quote {
                    if quote == b'\'' && bytes.get(index + 1) == Some(&b'\'') {
                        index += 2;
                        continue;
                    }
                    break;
                }
                index += 1;
            }
            index += 1;
        }
        b'{' | b'[' | b'#' | b'?' => return None,
        _ => {}
    }

    while index < bytes.len() {
        match bytes[index] {
            b':' => {
                let next = bytes.get(index + 1);
                if next.is_none() || matches!(next, Some(b' ') | Some(b'\t')) {
                    return Some(index);
                }
            }
            b'#' if index > 0 && matches!(bytes[index - 1], b' ' | b'\t') => return None,
            _ => {}
        }
        index += 1;
    }
    None
}

/// Split an inline value from a trailing comment.
///
/// Returns the value without trailing whitespace and the remainder (the
/// whitespace plus the comment, or just trailing whitespace).
pub(crate) fn split_comment(body: &str) -> (&str, &str) {
    let bytes = body.as_bytes();
    let mut cut = body.len();
    for index in 1..bytes.len() {
        if bytes[index] == b'#' && matches!(bytes[index - 1], b' ' | b'\t') {
            cut = index;
            break;
        }
    }
    let value = body[..cut].trim_end();
    (value, &body[value.len()..])
}

/// Escape a string for use inside YAML double quotes.
pub(crate) fn escape_double(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c if c.is_control() => out.push_str(&format!("\\u{:04X}", c as u32)),
            c => out.push(c),
        }
    }
    out
}


#[cfg(test)]
mod proptest_tests {
    use super::*;
    use proptest::prelude::*;

    fn line_strategy() -> impl Strategy<Value = String> {
        let indent = prop::sample::select(vec!["", "  ", "    ", "- ", "  - "]);
        let key = "[a-z_]{1,8}";
        let lead = prop::sample::select(vec!["", "@", "`", "!", "!!", "&", "*", "#", "# ", "\"", "'"]);
        let value = "[a-zA-Z0-9 .:@#\"-]{0,12}";
        (indent, key, lead, value).prop_map(|(indent, key, lead, value)| {
            format!("{}{}: {}{}", indent, key, lead, value)
        })
    }

    proptest! {
        /// Property: running the pass on its own output changes nothing
        #[test]
        fn preprocess_is_idempotent(lines in prop::collection::vec(line_strategy(), 1..8)) {
            let text = lines.join("\n");
            let once = preprocess(&text);
            let twice = preprocess(&once);
            prop_assert_eq!(twice, once);
        }

        /// Property: the pass never changes the number of lines
        #[test]
        fn preprocess_preserves_line_count(lines in prop::collection::vec(line_strategy(), 1..8)) {
            let text = lines.join("\n");
            prop_assert_eq!(preprocess_lines(&text).len(), lines.len());
        }
    }
}
