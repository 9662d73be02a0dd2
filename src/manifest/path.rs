//! Dotted field paths
//!
//! A [`FieldPath`] names the key an upsert writes, e.g. `applications.stack`.
//!
//! Supports:
//! - Dot notation: `foo.bar.baz`
//! - Bracket notation for keys containing dots: `labels["app.kubernetes.io/name"]`
//! - Escaped characters: `foo\.bar` (literal dot)
//!
//! Sequence indices (`items[0]`) are rejected; the engine only walks mappings.

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// A non-empty list of mapping keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldPath {
    segments: Vec<String>,
}

impl FieldPath {
    /// Parse a dotted path string.
    ///
    /// # Examples
    ///
    /// ```
    /// use manifest_sweep::manifest::FieldPath;
    ///
    /// let path = FieldPath::parse(r#"metadata.labels["app.kubernetes.io/name"]"#).unwrap();
    /// assert_eq!(path.segments(), ["metadata", "labels", "app.kubernetes.io/name"]);
    /// ```
    pub fn parse(input: &str) -> Result<Self> {
        let invalid = |reason: &str| Error::InvalidPath {
            path: input.to_string(),
            reason: reason.to_string(),
        };

        if input.trim().is_empty() {
            return Err(invalid("path is empty"));
        }

        let mut segments = Vec::new();
        let mut current = String::new();
        let mut chars = input.chars().peekable();
        let mut escaped = false;
        // The previous segment ended with `]`, so only `.` or `[` may follow.
        let mut closed = false;

        while let Some(ch) = chars.next() {
            if escaped {
                current.push(ch);
                escaped = false;
                continue;
            }

            match ch {
                '\\' => {
                    if closed {
                        return Err(invalid("expected '.' after ']'"));
                    }
                    escaped = true;
                }
                '.' => {
                    if current.is_empty() && !closed {
                        return Err(invalid("path contains an empty segment"));
                    }
                    if !current.is_empty() {
                        segments.push(std::mem::take(&mut current));
                    }
                    closed = false;
                }
                '[' => {
                    if !current.is_empty() {
                        segments.push(std::mem::take(&mut current));
                    }

                    let first_char = chars.peek().copied();
                    let key = if first_char == Some('"') || first_char == Some('\'') {
                        let quote_char = chars.next().unwrap_or('"');
                        let mut key = String::new();
                        let mut bracket_escaped = false;
                        let mut terminated = false;

                        while let Some(ch) = chars.next() {
                            if bracket_escaped {
                                key.push(ch);
                                bracket_escaped = false;
                            } else if ch == '\\' {
                                bracket_escaped = true;
                            } else if ch == quote_char && chars.peek() == Some(&']') {
                                chars.next();
                                terminated = true;
                                break;
                            } else {
                                key.push(ch);
                            }
                        }

                        if !terminated {
                            return Err(invalid("unterminated quoted segment"));
                        }
                        key
                    } else {
                        let mut bracket_content = String::new();
                        let mut terminated = false;
                        for next_ch in chars.by_ref() {
                            if next_ch == ']' {
                                terminated = true;
                                break;
                            }
                            bracket_content.push(next_ch);
                        }

                        if !terminated {
                            return Err(invalid("unterminated '['"));
                        }
                        let content = bracket_content.trim();
                        if content.parse::<usize>().is_ok() {
                            return Err(invalid("sequence indices are not supported"));
                        }
                        content.to_string()
                    };

                    if key.is_empty() {
                        return Err(invalid("path contains an empty segment"));
                    }
                    segments.push(key);
                    closed = true;
                }
                _ => {
                    if closed {
                        return Err(invalid("expected '.' after ']'"));
                    }
                    current.push(ch);
                }
            }
        }

        if escaped {
            return Err(invalid("path ends with a dangling escape"));
        }
        if !current.is_empty() {
            segments.push(current);
        } else if !closed {
            return Err(invalid("path ends with '.'"));
        }

        Ok(Self { segments })
    }

    /// Build a path from already-split segments.
    pub fn from_segments<I, S>(segments: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments: Vec<String> = segments.into_iter().map(Into::into).collect();
        if segments.is_empty() {
            return Err(Error::InvalidPath {
                path: String::new(),
                reason: "path is empty".to_string(),
            });
        }
        if segments.iter().any(String::is_empty) {
            return Err(Error::InvalidPath {
                path: segments.join("."),
                reason: "path contains an empty segment".to_string(),
            });
        }
        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Always false; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

impl FromStr for FieldPath {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, segment) in self.segments.iter().enumerate() {
            if segment.contains(['.', '[', ']', '\\']) {
                write!(f, "[\"{}\"]", segment.replace('\\', "\\\\").replace('"', "\\\""))?;
            } else {
                if index > 0 {
                    f.write_str(".")?;
                }
                f.write_str(segment)?;
            }
        }
        Ok(())
    }
}
