//! Inline markup codec.
//!
//! Message text may embed rich elements (mentions, images, ...) as bracketed
//! tags of the form `[CQ:<name>,<key>=<value>,...]`.  This module converts
//! between the flat wire string and a structured sequence of [`Segment`]s.
//!
//! # Grammar
//!
//! Tag names and parameter keys are restricted to `[A-Za-z0-9_.-]+`.  The
//! four reserved characters are escaped inside text and parameter values:
//!
//! | char | escape   |
//! |------|----------|
//! | `&`  | `&amp;`  |
//! | `[`  | `&#91;`  |
//! | `]`  | `&#93;`  |
//! | `,`  | `&#44;`  (parameter values only) |
//!
//! Encoding applies the replacements in the order listed; decoding applies
//! the exact reverse order, so escape sequences survive a round trip
//! unchanged.
//!
//! # Round-trip laws
//!
//! - `parse(stringify(x)) == x` for any sequence of non-empty segments.
//! - `stringify(parse(s)) == s` for any `s` that `stringify` produced.

use std::fmt;

use thiserror::Error;

/// Errors surfaced by the markup codec.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MarkupError {
    /// A `[CQ:` span that does not match the tag grammar (unterminated,
    /// nested bracket, parameter without `=`, or a bad identifier).
    #[error("malformed markup tag at byte {offset}")]
    MalformedTag {
        /// Byte offset of the offending `[` in the input string.
        offset: usize,
    },

    /// A tag name or parameter key outside `[A-Za-z0-9_.-]+`.
    #[error("invalid tag identifier {0:?}")]
    InvalidIdentifier(String),
}

fn is_identifier(s: &str) -> bool {
    !s.is_empty()
        && s.bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'.' | b'-'))
}

// ─── Escaping ─────────────────────────────────────────────────────────────────

/// Escapes plain text for embedding between tags (`&`, `[`, `]`).
pub fn escape_text(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('[', "&#91;")
        .replace(']', "&#93;")
}

/// Escapes a tag parameter value (`&`, `[`, `]`, `,`).
pub fn escape_value(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('[', "&#91;")
        .replace(']', "&#93;")
        .replace(',', "&#44;")
}

/// Decodes escape sequences; exact inverse of [`escape_value`] (and of
/// [`escape_text`], which emits a subset of the same sequences).
pub fn unescape(s: &str) -> String {
    s.replace("&#44;", ",")
        .replace("&#93;", "]")
        .replace("&#91;", "[")
        .replace("&amp;", "&")
}

// ─── Tag ──────────────────────────────────────────────────────────────────────

/// One embedded rich element: a validated name plus ordered parameters.
///
/// Parameter order is preserved so that serializing a parsed tag reproduces
/// the original wire text byte-for-byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    name: String,
    params: Vec<(String, String)>,
}

impl Tag {
    /// Creates a tag with no parameters, validating the name.
    pub fn new(name: impl Into<String>) -> Result<Self, MarkupError> {
        let name = name.into();
        if !is_identifier(&name) {
            return Err(MarkupError::InvalidIdentifier(name));
        }
        Ok(Self {
            name,
            params: Vec::new(),
        })
    }

    /// Appends a parameter, validating the key.  Values are arbitrary text;
    /// they are escaped on serialization.
    pub fn param(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<Self, MarkupError> {
        let key = key.into();
        if !is_identifier(&key) {
            return Err(MarkupError::InvalidIdentifier(key));
        }
        self.params.push((key, value.into()));
        Ok(self)
    }

    /// The canonical mention tag, `[CQ:at,qq=<user_id>]`.
    pub fn at(user_id: i64) -> Self {
        Self {
            name: "at".to_owned(),
            params: vec![("qq".to_owned(), user_id.to_string())],
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the first value for `key`, if present.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[CQ:{}", self.name)?;
        for (key, value) in &self.params {
            write!(f, ",{}={}", key, escape_value(value))?;
        }
        f.write_str("]")
    }
}

// ─── Segment ──────────────────────────────────────────────────────────────────

/// One element of a decoded message body, in source order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// A decoded (unescaped) plain-text span.
    Text(String),
    /// An embedded markup tag.
    Tag(Tag),
}

impl Segment {
    pub fn text(text: impl Into<String>) -> Self {
        Segment::Text(text.into())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Segment::Text(t) => Some(t),
            Segment::Tag(_) => None,
        }
    }

    pub fn as_tag(&self) -> Option<&Tag> {
        match self {
            Segment::Text(_) => None,
            Segment::Tag(t) => Some(t),
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Text(t) => f.write_str(&escape_text(t)),
            Segment::Tag(t) => t.fmt(f),
        }
    }
}

// ─── Codec ────────────────────────────────────────────────────────────────────

/// Splits a wire string into decoded text spans and parsed tags.
///
/// A `[` that does not open a `[CQ:` span is ordinary text (it only reaches
/// us unescaped when a remote peer produced sloppy output, and rejecting the
/// whole message for it would be worse than passing it through).  A `[CQ:`
/// span that does not match the grammar fails with
/// [`MarkupError::MalformedTag`].
pub fn parse(raw: &str) -> Result<Vec<Segment>, MarkupError> {
    let mut segments = Vec::new();
    let mut rest = raw;
    let mut offset = 0;

    while !rest.is_empty() {
        match rest.find("[CQ:") {
            None => {
                segments.push(Segment::Text(unescape(rest)));
                break;
            }
            Some(0) => {
                let close = rest
                    .find(']')
                    .ok_or(MarkupError::MalformedTag { offset })?;
                let body = &rest[4..close];
                let tag = parse_tag_body(body)
                    .ok_or(MarkupError::MalformedTag { offset })?;
                segments.push(Segment::Tag(tag));
                rest = &rest[close + 1..];
                offset += close + 1;
            }
            Some(text_len) => {
                segments.push(Segment::Text(unescape(&rest[..text_len])));
                rest = &rest[text_len..];
                offset += text_len;
            }
        }
    }

    Ok(segments)
}

fn parse_tag_body(body: &str) -> Option<Tag> {
    if body.contains('[') {
        return None;
    }
    let mut parts = body.split(',');
    let name = parts.next()?;
    if !is_identifier(name) {
        return None;
    }
    let mut params = Vec::new();
    for part in parts {
        let (key, value) = part.split_once('=')?;
        if !is_identifier(key) {
            return None;
        }
        params.push((key.to_owned(), unescape(value)));
    }
    Some(Tag {
        name: name.to_owned(),
        params,
    })
}

/// Serializes a segment sequence back into the wire string.
pub fn stringify(segments: &[Segment]) -> String {
    segments.iter().map(ToString::to_string).collect()
}

/// Decodes only the plain-text spans of `raw`, discarding all tags.
pub fn extract_plain_text(raw: &str) -> Result<String, MarkupError> {
    Ok(parse(raw)?
        .iter()
        .filter_map(Segment::as_text)
        .collect())
}
