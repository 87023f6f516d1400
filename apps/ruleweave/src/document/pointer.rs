//! JSON Pointer and `$ref` helpers.

use crate::error::PointerError;
use crate::models::{JsonPath, Segment};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
/// A parsed `$ref` value: optional document part plus a JSON Pointer.
pub struct RefPointer {
    /// Document part before `#`; `None` for a local reference.
    pub source: Option<String>,
    /// Pointer part after `#`; empty for the document root.
    pub pointer: String,
}

impl RefPointer {
    /// Split and validate a reference such as `common.yaml#/components/a`.
    pub fn parse(reference: &str) -> Result<Self, PointerError> {
        let (source, pointer) = match reference.split_once('#') {
            Some((s, p)) => (s, p),
            None => (reference, ""),
        };
        if !pointer.is_empty() && !pointer.starts_with('/') {
            return Err(PointerError::Malformed {
                pointer: pointer.to_string(),
            });
        }
        Ok(Self {
            source: (!source.is_empty()).then(|| source.to_string()),
            pointer: pointer.to_string(),
        })
    }

    pub fn is_local(&self) -> bool {
        self.source.is_none()
    }

    /// Path segments addressed by the pointer part.
    pub fn path(&self) -> JsonPath {
        split_pointer(&self.pointer)
    }
}

/// Convert a JSON Pointer (optionally `#`-prefixed) into path segments.
pub fn pointer_to_path(pointer: &str) -> Result<JsonPath, PointerError> {
    let pointer = pointer.strip_prefix('#').unwrap_or(pointer);
    if !pointer.is_empty() && !pointer.starts_with('/') {
        return Err(PointerError::Malformed {
            pointer: pointer.to_string(),
        });
    }
    Ok(split_pointer(pointer))
}

fn split_pointer(pointer: &str) -> JsonPath {
    if pointer.is_empty() {
        return Vec::new();
    }
    pointer
        .split('/')
        .skip(1)
        .map(|s| Segment::Key(decode_fragment(s)))
        .collect()
}

/// Decode one pointer fragment: percent-encoding, then `~1` and `~0`.
pub fn decode_fragment(fragment: &str) -> String {
    let decoded = urlencoding::decode(fragment)
        .map(|c| c.into_owned())
        .unwrap_or_else(|_| fragment.to_string());
    decoded.replace("~1", "/").replace("~0", "~")
}

/// Escape one segment for use inside a JSON Pointer.
pub fn encode_segment(segment: &Segment) -> String {
    segment.as_key().replace('~', "~0").replace('/', "~1")
}

/// Render a path as a JSON Pointer (`/a/b`), empty for the root.
pub fn path_to_pointer(path: &[Segment]) -> String {
    let mut out = String::new();
    for seg in path {
        out.push('/');
        out.push_str(&encode_segment(seg));
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrintStyle {
    /// `info.contact.name`
    Dot,
    /// `#/info/contact/name`
    EscapedPointer,
}

/// Render a path for human-facing messages.
pub fn print_path(path: &[Segment], style: PrintStyle) -> String {
    match style {
        PrintStyle::Dot => path
            .iter()
            .map(|s| s.as_key().into_owned())
            .collect::<Vec<_>>()
            .join("."),
        PrintStyle::EscapedPointer => format!("#{}", path_to_pointer(path)),
    }
}
