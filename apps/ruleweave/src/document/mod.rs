//! Source documents.
//!
//! A `SourceDocument` is immutable once parsed: raw text, the unresolved
//! value tree, parse diagnostics, and a path -> text range index. Parsing
//! goes through the `Parser` trait; the default parser is picked from the
//! source extension (`.json` -> JSON, anything else -> YAML).

pub mod json;
pub mod pointer;
pub mod yaml;

use crate::models::{JsonPath, Position, Range, Segment};
use serde_json::Value as Json;
use std::collections::HashMap;

pub use json::JsonParser;
pub use yaml::YamlParser;

/// Identity used for documents without a source (piped input).
pub const STDIN: &str = "<stdin>";

pub(crate) static NULL: Json = Json::Null;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseDiagnosticKind {
    Syntax,
    DuplicateKey,
    /// Mapping key that is not a string scalar.
    IncompatibleValue,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// A recoverable problem found while parsing.
pub struct ParseDiagnostic {
    pub kind: ParseDiagnosticKind,
    pub message: String,
    pub path: JsonPath,
    pub range: Range,
}

#[derive(Debug, Clone, Default)]
/// Raw parser output.
pub struct ParsedDocument {
    pub data: Json,
    pub diagnostics: Vec<ParseDiagnostic>,
    pub ranges: HashMap<JsonPath, Range>,
}

/// A structured-text parser producing a value tree plus a range index.
pub trait Parser: Send + Sync {
    fn parse(&self, text: &str) -> ParsedDocument;
}

static JSON_PARSER: JsonParser = JsonParser;
static YAML_PARSER: YamlParser = YamlParser;

/// Pick the parser for a document from its source extension.
pub fn parser_for(source: Option<&str>) -> &'static dyn Parser {
    let is_json = source
        .map(|s| s.split(['?', '#']).next().unwrap_or(s))
        .is_some_and(|s| s.to_ascii_lowercase().ends_with(".json"));
    if is_json {
        &JSON_PARSER
    } else {
        &YAML_PARSER
    }
}

#[derive(Debug, Clone)]
pub struct SourceDocument {
    source: Option<String>,
    text: String,
    data: Json,
    diagnostics: Vec<ParseDiagnostic>,
    ranges: HashMap<JsonPath, Range>,
}

impl SourceDocument {
    /// Parse `text` with an explicit parser.
    pub fn parse(text: impl Into<String>, source: Option<String>, parser: &dyn Parser) -> Self {
        let text = text.into();
        let parsed = parser.parse(&text);
        Self {
            source,
            text,
            data: parsed.data,
            diagnostics: parsed.diagnostics,
            ranges: parsed.ranges,
        }
    }

    /// Parse `text` with the parser matching the source extension.
    pub fn from_source(text: impl Into<String>, source: Option<String>) -> Self {
        let parser = parser_for(source.as_deref());
        Self::parse(text, source, parser)
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    /// Registry key: the source URI, or the stdin sentinel.
    pub fn key(&self) -> &str {
        self.source.as_deref().unwrap_or(STDIN)
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn data(&self) -> &Json {
        &self.data
    }

    pub fn diagnostics(&self) -> &[ParseDiagnostic] {
        &self.diagnostics
    }

    /// Text range of the node at `path`. With `closest`, falls back to the
    /// nearest ancestor that has a range.
    pub fn range_for_path(&self, path: &[Segment], closest: bool) -> Option<Range> {
        if let Some(r) = self.ranges.get(path) {
            return Some(*r);
        }
        if !closest {
            return None;
        }
        let mut prefix = path.to_vec();
        while prefix.pop().is_some() {
            if let Some(r) = self.ranges.get(&prefix) {
                return Some(*r);
            }
        }
        None
    }

    /// Range spanning the whole text.
    pub fn document_range(&self) -> Range {
        Range::new(Position::new(0, 0), end_of_text(&self.text))
    }
}

pub(crate) fn end_of_text(text: &str) -> Position {
    let mut line = 0;
    let mut character = 0;
    for ch in text.chars() {
        if ch == '\n' {
            line += 1;
            character = 0;
        } else {
            character += 1;
        }
    }
    Position::new(line, character)
}

/// Child segment of `node` matching `seg`, normalized to the container kind.
pub fn child_segment(node: &Json, seg: &Segment) -> Option<Segment> {
    match node {
        Json::Object(map) => {
            let key = seg.as_key();
            map.contains_key(key.as_ref())
                .then(|| Segment::Key(key.into_owned()))
        }
        Json::Array(items) => seg
            .as_index()
            .filter(|i| *i < items.len())
            .map(Segment::Index),
        _ => None,
    }
}

fn child<'a>(node: &'a Json, seg: &Segment) -> Option<&'a Json> {
    match node {
        Json::Object(map) => map.get(seg.as_key().as_ref()),
        Json::Array(items) => seg.as_index().and_then(|i| items.get(i)),
        _ => None,
    }
}

/// Value at `path`, accepting decimal keys for array indices.
pub fn get_value<'a>(root: &'a Json, path: &[Segment]) -> Option<&'a Json> {
    path.iter().try_fold(root, |node, seg| child(node, seg))
}

/// Longest prefix of `path` that exists in `root`, normalized.
pub fn closest_path(root: &Json, path: &[Segment]) -> JsonPath {
    let mut out = Vec::new();
    let mut node = root;
    for seg in path {
        match child_segment(node, seg) {
            Some(s) => {
                node = child(node, &s).unwrap_or(&NULL);
                out.push(s);
            }
            None => break,
        }
    }
    out
}

/// The `$ref` string of a reference object, if `node` is one.
pub fn ref_of(node: &Json) -> Option<&str> {
    node.as_object()?.get("$ref")?.as_str()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parser_for_extension() {
        let doc = SourceDocument::from_source("{\"a\": 1}", Some("/tmp/x.JSON".into()));
        assert_eq!(doc.data(), &json!({"a": 1}));
        let doc = SourceDocument::from_source("a: 1\n", Some("/tmp/x.yaml".into()));
        assert_eq!(doc.data(), &json!({"a": 1}));
        let doc = SourceDocument::from_source("a: 1\n", None);
        assert_eq!(doc.key(), STDIN);
    }

    #[test]
    fn test_get_value_and_closest_path() {
        let root = json!({"a": {"b": [10, {"c": true}]}});
        let path: JsonPath = vec!["a".into(), "b".into(), "1".into(), "c".into()];
        assert_eq!(get_value(&root, &path), Some(&json!(true)));
        let missing: JsonPath = vec!["a".into(), "b".into(), "1".into(), "zzz".into()];
        assert_eq!(
            closest_path(&root, &missing),
            vec![Segment::from("a"), Segment::from("b"), Segment::Index(1)]
        );
    }

    #[test]
    fn test_range_for_path_falls_back_to_ancestor() {
        let doc = SourceDocument::from_source("{\n  \"a\": {\n    \"b\": 1\n  }\n}", Some("d.json".into()));
        let exact = doc.range_for_path(&["a".into(), "b".into()], false).unwrap();
        assert_eq!(exact.start, Position::new(2, 4));
        let missing = vec![Segment::from("a"), Segment::from("nope")];
        assert!(doc.range_for_path(&missing, false).is_none());
        let closest = doc.range_for_path(&missing, true).unwrap();
        assert_eq!(closest.start, Position::new(1, 2));
    }

    #[test]
    fn test_document_range_spans_text() {
        let doc = SourceDocument::from_source("a: 1\nbb: 2", None);
        assert_eq!(doc.document_range().end, Position::new(1, 5));
    }

    #[test]
    fn test_text_is_kept_verbatim_after_parse_errors() {
        let text = "a: 1\nb: 'open\n";
        let doc = SourceDocument::from_source(text, Some("/d.yaml".into()));
        assert_eq!(doc.text(), text);
        assert_eq!(doc.data()["a"], 1);
        assert_eq!(doc.diagnostics()[0].kind, ParseDiagnosticKind::Syntax);
    }
}
