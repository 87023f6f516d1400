//! Shared data models for diagnostics, lint reports, and ruleset definitions.

pub mod definition;
pub mod severity;

pub use severity::{RuleSeverity, Severity};

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
/// One step of a path into a document: an object key or an array index.
pub enum Segment {
    Index(usize),
    Key(String),
}

/// Ordered sequence of segments addressing a node inside a document.
pub type JsonPath = Vec<Segment>;

impl Segment {
    /// Key view of the segment; indices are rendered in decimal.
    pub fn as_key(&self) -> std::borrow::Cow<'_, str> {
        match self {
            Self::Key(k) => std::borrow::Cow::Borrowed(k.as_str()),
            Self::Index(i) => std::borrow::Cow::Owned(i.to_string()),
        }
    }

    /// Index view of the segment, parsing keys that are plain decimals.
    pub fn as_index(&self) -> Option<usize> {
        match self {
            Self::Index(i) => Some(*i),
            Self::Key(k) => k.parse().ok(),
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key(k) => f.write_str(k),
            Self::Index(i) => write!(f, "{i}"),
        }
    }
}

impl From<&str> for Segment {
    fn from(value: &str) -> Self {
        Self::Key(value.to_string())
    }
}

impl From<String> for Segment {
    fn from(value: String) -> Self {
        Self::Key(value)
    }
}

impl From<usize> for Segment {
    fn from(value: usize) -> Self {
        Self::Index(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
/// Zero-based line/character position in a source text.
pub struct Position {
    pub line: usize,
    pub character: usize,
}

impl Position {
    pub const fn new(line: usize, character: usize) -> Self {
        Self { line, character }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
/// Text range covered by a node or a diagnostic.
pub struct Range {
    pub start: Position,
    pub end: Position,
}

impl Range {
    /// Range used when a path cannot be mapped back to text.
    pub const DEFAULT: Self = Self {
        start: Position::new(0, 0),
        end: Position::new(0, 0),
    };

    pub const fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}",
            self.start.line + 1,
            self.start.character + 1
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// A located, severity-tagged lint result.
pub struct Diagnostic {
    pub code: String,
    pub message: String,
    pub path: JsonPath,
    pub severity: Severity,
    pub range: Range,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
/// Aggregated lint summary used by printers.
pub struct Summary {
    pub errors: usize,
    pub warnings: usize,
    pub infos: usize,
    pub hints: usize,
    pub files: usize,
}

#[derive(Debug, Default, Clone, Serialize)]
/// Lint results container.
pub struct LintReport {
    pub diagnostics: Vec<Diagnostic>,
    pub summary: Summary,
}

impl LintReport {
    /// Build a report, counting diagnostics per severity.
    pub fn new(diagnostics: Vec<Diagnostic>, files: usize) -> Self {
        let mut summary = Summary {
            files,
            ..Summary::default()
        };
        for d in &diagnostics {
            match d.severity {
                Severity::Error => summary.errors += 1,
                Severity::Warning => summary.warnings += 1,
                Severity::Information => summary.infos += 1,
                Severity::Hint => summary.hints += 1,
            }
        }
        Self {
            diagnostics,
            summary,
        }
    }

    /// True when any diagnostic is at least as severe as `threshold`.
    pub fn fails_at(&self, threshold: Severity) -> bool {
        self.diagnostics.iter().any(|d| d.severity <= threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diag(severity: Severity) -> Diagnostic {
        Diagnostic {
            code: "c".into(),
            message: "m".into(),
            path: vec![],
            severity,
            range: Range::DEFAULT,
            source: None,
        }
    }

    #[test]
    fn test_segment_serializes_untagged() {
        let path: JsonPath = vec!["paths".into(), 3usize.into()];
        let out = serde_json::to_value(&path).unwrap();
        assert_eq!(out, serde_json::json!(["paths", 3]));
    }

    #[test]
    fn test_report_counts_and_threshold() {
        let report = LintReport::new(
            vec![diag(Severity::Warning), diag(Severity::Hint), diag(Severity::Warning)],
            2,
        );
        assert_eq!(report.summary.warnings, 2);
        assert_eq!(report.summary.hints, 1);
        assert_eq!(report.summary.errors, 0);
        assert!(!report.fails_at(Severity::Error));
        assert!(report.fails_at(Severity::Warning));
    }
}
