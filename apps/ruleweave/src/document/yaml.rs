//! YAML parsing on top of the `yaml-rust2` event stream.
//!
//! The value tree is assembled from marked parser events, so every key and
//! sequence item gets its own range, flow style (`{a: 1}`, `[1, 2]`)
//! included. Duplicate keys are reported and the last value wins. A syntax
//! error stops the event stream; whatever was built up to that point is
//! kept so rules still see the readable part of the document.

use super::{end_of_text, ParseDiagnostic, ParseDiagnosticKind, ParsedDocument, Parser};
use crate::models::{JsonPath, Position, Range, Segment};
use regex::Regex;
use serde_json::{Map, Number, Value as Json};
use std::collections::HashMap;
use std::sync::OnceLock;
use yaml_rust2::parser::{Event, MarkedEventReceiver, Parser as EventParser, Tag};
use yaml_rust2::scanner::{Marker, ScanError, TScalarStyle};

#[derive(Debug, Default, Clone, Copy)]
pub struct YamlParser;

impl Parser for YamlParser {
    fn parse(&self, text: &str) -> ParsedDocument {
        let mut log = EventLog::default();
        let error = EventParser::new_from_str(text).load(&mut log, false).err();

        let source = Source::new(text);
        let tail = error
            .as_ref()
            .map(|e| position(e.marker()))
            .unwrap_or_else(|| end_of_text(text));
        let mut builder = Builder::new(&source);
        for (i, (event, mark)) in log.0.iter().enumerate() {
            let next = log.0.get(i + 1).map(|(_, m)| position(m)).unwrap_or(tail);
            builder.on_event(event, position(mark), next);
        }
        if let Some(err) = &error {
            builder.syntax_error(err);
        }
        builder.finish(text)
    }
}

#[derive(Default)]
struct EventLog(Vec<(Event, Marker)>);

impl MarkedEventReceiver for EventLog {
    fn on_event(&mut self, ev: Event, mark: Marker) {
        self.0.push((ev, mark));
    }
}

fn position(mark: &Marker) -> Position {
    Position::new(mark.line().saturating_sub(1), mark.col())
}

/// Text split into lines of chars, addressed by `Position`.
struct Source {
    lines: Vec<Vec<char>>,
}

impl Source {
    fn new(text: &str) -> Self {
        Self {
            lines: text.split('\n').map(|l| l.chars().collect()).collect(),
        }
    }

    fn char_at(&self, p: Position) -> Option<char> {
        self.lines.get(p.line).and_then(|l| l.get(p.character)).copied()
    }

    fn advance(&self, p: Position) -> Position {
        match self.lines.get(p.line) {
            Some(l) if p.character < l.len() => Position::new(p.line, p.character + 1),
            _ => Position::new(p.line + 1, 0),
        }
    }

    fn retreat(&self, p: Position) -> Option<Position> {
        if p.character > 0 {
            let len = self.lines.get(p.line).map_or(0, Vec::len);
            return Some(Position::new(p.line, p.character.min(len + 1) - 1));
        }
        let line = p.line.checked_sub(1)?;
        Some(Position::new(line, self.lines.get(line).map_or(0, Vec::len)))
    }

    fn starts_with(&self, p: Position, value: &str) -> bool {
        let Some(line) = self.lines.get(p.line) else {
            return false;
        };
        let mut at = p.character;
        for ch in value.chars() {
            if line.get(at) != Some(&ch) {
                return false;
            }
            at += 1;
        }
        true
    }

    /// End of the token starting at `start` (aliases).
    fn token_end(&self, start: Position) -> Position {
        let mut p = start;
        while let Some(c) = self.char_at(p) {
            if c.is_whitespace() || matches!(c, ',' | ']' | '}') {
                break;
            }
            p = self.advance(p);
        }
        p
    }

    /// Last non-blank character before `next`, not before `start`.
    fn trim_back(&self, start: Position, next: Position) -> Position {
        let mut p = next;
        while let Some(prev) = self.retreat(p) {
            if prev < start {
                break;
            }
            match self.char_at(prev) {
                Some(c) if !c.is_whitespace() => return self.advance(prev),
                _ => p = prev,
            }
        }
        start
    }

    fn quoted_end(&self, start: Position, quote: char, next: Position) -> Position {
        let mut p = self.advance(start);
        while p.line < self.lines.len() {
            match self.char_at(p) {
                Some('\\') if quote == '"' => p = self.advance(self.advance(p)),
                Some(c) if c == quote => {
                    let after = self.advance(p);
                    if quote == '\'' && self.char_at(after) == Some('\'') {
                        p = self.advance(after);
                        continue;
                    }
                    return after;
                }
                _ => p = self.advance(p),
            }
        }
        next
    }

    fn scalar_end(&self, start: Position, style: TScalarStyle, value: &str, next: Position) -> Position {
        match style {
            TScalarStyle::SingleQuoted => self.quoted_end(start, '\'', next),
            TScalarStyle::DoubleQuoted => self.quoted_end(start, '"', next),
            TScalarStyle::Plain if self.starts_with(start, value) => {
                Position::new(start.line, start.character + value.chars().count())
            }
            // Empty values are reported as `~` with no text behind them.
            TScalarStyle::Plain if value == "~" || value.is_empty() => start,
            _ => self.trim_back(start, next),
        }
    }
}

static INT: OnceLock<Option<Regex>> = OnceLock::new();
static FLOAT: OnceLock<Option<Regex>> = OnceLock::new();

fn matches(cell: &'static OnceLock<Option<Regex>>, pattern: &str, text: &str) -> bool {
    cell.get_or_init(|| Regex::new(pattern).ok())
        .as_ref()
        .is_some_and(|re| re.is_match(text))
}

/// Core-schema resolution of a plain scalar. `.inf` and `.nan` have no JSON
/// counterpart and stay strings.
fn plain_value(v: &str) -> Json {
    match v {
        "" | "~" | "null" | "Null" | "NULL" => return Json::Null,
        "true" | "True" | "TRUE" => return Json::Bool(true),
        "false" | "False" | "FALSE" => return Json::Bool(false),
        _ => {}
    }
    if matches(&INT, r"^[-+]?[0-9]+$", v) {
        if let Ok(n) = v.parse::<i64>() {
            return Json::Number(n.into());
        }
        if let Ok(n) = v.trim_start_matches('+').parse::<u64>() {
            return Json::Number(n.into());
        }
    }
    let radix = v
        .strip_prefix("0x")
        .map(|d| (d, 16))
        .or_else(|| v.strip_prefix("0o").map(|d| (d, 8)));
    if let Some((digits, radix)) = radix {
        if let Ok(n) = i64::from_str_radix(digits, radix) {
            return Json::Number(n.into());
        }
    }
    if matches(&FLOAT, r"^[-+]?(\.[0-9]+|[0-9]+(\.[0-9]*)?)([eE][-+]?[0-9]+)?$", v) {
        if let Some(n) = v.parse::<f64>().ok().and_then(Number::from_f64) {
            return Json::Number(n);
        }
    }
    Json::String(v.to_string())
}

fn is_core_tag(tag: &Tag) -> bool {
    tag.handle == "!!" || tag.handle == "tag:yaml.org,2002:"
}

fn scalar_value(value: &str, style: TScalarStyle, tag: Option<&Tag>) -> Json {
    match tag {
        Some(t) if is_core_tag(t) && t.suffix == "str" => return Json::String(value.to_string()),
        Some(t) if is_core_tag(t) && t.suffix == "null" => return Json::Null,
        _ => {}
    }
    if style == TScalarStyle::Plain {
        plain_value(value)
    } else {
        Json::String(value.to_string())
    }
}

fn kind_name(value: &Json) -> &'static str {
    match value {
        Json::Null => "null",
        Json::Bool(_) => "boolean",
        Json::Number(_) => "number",
        Json::String(_) => "string",
        Json::Array(_) => "sequence",
        Json::Object(_) => "mapping",
    }
}

fn with(path: &[Segment], seg: Segment) -> JsonPath {
    let mut out = path.to_vec();
    out.push(seg);
    out
}

#[derive(Debug)]
enum Slot {
    Key,
    Value { name: String, start: Position },
    /// Value of a key that could not be used.
    Skip,
}

#[derive(Debug)]
enum Body {
    Mapping { map: Map<String, Json>, slot: Slot },
    Sequence(Vec<Json>),
}

#[derive(Debug)]
struct Frame {
    body: Body,
    path: JsonPath,
    /// False inside complex keys, whose nodes have no path.
    indexed: bool,
    start: Position,
    end: Position,
    anchor: usize,
}

struct Node {
    value: Json,
    start: Position,
    end: Position,
    /// Source text of a scalar, used when it appears as a key.
    raw: Option<String>,
}

struct Builder<'s> {
    source: &'s Source,
    frames: Vec<Frame>,
    root: Option<Json>,
    anchors: HashMap<usize, Json>,
    ranges: HashMap<JsonPath, Range>,
    diagnostics: Vec<ParseDiagnostic>,
}

impl<'s> Builder<'s> {
    fn new(source: &'s Source) -> Self {
        Self {
            source,
            frames: Vec::new(),
            root: None,
            anchors: HashMap::new(),
            ranges: HashMap::new(),
            diagnostics: Vec::new(),
        }
    }

    fn on_event(&mut self, event: &Event, at: Position, next: Position) {
        match event {
            Event::Scalar(value, style, anchor, tag) => {
                let json = scalar_value(value, *style, tag.as_ref());
                if *anchor > 0 {
                    self.anchors.insert(*anchor, json.clone());
                }
                let end = self.source.scalar_end(at, *style, value, next);
                self.attach(Node {
                    value: json,
                    start: at,
                    end,
                    raw: Some(value.clone()),
                });
            }
            Event::Alias(id) => {
                let value = self.anchors.get(id).cloned().unwrap_or(Json::Null);
                let end = self.source.token_end(at);
                self.attach(Node {
                    value,
                    start: at,
                    end,
                    raw: None,
                });
            }
            Event::MappingStart(anchor, _) => self.open(
                Body::Mapping {
                    map: Map::new(),
                    slot: Slot::Key,
                },
                at,
                *anchor,
            ),
            Event::SequenceStart(anchor, _) => self.open(Body::Sequence(Vec::new()), at, *anchor),
            Event::MappingEnd | Event::SequenceEnd => {
                let Some(frame) = self.frames.pop() else {
                    return;
                };
                let end = match self.source.char_at(at) {
                    Some('}' | ']') => self.source.advance(at),
                    _ => frame.end,
                };
                let node = self.close(frame, end);
                self.attach(node);
            }
            _ => {}
        }
    }

    fn open(&mut self, body: Body, start: Position, anchor: usize) {
        let (path, indexed) = match self.frames.last() {
            None => (Vec::new(), true),
            Some(f) if !f.indexed => (Vec::new(), false),
            Some(f) => match &f.body {
                Body::Mapping {
                    slot: Slot::Value { name, .. },
                    ..
                } => (with(&f.path, Segment::from(name.as_str())), true),
                Body::Mapping { .. } => (Vec::new(), false),
                Body::Sequence(items) => (with(&f.path, Segment::Index(items.len())), true),
            },
        };
        self.frames.push(Frame {
            body,
            path,
            indexed,
            start,
            end: start,
            anchor,
        });
    }

    fn close(&mut self, frame: Frame, end: Position) -> Node {
        let value = match frame.body {
            Body::Mapping { map, .. } => Json::Object(map),
            Body::Sequence(items) => Json::Array(items),
        };
        if frame.anchor > 0 {
            self.anchors.insert(frame.anchor, value.clone());
        }
        Node {
            value,
            start: frame.start,
            end,
            raw: None,
        }
    }

    fn attach(&mut self, node: Node) {
        let Some(frame) = self.frames.last_mut() else {
            if self.root.is_none() {
                self.root = Some(node.value);
            }
            return;
        };
        frame.end = frame.end.max(node.end);
        match &mut frame.body {
            Body::Sequence(items) => {
                if frame.indexed {
                    self.ranges.insert(
                        with(&frame.path, Segment::Index(items.len())),
                        Range::new(node.start, node.end),
                    );
                }
                items.push(node.value);
            }
            Body::Mapping { map, slot } => match std::mem::replace(slot, Slot::Key) {
                Slot::Key => {
                    *slot = key_slot(
                        node,
                        map,
                        &frame.path,
                        frame.indexed,
                        &mut self.ranges,
                        &mut self.diagnostics,
                    );
                }
                Slot::Value { name, start } => {
                    if frame.indexed {
                        self.ranges.insert(
                            with(&frame.path, Segment::from(name.as_str())),
                            Range::new(start, node.end),
                        );
                    }
                    map.insert(name, node.value);
                }
                Slot::Skip => {}
            },
        }
    }

    fn syntax_error(&mut self, err: &ScanError) {
        let at = position(err.marker());
        let path = self.frames.last().map(|f| f.path.clone()).unwrap_or_default();
        self.diagnostics.push(ParseDiagnostic {
            kind: ParseDiagnosticKind::Syntax,
            message: err.info().to_string(),
            path,
            range: Range::new(at, self.source.advance(at)),
        });
    }

    fn finish(mut self, text: &str) -> ParsedDocument {
        while let Some(frame) = self.frames.pop() {
            let end = frame.end;
            let node = self.close(frame, end);
            self.attach(node);
        }
        self.ranges.insert(
            Vec::new(),
            Range::new(Position::new(0, 0), end_of_text(text)),
        );
        ParsedDocument {
            data: self.root.unwrap_or(Json::Null),
            diagnostics: self.diagnostics,
            ranges: self.ranges,
        }
    }
}

/// Turn a key node into the slot awaiting its value.
fn key_slot(
    node: Node,
    map: &Map<String, Json>,
    path: &[Segment],
    indexed: bool,
    ranges: &mut HashMap<JsonPath, Range>,
    diagnostics: &mut Vec<ParseDiagnostic>,
) -> Slot {
    let range = Range::new(node.start, node.end);
    let kind = kind_name(&node.value);
    let name = match node.value {
        Json::String(s) => s,
        Json::Array(_) | Json::Object(_) => {
            diagnostics.push(ParseDiagnostic {
                kind: ParseDiagnosticKind::IncompatibleValue,
                message: format!("Mapping key must be a string scalar rather than {kind}"),
                path: path.to_vec(),
                range,
            });
            return Slot::Skip;
        }
        other => {
            let name = match (&other, node.raw) {
                (Json::Null, _) => "null".to_string(),
                (_, Some(raw)) => raw,
                (_, None) => other.to_string(),
            };
            diagnostics.push(ParseDiagnostic {
                kind: ParseDiagnosticKind::IncompatibleValue,
                message: format!("Mapping key must be a string scalar rather than {kind}"),
                path: with(path, Segment::from(name.as_str())),
                range,
            });
            name
        }
    };
    if map.contains_key(&name) {
        let at = with(path, Segment::from(name.as_str()));
        if indexed {
            ranges.retain(|p, _| !p.starts_with(&at));
        }
        diagnostics.push(ParseDiagnostic {
            kind: ParseDiagnosticKind::DuplicateKey,
            message: format!("Duplicate key: {name}"),
            path: at,
            range,
        });
    }
    Slot::Value {
        name,
        start: node.start,
    }
}
