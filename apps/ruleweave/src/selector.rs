//! Node selection for rule `given` expressions.
//!
//! The default engine understands a JSONPath subset: `$`, `.name`, `.*`,
//! `..` recursive descent, and bracket steps with quoted names, indices
//! (negative counts from the end), slices, `*` and comma unions. Filter
//! expressions are rejected as unsupported.

use crate::error::SelectorError;
use crate::models::{JsonPath, Segment};
use serde_json::Value as Json;

#[derive(Debug, Clone, PartialEq)]
/// A matched node and its path from the evaluated root.
pub struct Match<'v> {
    pub path: JsonPath,
    pub value: &'v Json,
}

/// Evaluate a selector expression against a tree.
pub trait Selector: Send + Sync {
    fn select<'v>(&self, expression: &str, root: &'v Json) -> Result<Vec<Match<'v>>, SelectorError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct JsonPathSelector;

impl Selector for JsonPathSelector {
    fn select<'v>(&self, expression: &str, root: &'v Json) -> Result<Vec<Match<'v>>, SelectorError> {
        let steps = parse(expression)?;
        let mut current = vec![Match {
            path: Vec::new(),
            value: root,
        }];
        for step in &steps {
            let mut next = Vec::new();
            for m in current {
                if step.recursive {
                    let mut all = Vec::new();
                    descend(m, &mut all);
                    for node in all {
                        apply(&step.selector, node, &mut next);
                    }
                } else {
                    apply(&step.selector, m, &mut next);
                }
            }
            current = next;
        }
        Ok(current)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Item {
    Name(String),
    Index(i64),
    Slice(Option<i64>, Option<i64>),
}

#[derive(Debug, Clone, PartialEq)]
enum StepSelector {
    Wildcard,
    Union(Vec<Item>),
}

#[derive(Debug, Clone, PartialEq)]
struct Step {
    recursive: bool,
    selector: StepSelector,
}

fn descend<'v>(m: Match<'v>, out: &mut Vec<Match<'v>>) {
    let value = m.value;
    let path = m.path.clone();
    out.push(m);
    match value {
        Json::Object(map) => {
            for (k, v) in map {
                let mut p = path.clone();
                p.push(Segment::Key(k.clone()));
                descend(Match { path: p, value: v }, out);
            }
        }
        Json::Array(items) => {
            for (i, v) in items.iter().enumerate() {
                let mut p = path.clone();
                p.push(Segment::Index(i));
                descend(Match { path: p, value: v }, out);
            }
        }
        _ => {}
    }
}

fn child<'v>(m: &Match<'v>, seg: Segment, value: &'v Json, out: &mut Vec<Match<'v>>) {
    let mut path = m.path.clone();
    path.push(seg);
    out.push(Match { path, value });
}

fn apply<'v>(selector: &StepSelector, m: Match<'v>, out: &mut Vec<Match<'v>>) {
    match (selector, m.value) {
        (StepSelector::Wildcard, Json::Object(map)) => {
            for (k, v) in map {
                child(&m, Segment::Key(k.clone()), v, out);
            }
        }
        (StepSelector::Wildcard, Json::Array(items)) => {
            for (i, v) in items.iter().enumerate() {
                child(&m, Segment::Index(i), v, out);
            }
        }
        (StepSelector::Union(items), node) => {
            for item in items {
                select_item(item, &m, node, out);
            }
        }
        _ => {}
    }
}

fn select_item<'v>(item: &Item, m: &Match<'v>, node: &'v Json, out: &mut Vec<Match<'v>>) {
    match (item, node) {
        (Item::Name(name), Json::Object(map)) => {
            if let Some(v) = map.get(name) {
                child(m, Segment::Key(name.clone()), v, out);
            }
        }
        (Item::Name(name), Json::Array(items)) => {
            if let Some((i, v)) = name.parse::<usize>().ok().and_then(|i| items.get(i).map(|v| (i, v))) {
                child(m, Segment::Index(i), v, out);
            }
        }
        (Item::Index(i), Json::Array(items)) => {
            let len = items.len() as i64;
            let idx = if *i < 0 { len + i } else { *i };
            if (0..len).contains(&idx) {
                let idx = idx as usize;
                child(m, Segment::Index(idx), &items[idx], out);
            }
        }
        (Item::Index(i), Json::Object(map)) => {
            let key = i.to_string();
            if let Some(v) = map.get(&key) {
                child(m, Segment::Key(key), v, out);
            }
        }
        (Item::Slice(start, end), Json::Array(items)) => {
            let len = items.len() as i64;
            let clamp = |v: i64| if v < 0 { (len + v).max(0) } else { v.min(len) };
            let from = start.map(clamp).unwrap_or(0);
            let to = end.map(clamp).unwrap_or(len);
            for idx in from..to {
                let idx = idx as usize;
                child(m, Segment::Index(idx), &items[idx], out);
            }
        }
        _ => {}
    }
}

struct Cursor<'a> {
    expression: &'a str,
    chars: Vec<char>,
    pos: usize,
}

impl Cursor<'_> {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn eat(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn error(&self, message: impl Into<String>) -> SelectorError {
        SelectorError::Syntax {
            expression: self.expression.to_string(),
            message: format!("{} at offset {}", message.into(), self.pos),
        }
    }

    fn unsupported(&self, feature: &str) -> SelectorError {
        SelectorError::Unsupported {
            expression: self.expression.to_string(),
            feature: feature.to_string(),
        }
    }

    fn name(&mut self) -> String {
        let mut out = String::new();
        while let Some(c) = self.peek() {
            if c == '.' || c == '[' {
                break;
            }
            out.push(c);
            self.pos += 1;
        }
        out
    }

    fn quoted(&mut self, quote: char) -> Result<String, SelectorError> {
        let mut out = String::new();
        loop {
            match self.peek() {
                None => return Err(self.error("unterminated string")),
                Some('\\') => {
                    self.pos += 1;
                    match self.peek() {
                        Some(c) => out.push(c),
                        None => return Err(self.error("unterminated string")),
                    }
                    self.pos += 1;
                }
                Some(c) if c == quote => {
                    self.pos += 1;
                    return Ok(out);
                }
                Some(c) => {
                    out.push(c);
                    self.pos += 1;
                }
            }
        }
    }

    fn integer(&mut self) -> Option<i64> {
        let start = self.pos;
        if self.peek() == Some('-') {
            self.pos += 1;
        }
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.pos += 1;
        }
        let raw: String = self.chars[start..self.pos].iter().collect();
        match raw.parse() {
            Ok(n) => Some(n),
            Err(_) => {
                self.pos = start;
                None
            }
        }
    }

    fn bracket(&mut self) -> Result<StepSelector, SelectorError> {
        self.skip_ws();
        if self.peek() == Some('?') || self.peek() == Some('(') {
            return Err(self.unsupported("filter and script expressions"));
        }
        if self.eat('*') {
            self.skip_ws();
            if !self.eat(']') {
                return Err(self.error("expected ']'"));
            }
            return Ok(StepSelector::Wildcard);
        }
        let mut items = Vec::new();
        loop {
            self.skip_ws();
            let item = match self.peek() {
                Some(q @ ('\'' | '"')) => {
                    self.pos += 1;
                    Item::Name(self.quoted(q)?)
                }
                Some(c) if c == '-' || c == ':' || c.is_ascii_digit() => {
                    let start = self.integer();
                    self.skip_ws();
                    if self.eat(':') {
                        self.skip_ws();
                        let end = self.integer();
                        self.skip_ws();
                        if self.peek() == Some(':') {
                            return Err(self.unsupported("slice steps"));
                        }
                        Item::Slice(start, end)
                    } else {
                        match start {
                            Some(i) => Item::Index(i),
                            None => return Err(self.error("expected an index")),
                        }
                    }
                }
                _ => return Err(self.error("expected a name, index or '*'")),
            };
            items.push(item);
            self.skip_ws();
            if self.eat(',') {
                continue;
            }
            if self.eat(']') {
                return Ok(StepSelector::Union(items));
            }
            return Err(self.error("expected ',' or ']'"));
        }
    }
}

fn parse(expression: &str) -> Result<Vec<Step>, SelectorError> {
    let mut cur = Cursor {
        expression,
        chars: expression.trim().chars().collect(),
        pos: 0,
    };
    if !cur.eat('$') {
        return Err(cur.error("expression must start with '$'"));
    }
    let mut steps = Vec::new();
    while let Some(c) = cur.peek() {
        match c {
            '.' => {
                cur.pos += 1;
                let recursive = cur.eat('.');
                let selector = if cur.eat('*') {
                    StepSelector::Wildcard
                } else if recursive && cur.eat('[') {
                    cur.bracket()?
                } else {
                    let name = cur.name();
                    if name.is_empty() {
                        return Err(cur.error("expected a member name"));
                    }
                    StepSelector::Union(vec![Item::Name(name)])
                };
                steps.push(Step {
                    recursive,
                    selector,
                });
            }
            '[' => {
                cur.pos += 1;
                let selector = cur.bracket()?;
                steps.push(Step {
                    recursive: false,
                    selector,
                });
            }
            _ => return Err(cur.error(format!("unexpected character '{c}'"))),
        }
    }
    Ok(steps)
}
