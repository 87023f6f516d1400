//! Position-tracking JSON parser.
//!
//! Accepts `//` and `/* */` comments. Duplicate keys are reported and the
//! last occurrence wins. On the first syntax error the partial tree built so
//! far is kept and parsing stops.

use super::{end_of_text, ParseDiagnostic, ParseDiagnosticKind, ParsedDocument, Parser};
use crate::models::{JsonPath, Position, Range, Segment};
use serde_json::{Map, Number, Value as Json};
use std::collections::HashMap;

#[derive(Debug, Default, Clone, Copy)]
pub struct JsonParser;

impl Parser for JsonParser {
    fn parse(&self, text: &str) -> ParsedDocument {
        let mut scanner = Scanner::new(text);
        scanner.skip_trivia();
        let data = if scanner.at_end() {
            Json::Null
        } else {
            let mut path = Vec::new();
            let value = scanner.value(&mut path);
            scanner.skip_trivia();
            if !scanner.failed && !scanner.at_end() {
                scanner.fail("End of file expected");
            }
            value
        };
        let Scanner {
            diagnostics,
            mut ranges,
            ..
        } = scanner;
        ranges.insert(
            Vec::new(),
            Range::new(Position::new(0, 0), end_of_text(text)),
        );
        ParsedDocument {
            data,
            diagnostics,
            ranges,
        }
    }
}

struct Scanner {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    col: usize,
    failed: bool,
    diagnostics: Vec<ParseDiagnostic>,
    ranges: HashMap<JsonPath, Range>,
    /// Path of the node being parsed, used for syntax diagnostics.
    current: JsonPath,
}

impl Scanner {
    fn new(text: &str) -> Self {
        Self {
            chars: text.chars().collect(),
            pos: 0,
            line: 0,
            col: 0,
            failed: false,
            diagnostics: Vec::new(),
            ranges: HashMap::new(),
            current: Vec::new(),
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn position(&self) -> Position {
        Position::new(self.line, self.col)
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += 1;
        if ch == '\n' {
            self.line += 1;
            self.col = 0;
        } else {
            self.col += 1;
        }
        Some(ch)
    }

    fn fail(&mut self, message: &str) {
        if self.failed {
            return;
        }
        self.failed = true;
        let at = self.position();
        let end = if self.at_end() {
            at
        } else {
            Position::new(at.line, at.character + 1)
        };
        self.diagnostics.push(ParseDiagnostic {
            kind: ParseDiagnosticKind::Syntax,
            message: message.to_string(),
            path: self.current.clone(),
            range: Range::new(at, end),
        });
    }

    fn skip_trivia(&mut self) {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() || c == '\u{feff}' => {
                    self.bump();
                }
                Some('/') if self.peek_at(1) == Some('/') => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                Some('/') if self.peek_at(1) == Some('*') => {
                    self.bump();
                    self.bump();
                    loop {
                        match self.peek() {
                            None => {
                                self.fail("Unexpected end of comment");
                                return;
                            }
                            Some('*') if self.peek_at(1) == Some('/') => {
                                self.bump();
                                self.bump();
                                break;
                            }
                            Some(_) => {
                                self.bump();
                            }
                        }
                    }
                }
                _ => return,
            }
        }
    }

    fn value(&mut self, path: &mut JsonPath) -> Json {
        self.current = path.clone();
        let start = self.position();
        let value = match self.peek() {
            Some('{') => self.object(path),
            Some('[') => self.array(path),
            Some('"') => match self.string() {
                Some(s) => Json::String(s),
                None => Json::Null,
            },
            Some(c) if c == '-' || c.is_ascii_digit() => self.number(),
            Some(c) if c.is_ascii_alphabetic() => self.literal(),
            Some(_) => {
                self.fail("Value expected");
                Json::Null
            }
            None => {
                self.fail("Unexpected end of input, value expected");
                Json::Null
            }
        };
        self.ranges
            .insert(path.clone(), Range::new(start, self.position()));
        value
    }

    fn object(&mut self, path: &mut JsonPath) -> Json {
        let mut map = Map::new();
        self.bump();
        self.skip_trivia();
        if self.peek() == Some('}') {
            self.bump();
            return Json::Object(map);
        }
        loop {
            if self.failed {
                return Json::Object(map);
            }
            self.skip_trivia();
            if self.peek() != Some('"') {
                self.fail("Property name expected");
                return Json::Object(map);
            }
            let key_start = self.position();
            let Some(key) = self.string() else {
                return Json::Object(map);
            };
            let key_end = self.position();
            self.skip_trivia();
            if self.peek() != Some(':') {
                self.fail("Colon expected");
                return Json::Object(map);
            }
            self.bump();
            self.skip_trivia();

            path.push(Segment::Key(key.clone()));
            if map.contains_key(&key) {
                self.diagnostics.push(ParseDiagnostic {
                    kind: ParseDiagnosticKind::DuplicateKey,
                    message: format!("Duplicate key: {key}"),
                    path: path.clone(),
                    range: Range::new(key_start, key_end),
                });
            }
            let value = self.value(path);
            self.ranges
                .insert(path.clone(), Range::new(key_start, self.position()));
            path.pop();
            map.insert(key, value);
            if self.failed {
                return Json::Object(map);
            }

            self.skip_trivia();
            match self.peek() {
                Some(',') => {
                    self.bump();
                    self.skip_trivia();
                    if self.peek() == Some('}') {
                        self.fail("Property expected");
                        return Json::Object(map);
                    }
                }
                Some('}') => {
                    self.bump();
                    return Json::Object(map);
                }
                _ => {
                    self.current = path.clone();
                    self.fail("Comma expected");
                    return Json::Object(map);
                }
            }
        }
    }

    fn array(&mut self, path: &mut JsonPath) -> Json {
        let mut items = Vec::new();
        self.bump();
        self.skip_trivia();
        if self.peek() == Some(']') {
            self.bump();
            return Json::Array(items);
        }
        loop {
            self.skip_trivia();
            path.push(Segment::Index(items.len()));
            let value = self.value(path);
            path.pop();
            items.push(value);
            if self.failed {
                return Json::Array(items);
            }
            self.skip_trivia();
            match self.peek() {
                Some(',') => {
                    self.bump();
                    self.skip_trivia();
                    if self.peek() == Some(']') {
                        self.fail("Value expected");
                        return Json::Array(items);
                    }
                }
                Some(']') => {
                    self.bump();
                    return Json::Array(items);
                }
                _ => {
                    self.current = path.clone();
                    self.fail("Comma expected");
                    return Json::Array(items);
                }
            }
        }
    }

    fn string(&mut self) -> Option<String> {
        self.bump();
        let mut out = String::new();
        loop {
            match self.bump() {
                None | Some('\n') => {
                    self.fail("Unexpected end of string");
                    return None;
                }
                Some('"') => return Some(out),
                Some('\\') => match self.bump() {
                    Some('"') => out.push('"'),
                    Some('\\') => out.push('\\'),
                    Some('/') => out.push('/'),
                    Some('b') => out.push('\u{8}'),
                    Some('f') => out.push('\u{c}'),
                    Some('n') => out.push('\n'),
                    Some('r') => out.push('\r'),
                    Some('t') => out.push('\t'),
                    Some('u') => {
                        let ch = self.unicode_escape()?;
                        out.push(ch);
                    }
                    _ => {
                        self.fail("Invalid escape character in string");
                        return None;
                    }
                },
                Some(c) => out.push(c),
            }
        }
    }

    fn hex4(&mut self) -> Option<u32> {
        let mut code = 0u32;
        for _ in 0..4 {
            let digit = self.peek().and_then(|c| c.to_digit(16));
            match digit {
                Some(d) => {
                    self.bump();
                    code = code * 16 + d;
                }
                None => {
                    self.fail("Invalid unicode sequence in string");
                    return None;
                }
            }
        }
        Some(code)
    }

    fn unicode_escape(&mut self) -> Option<char> {
        let high = self.hex4()?;
        if (0xD800..0xDC00).contains(&high)
            && self.peek() == Some('\\')
            && self.peek_at(1) == Some('u')
        {
            self.bump();
            self.bump();
            let low = self.hex4()?;
            if (0xDC00..0xE000).contains(&low) {
                let code = 0x10000 + ((high - 0xD800) << 10) + (low - 0xDC00);
                return Some(char::from_u32(code).unwrap_or('\u{fffd}'));
            }
            return Some('\u{fffd}');
        }
        Some(char::from_u32(high).unwrap_or('\u{fffd}'))
    }

    fn number(&mut self) -> Json {
        let mut raw = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() || matches!(c, '-' | '+' | '.' | 'e' | 'E') {
                raw.push(c);
                self.bump();
            } else {
                break;
            }
        }
        match raw.parse::<Number>() {
            Ok(n) => Json::Number(n),
            Err(_) => {
                self.fail("Invalid number format");
                Json::Null
            }
        }
    }

    fn literal(&mut self) -> Json {
        let mut word = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '_' {
                word.push(c);
                self.bump();
            } else {
                break;
            }
        }
        match word.as_str() {
            "true" => Json::Bool(true),
            "false" => Json::Bool(false),
            "null" => Json::Null,
            _ => {
                self.fail("Invalid symbol");
                Json::Null
            }
        }
    }
}
