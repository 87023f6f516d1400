//! Ruleset file schema.
//!
//! A ruleset document declares:
//! - `rules`: rule definitions or overrides of inherited rules.
//! - `extends`: other rulesets, optionally with a mode (`off|recommended|all`).
//! - `functions`/`functionsDir`: custom functions bound from the host registry.
//! - `except`: `"<doc>#<pointer>"` locations exempted from named rules.
//! - `parserOptions`, `formats`, `documentationUrl`.

use super::RuleSeverity;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
/// A field declared either as a single value or as a sequence.
pub enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> OneOrMany<T> {
    /// Normalize to a sequence.
    pub fn into_vec(self) -> Vec<T> {
        match self {
            Self::Many(v) => v,
            Self::One(t) => vec![t],
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
/// How the rules of an extended ruleset are enabled in the extending one.
pub enum RulesetMode {
    Off,
    #[default]
    Recommended,
    All,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
/// An `extends` entry: a URI, or a `[uri, mode]` pair.
pub enum ExtendsEntry {
    Uri(String),
    WithMode(String, RulesetMode),
}

impl ExtendsEntry {
    pub fn uri(&self) -> &str {
        match self {
            Self::Uri(u) | Self::WithMode(u, _) => u,
        }
    }

    pub fn mode(&self) -> RulesetMode {
        match self {
            Self::Uri(_) => RulesetMode::default(),
            Self::WithMode(_, m) => *m,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
/// A `functions` entry: a name, or a `[name, optionsSchema]` pair.
pub enum FunctionDeclaration {
    Name(String),
    WithSchema(String, Json),
}

impl FunctionDeclaration {
    pub fn name(&self) -> &str {
        match self {
            Self::Name(n) | Self::WithSchema(n, _) => n,
        }
    }

    pub fn schema(&self) -> Option<&Json> {
        match self {
            Self::Name(_) => None,
            Self::WithSchema(_, s) => Some(s),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
/// Severities applied to specific parser diagnostics.
pub struct ParserOptions {
    #[serde(default = "error_severity")]
    pub duplicate_keys: RuleSeverity,
    #[serde(default = "error_severity")]
    pub incompatible_values: RuleSeverity,
}

fn error_severity() -> RuleSeverity {
    RuleSeverity::Error
}

impl Default for ParserOptions {
    fn default() -> Self {
        Self {
            duplicate_keys: RuleSeverity::Error,
            incompatible_values: RuleSeverity::Error,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
/// Root ruleset document after `$ref` resolution.
pub struct RulesetDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub documentation_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formats: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub functions_dir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub functions: Option<Vec<FunctionDeclaration>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub except: Option<BTreeMap<String, Vec<String>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parser_options: Option<ParserOptions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extends: Option<OneOrMany<ExtendsEntry>>,
    /// Raw declarations; their shape decides the merge behavior.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rules: Option<Map<String, Json>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
/// A `then` clause: the function to run plus its target field and options.
pub struct ThenDefinition {
    pub function: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_options: Option<Json>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
/// A full rule as written in a ruleset file.
pub struct RuleDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<RuleSeverity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommended: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formats: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub documentation_url: Option<String>,
    pub given: OneOrMany<String>,
    pub then: OneOrMany<ThenDefinition>,
}
