//! Error types.
//!
//! Only construction and lookup failures are errors. Parse problems,
//! unresolvable `$ref`s and failing rule functions surface as diagnostics.

use thiserror::Error;

#[derive(Debug, Error)]
/// Failure to retrieve raw content for a URI.
pub enum FetchError {
    #[error("Could not read {uri}: {source}")]
    Io {
        uri: String,
        #[source]
        source: std::io::Error,
    },

    #[error("HTTP error {status} while fetching {uri}")]
    Http { uri: String, status: u16 },

    #[error("Network error while fetching {uri}: {message}")]
    Network { uri: String, message: String },

    #[error("Invalid URI {uri}: {message}")]
    InvalidUri { uri: String, message: String },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
/// A `$ref` or JSON Pointer that cannot be interpreted.
pub enum PointerError {
    #[error("Invalid JSON pointer \"{pointer}\": a non-root pointer must begin with \"/\"")]
    Malformed { pointer: String },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
/// Selector expression that the selector engine cannot evaluate.
pub enum SelectorError {
    #[error("Invalid selector \"{expression}\": {message}")]
    Syntax { expression: String, message: String },

    #[error("Unsupported selector feature in \"{expression}\": {feature}")]
    Unsupported { expression: String, feature: String },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
/// Failure raised by a rule function while it runs.
pub enum FunctionError {
    #[error("Invalid options for function \"{function}\": {message}")]
    InvalidOptions { function: String, message: String },

    #[error("{0}")]
    Failed(String),
}

#[derive(Debug, Error)]
/// Fatal error while loading a ruleset. No partial ruleset is ever returned.
pub enum RulesetError {
    #[error("Could not read ruleset {uri}: {source}")]
    Read {
        uri: String,
        #[source]
        source: FetchError,
    },

    #[error("Ruleset {uri} must not be empty")]
    Empty { uri: String },

    #[error("Ruleset {uri} could not be parsed: {message}")]
    Parse { uri: String, message: String },

    #[error("Ruleset {uri} has unresolvable references: {message}")]
    Resolve { uri: String, message: String },

    #[error("Ruleset {uri} must have rules or extends property")]
    MissingRulesOrExtends { uri: String },

    #[error("Ruleset {uri} is invalid:\n{message}")]
    Invalid { uri: String, message: String },

    #[error("Rule \"{rule}\" in ruleset {uri} is invalid: {message}")]
    InvalidRule {
        uri: String,
        rule: String,
        message: String,
    },

    #[error("Rule \"{rule}\" in ruleset {uri} cannot extend a non-existing rule")]
    UnknownRule { uri: String, rule: String },

    #[error("Function \"{function}\" declared by ruleset {uri} is not registered (looked up {location})")]
    FunctionNotRegistered {
        uri: String,
        function: String,
        location: String,
    },

    #[error("Options schema of function \"{function}\" in ruleset {uri} is invalid: {message}")]
    InvalidFunctionSchema {
        uri: String,
        function: String,
        message: String,
    },

    #[error("Ruleset {uri} extends itself through {chain}")]
    CircularExtends { uri: String, chain: String },

    #[error("Ruleset {uri} could not load extended ruleset: {source}")]
    Extends {
        uri: String,
        #[source]
        source: Box<RulesetError>,
    },
}

#[derive(Debug, Error)]
/// Fatal error that stops a lint run.
pub enum LintError {
    #[error("No ruleset has been set")]
    NoRuleset,

    #[error("Function {function} not found. Called by rule {rule}.")]
    FunctionNotFound { function: String, rule: String },

    #[error(transparent)]
    Ruleset(#[from] RulesetError),
}

pub type Result<T, E = LintError> = std::result::Result<T, E>;
