//! Ruleweave core library.
//!
//! This crate lints JSON and YAML documents against rulesets: it resolves
//! `$ref`s across documents, maps every resolved location back to the file
//! that authored it, loads rulesets with `extends` inheritance, and runs
//! rule functions over selected nodes.
//!
//! High-level modules:
//! - `document`: Source documents, JSON/YAML parsers, JSON Pointer helpers.
//! - `fetch`: File, HTTP(S) and in-memory content providers.
//! - `inventory`: `$ref` resolution and provenance lookup (`locate`).
//! - `selector`: JSONPath-style node selection.
//! - `ruleset`: Ruleset loading, merge algorithm and function binding.
//! - `functions`: Built-in rule functions.
//! - `message`: Message templates.
//! - `formats`: Document format detection.
//! - `runner`: Rule execution and diagnostic assembly.
//! - `linter`: Facade tying the pieces together.
//! - `models`: Diagnostics, severities and ruleset definition models.
//! - `cli`, `config`, `output`: Binary support.
pub mod cli;
pub mod config;
pub mod document;
pub mod error;
pub mod fetch;
pub mod formats;
pub mod functions;
pub mod inventory;
pub mod linter;
pub mod message;
pub mod models;
pub mod output;
pub mod ruleset;
pub mod runner;
pub mod selector;

pub use error::{LintError, RulesetError};
pub use linter::{LintOptions, LintOutcome, Linter};
pub use models::{Diagnostic, Severity};
