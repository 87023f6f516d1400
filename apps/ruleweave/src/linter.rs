//! Linting facade.
//!
//! Ties a document, its reference inventory, the loaded ruleset and the
//! runner together:
//! - parser diagnostics of every visited document (severities taken from
//!   the ruleset's `parserOptions`);
//! - `invalid-ref` errors for unresolvable references;
//! - `unrecognized-format` when no registered format matches;
//! - rule results from the runner.
//!
//! The combined list is deduplicated and sorted by source, position, code
//! and path.

use crate::document::{ParseDiagnosticKind, SourceDocument};
use crate::error::{LintError, Result, RulesetError};
use crate::formats::{FormatDetector, FormatRegistry};
use crate::functions::builtins;
use crate::inventory::{DocumentInventory, Resolver};
use crate::models::definition::ParserOptions;
use crate::models::{Diagnostic, Segment, Severity};
use crate::ruleset::function::{FunctionRegistry, SharedFunction};
use crate::ruleset::{Ruleset, RulesetLoader};
use crate::runner::{dedup, document_wide, Runner};
use serde_json::Value as Json;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

pub const PARSER: &str = "parser";
pub const INVALID_REF: &str = "invalid-ref";
pub const UNRECOGNIZED_FORMAT: &str = "unrecognized-format";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LintOptions {
    /// Skip the `unrecognized-format` warning when no format matches.
    pub ignore_unknown_format: bool,
}

#[derive(Debug, Clone)]
/// Result of linting one document.
pub struct LintOutcome {
    /// Fully dereferenced document.
    pub resolved: Json,
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Clone)]
pub struct Linter {
    resolver: Resolver,
    ruleset: Option<Arc<Ruleset>>,
    functions: HashMap<String, SharedFunction>,
    formats: FormatRegistry,
    runner: Runner,
}

impl fmt::Debug for Linter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut functions: Vec<&String> = self.functions.keys().collect();
        functions.sort();
        f.debug_struct("Linter")
            .field("ruleset", &self.ruleset.as_ref().map(|r| r.uri().to_string()))
            .field("functions", &functions)
            .field("formats", &self.formats)
            .field("runner", &self.runner)
            .finish()
    }
}

impl Default for Linter {
    fn default() -> Self {
        Self::new(Resolver::default())
    }
}

impl Linter {
    /// Linter with the built-in functions and default formats.
    pub fn new(resolver: Resolver) -> Self {
        Self {
            resolver,
            ruleset: None,
            functions: builtins(),
            formats: FormatRegistry::with_defaults(),
            runner: Runner::default(),
        }
    }

    pub fn with_runner(mut self, runner: Runner) -> Self {
        self.runner = runner;
        self
    }

    pub fn with_formats(mut self, formats: FormatRegistry) -> Self {
        self.formats = formats;
        self
    }

    pub fn register_format(&mut self, name: impl Into<String>, detector: FormatDetector) -> &mut Self {
        self.formats.register(name, detector);
        self
    }

    /// Make a function available to every rule under `name`. Ruleset
    /// functions with the same name take precedence.
    pub fn register_function(&mut self, name: impl Into<String>, function: SharedFunction) -> &mut Self {
        self.functions.insert(name.into(), function);
        self
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    pub fn ruleset(&self) -> Option<&Ruleset> {
        self.ruleset.as_deref()
    }

    pub fn set_ruleset(&mut self, ruleset: Ruleset) {
        tracing::debug!(uri = ruleset.uri(), rules = ruleset.rules().len(), "ruleset set");
        self.ruleset = Some(Arc::new(ruleset));
    }

    /// Load a ruleset through this linter's resolver and make it active.
    pub fn load_ruleset(&mut self, uri: &str, registry: FunctionRegistry) -> Result<(), RulesetError> {
        let ruleset = RulesetLoader::new(self.resolver.clone(), registry).load(uri)?;
        self.set_ruleset(ruleset);
        Ok(())
    }

    /// Lint raw text. `source` decides the parser and the document identity.
    pub fn lint_text(&self, text: &str, source: Option<&str>, options: LintOptions) -> Result<LintOutcome> {
        let document = SourceDocument::from_source(text, source.map(str::to_string));
        self.lint(Arc::new(document), options)
    }

    #[tracing::instrument(skip_all, fields(source = document.key()))]
    pub fn lint(&self, document: Arc<SourceDocument>, options: LintOptions) -> Result<LintOutcome> {
        let ruleset = self.ruleset.as_ref().ok_or(LintError::NoRuleset)?;
        let mut inventory = DocumentInventory::resolve(document, &self.resolver);
        let mut diagnostics = Vec::new();

        let detected = self.formats.detect(inventory.resolved(), inventory.source());
        if !detected.is_empty() {
            inventory.set_formats(Some(detected));
        } else if options.ignore_unknown_format {
            inventory.set_formats(Some(Vec::new()));
        } else {
            inventory.set_formats(None);
            if !self.formats.is_empty() {
                let names: Vec<&str> = self.formats.names().collect();
                diagnostics.push(document_wide(
                    &inventory,
                    UNRECOGNIZED_FORMAT,
                    format!(
                        "The provided document does not match any of the registered formats [{}]",
                        names.join(", ")
                    ),
                    Severity::Warning,
                ));
            }
        }
        tracing::debug!(formats = ?inventory.formats(), "formats detected");

        diagnostics.extend(parser_diagnostics(&inventory, ruleset.parser_options()));
        diagnostics.extend(invalid_refs(&inventory));

        let mut functions = self.functions.clone();
        functions.extend(ruleset.functions().iter().map(|(k, v)| (k.clone(), v.clone())));
        diagnostics.extend(self.runner.run(
            ruleset.rules(),
            &inventory,
            &functions,
            ruleset.exceptions(),
        )?);

        let mut diagnostics = dedup(diagnostics, self.runner.fingerprint());
        sort_diagnostics(&mut diagnostics);
        Ok(LintOutcome {
            resolved: inventory.resolved().clone(),
            diagnostics,
        })
    }
}

fn parser_severity(kind: ParseDiagnosticKind, options: ParserOptions) -> Option<Severity> {
    match kind {
        ParseDiagnosticKind::Syntax => Some(Severity::Error),
        ParseDiagnosticKind::DuplicateKey => options.duplicate_keys.diagnostic(),
        ParseDiagnosticKind::IncompatibleValue => options.incompatible_values.diagnostic(),
    }
}

/// Parse diagnostics of the root and of every referenced document.
fn parser_diagnostics(inventory: &DocumentInventory, options: ParserOptions) -> Vec<Diagnostic> {
    let root = inventory.document();
    let mut documents: Vec<&Arc<SourceDocument>> = inventory
        .documents()
        .values()
        .filter(|d| !Arc::ptr_eq(d, root))
        .collect();
    documents.sort_by(|a, b| a.key().cmp(b.key()));
    documents.insert(0, root);

    let mut out = Vec::new();
    for document in documents {
        for diag in document.diagnostics() {
            let Some(severity) = parser_severity(diag.kind, options) else {
                continue;
            };
            out.push(Diagnostic {
                code: PARSER.to_string(),
                message: diag.message.clone(),
                path: diag.path.clone(),
                severity,
                range: diag.range,
                source: document.source().map(str::to_string),
            });
        }
    }
    out
}

/// One `invalid-ref` error per distinct resolution message.
fn invalid_refs(inventory: &DocumentInventory) -> Vec<Diagnostic> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for error in inventory.errors() {
        if !seen.insert(error.message.clone()) {
            continue;
        }
        let mut path = error.document_path.clone();
        path.push(Segment::from("$ref"));
        let document = inventory.documents().get(&error.source);
        let range = document
            .and_then(|d| d.range_for_path(&path, true))
            .unwrap_or_default();
        let source = document
            .and_then(|d| d.source().map(str::to_string))
            .or_else(|| Some(error.source.clone()));
        out.push(Diagnostic {
            code: INVALID_REF.to_string(),
            message: error.message.clone(),
            path,
            severity: Severity::Error,
            range,
            source,
        });
    }
    out
}

/// Order by source, start position, code, then path.
pub fn sort_diagnostics(diagnostics: &mut [Diagnostic]) {
    diagnostics.sort_by(|a, b| {
        a.source
            .cmp(&b.source)
            .then(a.range.start.cmp(&b.range.start))
            .then(a.code.cmp(&b.code))
            .then(a.path.cmp(&b.path))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::StaticAssets;
    use crate::error::FunctionError;
    use crate::ruleset::function::{FunctionContext, FunctionOutput, FunctionPaths};
    use crate::runner::FunctionErrorPolicy;
    use serde_json::json;

    const TITLE_RULESET: &str = r#"
rules:
  no-empty-title:
    given: $.info.title
    then:
      function: truthy
"#;

    fn linter(files: &[(&str, &str)], ruleset: &str) -> Linter {
        let mut assets = StaticAssets::new();
        for (uri, text) in files {
            assets.insert(*uri, *text);
        }
        let mut linter = Linter::new(Resolver::new(Arc::new(assets)));
        linter
            .load_ruleset(ruleset, FunctionRegistry::new())
            .unwrap();
        linter
    }

    fn codes(outcome: &LintOutcome) -> Vec<&str> {
        outcome.diagnostics.iter().map(|d| d.code.as_str()).collect()
    }

    #[test]
    fn test_no_empty_title_end_to_end() {
        let l = linter(&[("/rules.yaml", TITLE_RULESET)], "/rules.yaml");
        let out = l
            .lint_text(
                r#"{"info": {"title": ""}}"#,
                Some("/api.json"),
                LintOptions {
                    ignore_unknown_format: true,
                },
            )
            .unwrap();
        assert_eq!(codes(&out), vec!["no-empty-title"]);
        assert_eq!(
            out.diagnostics[0].path,
            vec![Segment::from("info"), Segment::from("title")]
        );
        assert_eq!(out.resolved, json!({"info": {"title": ""}}));
    }

    #[test]
    fn test_unrecognized_format_warning() {
        let l = linter(&[("/rules.yaml", TITLE_RULESET)], "/rules.yaml");
        let out = l
            .lint_text("info:\n  title: x\n", Some("/api.yaml"), LintOptions::default())
            .unwrap();
        assert_eq!(codes(&out), vec![UNRECOGNIZED_FORMAT]);
        assert_eq!(out.diagnostics[0].severity, Severity::Warning);

        let out = l
            .lint_text("openapi: 3.0.0\ninfo:\n  title: x\n", Some("/api.yaml"), LintOptions::default())
            .unwrap();
        assert!(out.diagnostics.is_empty());
    }

    #[test]
    fn test_parser_options_adjust_duplicate_keys() {
        let text = "openapi: 3.0.0\ninfo:\n  title: a\n  title: b\n";
        let default = linter(&[("/rules.yaml", TITLE_RULESET)], "/rules.yaml");
        let out = default.lint_text(text, Some("/api.yaml"), LintOptions::default()).unwrap();
        assert_eq!(codes(&out), vec![PARSER]);
        assert_eq!(out.diagnostics[0].severity, Severity::Error);

        let relaxed = format!("parserOptions:\n  duplicateKeys: warn\n{TITLE_RULESET}");
        let l = linter(&[("/rules.yaml", relaxed.as_str())], "/rules.yaml");
        let out = l.lint_text(text, Some("/api.yaml"), LintOptions::default()).unwrap();
        assert_eq!(out.diagnostics[0].severity, Severity::Warning);

        let silent = format!("parserOptions:\n  duplicateKeys: 'off'\n{TITLE_RULESET}");
        let l = linter(&[("/rules.yaml", silent.as_str())], "/rules.yaml");
        let out = l.lint_text(text, Some("/api.yaml"), LintOptions::default()).unwrap();
        assert!(out.diagnostics.is_empty());
    }

    #[test]
    fn test_nested_duplicate_keys_keep_the_document_lintable() {
        let l = linter(&[("/rules.yaml", TITLE_RULESET)], "/rules.yaml");
        let text = "openapi: 3.0.0\ntags:\n  - name: a\n    name: b\ninfo: {title: x, title: ''}\n";
        let out = l.lint_text(text, Some("/api.yaml"), LintOptions::default()).unwrap();
        let mut found = codes(&out);
        found.sort_unstable();
        assert_eq!(found, vec!["no-empty-title", PARSER, PARSER]);
        assert_eq!(out.resolved["tags"][0]["name"], "b");

        let silent = format!("parserOptions:\n  duplicateKeys: 'off'\n{TITLE_RULESET}");
        let l = linter(&[("/rules.yaml", silent.as_str())], "/rules.yaml");
        let out = l.lint_text(text, Some("/api.yaml"), LintOptions::default()).unwrap();
        assert_eq!(codes(&out), vec!["no-empty-title"]);
    }

    #[test]
    fn test_rules_run_on_tree_before_syntax_error() {
        let l = linter(&[("/rules.yaml", TITLE_RULESET)], "/rules.yaml");
        let text = "openapi: 3.0.0\ninfo:\n  title: ''\nbroken: 'open\n";
        let out = l.lint_text(text, Some("/api.yaml"), LintOptions::default()).unwrap();
        let mut found = codes(&out);
        found.sort_unstable();
        assert_eq!(found, vec!["no-empty-title", PARSER]);
    }

    #[test]
    fn test_invalid_refs_are_deduplicated_by_message() {
        let l = linter(&[("/rules.yaml", TITLE_RULESET)], "/rules.yaml");
        let text = "openapi: 3.0.0\ninfo:\n  title: x\na:\n  $ref: '#/missing'\nb:\n  - $ref: '#/missing'\n";
        let out = l.lint_text(text, Some("/api.yaml"), LintOptions::default()).unwrap();
        assert_eq!(codes(&out), vec![INVALID_REF]);
        assert_eq!(out.diagnostics[0].path, vec![Segment::from("a"), Segment::from("$ref")]);
        assert_eq!(out.diagnostics[0].severity, Severity::Error);
    }

    #[test]
    fn test_referenced_document_diagnostics_keep_their_source() {
        let files = [
            ("/rules.yaml", TITLE_RULESET),
            ("/specs/info.yaml", "title: ''\ntitle: ''\n"),
        ];
        let l = linter(&files, "/rules.yaml");
        let text = "openapi: 3.0.0\ninfo:\n  $ref: info.yaml\n";
        let out = l.lint_text(text, Some("/specs/api.yaml"), LintOptions::default()).unwrap();
        let mut found = codes(&out);
        found.sort_unstable();
        assert_eq!(found, vec!["no-empty-title", PARSER]);
        assert!(out
            .diagnostics
            .iter()
            .all(|d| d.source.as_deref() == Some("/specs/info.yaml")));
    }

    #[test]
    fn test_results_are_sorted_by_position() {
        let ruleset = r#"
rules:
  b-rule:
    given: $.a
    then:
      function: falsy
  a-rule:
    given: $.b
    then:
      function: falsy
"#;
        let l = linter(&[("/rules.yaml", ruleset)], "/rules.yaml");
        let out = l
            .lint_text(
                "b: 1\na: 1\n",
                Some("/x.yaml"),
                LintOptions {
                    ignore_unknown_format: true,
                },
            )
            .unwrap();
        assert_eq!(codes(&out), vec!["a-rule", "b-rule"]);
    }

    fn explode(_: Option<&Json>, _: Option<&Json>, _: &FunctionPaths, _: &FunctionContext<'_>) -> FunctionOutput {
        Err(FunctionError::Failed("nope".into()))
    }

    #[test]
    fn test_failing_functions_follow_runner_policy() {
        let ruleset = "functions: [explode]\nrules:\n  r:\n    given: $\n    then:\n      function: explode\n";
        let mut assets = StaticAssets::new();
        assets.insert("/rules.yaml", ruleset);
        let mut registry = FunctionRegistry::new();
        let explode: SharedFunction = Arc::new(explode);
        registry.register("explode", explode);
        let options = LintOptions {
            ignore_unknown_format: true,
        };

        let mut reporting = Linter::new(Resolver::new(Arc::new(assets.clone())));
        reporting.load_ruleset("/rules.yaml", registry.clone()).unwrap();
        let out = reporting.lint_text("{}", Some("/d.json"), options).unwrap();
        assert_eq!(codes(&out), vec!["r"]);

        let mut omitting = Linter::new(Resolver::new(Arc::new(assets)))
            .with_runner(Runner::new().with_policy(FunctionErrorPolicy::Omit));
        omitting.load_ruleset("/rules.yaml", registry).unwrap();
        let out = omitting.lint_text("{}", Some("/d.json"), options).unwrap();
        assert!(out.diagnostics.is_empty());
    }

    #[test]
    fn test_missing_ruleset() {
        let l = Linter::default();
        assert!(matches!(
            l.lint_text("{}", None, LintOptions::default()),
            Err(LintError::NoRuleset)
        ));
    }
}
