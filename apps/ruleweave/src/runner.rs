//! Rule execution.
//!
//! For every active rule, each `given` selector is evaluated against the
//! resolved or unresolved tree, each `then` clause runs on every lint target
//! derived from the matches, and raw results are mapped back to their
//! authoring document through `DocumentInventory::locate`.
//!
//! Rules run in parallel on the rayon pool. A branch that fails (a function
//! error or an unusable selector) never aborts the run: it is reported as a
//! diagnostic or dropped, per `FunctionErrorPolicy`.

use crate::document::pointer::{decode_fragment, path_to_pointer, print_path, PrintStyle};
use crate::document::{closest_path, get_value, STDIN};
use crate::error::{FunctionError, LintError};
use crate::inventory::DocumentInventory;
use crate::message::{interpolate, MessageVars};
use crate::models::{Diagnostic, JsonPath, Range, Segment, Severity};
use crate::ruleset::function::{FunctionContext, FunctionPaths, RuleResult, SharedFunction};
use crate::ruleset::rule::{Rule, Then};
use crate::selector::{JsonPathSelector, Match, Selector};
use rayon::prelude::*;
use serde_json::Value as Json;
use sha2::{Digest, Sha256};
use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// Code of the warning emitted when exceptions cannot be enforced.
pub const EXCEPT_BUT_STDIN: &str = "except-but-stdin";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
/// What happens to a branch whose function or selector fails.
pub enum FunctionErrorPolicy {
    /// Emit a diagnostic under the rule's code describing the failure.
    #[default]
    Report,
    /// Drop the branch's results silently.
    Omit,
}

/// Identity of a diagnostic for deduplication.
pub type Fingerprint = Arc<dyn Fn(&Diagnostic) -> String + Send + Sync>;

/// Hash of code, path, range and source.
pub fn default_fingerprint(diagnostic: &Diagnostic) -> String {
    let mut hasher = Sha256::new();
    hasher.update(diagnostic.code.as_bytes());
    hasher.update([0u8]);
    for segment in &diagnostic.path {
        hasher.update(segment.as_key().as_bytes());
        hasher.update([0u8]);
    }
    let r = diagnostic.range;
    hasher.update(format!("{}:{}-{}:{}", r.start.line, r.start.character, r.end.line, r.end.character));
    hasher.update([0u8]);
    hasher.update(diagnostic.source.as_deref().unwrap_or_default().as_bytes());
    hex::encode(hasher.finalize())
}

/// Keep the first diagnostic of every fingerprint.
pub fn dedup(diagnostics: Vec<Diagnostic>, fingerprint: &Fingerprint) -> Vec<Diagnostic> {
    let mut seen = HashSet::new();
    diagnostics
        .into_iter()
        .filter(|d| seen.insert(fingerprint(d)))
        .collect()
}

/// Build a diagnostic covering the whole root document.
pub fn document_wide(
    inventory: &DocumentInventory,
    code: &str,
    message: impl Into<String>,
    severity: Severity,
) -> Diagnostic {
    let document = inventory.document();
    Diagnostic {
        code: code.to_string(),
        message: message.into(),
        path: Vec::new(),
        severity,
        range: document.range_for_path(&[], true).unwrap_or(Range::DEFAULT),
        source: document.source().map(str::to_string),
    }
}

#[derive(Debug)]
/// A lint target derived from a matched node.
struct Target<'v> {
    /// Path relative to the matched node.
    path: JsonPath,
    value: Option<Cow<'v, Json>>,
}

fn field_path(field: &str) -> JsonPath {
    let mut out = Vec::new();
    for part in field.split('.') {
        let (name, mut rest) = match part.find('[') {
            Some(i) => (&part[..i], &part[i..]),
            None => (part, ""),
        };
        if !name.is_empty() {
            out.push(Segment::from(name));
        }
        while let Some(inner) = rest.strip_prefix('[') {
            let Some(end) = inner.find(']') else {
                break;
            };
            let key = inner[..end].trim_matches(|c| c == '\'' || c == '"');
            out.push(match key.parse::<usize>() {
                Ok(i) => Segment::Index(i),
                Err(_) => Segment::from(key),
            });
            rest = &inner[end + 1..];
        }
    }
    out
}

#[derive(Clone)]
pub struct Runner {
    selector: Arc<dyn Selector>,
    policy: FunctionErrorPolicy,
    fingerprint: Fingerprint,
}

impl fmt::Debug for Runner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runner").field("policy", &self.policy).finish()
    }
}

impl Default for Runner {
    fn default() -> Self {
        Self {
            selector: Arc::new(JsonPathSelector),
            policy: FunctionErrorPolicy::default(),
            fingerprint: Arc::new(default_fingerprint),
        }
    }
}

/// Shared, read-only state of one run.
struct Run<'a> {
    inventory: &'a DocumentInventory,
    functions: &'a HashMap<String, SharedFunction>,
    exceptions: &'a BTreeMap<String, Vec<String>>,
}

enum BranchError {
    Function(FunctionError),
    Selector(String),
}

impl fmt::Display for BranchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Function(e) => write!(f, "{e}"),
            Self::Selector(e) => f.write_str(e),
        }
    }
}

impl Runner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_selector(mut self, selector: Arc<dyn Selector>) -> Self {
        self.selector = selector;
        self
    }

    pub fn with_policy(mut self, policy: FunctionErrorPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_fingerprint(mut self, fingerprint: Fingerprint) -> Self {
        self.fingerprint = fingerprint;
        self
    }

    pub fn policy(&self) -> FunctionErrorPolicy {
        self.policy
    }

    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    /// Run `rules` against the inventory. Fails only when an active rule
    /// names a function missing from `functions`.
    #[tracing::instrument(skip_all, fields(source = inventory.document().key(), rules = rules.len()))]
    pub fn run(
        &self,
        rules: &BTreeMap<String, Rule>,
        inventory: &DocumentInventory,
        functions: &HashMap<String, SharedFunction>,
        exceptions: &BTreeMap<String, Vec<String>>,
    ) -> Result<Vec<Diagnostic>, LintError> {
        let active: Vec<&Rule> = rules
            .values()
            .filter(|r| r.is_active() && r.matches_formats(inventory.formats()))
            .collect();
        for rule in &active {
            if let Some(then) = rule.then.iter().find(|t| !functions.contains_key(&t.function)) {
                return Err(LintError::FunctionNotFound {
                    function: then.function.clone(),
                    rule: rule.name.clone(),
                });
            }
        }
        tracing::debug!(active = active.len(), "running rules");

        let run = Run {
            inventory,
            functions,
            exceptions,
        };
        let mut diagnostics = Vec::new();
        let is_stdin = inventory.source().map_or(true, |s| s == STDIN);
        if is_stdin && !exceptions.is_empty() {
            diagnostics.push(document_wide(
                inventory,
                EXCEPT_BUT_STDIN,
                "The ruleset contains `except` entries. However, they cannot be enforced when the input is passed through stdin.",
                Severity::Warning,
            ));
        }

        let per_rule: Vec<Vec<Diagnostic>> = active
            .par_iter()
            .map(|rule| self.run_rule(rule, &run))
            .collect();
        diagnostics.extend(per_rule.into_iter().flatten());
        let diagnostics = dedup(diagnostics, &self.fingerprint);
        tracing::debug!(diagnostics = diagnostics.len(), "rules finished");
        Ok(diagnostics)
    }

    fn run_rule(&self, rule: &Rule, run: &Run<'_>) -> Vec<Diagnostic> {
        let tree = if rule.resolved {
            run.inventory.resolved()
        } else {
            run.inventory.unresolved()
        };
        let mut out = Vec::new();
        for given in &rule.given {
            let matches = if given.trim() == "$" {
                vec![Match {
                    path: Vec::new(),
                    value: tree,
                }]
            } else {
                match self.selector.select(given, tree) {
                    Ok(m) => m,
                    Err(e) => {
                        self.branch_failed(rule, run, &[], BranchError::Selector(e.to_string()), &mut out);
                        continue;
                    }
                }
            };
            for m in &matches {
                for then in &rule.then {
                    self.lint_node(rule, then, m, run, &mut out);
                }
            }
        }
        out
    }

    fn targets<'v>(&self, value: &'v Json, field: Option<&str>) -> Result<Vec<Target<'v>>, BranchError> {
        let Some(field) = field else {
            return Ok(vec![Target {
                path: Vec::new(),
                value: Some(Cow::Borrowed(value)),
            }]);
        };
        if field == "@key" {
            return Ok(value
                .as_object()
                .map(|map| {
                    map.keys()
                        .map(|k| Target {
                            path: vec![Segment::from(k.as_str())],
                            value: Some(Cow::Owned(Json::String(k.clone()))),
                        })
                        .collect()
                })
                .unwrap_or_default());
        }
        if field.starts_with('$') {
            let found = self
                .selector
                .select(field, value)
                .map_err(|e| BranchError::Selector(e.to_string()))?;
            return Ok(found
                .into_iter()
                .map(|m| Target {
                    path: m.path,
                    value: Some(Cow::Borrowed(m.value)),
                })
                .collect());
        }
        let path = field_path(field);
        let value = get_value(value, &path).map(Cow::Borrowed);
        Ok(vec![Target { path, value }])
    }

    fn lint_node(&self, rule: &Rule, then: &Then, m: &Match<'_>, run: &Run<'_>, out: &mut Vec<Diagnostic>) {
        let Some(function) = run.functions.get(&then.function) else {
            return;
        };
        let targets = match self.targets(m.value, then.field.as_deref()) {
            Ok(t) => t,
            Err(e) => {
                self.branch_failed(rule, run, &m.path, e, out);
                return;
            }
        };
        let original = if rule.resolved {
            get_value(run.inventory.unresolved(), &m.path).unwrap_or(m.value)
        } else {
            m.value
        };
        let context = FunctionContext {
            original,
            given: m.value,
            inventory: run.inventory,
        };
        for target in targets {
            let mut target_path = m.path.clone();
            target_path.extend(target.path);
            let paths = FunctionPaths {
                given: m.path.clone(),
                target: target_path,
            };
            match function.call(
                target.value.as_deref(),
                then.function_options.as_ref(),
                &paths,
                &context,
            ) {
                Ok(None) => {}
                Ok(Some(results)) => {
                    for result in results {
                        let diagnostic = self.to_diagnostic(rule, &result, &paths.target, run);
                        if !self.is_excepted(rule, &diagnostic, run) {
                            out.push(diagnostic);
                        }
                    }
                }
                Err(e) => self.branch_failed(rule, run, &paths.target, BranchError::Function(e), out),
            }
        }
    }

    fn branch_failed(&self, rule: &Rule, run: &Run<'_>, path: &[Segment], error: BranchError, out: &mut Vec<Diagnostic>) {
        tracing::warn!(rule = %rule.name, %error, policy = ?self.policy, "rule branch failed");
        if self.policy == FunctionErrorPolicy::Omit {
            return;
        }
        let result = RuleResult::new(format!("Rule \"{}\" could not be evaluated: {error}", rule.name));
        let mut diagnostic = self.to_diagnostic(rule, &result, path, run);
        diagnostic.message = result.message;
        out.push(diagnostic);
    }

    fn is_excepted(&self, rule: &Rule, diagnostic: &Diagnostic, run: &Run<'_>) -> bool {
        let Some(source) = &diagnostic.source else {
            return false;
        };
        let key = format!("{source}#{}", path_to_pointer(&diagnostic.path));
        run.exceptions
            .get(&key)
            .is_some_and(|names| names.iter().any(|n| *n == rule.name))
    }

    fn to_diagnostic(&self, rule: &Rule, result: &RuleResult, target_path: &[Segment], run: &Run<'_>) -> Diagnostic {
        let inventory = run.inventory;
        let escaped: JsonPath = result
            .path
            .as_deref()
            .unwrap_or(target_path)
            .iter()
            .map(|s| match s {
                Segment::Key(k) => Segment::Key(decode_fragment(k)),
                index => index.clone(),
            })
            .collect();

        let location = inventory.locate(&escaped, rule.resolved);
        let (document, path, missing) = match location {
            Some(l) => (l.document, l.path, l.missing_property_path),
            None => (
                inventory.document().clone(),
                closest_path(inventory.unresolved(), &escaped),
                Vec::new(),
            ),
        };
        let range = document.range_for_path(&path, true).unwrap_or(Range::DEFAULT);
        let property = missing
            .last()
            .or(path.last())
            .map(|s| s.as_key().into_owned())
            .unwrap_or_default();

        let mut vars = MessageVars {
            property,
            error: result.message.clone(),
            path: print_path(&path, PrintStyle::EscapedPointer),
            description: rule.description.clone(),
            value: get_value(document.data(), &path).cloned(),
        };
        let result_message = interpolate(&result.message, &vars);
        vars.error = result_message.clone();
        let message = match (&rule.message, &rule.description) {
            (Some(template), _) => interpolate(template, &vars),
            (None, Some(description)) => description.clone(),
            (None, None) => result_message,
        };

        Diagnostic {
            code: rule.name.clone(),
            message: message.trim().to_string(),
            path,
            severity: rule.severity.diagnostic().unwrap_or(Severity::Hint),
            range,
            source: document.source().map(str::to_string),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::SourceDocument;
    use crate::fetch::StaticAssets;
    use crate::functions::builtins;
    use crate::inventory::Resolver;
    use crate::ruleset::function::FunctionOutput;
    use serde_json::json;

    fn inventory(files: &[(&str, &str)], root: &str) -> DocumentInventory {
        let mut assets = StaticAssets::new();
        for (uri, text) in files {
            assets.insert(*uri, *text);
        }
        let resolver = Resolver::new(Arc::new(assets));
        let Ok(doc) = resolver.document(root) else {
            panic!("{root} missing");
        };
        DocumentInventory::resolve(doc, &resolver)
    }

    fn rules(defs: Json) -> BTreeMap<String, Rule> {
        defs.as_object()
            .unwrap()
            .iter()
            .map(|(name, def)| (name.clone(), Rule::from_json(name, def.clone()).unwrap()))
            .collect()
    }

    fn run(rules: &BTreeMap<String, Rule>, inventory: &DocumentInventory) -> Vec<Diagnostic> {
        Runner::new()
            .run(rules, inventory, &builtins(), &BTreeMap::new())
            .unwrap()
    }

    #[test]
    fn test_field_paths() {
        assert_eq!(field_path("title"), vec![Segment::from("title")]);
        assert_eq!(
            field_path("a.b[0]['c']"),
            vec![Segment::from("a"), Segment::from("b"), Segment::Index(0), Segment::from("c")]
        );
    }

    #[test]
    fn test_no_empty_title() {
        let inv = inventory(&[("/api.json", r#"{"info": {"title": ""}}"#)], "/api.json");
        let rules = rules(json!({
            "no-empty-title": {"given": "$.info.title", "then": {"function": "truthy"}}
        }));
        let out = run(&rules, &inv);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].code, "no-empty-title");
        assert_eq!(out[0].path, vec![Segment::from("info"), Segment::from("title")]);
        assert_eq!(out[0].severity, Severity::Warning);
        assert_eq!(out[0].message, "`title` property is not truthy");
        assert_eq!(out[0].source.as_deref(), Some("/api.json"));
        assert_eq!(out[0].range.start.line, 0);
    }

    #[test]
    fn test_missing_field_is_reported_at_parent_with_property_name() {
        let inv = inventory(&[("/api.yaml", "info:\n  version: 1\n")], "/api.yaml");
        let rules = rules(json!({
            "info-title": {"given": "$.info", "then": {"field": "title", "function": "defined"}, "severity": "error"}
        }));
        let out = run(&rules, &inv);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].path, vec![Segment::from("info")]);
        assert_eq!(out[0].message, "`title` property must be defined");
        assert_eq!(out[0].severity, Severity::Error);
    }

    #[test]
    fn test_cross_file_path_fidelity() {
        let files = [
            ("/specs/api.yaml", "info:\n  $ref: ./common/info.yaml#/shared\n"),
            ("/specs/common/info.yaml", "shared:\n  title: ''\n"),
        ];
        let inv = inventory(&files, "/specs/api.yaml");
        let rules = rules(json!({
            "no-empty-title": {"given": "$.info.title", "then": {"function": "truthy"}}
        }));
        let out = run(&rules, &inv);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].source.as_deref(), Some("/specs/common/info.yaml"));
        assert_eq!(out[0].path, vec![Segment::from("shared"), Segment::from("title")]);
        assert_eq!(out[0].range.start.line, 1);
    }

    #[test]
    fn test_unresolved_rules_see_refs() {
        let files = [
            ("/api.yaml", "a:\n  $ref: '#/b'\nb:\n  x: 1\n"),
        ];
        let inv = inventory(&files, "/api.yaml");
        let rules = rules(json!({
            "no-refs": {"given": "$..$ref", "resolved": false, "then": {"function": "undefined"}}
        }));
        let out = run(&rules, &inv);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].path, vec![Segment::from("a"), Segment::from("$ref")]);
    }

    #[test]
    fn test_equivalent_selectors_are_deduplicated() {
        let inv = inventory(&[("/api.json", r#"{"info": {"title": ""}}"#)], "/api.json");
        let rules = rules(json!({
            "no-empty-title": {
                "given": ["$.info.title", "$['info']['title']"],
                "then": [{"function": "truthy"}]
            }
        }));
        assert_eq!(run(&rules, &inv).len(), 1);
    }

    #[test]
    fn test_message_template_and_description() {
        let inv = inventory(&[("/api.json", r#"{"info": {"title": ""}}"#)], "/api.json");
        let rules = rules(json!({
            "templated": {
                "given": "$.info.title",
                "message": "{{property}} at {{path}}: {{error}}",
                "then": {"function": "truthy"}
            },
            "described": {
                "given": "$.info.title",
                "description": "Titles matter.",
                "then": {"function": "truthy"}
            }
        }));
        let out = run(&rules, &inv);
        let by_code: HashMap<_, _> = out.iter().map(|d| (d.code.as_str(), d.message.as_str())).collect();
        assert_eq!(by_code["templated"], "title at #/info/title: `title` property is not truthy");
        assert_eq!(by_code["described"], "Titles matter.");
    }

    #[test]
    fn test_key_targets_and_disabled_rules() {
        let inv = inventory(&[("/api.json", r#"{"paths": {"/a": {}, "b": {}}}"#)], "/api.json");
        let mut rules = rules(json!({
            "slash": {"given": "$.paths", "then": {"field": "@key", "function": "pattern", "functionOptions": {"match": "^/"}}},
            "off": {"given": "$", "severity": "off", "then": {"function": "falsy"}}
        }));
        let out = run(&rules, &inv);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].path, vec![Segment::from("paths"), Segment::from("b")]);

        if let Some(r) = rules.get_mut("slash") {
            r.enabled = false;
        }
        assert!(run(&rules, &inv).is_empty());
    }

    #[test]
    fn test_formats_restrict_rules() {
        let mut inv = inventory(&[("/api.json", r#"{"info": {}}"#)], "/api.json");
        let rules = rules(json!({
            "oas3-only": {"given": "$", "formats": ["oas3"], "then": {"function": "falsy"}}
        }));
        assert!(run(&rules, &inv).is_empty());
        inv.set_formats(Some(vec!["oas3".into()]));
        assert_eq!(run(&rules, &inv).len(), 1);
    }

    #[test]
    fn test_missing_function_is_fatal() {
        let inv = inventory(&[("/api.json", "{}")], "/api.json");
        let rules = rules(json!({"r": {"given": "$", "then": {"function": "nope"}}}));
        let err = Runner::new()
            .run(&rules, &inv, &builtins(), &BTreeMap::new())
            .unwrap_err();
        assert!(matches!(err, LintError::FunctionNotFound { ref function, ref rule } if function == "nope" && rule == "r"));
    }

    fn failing() -> HashMap<String, SharedFunction> {
        let mut functions = builtins();
        let f: SharedFunction = Arc::new(
            |_: Option<&Json>, _: Option<&Json>, _: &FunctionPaths, _: &FunctionContext<'_>| -> FunctionOutput {
                Err(FunctionError::Failed("boom".into()))
            },
        );
        functions.insert("boom".into(), f);
        functions
    }

    #[test]
    fn test_failing_function_is_reported_by_default() {
        let inv = inventory(&[("/api.json", r#"{"info": {"title": ""}}"#)], "/api.json");
        let rules = rules(json!({
            "explodes": {"given": "$.info", "then": {"function": "boom"}},
            "works": {"given": "$.info.title", "then": {"function": "truthy"}}
        }));
        let out = Runner::new()
            .run(&rules, &inv, &failing(), &BTreeMap::new())
            .unwrap();
        assert_eq!(out.len(), 2);
        let failed = out.iter().find(|d| d.code == "explodes").unwrap();
        assert!(failed.message.contains("boom"), "{}", failed.message);
        assert_eq!(failed.path, vec![Segment::from("info")]);
    }

    #[test]
    fn test_failing_function_is_dropped_when_omitted() {
        let inv = inventory(&[("/api.json", r#"{"info": {"title": ""}}"#)], "/api.json");
        let rules = rules(json!({
            "explodes": {"given": "$.info", "then": {"function": "boom"}},
            "works": {"given": "$.info.title", "then": {"function": "truthy"}}
        }));
        let out = Runner::new()
            .with_policy(FunctionErrorPolicy::Omit)
            .run(&rules, &inv, &failing(), &BTreeMap::new())
            .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].code, "works");
    }

    #[test]
    fn test_exceptions_drop_matching_results() {
        let inv = inventory(&[("/api.json", r#"{"info": {"title": ""}}"#)], "/api.json");
        let rules = rules(json!({
            "no-empty-title": {"given": "$.info.title", "then": {"function": "truthy"}}
        }));
        let exceptions = BTreeMap::from([(
            "/api.json#/info/title".to_string(),
            vec!["no-empty-title".to_string()],
        )]);
        let out = Runner::new().run(&rules, &inv, &builtins(), &exceptions).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_stdin_with_exceptions_warns() {
        let doc = Arc::new(SourceDocument::from_source(r#"{"a": 1}"#, Some(STDIN.to_string())));
        let inv = DocumentInventory::resolve(doc, &Resolver::default());
        let exceptions = BTreeMap::from([("/x.json#/a".to_string(), vec!["r".to_string()])]);
        let out = Runner::new()
            .run(&BTreeMap::new(), &inv, &builtins(), &exceptions)
            .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].code, EXCEPT_BUT_STDIN);
        assert_eq!(out[0].severity, Severity::Warning);
    }

    #[test]
    fn test_custom_fingerprint_controls_dedup() {
        let d = |code: &str| Diagnostic {
            code: code.into(),
            message: "m".into(),
            path: vec![],
            severity: Severity::Error,
            range: Range::DEFAULT,
            source: None,
        };
        let by_message: Fingerprint = Arc::new(|d: &Diagnostic| d.message.clone());
        assert_eq!(dedup(vec![d("a"), d("b")], &by_message).len(), 1);
        let default: Fingerprint = Arc::new(default_fingerprint);
        assert_eq!(dedup(vec![d("a"), d("b"), d("a")], &default).len(), 2);
    }
}
