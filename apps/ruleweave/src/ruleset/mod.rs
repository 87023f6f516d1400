//! Ruleset loading.
//!
//! `RulesetLoader::load` reads a ruleset document, dereferences its own
//! `$ref`s, validates it, binds its declared functions and loads every
//! extended ruleset. The merged `rules`, `functions` and `exceptions` tables
//! are built once at that point and never change afterward.

pub mod function;
pub mod merge;
pub mod rule;
pub mod validation;

use crate::document::{ParseDiagnosticKind, SourceDocument};
use crate::error::RulesetError;
use crate::fetch::resolve_uri;
use crate::inventory::Resolver;
use crate::models::definition::{ParserOptions, RulesetDefinition, RulesetMode};
use function::{qualified_name, CustomFunction, FunctionRegistry, SharedFunction};
use rayon::prelude::*;
use rule::Rule;
use serde_json::Value as Json;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

const DEFAULT_FUNCTIONS_DIR: &str = "functions";

/// Loads rulesets through a resolver, binding functions from a registry.
#[derive(Debug, Clone, Default)]
pub struct RulesetLoader {
    resolver: Resolver,
    registry: Arc<FunctionRegistry>,
}

impl RulesetLoader {
    pub fn new(resolver: Resolver, registry: FunctionRegistry) -> Self {
        Self {
            resolver,
            registry: Arc::new(registry),
        }
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    /// Load the ruleset at `uri` together with its whole extends chain.
    #[tracing::instrument(skip(self))]
    pub fn load(&self, uri: &str) -> Result<Ruleset, RulesetError> {
        self.load_chain(uri, &[])
    }

    fn load_chain(&self, uri: &str, chain: &[String]) -> Result<Ruleset, RulesetError> {
        let definition = self.read_definition(uri)?;

        let mut chain = chain.to_vec();
        chain.push(uri.to_string());
        let extends = definition
            .extends
            .clone()
            .map(|e| e.into_vec())
            .unwrap_or_default();

        let (functions, parents) = rayon::join(
            || self.bind_functions(uri, &definition),
            || {
                extends
                    .par_iter()
                    .map(|entry| {
                        let target = resolve_uri(Some(uri), entry.uri());
                        if chain.contains(&target) {
                            let mut cycle = chain.clone();
                            cycle.push(target.clone());
                            return Err(RulesetError::CircularExtends {
                                uri: target,
                                chain: cycle.join(" -> "),
                            });
                        }
                        tracing::debug!(parent = %target, mode = ?entry.mode(), "loading extended ruleset");
                        let parent = self.load_chain(&target, &chain).map_err(|e| match e {
                            e @ RulesetError::CircularExtends { .. } => e,
                            e => RulesetError::Extends {
                                uri: uri.to_string(),
                                source: Box::new(e),
                            },
                        })?;
                        Ok((Arc::new(parent), entry.mode()))
                    })
                    .collect::<Result<Vec<_>, _>>()
            },
        );

        Ruleset::build(uri.to_string(), definition, functions?, parents?)
    }

    fn read_definition(&self, uri: &str) -> Result<RulesetDefinition, RulesetError> {
        let text = self.resolver.fetch(uri).map_err(|source| RulesetError::Read {
            uri: uri.to_string(),
            source,
        })?;
        if text.trim().is_empty() {
            return Err(RulesetError::Empty {
                uri: uri.to_string(),
            });
        }

        let document = Arc::new(SourceDocument::from_source(text, Some(uri.to_string())));
        if let Some(diag) = document
            .diagnostics()
            .iter()
            .find(|d| d.kind == ParseDiagnosticKind::Syntax)
        {
            return Err(RulesetError::Parse {
                uri: uri.to_string(),
                message: format!("{} at {}", diag.message, diag.range),
            });
        }

        let dereferenced = self.resolver.dereference(&document);
        if !dereferenced.errors.is_empty() {
            let message = dereferenced
                .errors
                .iter()
                .map(|e| e.message.as_str())
                .collect::<Vec<_>>()
                .join("; ");
            return Err(RulesetError::Resolve {
                uri: uri.to_string(),
                message,
            });
        }

        let value = dereferenced.resolved;
        let Some(object) = value.as_object() else {
            return Err(RulesetError::Invalid {
                uri: uri.to_string(),
                message: "Provided ruleset is not an object".to_string(),
            });
        };
        if !object.contains_key("rules") && !object.contains_key("extends") {
            return Err(RulesetError::MissingRulesOrExtends {
                uri: uri.to_string(),
            });
        }
        validation::validate_ruleset(&value).map_err(|message| RulesetError::Invalid {
            uri: uri.to_string(),
            message,
        })?;

        serde_json::from_value(value).map_err(|e| RulesetError::Invalid {
            uri: uri.to_string(),
            message: e.to_string(),
        })
    }

    fn bind_functions(
        &self,
        uri: &str,
        definition: &RulesetDefinition,
    ) -> Result<BTreeMap<String, CustomFunction>, RulesetError> {
        let dir = resolve_uri(
            Some(uri),
            definition
                .functions_dir
                .as_deref()
                .unwrap_or(DEFAULT_FUNCTIONS_DIR),
        );
        let mut bound = BTreeMap::new();
        for declaration in definition.functions.iter().flatten() {
            let name = declaration.name();
            let location = format!("{}/{name}", dir.trim_end_matches('/'));
            let implementation =
                self.registry
                    .lookup(&location, name)
                    .ok_or_else(|| RulesetError::FunctionNotRegistered {
                        uri: uri.to_string(),
                        function: name.to_string(),
                        location: location.clone(),
                    })?;
            let custom = CustomFunction::new(name, location, declaration.schema().cloned(), implementation)
                .map_err(|message| RulesetError::InvalidFunctionSchema {
                    uri: uri.to_string(),
                    function: name.to_string(),
                    message,
                })?;
            bound.insert(name.to_string(), custom);
        }
        Ok(bound)
    }
}

#[derive(Clone)]
/// A fully loaded ruleset. Identity is its source URI.
pub struct Ruleset {
    uri: String,
    definition: RulesetDefinition,
    extends: Vec<(Arc<Ruleset>, RulesetMode)>,
    own_functions: BTreeMap<String, CustomFunction>,
    rules: BTreeMap<String, Rule>,
    functions: HashMap<String, SharedFunction>,
    exceptions: BTreeMap<String, Vec<String>>,
    parser_options: ParserOptions,
}

impl fmt::Debug for Ruleset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut functions: Vec<_> = self.functions.keys().collect();
        functions.sort();
        f.debug_struct("Ruleset")
            .field("uri", &self.uri)
            .field("extends", &self.extends.iter().map(|(r, m)| (&r.uri, m)).collect::<Vec<_>>())
            .field("rules", &self.rules.keys().collect::<Vec<_>>())
            .field("functions", &functions)
            .field("exceptions", &self.exceptions)
            .finish()
    }
}

impl Ruleset {
    fn build(
        uri: String,
        definition: RulesetDefinition,
        own_functions: BTreeMap<String, CustomFunction>,
        extends: Vec<(Arc<Ruleset>, RulesetMode)>,
    ) -> Result<Self, RulesetError> {
        let mut rules = BTreeMap::new();
        let mut functions = HashMap::new();
        let mut exceptions: BTreeMap<String, Vec<String>> = BTreeMap::new();

        for (parent, mode) in &extends {
            for (name, rule) in parent.rules() {
                let mut rule = rule.clone();
                rule.is_inherited = true;
                rule.enabled = match mode {
                    RulesetMode::All => true,
                    RulesetMode::Recommended => rule.recommended,
                    RulesetMode::Off => false,
                };
                rules.insert(name.clone(), rule);
            }
            functions.extend(parent.functions().iter().map(|(k, v)| (k.clone(), v.clone())));
            for (location, names) in parent.exceptions() {
                union_into(exceptions.entry(location.clone()).or_default(), names);
            }
        }

        for (name, custom) in &own_functions {
            let f = custom.function();
            functions.insert(qualified_name(name, &uri), f.clone());
            functions.insert(name.clone(), f);
        }

        if let Some(declarations) = &definition.rules {
            let declared = merge::merge_rules(&mut rules, declarations, &uri)?;
            for name in &declared {
                let Some(rule) = rules.get_mut(name) else {
                    continue;
                };
                for then in &mut rule.then {
                    if own_functions.contains_key(&then.function) {
                        then.function = qualified_name(&then.function, &uri);
                    }
                }
                if rule.is_inherited {
                    continue;
                }
                if rule.documentation_url.is_none() {
                    if let Some(base) = &definition.documentation_url {
                        rule.documentation_url = Some(format!("{base}#{name}"));
                    }
                }
                if rule.formats.is_none() {
                    rule.formats = definition.formats.clone();
                }
            }
        }

        for (location, names) in definition.except.iter().flatten() {
            let Some((doc, pointer)) = location.split_once('#') else {
                return Err(RulesetError::Invalid {
                    uri: uri.clone(),
                    message: format!("Exception location \"{location}\" must contain a '#'"),
                });
            };
            let key = format!("{}#{pointer}", resolve_uri(Some(&uri), doc));
            union_into(exceptions.entry(key).or_default(), names);
        }

        let parser_options = definition.parser_options.unwrap_or_default();
        tracing::debug!(
            uri = %uri,
            rules = rules.len(),
            functions = functions.len(),
            exceptions = exceptions.len(),
            "ruleset built"
        );
        Ok(Self {
            uri,
            definition,
            extends,
            own_functions,
            rules,
            functions,
            exceptions,
            parser_options,
        })
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn definition(&self) -> &RulesetDefinition {
        &self.definition
    }

    /// Directly extended rulesets with the mode each was extended with.
    pub fn extends(&self) -> &[(Arc<Ruleset>, RulesetMode)] {
        &self.extends
    }

    /// Functions declared by this level only, keyed by bare name.
    pub fn own_functions(&self) -> &BTreeMap<String, CustomFunction> {
        &self.own_functions
    }

    pub fn rules(&self) -> &BTreeMap<String, Rule> {
        &self.rules
    }

    pub fn rule(&self, name: &str) -> Option<&Rule> {
        self.rules.get(name)
    }

    /// Execution-time function table: qualified names and bare aliases.
    pub fn functions(&self) -> &HashMap<String, SharedFunction> {
        &self.functions
    }

    pub fn function(&self, name: &str) -> Option<SharedFunction> {
        self.functions.get(name).cloned()
    }

    /// `"<doc>#<pointer>"` locations mapped to the rule names exempted there.
    pub fn exceptions(&self) -> &BTreeMap<String, Vec<String>> {
        &self.exceptions
    }

    pub fn parser_options(&self) -> ParserOptions {
        self.parser_options
    }

    /// Formats declared at the ruleset level.
    pub fn formats(&self) -> Option<&[String]> {
        self.definition.formats.as_deref()
    }
}

fn union_into(target: &mut Vec<String>, names: &[String]) {
    for name in names {
        if !target.contains(name) {
            target.push(name.clone());
        }
    }
}
