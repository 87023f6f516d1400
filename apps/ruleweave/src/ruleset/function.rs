//! Rule functions and the registry that binds ruleset declarations to them.
//!
//! A ruleset never carries executable code. It declares function names; the
//! host registers implementations either under the function URI
//! (`<ruleset dir>/<functionsDir>/<name>`) or under the bare name, and
//! loading binds each declaration to the registered implementation.

use super::validation;
use crate::document::NULL;
use crate::error::FunctionError;
use crate::inventory::DocumentInventory;
use crate::models::JsonPath;
use serde_json::Value as Json;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
/// Paths of the matched node and of the actual lint target.
pub struct FunctionPaths {
    pub given: JsonPath,
    pub target: JsonPath,
}

#[derive(Clone, Copy)]
/// Read-only view handed to every function invocation.
pub struct FunctionContext<'a> {
    /// Matched value before any `field` narrowing.
    pub original: &'a Json,
    pub given: &'a Json,
    pub inventory: &'a DocumentInventory,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Raw function output before location resolution.
pub struct RuleResult {
    pub message: String,
    /// Overrides the target path for placement when set.
    pub path: Option<JsonPath>,
}

impl RuleResult {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            path: None,
        }
    }

    pub fn at(message: impl Into<String>, path: JsonPath) -> Self {
        Self {
            message: message.into(),
            path: Some(path),
        }
    }
}

pub type FunctionOutput = Result<Option<Vec<RuleResult>>, FunctionError>;

/// A rule function: `(target, options, paths, context) -> results | none`.
pub trait RuleFunction: Send + Sync {
    fn call(
        &self,
        target: Option<&Json>,
        options: Option<&Json>,
        paths: &FunctionPaths,
        context: &FunctionContext<'_>,
    ) -> FunctionOutput;
}

impl<F> RuleFunction for F
where
    F: Fn(Option<&Json>, Option<&Json>, &FunctionPaths, &FunctionContext<'_>) -> FunctionOutput
        + Send
        + Sync,
{
    fn call(
        &self,
        target: Option<&Json>,
        options: Option<&Json>,
        paths: &FunctionPaths,
        context: &FunctionContext<'_>,
    ) -> FunctionOutput {
        self(target, options, paths, context)
    }
}

pub type SharedFunction = Arc<dyn RuleFunction>;

/// Validates options against a JSON Schema before delegating.
pub struct SchemaValidated {
    name: String,
    validator: jsonschema::Validator,
    inner: SharedFunction,
}

impl SchemaValidated {
    pub fn new(name: impl Into<String>, schema: &Json, inner: SharedFunction) -> Result<Self, String> {
        Ok(Self {
            name: name.into(),
            validator: validation::compile_schema(schema)?,
            inner,
        })
    }
}

impl RuleFunction for SchemaValidated {
    fn call(
        &self,
        target: Option<&Json>,
        options: Option<&Json>,
        paths: &FunctionPaths,
        context: &FunctionContext<'_>,
    ) -> FunctionOutput {
        validation::check(&self.validator, options.unwrap_or(&NULL)).map_err(|message| {
            FunctionError::InvalidOptions {
                function: self.name.clone(),
                message,
            }
        })?;
        self.inner.call(target, options, paths, context)
    }
}

#[derive(Clone)]
/// A ruleset-declared function bound to its implementation.
pub struct CustomFunction {
    pub name: String,
    pub uri: String,
    pub schema: Option<Json>,
    compiled: SharedFunction,
}

impl fmt::Debug for CustomFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomFunction")
            .field("name", &self.name)
            .field("uri", &self.uri)
            .field("schema", &self.schema)
            .finish()
    }
}

impl CustomFunction {
    /// Bind `implementation`, wrapping it with options validation when a
    /// schema is declared. The result is immutable.
    pub fn new(
        name: impl Into<String>,
        uri: impl Into<String>,
        schema: Option<Json>,
        implementation: SharedFunction,
    ) -> Result<Self, String> {
        let name = name.into();
        let compiled: SharedFunction = match &schema {
            Some(s) => Arc::new(SchemaValidated::new(name.clone(), s, implementation)?),
            None => implementation,
        };
        Ok(Self {
            name,
            uri: uri.into(),
            schema,
            compiled,
        })
    }

    pub fn function(&self) -> SharedFunction {
        self.compiled.clone()
    }
}

/// Ruleset-scoped function name: `<name>-<16 hex digits of sha256(uri)>`.
pub fn qualified_name(name: &str, ruleset_uri: &str) -> String {
    let digest = Sha256::digest(ruleset_uri.as_bytes());
    let hex = hex::encode(digest);
    format!("{name}-{}", &hex[..16])
}

#[derive(Clone, Default)]
/// Host-side table of implementations available to rulesets.
pub struct FunctionRegistry {
    by_uri: HashMap<String, SharedFunction>,
    by_name: HashMap<String, SharedFunction>,
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut uris: Vec<_> = self.by_uri.keys().collect();
        uris.sort();
        let mut names: Vec<_> = self.by_name.keys().collect();
        names.sort();
        f.debug_struct("FunctionRegistry")
            .field("by_uri", &uris)
            .field("by_name", &names)
            .finish()
    }
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an implementation for any ruleset declaring `name`.
    pub fn register(&mut self, name: impl Into<String>, function: SharedFunction) -> &mut Self {
        self.by_name.insert(name.into(), function);
        self
    }

    /// Register an implementation for one function URI only.
    pub fn register_at(&mut self, uri: impl Into<String>, function: SharedFunction) -> &mut Self {
        self.by_uri.insert(uri.into(), function);
        self
    }

    /// Implementation for a declaration: exact URI first, then bare name.
    pub fn lookup(&self, uri: &str, name: &str) -> Option<SharedFunction> {
        self.by_uri
            .get(uri)
            .or_else(|| self.by_name.get(name))
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::SourceDocument;
    use crate::inventory::Resolver;
    use serde_json::json;

    fn always(message: &'static str) -> SharedFunction {
        Arc::new(
            move |_: Option<&Json>, _: Option<&Json>, _: &FunctionPaths, _: &FunctionContext<'_>| -> FunctionOutput {
                Ok(Some(vec![RuleResult::new(message)]))
            },
        )
    }

    fn inventory() -> DocumentInventory {
        let doc = Arc::new(SourceDocument::from_source("{}", Some("/d.json".into())));
        DocumentInventory::resolve(doc, &Resolver::default())
    }

    #[test]
    fn test_qualified_names_depend_on_ruleset_uri() {
        let a = qualified_name("check", "/rules/a.yaml");
        let b = qualified_name("check", "/rules/b.yaml");
        assert_ne!(a, b);
        assert!(a.starts_with("check-"));
        assert_eq!(a.len(), "check-".len() + 16);
        assert_eq!(a, qualified_name("check", "/rules/a.yaml"));
    }

    #[test]
    fn test_registry_prefers_uri_over_name() {
        let mut reg = FunctionRegistry::new();
        reg.register("check", always("by name"))
            .register_at("/rules/functions/check", always("by uri"));
        let inv = inventory();
        let ctx = FunctionContext {
            original: &Json::Null,
            given: &Json::Null,
            inventory: &inv,
        };
        let paths = FunctionPaths::default();
        let f = reg.lookup("/rules/functions/check", "check").unwrap();
        assert_eq!(f.call(None, None, &paths, &ctx).unwrap().unwrap()[0].message, "by uri");
        let f = reg.lookup("/elsewhere/functions/check", "check").unwrap();
        assert_eq!(f.call(None, None, &paths, &ctx).unwrap().unwrap()[0].message, "by name");
        assert!(reg.lookup("/x", "missing").is_none());
    }

    #[test]
    fn test_schema_decorator_rejects_bad_options() {
        let custom = CustomFunction::new(
            "check",
            "/rules/functions/check",
            Some(json!({"type": "object", "required": ["max"]})),
            always("ran"),
        )
        .unwrap();
        let inv = inventory();
        let ctx = FunctionContext {
            original: &Json::Null,
            given: &Json::Null,
            inventory: &inv,
        };
        let paths = FunctionPaths::default();
        let f = custom.function();
        let err = f.call(None, Some(&json!({})), &paths, &ctx).unwrap_err();
        assert!(matches!(err, FunctionError::InvalidOptions { .. }));
        assert!(f.call(None, Some(&json!({"max": 1})), &paths, &ctx).is_ok());
    }

    #[test]
    fn test_invalid_schema_is_rejected_at_bind_time() {
        let res = CustomFunction::new("c", "/u", Some(json!({"type": 12})), always("x"));
        assert!(res.is_err());
    }
}
