//! Built-in rule functions.
//!
//! Every built-in follows the `RuleFunction` signature. Functions with
//! options are wrapped in `SchemaValidated`, so bad options surface as
//! `FunctionError::InvalidOptions` before the function body runs.

mod enumeration;
mod length;
mod pattern;
mod presence;
mod schema;

use crate::ruleset::function::{SchemaValidated, SharedFunction};
use serde_json::{json, Value as Json};
use std::collections::HashMap;
use std::sync::Arc;

pub use enumeration::enumeration;
pub use length::length;
pub use pattern::pattern;
pub use presence::{defined, falsy, truthy, undefined};
pub use schema::schema;

/// Truthiness as rule authors expect it: `null`, `false`, `0`, `""` and a
/// missing value are falsy, everything else is truthy.
pub fn is_truthy(value: Option<&Json>) -> bool {
    match value {
        None | Some(Json::Null) => false,
        Some(Json::Bool(b)) => *b,
        Some(Json::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Some(Json::String(s)) => !s.is_empty(),
        Some(Json::Array(_)) | Some(Json::Object(_)) => true,
    }
}

/// Short rendering of a value for messages: strings unquoted, the rest as JSON.
pub(crate) fn print_value(value: &Json) -> String {
    match value {
        Json::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn validated(name: &str, schema: Json, inner: SharedFunction) -> SharedFunction {
    match SchemaValidated::new(name, &schema, inner.clone()) {
        Ok(f) => Arc::new(f),
        Err(err) => {
            tracing::warn!(function = name, %err, "built-in options schema rejected; running unchecked");
            inner
        }
    }
}

/// Table of built-in functions keyed by name.
pub fn builtins() -> HashMap<String, SharedFunction> {
    let mut table: HashMap<String, SharedFunction> = HashMap::new();
    table.insert("truthy".into(), Arc::new(truthy));
    table.insert("falsy".into(), Arc::new(falsy));
    table.insert("defined".into(), Arc::new(defined));
    table.insert("undefined".into(), Arc::new(undefined));
    table.insert(
        "pattern".into(),
        validated(
            "pattern",
            json!({
                "type": "object",
                "properties": {
                    "match": {"type": "string"},
                    "notMatch": {"type": "string"}
                },
                "anyOf": [{"required": ["match"]}, {"required": ["notMatch"]}],
                "additionalProperties": false
            }),
            Arc::new(pattern),
        ),
    );
    table.insert(
        "enumeration".into(),
        validated(
            "enumeration",
            json!({
                "type": "object",
                "properties": {"values": {"type": "array"}},
                "required": ["values"],
                "additionalProperties": false
            }),
            Arc::new(enumeration),
        ),
    );
    table.insert(
        "length".into(),
        validated(
            "length",
            json!({
                "type": "object",
                "properties": {
                    "min": {"type": "number"},
                    "max": {"type": "number"}
                },
                "anyOf": [{"required": ["min"]}, {"required": ["max"]}],
                "additionalProperties": false
            }),
            Arc::new(length),
        ),
    );
    table.insert(
        "schema".into(),
        validated(
            "schema",
            json!({
                "type": "object",
                "properties": {
                    "schema": {"type": ["object", "boolean"]},
                    "allErrors": {"type": "boolean"}
                },
                "required": ["schema"],
                "additionalProperties": false
            }),
            Arc::new(schema),
        ),
    );
    table
}

#[cfg(test)]
pub(crate) mod testing {
    use crate::document::SourceDocument;
    use crate::inventory::{DocumentInventory, Resolver};
    use crate::ruleset::function::{FunctionContext, FunctionOutput, FunctionPaths, RuleFunction};
    use crate::models::Segment;
    use serde_json::Value as Json;
    use std::sync::Arc;

    /// Call `f` on `target` with the target path `["x"]`, returning messages.
    pub fn call(f: &dyn RuleFunction, target: Option<&Json>, options: Option<&Json>) -> FunctionOutput {
        let doc = Arc::new(SourceDocument::from_source("{}", Some("/t.json".into())));
        let inventory = DocumentInventory::resolve(doc, &Resolver::default());
        let ctx = FunctionContext {
            original: &Json::Null,
            given: &Json::Null,
            inventory: &inventory,
        };
        let paths = FunctionPaths {
            given: vec![],
            target: vec![Segment::from("x")],
        };
        f.call(target, options, &paths, &ctx)
    }

    pub fn messages(out: FunctionOutput) -> Vec<String> {
        out.ok()
            .flatten()
            .unwrap_or_default()
            .into_iter()
            .map(|r| r.message)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{call, messages};
    use super::*;
    use crate::error::FunctionError;

    #[test]
    fn test_truthiness() {
        assert!(!is_truthy(None));
        assert!(!is_truthy(Some(&json!(""))));
        assert!(!is_truthy(Some(&json!(0))));
        assert!(!is_truthy(Some(&json!(null))));
        assert!(is_truthy(Some(&json!([]))));
        assert!(is_truthy(Some(&json!("a"))));
        assert!(is_truthy(Some(&json!(0.5))));
    }

    #[test]
    fn test_builtins_validate_their_options() {
        let table = builtins();
        for name in ["truthy", "falsy", "defined", "undefined", "pattern", "enumeration", "length", "schema"] {
            assert!(table.contains_key(name), "{name}");
        }
        let err = call(table["pattern"].as_ref(), Some(&json!("a")), Some(&json!({}))).unwrap_err();
        assert!(matches!(err, FunctionError::InvalidOptions { .. }));
        let out = call(table["pattern"].as_ref(), Some(&json!("a")), Some(&json!({"match": "^b"})));
        assert_eq!(messages(out).len(), 1);
    }
}
