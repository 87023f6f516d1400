//! Structural validation of ruleset documents and rule definitions.

use serde_json::{json, Value as Json};
use std::sync::OnceLock;

const DRAFT: &str = "https://json-schema.org/draft/2020-12/schema";

fn severity_schema() -> Json {
    json!({
        "enum": ["error", "warn", "info", "hint", "off", -1, 0, 1, 2, 3, "-1", "0", "1", "2", "3"]
    })
}

fn then_schema() -> Json {
    json!({
        "type": "object",
        "required": ["function"],
        "properties": {
            "function": {"type": "string", "minLength": 1},
            "field": {"type": "string"},
            "functionOptions": {}
        },
        "additionalProperties": false
    })
}

fn rule_properties() -> Json {
    json!({
        "description": {"type": "string"},
        "message": {"type": "string"},
        "severity": severity_schema(),
        "resolved": {"type": "boolean"},
        "recommended": {"type": "boolean"},
        "documentationUrl": {"type": "string"},
        "formats": {"type": "array", "items": {"type": "string"}},
        "given": {
            "oneOf": [
                {"type": "string", "minLength": 1},
                {"type": "array", "minItems": 1, "items": {"type": "string", "minLength": 1}}
            ]
        },
        "then": {
            "oneOf": [
                then_schema(),
                {"type": "array", "minItems": 1, "items": then_schema()}
            ]
        }
    })
}

/// Schema for a complete rule.
pub fn rule_schema() -> Json {
    json!({
        "$schema": DRAFT,
        "type": "object",
        "required": ["given", "then"],
        "properties": rule_properties(),
        "additionalProperties": false
    })
}

/// Schema for a ruleset document. Rule entries may be partial overrides
/// here; new rules are checked against `rule_schema` once merged.
pub fn ruleset_schema() -> Json {
    let declaration = json!({
        "oneOf": [
            {"type": "boolean"},
            severity_schema(),
            {
                "type": "array",
                "minItems": 1,
                "maxItems": 2,
                "prefixItems": [{"anyOf": [{"type": "boolean"}, severity_schema()]}]
            },
            {
                "type": "object",
                "properties": rule_properties(),
                "additionalProperties": false
            }
        ]
    });
    let extends_entry = json!({
        "oneOf": [
            {"type": "string", "minLength": 1},
            {
                "type": "array",
                "minItems": 2,
                "maxItems": 2,
                "prefixItems": [
                    {"type": "string", "minLength": 1},
                    {"enum": ["off", "recommended", "all"]}
                ]
            }
        ]
    });
    json!({
        "$schema": DRAFT,
        "type": "object",
        "anyOf": [{"required": ["rules"]}, {"required": ["extends"]}],
        "properties": {
            "documentationUrl": {"type": "string"},
            "formats": {"type": "array", "items": {"type": "string"}},
            "functionsDir": {"type": "string"},
            "functions": {
                "type": "array",
                "items": {
                    "oneOf": [
                        {"type": "string", "minLength": 1},
                        {
                            "type": "array",
                            "minItems": 2,
                            "maxItems": 2,
                            "prefixItems": [{"type": "string", "minLength": 1}, {"type": "object"}]
                        }
                    ]
                }
            },
            "except": {
                "type": "object",
                "additionalProperties": {"type": "array", "items": {"type": "string"}}
            },
            "parserOptions": {
                "type": "object",
                "properties": {
                    "duplicateKeys": severity_schema(),
                    "incompatibleValues": severity_schema()
                },
                "additionalProperties": false
            },
            "extends": {
                "oneOf": [
                    {"type": "string", "minLength": 1},
                    {"type": "array", "items": extends_entry}
                ]
            },
            "rules": {"type": "object", "additionalProperties": declaration}
        }
    })
}

fn compiled(
    cell: &'static OnceLock<Result<jsonschema::Validator, String>>,
    schema: fn() -> Json,
) -> Result<&'static jsonschema::Validator, String> {
    cell.get_or_init(|| jsonschema::validator_for(&schema()).map_err(|e| e.to_string()))
        .as_ref()
        .map_err(Clone::clone)
}

fn collect_errors(validator: &jsonschema::Validator, value: &Json) -> Result<(), String> {
    let errors: Vec<String> = validator
        .iter_errors(value)
        .map(|e| {
            let at = e.instance_path().to_string();
            if at.is_empty() {
                e.to_string()
            } else {
                format!("{at} {e}")
            }
        })
        .collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors.join("\n"))
    }
}

/// Validate a whole ruleset document; `Err` carries one line per problem.
pub fn validate_ruleset(value: &Json) -> Result<(), String> {
    static CELL: OnceLock<Result<jsonschema::Validator, String>> = OnceLock::new();
    collect_errors(compiled(&CELL, ruleset_schema)?, value)
}

/// Validate one complete rule definition.
pub fn validate_rule(value: &Json) -> Result<(), String> {
    static CELL: OnceLock<Result<jsonschema::Validator, String>> = OnceLock::new();
    collect_errors(compiled(&CELL, rule_schema)?, value)
}

/// Compile a function options schema.
pub fn compile_schema(schema: &Json) -> Result<jsonschema::Validator, String> {
    jsonschema::validator_for(schema).map_err(|e| e.to_string())
}

/// Validate `value` against a compiled schema.
pub fn check(validator: &jsonschema::Validator, value: &Json) -> Result<(), String> {
    collect_errors(validator, value)
}
