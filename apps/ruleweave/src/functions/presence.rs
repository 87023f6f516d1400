//! Presence and truthiness checks.

use super::is_truthy;
use crate::ruleset::function::{FunctionContext, FunctionOutput, FunctionPaths, RuleResult};
use serde_json::Value as Json;

fn report(message: &str) -> FunctionOutput {
    Ok(Some(vec![RuleResult::new(message)]))
}

pub fn truthy(
    target: Option<&Json>,
    _options: Option<&Json>,
    _paths: &FunctionPaths,
    _context: &FunctionContext<'_>,
) -> FunctionOutput {
    if is_truthy(target) {
        return Ok(None);
    }
    report("{{property|gravis|append-property}}is not truthy")
}

pub fn falsy(
    target: Option<&Json>,
    _options: Option<&Json>,
    _paths: &FunctionPaths,
    _context: &FunctionContext<'_>,
) -> FunctionOutput {
    if !is_truthy(target) {
        return Ok(None);
    }
    report("{{property|gravis|append-property}}is not falsy")
}

pub fn defined(
    target: Option<&Json>,
    _options: Option<&Json>,
    _paths: &FunctionPaths,
    _context: &FunctionContext<'_>,
) -> FunctionOutput {
    if target.is_some() {
        return Ok(None);
    }
    report("{{property|gravis|append-property}}must be defined")
}

pub fn undefined(
    target: Option<&Json>,
    _options: Option<&Json>,
    _paths: &FunctionPaths,
    _context: &FunctionContext<'_>,
) -> FunctionOutput {
    if target.is_none() {
        return Ok(None);
    }
    report("{{property|gravis|append-property}}must be undefined")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::testing::{call, messages};
    use serde_json::json;

    #[test]
    fn test_truthy_and_falsy() {
        assert!(messages(call(&truthy, Some(&json!("x")), None)).is_empty());
        assert_eq!(
            messages(call(&truthy, Some(&json!("")), None)),
            vec!["{{property|gravis|append-property}}is not truthy".to_string()]
        );
        assert_eq!(messages(call(&truthy, None, None)).len(), 1);
        assert!(messages(call(&falsy, Some(&json!(false)), None)).is_empty());
        assert_eq!(messages(call(&falsy, Some(&json!({})), None)).len(), 1);
    }

    #[test]
    fn test_defined_and_undefined() {
        assert!(messages(call(&defined, Some(&json!(null)), None)).is_empty());
        assert_eq!(messages(call(&defined, None, None)).len(), 1);
        assert!(messages(call(&undefined, None, None)).is_empty());
        assert_eq!(messages(call(&undefined, Some(&json!(1)), None)).len(), 1);
    }
}
