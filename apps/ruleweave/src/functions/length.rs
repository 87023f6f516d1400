//! Size bounds for strings, arrays, objects and numbers.

use crate::ruleset::function::{FunctionContext, FunctionOutput, FunctionPaths, RuleResult};
use serde_json::Value as Json;

fn measure(value: &Json) -> Option<f64> {
    match value {
        Json::String(s) => Some(s.chars().count() as f64),
        Json::Array(items) => Some(items.len() as f64),
        Json::Object(map) => Some(map.len() as f64),
        Json::Number(n) => n.as_f64(),
        _ => None,
    }
}

pub fn length(
    target: Option<&Json>,
    options: Option<&Json>,
    _paths: &FunctionPaths,
    _context: &FunctionContext<'_>,
) -> FunctionOutput {
    let Some(size) = target.and_then(measure) else {
        return Ok(None);
    };
    let bound = |key: &str| options.and_then(|o| o.get(key)).and_then(Json::as_f64);
    let mut results = Vec::new();
    if let Some(min) = bound("min") {
        if size < min {
            results.push(RuleResult::new(format!(
                "{{{{property|gravis|append-property}}}}must not be shorter than {min}"
            )));
        }
    }
    if let Some(max) = bound("max") {
        if size > max {
            results.push(RuleResult::new(format!(
                "{{{{property|gravis|append-property}}}}must not be longer than {max}"
            )));
        }
    }
    Ok((!results.is_empty()).then_some(results))
}
