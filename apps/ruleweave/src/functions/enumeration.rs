//! Allowed-values check.

use super::print_value;
use crate::ruleset::function::{FunctionContext, FunctionOutput, FunctionPaths, RuleResult};
use serde_json::Value as Json;

pub fn enumeration(
    target: Option<&Json>,
    options: Option<&Json>,
    _paths: &FunctionPaths,
    _context: &FunctionContext<'_>,
) -> FunctionOutput {
    let Some(value) = target else {
        return Ok(None);
    };
    let values = options
        .and_then(|o| o.get("values"))
        .and_then(Json::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    if values.contains(value) {
        return Ok(None);
    }
    let allowed = values.iter().map(print_value).collect::<Vec<_>>().join(", ");
    Ok(Some(vec![RuleResult::new(format!(
        "\"{}\" must be equal to one of the allowed values: {allowed}",
        print_value(value)
    ))]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::testing::{call, messages};
    use serde_json::json;

    #[test]
    fn test_enumeration() {
        let opts = json!({"values": ["a", "b", 3]});
        assert!(messages(call(&enumeration, Some(&json!("a")), Some(&opts))).is_empty());
        assert!(messages(call(&enumeration, Some(&json!(3)), Some(&opts))).is_empty());
        assert!(messages(call(&enumeration, None, Some(&opts))).is_empty());
        assert_eq!(
            messages(call(&enumeration, Some(&json!("c")), Some(&opts))),
            vec!["\"c\" must be equal to one of the allowed values: a, b, 3".to_string()]
        );
    }
}
