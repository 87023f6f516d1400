//! Regular expression checks on string targets.
//!
//! Patterns are plain regexes or JavaScript-style `/source/flags` literals;
//! the `i`, `m` and `s` flags are honored.

use crate::error::FunctionError;
use crate::ruleset::function::{FunctionContext, FunctionOutput, FunctionPaths, RuleResult};
use regex::{Regex, RegexBuilder};
use serde_json::Value as Json;

fn compile(pattern: &str) -> Result<Regex, FunctionError> {
    let literal = pattern
        .strip_prefix('/')
        .and_then(|rest| rest.rfind('/').map(|end| (&rest[..end], &rest[end + 1..])))
        .filter(|(_, flags)| flags.chars().all(|c| "gimsuy".contains(c)));
    let builder = match literal {
        Some((source, flags)) => {
            let mut b = RegexBuilder::new(source);
            b.case_insensitive(flags.contains('i'))
                .multi_line(flags.contains('m'))
                .dot_matches_new_line(flags.contains('s'));
            b
        }
        None => RegexBuilder::new(pattern),
    };
    builder
        .build()
        .map_err(|e| FunctionError::Failed(format!("Invalid pattern '{pattern}': {e}")))
}

pub fn pattern(
    target: Option<&Json>,
    options: Option<&Json>,
    _paths: &FunctionPaths,
    _context: &FunctionContext<'_>,
) -> FunctionOutput {
    let Some(Json::String(value)) = target else {
        return Ok(None);
    };
    let option = |key: &str| options.and_then(|o| o.get(key)).and_then(Json::as_str);
    let mut results = Vec::new();

    if let Some(expected) = option("match") {
        if !compile(expected)?.is_match(value) {
            results.push(RuleResult::new(format!(
                "\"{value}\" must match the pattern '{expected}'"
            )));
        }
    }
    if let Some(forbidden) = option("notMatch") {
        if compile(forbidden)?.is_match(value) {
            results.push(RuleResult::new(format!(
                "\"{value}\" must not match the pattern '{forbidden}'"
            )));
        }
    }
    Ok((!results.is_empty()).then_some(results))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::testing::{call, messages};
    use serde_json::json;

    #[test]
    fn test_match_and_not_match() {
        let opts = json!({"match": "^[a-z]+$"});
        assert!(messages(call(&pattern, Some(&json!("abc")), Some(&opts))).is_empty());
        assert_eq!(
            messages(call(&pattern, Some(&json!("aBc")), Some(&opts))),
            vec!["\"aBc\" must match the pattern '^[a-z]+$'".to_string()]
        );
        let opts = json!({"notMatch": "secret"});
        assert_eq!(messages(call(&pattern, Some(&json!("my-secret")), Some(&opts))).len(), 1);
    }

    #[test]
    fn test_regex_literal_flags() {
        let opts = json!({"match": "/^abc$/i"});
        assert!(messages(call(&pattern, Some(&json!("ABC")), Some(&opts))).is_empty());
    }

    #[test]
    fn test_non_strings_are_ignored_and_bad_patterns_fail() {
        let opts = json!({"match": "^a"});
        assert!(messages(call(&pattern, Some(&json!(3)), Some(&opts))).is_empty());
        let bad = json!({"match": "("});
        assert!(call(&pattern, Some(&json!("a")), Some(&bad)).is_err());
    }
}
