//! Rule declaration merging.
//!
//! | declaration              | effect                                          |
//! |--------------------------|-------------------------------------------------|
//! | `true` / `false`         | enable / disable the existing rule              |
//! | severity token           | enable and set severity; `off` disables         |
//! | `[token]`                | same as the scalar form                         |
//! | `[token, options]`       | as above, then replace every clause's options   |
//! | object                   | new rule, or deep merge onto the existing one   |
//!
//! Every form except an object requires an existing rule. A severity of
//! `off` stays in effect until a later level sets another severity.

use super::rule::Rule;
use super::validation;
use crate::error::RulesetError;
use crate::models::RuleSeverity;
use serde_json::{Map, Value as Json};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, PartialEq)]
enum Head {
    Toggle(bool),
    Severity(RuleSeverity),
}

#[derive(Debug, Clone, PartialEq)]
enum Declaration {
    Head(Head),
    WithOptions(Head, Json),
    Rule(Json),
}

fn head(value: &Json) -> Option<Head> {
    match value {
        Json::Bool(b) => Some(Head::Toggle(*b)),
        other => RuleSeverity::from_token(other).map(Head::Severity),
    }
}

fn classify(value: &Json) -> Option<Declaration> {
    match value {
        Json::Object(_) => Some(Declaration::Rule(value.clone())),
        Json::Array(items) => match items.as_slice() {
            [first] => head(first).map(Declaration::Head),
            [first, options] => head(first).map(|h| Declaration::WithOptions(h, options.clone())),
            _ => None,
        },
        other => head(other).map(Declaration::Head),
    }
}

fn apply_head(rule: &mut Rule, head: &Head) {
    match head {
        Head::Toggle(enabled) => rule.enabled = *enabled,
        Head::Severity(severity) => {
            rule.severity = *severity;
            rule.enabled = *severity != RuleSeverity::Off;
        }
    }
}

/// Apply one ruleset level's declarations onto `rules`. Returns the names
/// declared as objects at this level.
pub(crate) fn merge_rules(
    rules: &mut BTreeMap<String, Rule>,
    declarations: &Map<String, Json>,
    uri: &str,
) -> Result<BTreeSet<String>, RulesetError> {
    let mut declared = BTreeSet::new();
    for (name, value) in declarations {
        let Some(declaration) = classify(value) else {
            return Err(RulesetError::InvalidRule {
                uri: uri.to_string(),
                rule: name.clone(),
                message: "Invalid value for a rule".to_string(),
            });
        };
        let existing = rules.get(name);
        let merged = match (declaration, existing) {
            (Declaration::Rule(patch), Some(rule)) => {
                rule.merge(&patch).map_err(|message| RulesetError::InvalidRule {
                    uri: uri.to_string(),
                    rule: name.clone(),
                    message,
                })?
            }
            (Declaration::Rule(def), None) => {
                let invalid = |message: String| RulesetError::InvalidRule {
                    uri: uri.to_string(),
                    rule: name.clone(),
                    message,
                };
                validation::validate_rule(&def).map_err(invalid)?;
                Rule::from_json(name, def).map_err(invalid)?
            }
            (_, None) => {
                return Err(RulesetError::UnknownRule {
                    uri: uri.to_string(),
                    rule: name.clone(),
                })
            }
            (Declaration::Head(h), Some(rule)) => {
                let mut rule = rule.clone();
                apply_head(&mut rule, &h);
                rule
            }
            (Declaration::WithOptions(h, options), Some(rule)) => {
                let mut rule = rule.clone();
                apply_head(&mut rule, &h);
                for then in &mut rule.then {
                    then.function_options = Some(options.clone());
                }
                rule
            }
        };
        if value.is_object() {
            declared.insert(name.clone());
        }
        tracing::trace!(rule = %name, enabled = merged.enabled, severity = %merged.severity, "rule merged");
        rules.insert(name.clone(), merged);
    }
    Ok(declared)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn inherited() -> BTreeMap<String, Rule> {
        let mut rule = Rule::from_json(
            "r",
            json!({"given": "$", "then": [{"function": "a"}, {"function": "b"}], "severity": "warn"}),
        )
        .unwrap();
        rule.is_inherited = true;
        BTreeMap::from([("r".to_string(), rule)])
    }

    fn apply(decl: Json) -> Result<BTreeMap<String, Rule>, RulesetError> {
        let mut rules = inherited();
        let map = json!({ "r": decl });
        merge_rules(&mut rules, map.as_object().unwrap(), "/rs.yaml")?;
        Ok(rules)
    }

    #[test]
    fn test_severity_override_precedence() {
        let r = &apply(json!("error")).unwrap()["r"];
        assert_eq!(r.severity, RuleSeverity::Error);
        assert!(r.is_active());

        let r = &apply(json!(false)).unwrap()["r"];
        assert!(!r.enabled);

        let r = &apply(json!(true)).unwrap()["r"];
        assert!(r.enabled);
        assert_eq!(r.severity, RuleSeverity::Warn);

        let r = &apply(json!("off")).unwrap()["r"];
        assert!(!r.is_active());

        let r = &apply(json!([2])).unwrap()["r"];
        assert_eq!(r.severity, RuleSeverity::Info);
    }

    #[test]
    fn test_off_is_sticky_against_true() {
        let mut rules = inherited();
        let first = json!({"r": "off"});
        merge_rules(&mut rules, first.as_object().unwrap(), "/a.yaml").unwrap();
        let second = json!({"r": true});
        merge_rules(&mut rules, second.as_object().unwrap(), "/b.yaml").unwrap();
        assert!(rules["r"].enabled);
        assert!(!rules["r"].is_active());
    }

    #[test]
    fn test_options_pair_overwrites_every_clause() {
        let r = &apply(json!(["error", {"max": 3}])).unwrap()["r"];
        assert_eq!(r.severity, RuleSeverity::Error);
        assert!(r.then.iter().all(|t| t.function_options == Some(json!({"max": 3}))));
    }

    #[test]
    fn test_object_override_clones_and_deep_merges() {
        let base = inherited();
        let mut rules = base.clone();
        let decl = json!({"r": {"description": "new"}});
        let declared = merge_rules(&mut rules, decl.as_object().unwrap(), "/rs.yaml").unwrap();
        assert!(declared.contains("r"));
        assert_eq!(rules["r"].description.as_deref(), Some("new"));
        assert_eq!(rules["r"].then.len(), 2);
        assert!(rules["r"].is_inherited);
        assert_eq!(base["r"].description, None);
    }

    #[test]
    fn test_unknown_rule_and_invalid_values() {
        let mut rules = BTreeMap::new();
        let decl = json!({"ghost": "error"});
        let err = merge_rules(&mut rules, decl.as_object().unwrap(), "/rs.yaml").unwrap_err();
        assert!(matches!(err, RulesetError::UnknownRule { ref rule, .. } if rule == "ghost"));

        assert!(matches!(apply(json!("fatal")), Err(RulesetError::InvalidRule { .. })));

        let mut rules = BTreeMap::new();
        let decl = json!({"half": {"given": "$"}});
        let err = merge_rules(&mut rules, decl.as_object().unwrap(), "/rs.yaml").unwrap_err();
        assert!(matches!(err, RulesetError::InvalidRule { .. }));
    }
}
