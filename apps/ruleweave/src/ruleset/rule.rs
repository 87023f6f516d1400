//! Compiled rule model.

use crate::models::definition::{OneOrMany, RuleDefinition, ThenDefinition};
use crate::models::RuleSeverity;
use serde_json::Value as Json;

#[derive(Debug, Clone, PartialEq)]
/// One `then` clause.
pub struct Then {
    pub function: String,
    pub field: Option<String>,
    pub function_options: Option<Json>,
}

impl From<ThenDefinition> for Then {
    fn from(def: ThenDefinition) -> Self {
        Self {
            function: def.function,
            field: def.field,
            function_options: def.function_options,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    pub name: String,
    pub description: Option<String>,
    pub message: Option<String>,
    pub severity: RuleSeverity,
    /// Run against the resolved tree (default) or the raw one.
    pub resolved: bool,
    pub given: Vec<String>,
    pub then: Vec<Then>,
    pub formats: Option<Vec<String>>,
    pub enabled: bool,
    pub recommended: bool,
    pub documentation_url: Option<String>,
    /// Set when the rule came from an extended ruleset.
    pub is_inherited: bool,
}

impl Rule {
    pub fn new(name: impl Into<String>, def: RuleDefinition) -> Self {
        let recommended = def.recommended != Some(false);
        Self {
            name: name.into(),
            description: def.description,
            message: def.message,
            severity: def.severity.unwrap_or_default(),
            resolved: def.resolved != Some(false),
            given: def.given.into_vec(),
            then: def.then.into_vec().into_iter().map(Then::from).collect(),
            formats: def.formats,
            enabled: recommended,
            recommended,
            documentation_url: def.documentation_url,
            is_inherited: false,
        }
    }

    /// Build from a raw definition value.
    pub fn from_json(name: &str, value: Json) -> Result<Self, String> {
        let def: RuleDefinition = serde_json::from_value(value).map_err(|e| e.to_string())?;
        Ok(Self::new(name, def))
    }

    /// Definition view of the rule, used as the base of a deep merge.
    pub fn to_definition(&self) -> RuleDefinition {
        RuleDefinition {
            description: self.description.clone(),
            message: self.message.clone(),
            severity: Some(self.severity),
            resolved: Some(self.resolved),
            recommended: Some(self.recommended),
            formats: self.formats.clone(),
            documentation_url: self.documentation_url.clone(),
            given: OneOrMany::Many(self.given.clone()),
            then: OneOrMany::Many(
                self.then
                    .iter()
                    .map(|t| ThenDefinition {
                        function: t.function.clone(),
                        field: t.field.clone(),
                        function_options: t.function_options.clone(),
                    })
                    .collect(),
            ),
        }
    }

    /// New rule with `patch` deep-merged over this one. Objects merge key by
    /// key; arrays and scalars in `patch` replace. `enabled` follows the
    /// merged `recommended` flag.
    pub fn merge(&self, patch: &Json) -> Result<Rule, String> {
        let mut base = serde_json::to_value(self.to_definition()).map_err(|e| e.to_string())?;
        deep_merge(&mut base, patch);
        let mut merged = Rule::from_json(&self.name, base)?;
        merged.is_inherited = self.is_inherited;
        Ok(merged)
    }

    /// Enabled and not switched off by severity.
    pub fn is_active(&self) -> bool {
        self.enabled && self.severity != RuleSeverity::Off
    }

    /// Whether the rule applies to a document with the detected `formats`.
    pub fn matches_formats(&self, formats: Option<&[String]>) -> bool {
        match (&self.formats, formats) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(wanted), Some(have)) => wanted.iter().any(|f| have.contains(f)),
        }
    }
}

pub(crate) fn deep_merge(base: &mut Json, patch: &Json) {
    match (base, patch) {
        (Json::Object(target), Json::Object(source)) => {
            for (k, v) in source {
                let nested = v.is_object() && target.get(k).is_some_and(Json::is_object);
                if !nested {
                    target.insert(k.clone(), v.clone());
                } else if let Some(existing) = target.get_mut(k) {
                    deep_merge(existing, v);
                }
            }
        }
        (target, source) => *target = source.clone(),
    }
}
