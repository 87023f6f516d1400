//! Message templates.
//!
//! Placeholders take the form `{{name}}` or `{{name|transformer|...}}`,
//! with transformers applied left to right. Known names: `property`,
//! `error`, `path`, `description`, `value`. Unknown names render empty.

use crate::functions::is_truthy;
use serde_json::Value as Json;

#[derive(Debug, Clone, Default, PartialEq)]
/// Variables available to a message template.
pub struct MessageVars {
    pub property: String,
    pub error: String,
    pub path: String,
    pub description: Option<String>,
    /// Value at the diagnostic path; `None` when the path does not exist.
    pub value: Option<Json>,
}

impl MessageVars {
    fn get(&self, name: &str) -> Option<Json> {
        match name {
            "property" => Some(Json::String(self.property.clone())),
            "error" => Some(Json::String(self.error.clone())),
            "path" => Some(Json::String(self.path.clone())),
            "description" => Some(self.description.clone().map_or(Json::Null, Json::String)),
            "value" => self.value.clone(),
            _ => None,
        }
    }
}

fn type_of(value: Option<&Json>) -> &'static str {
    match value {
        None => "undefined",
        Some(Json::String(_)) => "string",
        Some(Json::Number(_)) => "number",
        Some(Json::Bool(_)) => "boolean",
        Some(_) => "object",
    }
}

fn render(value: Option<&Json>) -> String {
    match value {
        None | Some(Json::Null) => String::new(),
        Some(Json::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

fn transform(name: &str, value: Option<Json>, vars: &MessageVars) -> Option<Json> {
    let wrap = |value: Option<Json>, before: &str, after: &str| {
        let text = if is_truthy(value.as_ref()) {
            format!("{before}{}{after}", render(value.as_ref()))
        } else {
            String::new()
        };
        Some(Json::String(text))
    };
    match name {
        "double-quotes" => wrap(value, "\"", "\""),
        "single-quotes" => wrap(value, "'", "'"),
        "gravis" => wrap(value, "`", "`"),
        "append-property" => wrap(value, "", " property "),
        "capitalize" => Some(Json::String(capitalize(&render(value.as_ref())))),
        "optional-typeof" => match value {
            Some(Json::String(s)) => Some(Json::String(s)),
            _ => Some(Json::String(format!("{} ", type_of(vars.value.as_ref())))),
        },
        "to-string" => Some(Json::String(match &value {
            Some(Json::Array(_)) => "Array[]".to_string(),
            Some(Json::Object(_)) => "Object{}".to_string(),
            Some(other) => other.to_string(),
            None => String::new(),
        })),
        other => {
            tracing::trace!(transformer = other, "unknown message transformer");
            value
        }
    }
}

fn evaluate(expression: &str, vars: &MessageVars) -> String {
    let mut parts = expression.split('|').map(str::trim);
    let name = parts.next().unwrap_or_default();
    let mut value = vars.get(name);
    for transformer in parts {
        value = transform(transformer, value, vars);
    }
    render(value.as_ref())
}

/// Interpolate `template` with `vars`.
pub fn interpolate(template: &str, vars: &MessageVars) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        let Some(end) = rest[start + 2..].find("}}") else {
            break;
        };
        out.push_str(&rest[..start]);
        out.push_str(&evaluate(&rest[start + 2..start + 2 + end], vars));
        rest = &rest[start + 2 + end + 2..];
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vars() -> MessageVars {
        MessageVars {
            property: "title".into(),
            error: "is not truthy".into(),
            path: "#/info/title".into(),
            description: Some("Info must have a title".into()),
            value: Some(json!("")),
        }
    }

    #[test]
    fn test_plain_variables() {
        assert_eq!(
            interpolate("{{description}} at {{path}}: {{error}}", &vars()),
            "Info must have a title at #/info/title: is not truthy"
        );
        assert_eq!(interpolate("{{nope}}x", &vars()), "x");
        assert_eq!(interpolate("no placeholders", &vars()), "no placeholders");
        assert_eq!(interpolate("dangling {{error", &vars()), "dangling {{error");
    }

    #[test]
    fn test_transformers() {
        let v = vars();
        assert_eq!(interpolate("{{property|gravis|append-property}}is bad", &v), "`title` property is bad");
        assert_eq!(interpolate("{{property|double-quotes}}", &v), "\"title\"");
        assert_eq!(interpolate("{{property|single-quotes}}", &v), "'title'");
        assert_eq!(interpolate("{{error|capitalize}}", &v), "Is not truthy");
        assert_eq!(interpolate("{{value|double-quotes}}", &v), "");

        let empty = MessageVars::default();
        assert_eq!(interpolate("{{property|gravis|append-property}}is bad", &empty), "is bad");
    }

    #[test]
    fn test_typeof_and_to_string() {
        let mut v = vars();
        v.value = Some(json!({"a": 1}));
        assert_eq!(interpolate("{{value|to-string}}", &v), "Object{}");
        assert_eq!(interpolate("{{value|optional-typeof}}value", &v), "object value");
        v.value = Some(json!([1]));
        assert_eq!(interpolate("{{value|to-string}}", &v), "Array[]");
        v.value = Some(json!(3));
        assert_eq!(interpolate("{{value|to-string}}", &v), "3");
        assert_eq!(interpolate("{{property|optional-typeof}}", &v), "title");
    }
}
