//! Document format detection.
//!
//! A format is a named predicate over the resolved tree and the document
//! source. Rules restricted to formats only run on documents where at least
//! one of those formats was detected.

use regex::Regex;
use serde_json::Value as Json;
use std::fmt;
use std::sync::{Arc, OnceLock};

pub type FormatDetector = Arc<dyn Fn(&Json, Option<&str>) -> bool + Send + Sync>;

fn version_field(document: &Json, key: &str) -> Option<String> {
    match document.as_object()?.get(key)? {
        Json::String(s) => Some(s.clone()),
        Json::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn matches(cell: &'static OnceLock<Option<Regex>>, pattern: &str, text: &str) -> bool {
    cell.get_or_init(|| Regex::new(pattern).ok())
        .as_ref()
        .is_some_and(|re| re.is_match(text))
}

/// Swagger 2.0 documents.
pub fn is_oas2(document: &Json, _source: Option<&str>) -> bool {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    version_field(document, "swagger").is_some_and(|v| matches(&RE, r"^2(\.0+)?$", &v))
}

/// OpenAPI 3.x documents.
pub fn is_oas3(document: &Json, _source: Option<&str>) -> bool {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    version_field(document, "openapi").is_some_and(|v| matches(&RE, r"^3(\.\d+)*$", &v))
}

/// AsyncAPI 2.x documents.
pub fn is_asyncapi2(document: &Json, _source: Option<&str>) -> bool {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    version_field(document, "asyncapi").is_some_and(|v| matches(&RE, r"^2\.\d+\.\d+$", &v))
}

/// Documents declaring a json-schema.org `$schema`.
pub fn is_json_schema(document: &Json, _source: Option<&str>) -> bool {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    version_field(document, "$schema")
        .is_some_and(|v| matches(&RE, r"^https?://json-schema\.org/(draft-\d+/schema|draft/\d{4}-\d{2}/schema|schema)#?$", &v))
}

#[derive(Clone, Default)]
/// Ordered set of named format detectors.
pub struct FormatRegistry {
    formats: Vec<(String, FormatDetector)>,
}

impl fmt::Debug for FormatRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

impl FormatRegistry {
    /// Registry without any detector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with `oas2`, `oas3`, `asyncapi2` and `json-schema`.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry
            .register("oas2", Arc::new(is_oas2))
            .register("oas3", Arc::new(is_oas3))
            .register("asyncapi2", Arc::new(is_asyncapi2))
            .register("json-schema", Arc::new(is_json_schema));
        registry
    }

    /// Add or replace a detector.
    pub fn register(&mut self, name: impl Into<String>, detector: FormatDetector) -> &mut Self {
        let name = name.into();
        match self.formats.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = detector,
            None => self.formats.push((name, detector)),
        }
        self
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.formats.iter().map(|(n, _)| n.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.formats.is_empty()
    }

    /// Names of every format matching the document, in registration order.
    pub fn detect(&self, document: &Json, source: Option<&str>) -> Vec<String> {
        self.formats
            .iter()
            .filter(|(_, detector)| detector(document, source))
            .map(|(name, _)| name.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_detectors() {
        let registry = FormatRegistry::with_defaults();
        assert_eq!(registry.detect(&json!({"swagger": "2.0"}), None), vec!["oas2"]);
        assert_eq!(registry.detect(&json!({"openapi": "3.1.0"}), None), vec!["oas3"]);
        assert_eq!(registry.detect(&json!({"asyncapi": "2.6.0"}), None), vec!["asyncapi2"]);
        assert_eq!(
            registry.detect(&json!({"$schema": "https://json-schema.org/draft/2020-12/schema"}), None),
            vec!["json-schema"]
        );
        assert!(registry.detect(&json!({"openapi": "2.0"}), None).is_empty());
        assert!(registry.detect(&json!([1, 2]), None).is_empty());
    }

    #[test]
    fn test_register_replaces_by_name() {
        let mut registry = FormatRegistry::new();
        assert!(registry.is_empty());
        registry.register("custom", Arc::new(|_: &Json, _: Option<&str>| false));
        registry.register("custom", Arc::new(|_: &Json, s: Option<&str>| s == Some("/a.yaml")));
        assert_eq!(registry.names().count(), 1);
        assert_eq!(registry.detect(&json!({}), Some("/a.yaml")), vec!["custom"]);
    }
}
