//! JSON Schema check with a per-process cache of compiled schemas.

use crate::document::pointer::pointer_to_path;
use crate::error::FunctionError;
use crate::ruleset::function::{FunctionContext, FunctionOutput, FunctionPaths, RuleResult};
use crate::ruleset::validation;
use parking_lot::Mutex;
use serde_json::Value as Json;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

type Cache = Mutex<HashMap<String, Arc<jsonschema::Validator>>>;

fn compiled(schema: &Json) -> Result<Arc<jsonschema::Validator>, FunctionError> {
    static CACHE: OnceLock<Cache> = OnceLock::new();
    let cache = CACHE.get_or_init(Cache::default);
    let key = schema.to_string();
    if let Some(v) = cache.lock().get(&key) {
        return Ok(v.clone());
    }
    let validator = Arc::new(
        validation::compile_schema(schema)
            .map_err(|e| FunctionError::Failed(format!("Invalid schema: {e}")))?,
    );
    cache.lock().insert(key, validator.clone());
    Ok(validator)
}

pub fn schema(
    target: Option<&Json>,
    options: Option<&Json>,
    paths: &FunctionPaths,
    _context: &FunctionContext<'_>,
) -> FunctionOutput {
    let Some(value) = target else {
        return Ok(None);
    };
    let Some(schema) = options.and_then(|o| o.get("schema")) else {
        return Ok(None);
    };
    let all_errors = options
        .and_then(|o| o.get("allErrors"))
        .and_then(Json::as_bool)
        .unwrap_or(false);
    let validator = compiled(schema)?;

    let mut results = Vec::new();
    for error in validator.iter_errors(value) {
        let mut path = paths.target.clone();
        path.extend(pointer_to_path(&error.instance_path().to_string()).unwrap_or_default());
        results.push(RuleResult::at(error.to_string(), path));
        if !all_errors {
            break;
        }
    }
    Ok((!results.is_empty()).then_some(results))
}
