use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

fn pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\$\{([A-Za-z_][A-Za-z0-9_]*)\}$").unwrap())
}

/// Substitute a single `${NAME}` parameter against `variables`. Values that
/// don't match the whole-string `${NAME}` shape pass through unchanged;
/// an undefined name also passes through as the literal string (P8).
pub fn substitute_value(value: &Value, variables: &HashMap<String, Value>) -> Value {
    match value {
        Value::String(s) => {
            if let Some(caps) = pattern().captures(s) {
                let name = &caps[1];
                variables.get(name).cloned().unwrap_or_else(|| value.clone())
            } else {
                value.clone()
            }
        }
        other => other.clone(),
    }
}

/// Substitute every parameter in a step's input map.
pub fn substitute_params(
    params: &HashMap<String, Value>,
    variables: &HashMap<String, Value>,
) -> HashMap<String, Value> {
    params
        .iter()
        .map(|(k, v)| (k.clone(), substitute_value(v, variables)))
        .collect()
}

/// Names referenced by `${NAME}`-shaped string parameters, for template
/// instantiation's required-variable check.
pub fn referenced_variables(params: &HashMap<String, Value>) -> Vec<String> {
    params
        .values()
        .filter_map(|v| match v {
            Value::String(s) => pattern().captures(s).map(|c| c[1].to_string()),
            _ => None,
        })
        .collect()
}
