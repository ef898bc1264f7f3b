use std::collections::HashMap;

use engine_core::{EngineError, Step};
use serde_json::Value;

use crate::complexity::{classify, Complexity};
use crate::params::{extract_quoted, infer_param_key};
use crate::pattern::{match_pattern, DEPENDENCY_REQUIRING};
use crate::heuristics::heuristic_tool_chain;

pub struct AnalyzedTask {
    pub steps: Vec<Step>,
    pub complexity: Complexity,
}

/// Turn a natural-language request into a dependency-aware step sequence
/// (§4.6). Pattern match first, heuristic inference as fallback.
pub fn analyze(description: &str) -> Result<AnalyzedTask, EngineError> {
    let lower = description.to_lowercase();
    let tool_chain: Vec<&str> = match match_pattern(&lower) {
        Some(pattern) => pattern.tool_chain.to_vec(),
        None => heuristic_tool_chain(&lower)?,
    };

    let quoted = extract_quoted(description);
    let steps = build_steps(&tool_chain, &quoted);
    let complexity = classify(description);

    Ok(AnalyzedTask { steps, complexity })
}

fn build_steps(tool_chain: &[&str], quoted: &[String]) -> Vec<Step> {
    let mut steps = Vec::with_capacity(tool_chain.len());
    let mut prev_id: Option<String> = None;

    for (idx, tool) in tool_chain.iter().enumerate() {
        let id = format!("step_{idx}");
        let mut params = HashMap::new();
        if let Some(first) = quoted.first() {
            params.insert(infer_param_key(tool).to_string(), Value::String(first.clone()));
        }

        let depends_on = if DEPENDENCY_REQUIRING.contains(tool) {
            prev_id.clone().into_iter().collect()
        } else {
            Vec::new()
        };

        steps.push(Step::new(&id, *tool, String::new()).with_params(params).with_depends_on(depends_on));
        prev_id = Some(id);
    }

    steps
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pattern_match_emits_one_step_per_tool_with_chained_deps() {
        let analyzed = analyze(r#"commit the changes to "src/main.rs""#).unwrap();
        assert_eq!(analyzed.steps.len(), 2);
        assert_eq!(analyzed.steps[0].tool, "git_diff");
        assert_eq!(analyzed.steps[1].tool, "git_commit");
        // git_diff is dependency-requiring: its step chains onto git_diff's id.
        assert_eq!(analyzed.steps[1].depends_on, vec!["step_0".to_string()]);
    }

    #[test]
    fn first_quoted_token_becomes_path_parameter() {
        let analyzed = analyze(r#"create a new file "config.toml""#).unwrap();
        let step = &analyzed.steps[0];
        assert_eq!(step.params.get("path").unwrap(), "config.toml");
    }

    #[test]
    fn heuristic_fallback_used_when_no_pattern_matches() {
        let analyzed = analyze("find the failing assertion").unwrap();
        assert_eq!(analyzed.steps[0].tool, "search");
    }

    #[test]
    fn unrecognized_description_propagates_error() {
        assert!(analyze("do something vague").is_err());
    }
}
