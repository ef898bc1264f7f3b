use std::time::Instant;

use engine_core::{EngineError, Step, StepResult, ToolOutput, ToolRegistry, ToolSchema};
use serde_json::Value;

use crate::substitution::substitute_params;

/// Validates and runs a single step against a [`ToolRegistry`].
///
/// Classification honors the tool contract's explicit `is_error` flag.
/// Tools that predate the flag and leave it `false` while still emitting a
/// literal `"Error:"` marker in string output are caught by a conservative
/// fallback, kept only for that backward-compatible case.
pub struct StepExecutor<'a> {
    registry: &'a ToolRegistry,
}

impl<'a> StepExecutor<'a> {
    pub fn new(registry: &'a ToolRegistry) -> Self {
        Self { registry }
    }

    pub fn execute(
        &self,
        step: &Step,
        variables: &std::collections::HashMap<String, Value>,
    ) -> Result<StepResult, EngineError> {
        let started = Instant::now();

        let tool = self.registry.get(&step.tool)?;
        let substituted = substitute_params(&step.params, variables);

        if let Some(schema) = tool.schema() {
            validate_schema(&step.tool, schema, &substituted)?;
        }

        let output = tool.execute(&substituted);
        let duration_ms = started.elapsed().as_millis() as u64;

        Ok(classify(output, duration_ms))
    }

    /// Synthesize a successful result describing the call without invoking
    /// the tool, for the planner's what-if previews.
    pub fn dry_run(
        &self,
        step: &Step,
        variables: &std::collections::HashMap<String, Value>,
    ) -> Result<StepResult, EngineError> {
        self.registry.get(&step.tool)?;
        let substituted = substitute_params(&step.params, variables);
        let description = serde_json::json!({
            "would_invoke": step.tool,
            "with_params": substituted,
            "step_id": step.id,
        });
        Ok(StepResult::success(description, 0, 0))
    }
}

fn classify(output: ToolOutput, duration_ms: u64) -> StepResult {
    let looks_like_error = matches!(&output.content, Value::String(s) if s.contains("Error:"));
    if output.is_error || looks_like_error {
        let message = match &output.content {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        tracing::debug!(duration_ms, "step tool reported failure");
        return StepResult::failure(message, duration_ms, 0);
    }
    StepResult::success(output.content, duration_ms, 0)
}

fn validate_schema(
    tool_name: &str,
    schema: &ToolSchema,
    input: &std::collections::HashMap<String, Value>,
) -> Result<(), EngineError> {
    for key in &schema.required {
        if !input.contains_key(key) {
            return Err(EngineError::SchemaViolation {
                tool: tool_name.to_string(),
                reason: format!("missing required key '{key}'"),
            });
        }
    }
    for (key, expected) in &schema.properties {
        if let Some(value) = input.get(key) {
            if !expected.matches(value) {
                return Err(EngineError::SchemaViolation {
                    tool: tool_name.to_string(),
                    reason: format!("key '{key}' does not match declared type"),
                });
            }
        }
    }
    Ok(())
}

/// Applies a step's execution outcome back onto the shared context, per
/// the Planner's post-processing contract (§4.2 "Context update").
pub fn apply_result_to_context(
    step: &Step,
    result: &StepResult,
    context: &mut engine_core::TaskContext,
) {
    if result.success && ToolRegistry::is_file_mutating_tool(&step.tool) {
        if let Some(Value::String(path)) = step.params.get("path") {
            context.record_modified(path.clone());
        }
    }
    context
        .variables
        .insert(format!("{}_output", step.id), result.output.clone());
}
