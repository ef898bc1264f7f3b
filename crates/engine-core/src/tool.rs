use std::collections::HashMap;

use serde_json::Value;

use crate::error::EngineError;

/// What a tool returns from one invocation.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub content: Value,
    pub is_error: bool,
}

impl ToolOutput {
    pub fn ok(content: Value) -> Self {
        Self {
            content,
            is_error: false,
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            content: Value::String(message.into()),
            is_error: true,
        }
    }
}

/// JSON-Schema-style shape a tool publishes for its input, used by the
/// step executor's optional validation pass.
#[derive(Debug, Clone, Default)]
pub struct ToolSchema {
    pub required: Vec<String>,
    pub properties: HashMap<String, PropertyType>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyType {
    String,
    Integer,
    Boolean,
    Object,
    Array,
}

impl PropertyType {
    pub fn matches(self, value: &Value) -> bool {
        match self {
            PropertyType::String => value.is_string(),
            PropertyType::Integer => value.is_i64() || value.is_u64() || value.is_f64(),
            PropertyType::Boolean => value.is_boolean(),
            PropertyType::Object => value.is_object(),
            PropertyType::Array => value.is_array(),
        }
    }
}

/// Capability set every registered tool exposes. Dispatch is by name through
/// a [`ToolRegistry`]; the input map is untyped at this boundary so the
/// registry stays tool-agnostic, and each tool decodes its own shape.
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    /// None means the tool publishes no schema and validation is skipped.
    fn schema(&self) -> Option<&ToolSchema> {
        None
    }

    fn execute(&self, input: &HashMap<String, Value>) -> ToolOutput;
}

/// Lookup table of tools by name, populated at startup.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Box<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Result<&dyn Tool, EngineError> {
        self.tools
            .get(name)
            .map(|t| t.as_ref())
            .ok_or_else(|| EngineError::UnknownTool(name.to_string()))
    }

    pub fn is_git_tool(name: &str) -> bool {
        name.starts_with("git_")
    }

    pub fn is_file_mutating_tool(name: &str) -> bool {
        matches!(name, "write_file" | "edit_file")
    }
}
