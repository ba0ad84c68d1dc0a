//! Tool handler trait, sync/async adapters, and input-schema validation.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::ToolError;

/// The single interface the executor invokes.
///
/// Synchronous and asynchronous tools both implement this; the executor
/// awaits uniformly and suspends only at this boundary.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn invoke(&self, args: Map<String, Value>) -> Result<Value, ToolError>;
}

/// Adapter turning a plain closure into a [`ToolHandler`].
pub struct SyncTool<F>(pub F);

#[async_trait]
impl<F> ToolHandler for SyncTool<F>
where
    F: Fn(Map<String, Value>) -> Result<Value, ToolError> + Send + Sync,
{
    async fn invoke(&self, args: Map<String, Value>) -> Result<Value, ToolError> {
        (self.0)(args)
    }
}

/// Adapter turning a future-returning closure into a [`ToolHandler`].
pub struct AsyncTool<F>(pub F);

#[async_trait]
impl<F, Fut> ToolHandler for AsyncTool<F>
where
    F: Fn(Map<String, Value>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, ToolError>> + Send,
{
    async fn invoke(&self, args: Map<String, Value>) -> Result<Value, ToolError> {
        (self.0)(args).await
    }
}

/// A registered tool: name, optional description, input schema, handler.
#[derive(Clone)]
pub struct ToolDefinition {
    /// Unique name the plan's steps refer to.
    pub name: String,
    /// Description surfaced in registry listings for planner prompts.
    pub description: Option<String>,
    /// JSON Schema (minimal subset) the resolved arguments are checked
    /// against before invocation. The default empty schema passes anything.
    pub input_schema: Value,
    /// The handler invoked with the resolved arguments.
    pub handler: Arc<dyn ToolHandler>,
}

impl ToolDefinition {
    pub fn new(name: impl Into<String>, handler: Arc<dyn ToolHandler>) -> Self {
        Self {
            name: name.into(),
            description: None,
            input_schema: Value::Object(Map::new()),
            handler,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_input_schema(mut self, schema: Value) -> Self {
        self.input_schema = schema;
        self
    }
}

impl fmt::Debug for ToolDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolDefinition")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("input_schema", &self.input_schema)
            .finish()
    }
}

/// Validate resolved arguments against a minimal JSON Schema subset.
///
/// Supports `type`, `required`, and recursive `properties`. An empty schema
/// passes anything.
pub fn validate_args(args: &Map<String, Value>, schema: &Value) -> Result<(), String> {
    validate_value(&Value::Object(args.clone()), schema)
}

fn validate_value(value: &Value, schema: &Value) -> Result<(), String> {
    let schema_obj = match schema.as_object() {
        Some(obj) => obj,
        None => return Ok(()),
    };
    if schema_obj.is_empty() {
        return Ok(());
    }

    if let Some(type_val) = schema_obj.get("type") {
        let type_str = type_val
            .as_str()
            .ok_or_else(|| "schema 'type' must be a string".to_string())?;
        let matches = match type_str {
            "string" => value.is_string(),
            "number" => value.is_number(),
            "integer" => value.is_i64() || value.is_u64(),
            "boolean" => value.is_boolean(),
            "object" => value.is_object(),
            "array" => value.is_array(),
            "null" => value.is_null(),
            other => return Err(format!("unknown schema type: {other}")),
        };
        if !matches {
            return Err(format!(
                "expected type '{type_str}', got {}",
                json_type_name(value)
            ));
        }
    }

    if let Some(required) = schema_obj.get("required").and_then(Value::as_array) {
        if let Some(obj) = value.as_object() {
            for req in required {
                if let Some(key) = req.as_str() {
                    if !obj.contains_key(key) {
                        return Err(format!("missing required field: '{key}'"));
                    }
                }
            }
        }
    }

    if let Some(properties) = schema_obj.get("properties").and_then(Value::as_object) {
        if let Some(obj) = value.as_object() {
            for (key, prop_schema) in properties {
                if let Some(prop_value) = obj.get(key) {
                    validate_value(prop_value, prop_schema)?;
                }
            }
        }
    }

    Ok(())
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) => {
            if n.is_i64() || n.is_u64() {
                "integer"
            } else {
                "number"
            }
        }
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
