//! Plan and step types, parsed from structured data or JSON text.

use std::collections::HashSet;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::{PlanError, PlanResult};

/// One node in a plan: a named tool invocation.
///
/// Argument values may embed reference expressions (`"@step_id.field"`)
/// pointing at earlier steps' results; see [`crate::plan::Reference`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    /// Unique identifier within the plan. Numeric ids in the input are
    /// normalized to their string form so lookups never mix types.
    #[serde(deserialize_with = "deserialize_step_id")]
    pub id: String,
    /// Name of the tool to invoke, resolved against the registry at run time.
    pub tool: String,
    /// Keyword arguments passed to the tool after reference resolution.
    #[serde(default)]
    pub args: Map<String, Value>,
    /// Human-readable annotation; ignored by execution, kept for logging.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desc: Option<String>,
}

/// An ordered sequence of steps forming one DAG of tool calls.
///
/// The dependency graph is implied by the reference expressions inside step
/// arguments, so acyclicity is checked at execution time, not here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub steps: Vec<PlanStep>,
}

impl Plan {
    pub fn new(steps: Vec<PlanStep>) -> Self {
        Self { steps }
    }

    /// Build a plan from an already-parsed JSON value.
    pub fn from_value(value: Value) -> PlanResult<Self> {
        let plan: Plan =
            serde_json::from_value(value).map_err(|e| PlanError::Malformed(e.to_string()))?;
        plan.validate()?;
        Ok(plan)
    }

    /// Parse a plan from JSON text.
    ///
    /// Tolerates a surrounding Markdown code fence, since LLM planners tend
    /// to wrap their JSON output in one.
    pub fn from_json(text: &str) -> PlanResult<Self> {
        let body = strip_code_fence(text);
        let plan: Plan =
            serde_json::from_str(body).map_err(|e| PlanError::Malformed(e.to_string()))?;
        plan.validate()?;
        Ok(plan)
    }

    /// Check plan-level invariants: step ids must be unique.
    pub fn validate(&self) -> PlanResult<()> {
        let mut seen = HashSet::new();
        for step in &self.steps {
            if !seen.insert(step.id.as_str()) {
                return Err(PlanError::Malformed(format!(
                    "duplicate step id '{}'",
                    step.id
                )));
            }
        }
        Ok(())
    }

    /// Look up a step by id.
    pub fn step(&self, id: &str) -> Option<&PlanStep> {
        self.steps.iter().find(|s| s.id == id)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

fn deserialize_step_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "step id must be a string or number, got {other}"
        ))),
    }
}

/// Strip a Markdown code fence (``` or ```json) from around a JSON body.
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(after_open) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // The rest of the fence line is a language tag ("json" etc.); drop it.
    let body = match after_open.split_once('\n') {
        Some((_, body)) => body,
        None => return trimmed,
    };
    match body.trim_end().strip_suffix("```") {
        Some(inner) => inner.trim_end(),
        None => body,
    }
}
