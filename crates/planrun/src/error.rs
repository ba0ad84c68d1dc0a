use std::fmt;

/// Boxed error returned by tool handlers.
pub type ToolError = Box<dyn std::error::Error + Send + Sync>;

/// Unified error type for the planrun crate.
#[derive(Debug)]
pub enum PlanError {
    /// Plan failed schema validation (missing field, wrong shape, duplicate id).
    Malformed(String),
    /// A step's arguments reference a step id not declared in the plan.
    UndefinedStepReference { step_id: String, referenced: String },
    /// The reference-derived dependency graph contains a cycle.
    CyclicPlan { remaining: Vec<String> },
    /// A step names a tool absent from the registry.
    UnknownTool { step_id: String, tool: String },
    /// A reference targets a step with no result in the execution context.
    UnresolvedDependency { step_id: String },
    /// A reference names a field absent from the target step's result.
    UnresolvedField { step_id: String, field: String },
    /// Resolved arguments failed the tool's input schema.
    InvalidArgs {
        step_id: String,
        tool: String,
        message: String,
    },
    /// A tool invocation returned an error.
    ToolFailed {
        step_id: String,
        tool: String,
        source: ToolError,
    },
    /// Blocking entry point called from inside an active async runtime.
    NestedRuntime,
    /// Internal error.
    Internal(String),
}

impl fmt::Display for PlanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanError::Malformed(msg) => write!(f, "malformed plan: {msg}"),
            PlanError::UndefinedStepReference { step_id, referenced } => {
                write!(f, "step '{step_id}' references undefined step id '{referenced}'")
            }
            PlanError::CyclicPlan { remaining } => {
                write!(
                    f,
                    "circular dependency detected among steps: {}",
                    remaining.join(", ")
                )
            }
            PlanError::UnknownTool { step_id, tool } => {
                write!(f, "step '{step_id}' names unknown tool '{tool}'")
            }
            PlanError::UnresolvedDependency { step_id } => {
                write!(f, "step '{step_id}' has no result in the execution context")
            }
            PlanError::UnresolvedField { step_id, field } => {
                write!(f, "field '{field}' not found in result of step '{step_id}'")
            }
            PlanError::InvalidArgs {
                step_id,
                tool,
                message,
            } => {
                write!(f, "invalid args for tool '{tool}' at step '{step_id}': {message}")
            }
            PlanError::ToolFailed {
                step_id,
                tool,
                source,
            } => {
                write!(f, "tool '{tool}' failed at step '{step_id}': {source}")
            }
            PlanError::NestedRuntime => {
                write!(f, "blocking execution is not allowed inside an async runtime")
            }
            PlanError::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

impl std::error::Error for PlanError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PlanError::ToolFailed { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

/// Result type alias using [`PlanError`].
pub type PlanResult<T> = Result<T, PlanError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_offending_step_and_tool() {
        let err = PlanError::UnknownTool {
            step_id: "s2".to_string(),
            tool: "missing".to_string(),
        };
        assert_eq!(err.to_string(), "step 's2' names unknown tool 'missing'");
    }

    #[test]
    fn cyclic_plan_lists_remaining_steps() {
        let err = PlanError::CyclicPlan {
            remaining: vec!["a".to_string(), "b".to_string()],
        };
        assert!(err.to_string().contains("a, b"));
    }

    #[test]
    fn tool_failure_exposes_source() {
        use std::error::Error;

        let err = PlanError::ToolFailed {
            step_id: "s1".to_string(),
            tool: "insert".to_string(),
            source: "connection refused".into(),
        };
        assert_eq!(err.source().unwrap().to_string(), "connection refused");
    }
}
