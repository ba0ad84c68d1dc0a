pub mod error;
pub mod executor;
pub mod plan;
pub mod tools;

pub use crate::error::{PlanError, PlanResult, ToolError};
pub use crate::executor::{ExecutionFailure, ExecutionReport, PlanExecutor};
pub use crate::plan::{Plan, PlanStep, Reference};
pub use crate::tools::{
    AsyncTool, StepRecord, StepStatus, SyncTool, ToolDefinition, ToolHandler, ToolRegistry,
};
