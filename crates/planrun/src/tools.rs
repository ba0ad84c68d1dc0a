//! Tool definitions, the caller-supplied registry, and invocation records.

pub mod definition;
pub mod invocation;
pub mod registry;

pub use definition::{validate_args, AsyncTool, SyncTool, ToolDefinition, ToolHandler};
pub use invocation::{StepRecord, StepStatus};
pub use registry::ToolRegistry;
