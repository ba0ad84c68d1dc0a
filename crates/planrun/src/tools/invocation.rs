//! Per-step invocation records capturing timing and outcome.

use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// Outcome of one step's tool invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepStatus {
    /// The tool returned a result and the step's output entered the context.
    Completed,
    /// The tool invocation (or its argument handling) failed, halting the run.
    Failed,
}

/// Record of a single step execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    /// Id of the executed step.
    pub step_id: String,
    /// Name of the tool that was invoked.
    pub tool: String,
    /// When the invocation started.
    pub started_at: SystemTime,
    /// When the invocation ended.
    pub ended_at: SystemTime,
    /// Duration of the invocation in milliseconds.
    pub duration_ms: u64,
    /// Outcome of the invocation.
    pub status: StepStatus,
    /// Error message if the invocation failed.
    pub error: Option<String>,
}

impl StepRecord {
    /// Create a record from start/end times, computing `duration_ms`.
    pub fn new(
        step_id: String,
        tool: String,
        started_at: SystemTime,
        ended_at: SystemTime,
        status: StepStatus,
    ) -> Self {
        let duration_ms = ended_at
            .duration_since(started_at)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);

        Self {
            step_id,
            tool,
            started_at,
            ended_at,
            duration_ms,
            status,
            error: None,
        }
    }
}
