//! Sequential plan execution: validate, order, resolve, invoke, record.

use std::collections::HashMap;
use std::fmt;
use std::time::SystemTime;

use serde_json::Value;
use uuid::Uuid;

use crate::error::PlanError;
use crate::plan::{build_dependencies, execution_order, resolve_args, Plan};
use crate::tools::{validate_args, StepRecord, StepStatus, ToolRegistry};

/// Outcome of a fully successful run.
#[derive(Debug)]
pub struct ExecutionReport {
    /// Identifier of this run, for log correlation.
    pub run_id: Uuid,
    /// Step id to that step's raw tool result.
    pub context: HashMap<String, Value>,
    /// One record per invoked step, in execution order.
    pub records: Vec<StepRecord>,
}

/// Outcome of a failed run.
///
/// Replaces the raise-and-inspect pattern: the completed results and step
/// records survive the failure so callers can see exactly how far execution
/// progressed.
#[derive(Debug)]
pub struct ExecutionFailure {
    pub run_id: Uuid,
    /// What went wrong.
    pub error: PlanError,
    /// The step that failed, or `None` when the run never started (plan
    /// validation, graph construction, or scheduling failed).
    pub failed_step: Option<String>,
    /// Results of the steps that completed before the failure.
    pub completed: HashMap<String, Value>,
    /// Records of the steps that were invoked, in execution order.
    pub records: Vec<StepRecord>,
}

impl ExecutionFailure {
    fn before_execution(run_id: Uuid, error: PlanError) -> Self {
        Self {
            run_id,
            error,
            failed_step: None,
            completed: HashMap::new(),
            records: Vec::new(),
        }
    }
}

impl fmt::Display for ExecutionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.failed_step {
            Some(step) => write!(
                f,
                "plan run {} failed at step '{}': {} ({} step(s) completed)",
                self.run_id,
                step,
                self.error,
                self.completed.len()
            ),
            None => write!(
                f,
                "plan run {} failed before execution: {}",
                self.run_id, self.error
            ),
        }
    }
}

impl std::error::Error for ExecutionFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// Executes plans against a tool registry, one step at a time in
/// topological order.
#[derive(Debug)]
pub struct PlanExecutor {
    registry: ToolRegistry,
}

impl PlanExecutor {
    pub fn new(registry: ToolRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Parse a JSON plan and execute it.
    pub async fn execute_json(&self, text: &str) -> Result<ExecutionReport, ExecutionFailure> {
        match Plan::from_json(text) {
            Ok(plan) => self.execute(&plan).await,
            Err(error) => Err(ExecutionFailure::before_execution(Uuid::new_v4(), error)),
        }
    }

    /// Normalize a structured value into a plan and execute it.
    pub async fn execute_value(&self, value: Value) -> Result<ExecutionReport, ExecutionFailure> {
        match Plan::from_value(value) {
            Ok(plan) => self.execute(&plan).await,
            Err(error) => Err(ExecutionFailure::before_execution(Uuid::new_v4(), error)),
        }
    }

    /// Execute a validated plan.
    ///
    /// Fail-fast: validation, graph construction, and scheduling all happen
    /// before any tool is invoked. Once running, steps execute strictly
    /// sequentially; a failing step halts the run and the results of earlier
    /// steps ride along in the returned [`ExecutionFailure`].
    pub async fn execute(&self, plan: &Plan) -> Result<ExecutionReport, ExecutionFailure> {
        let run_id = Uuid::new_v4();
        let fail_early = |error| ExecutionFailure::before_execution(run_id, error);

        plan.validate().map_err(fail_early)?;
        let deps = build_dependencies(plan).map_err(fail_early)?;
        let order = execution_order(plan, &deps).map_err(fail_early)?;
        tracing::info!("plan run {run_id}: {} step(s), order {:?}", order.len(), order);

        let mut context: HashMap<String, Value> = HashMap::with_capacity(order.len());
        let mut records: Vec<StepRecord> = Vec::with_capacity(order.len());

        for step_id in &order {
            let step = match plan.step(step_id) {
                Some(step) => step,
                None => {
                    return Err(ExecutionFailure {
                        run_id,
                        error: PlanError::Internal(format!(
                            "scheduled step '{step_id}' missing from plan"
                        )),
                        failed_step: Some(step_id.clone()),
                        completed: context,
                        records,
                    })
                }
            };

            let resolved = match resolve_args(&step.args, &context) {
                Ok(resolved) => resolved,
                Err(error) => {
                    return Err(ExecutionFailure {
                        run_id,
                        error,
                        failed_step: Some(step.id.clone()),
                        completed: context,
                        records,
                    })
                }
            };

            let tool = match self.registry.lookup(&step.tool) {
                Some(tool) => tool,
                None => {
                    return Err(ExecutionFailure {
                        run_id,
                        error: PlanError::UnknownTool {
                            step_id: step.id.clone(),
                            tool: step.tool.clone(),
                        },
                        failed_step: Some(step.id.clone()),
                        completed: context,
                        records,
                    })
                }
            };

            if let Err(message) = validate_args(&resolved, &tool.input_schema) {
                return Err(ExecutionFailure {
                    run_id,
                    error: PlanError::InvalidArgs {
                        step_id: step.id.clone(),
                        tool: step.tool.clone(),
                        message,
                    },
                    failed_step: Some(step.id.clone()),
                    completed: context,
                    records,
                });
            }

            let started_at = SystemTime::now();
            let outcome = tool.handler.invoke(resolved).await;
            let ended_at = SystemTime::now();

            match outcome {
                Ok(result) => {
                    records.push(StepRecord::new(
                        step.id.clone(),
                        step.tool.clone(),
                        started_at,
                        ended_at,
                        StepStatus::Completed,
                    ));
                    tracing::info!(
                        "executed step '{}' via tool '{}'{}",
                        step.id,
                        step.tool,
                        step.desc
                            .as_deref()
                            .map(|d| format!(" ({d})"))
                            .unwrap_or_default()
                    );
                    context.insert(step.id.clone(), result);
                }
                Err(source) => {
                    let mut record = StepRecord::new(
                        step.id.clone(),
                        step.tool.clone(),
                        started_at,
                        ended_at,
                        StepStatus::Failed,
                    );
                    record.error = Some(source.to_string());
                    records.push(record);
                    tracing::warn!(
                        "step '{}' failed in tool '{}': {}",
                        step.id,
                        step.tool,
                        source
                    );
                    return Err(ExecutionFailure {
                        run_id,
                        error: PlanError::ToolFailed {
                            step_id: step.id.clone(),
                            tool: step.tool.clone(),
                            source,
                        },
                        failed_step: Some(step.id.clone()),
                        completed: context,
                        records,
                    });
                }
            }
        }

        Ok(ExecutionReport {
            run_id,
            context,
            records,
        })
    }

    /// Blocking convenience entry for callers without an async runtime.
    ///
    /// Refuses to run inside an active runtime rather than deadlocking on a
    /// nested `block_on`.
    pub fn execute_blocking(&self, plan: &Plan) -> Result<ExecutionReport, ExecutionFailure> {
        if tokio::runtime::Handle::try_current().is_ok() {
            return Err(ExecutionFailure::before_execution(
                Uuid::new_v4(),
                PlanError::NestedRuntime,
            ));
        }
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| {
                ExecutionFailure::before_execution(
                    Uuid::new_v4(),
                    PlanError::Internal(format!("failed to build runtime: {e}")),
                )
            })?;
        runtime.block_on(self.execute(plan))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counting_registry(invocations: Arc<AtomicUsize>) -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register_fn("noop", move |args| {
            invocations.fetch_add(1, Ordering::SeqCst);
            Ok(Value::Object(args))
        });
        registry
    }

    fn demo_registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register_fn("generate_users", |args| {
            let n = args.get("n").and_then(Value::as_u64).unwrap_or(0);
            Ok(json!({"id_list": (1..=n).collect::<Vec<u64>>(), "count": n}))
        });
        registry.register_async("generate_products", |args: Map<String, Value>| async move {
            let n = args.get("n").and_then(Value::as_u64).unwrap_or(0);
            Ok(json!({"id_list": (1..=n).collect::<Vec<u64>>(), "count": n}))
        });
        registry.register_fn("generate_orders", |args| {
            let users = args.get("user_ids").cloned().unwrap_or(Value::Null);
            let products = args.get("product_ids").cloned().unwrap_or(Value::Null);
            Ok(json!({"user_ids": users, "product_ids": products, "status": "ok"}))
        });
        registry
    }

    #[tokio::test]
    async fn linear_plan_executes_in_order() {
        let executor = PlanExecutor::new(demo_registry());
        let report = executor
            .execute_value(json!({
                "steps": [
                    {"id": "step_users", "tool": "generate_users", "args": {"n": 3}},
                    {"id": "step_products", "tool": "generate_products", "args": {"n": 2}},
                    {
                        "id": "step_orders",
                        "tool": "generate_orders",
                        "args": {
                            "user_ids": "@step_users.id_list",
                            "product_ids": "@step_products.id_list"
                        }
                    }
                ]
            }))
            .await
            .unwrap();

        assert_eq!(report.context.len(), 3);
        assert_eq!(report.context["step_orders"]["user_ids"], json!([1, 2, 3]));
        assert_eq!(report.context["step_orders"]["product_ids"], json!([1, 2]));

        let executed: Vec<&str> = report.records.iter().map(|r| r.step_id.as_str()).collect();
        assert_eq!(executed, vec!["step_users", "step_products", "step_orders"]);
        assert!(report
            .records
            .iter()
            .all(|r| r.status == StepStatus::Completed));
    }

    #[tokio::test]
    async fn mixed_sync_async_with_downstream_references() {
        // generate_users is sync, generate_products is async; the downstream
        // step references a field from each.
        let executor = PlanExecutor::new(demo_registry());
        let report = executor
            .execute_value(json!({
                "steps": [
                    {"id": "u", "tool": "generate_users", "args": {"n": 1}},
                    {"id": "p", "tool": "generate_products", "args": {"n": 1}},
                    {
                        "id": "o",
                        "tool": "generate_orders",
                        "args": {"user_ids": "@u.id_list", "product_ids": "@p.id_list"}
                    }
                ]
            }))
            .await
            .unwrap();
        assert_eq!(report.context["o"]["status"], json!("ok"));
    }

    #[tokio::test]
    async fn numeric_ids_execute_and_resolve() {
        let executor = PlanExecutor::new(demo_registry());
        let report = executor
            .execute_value(json!({
                "steps": [
                    {"id": 1, "tool": "generate_users", "args": {"n": 2}},
                    {
                        "id": 2,
                        "tool": "generate_orders",
                        // "@step_1" exercises the trailing-digit tolerance.
                        "args": {"user_ids": "@step_1.id_list"}
                    }
                ]
            }))
            .await
            .unwrap();
        assert_eq!(report.context["2"]["user_ids"], json!([1, 2]));
    }

    #[tokio::test]
    async fn cycle_invokes_no_tool() {
        let invocations = Arc::new(AtomicUsize::new(0));
        let executor = PlanExecutor::new(counting_registry(invocations.clone()));
        let failure = executor
            .execute_value(json!({
                "steps": [
                    {"id": "a", "tool": "noop", "args": {"x": "@b"}},
                    {"id": "b", "tool": "noop", "args": {"x": "@a"}}
                ]
            }))
            .await
            .unwrap_err();

        assert!(matches!(failure.error, PlanError::CyclicPlan { .. }));
        assert!(failure.failed_step.is_none());
        assert!(failure.completed.is_empty());
        assert_eq!(invocations.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn undefined_reference_invokes_no_tool() {
        let invocations = Arc::new(AtomicUsize::new(0));
        let executor = PlanExecutor::new(counting_registry(invocations.clone()));
        let failure = executor
            .execute_value(json!({
                "steps": [
                    {"id": "a", "tool": "noop", "args": {}},
                    {"id": "b", "tool": "noop", "args": {"x": "@ghost.y"}}
                ]
            }))
            .await
            .unwrap_err();

        assert!(matches!(
            failure.error,
            PlanError::UndefinedStepReference { .. }
        ));
        assert_eq!(invocations.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unknown_tool_preserves_earlier_context() {
        let executor = PlanExecutor::new(demo_registry());
        let failure = executor
            .execute_value(json!({
                "steps": [
                    {"id": "first", "tool": "generate_users", "args": {"n": 1}},
                    {"id": "second", "tool": "does_not_exist", "args": {}}
                ]
            }))
            .await
            .unwrap_err();

        assert!(matches!(failure.error, PlanError::UnknownTool { .. }));
        assert_eq!(failure.failed_step.as_deref(), Some("second"));
        assert!(failure.completed.contains_key("first"));
        assert!(!failure.completed.contains_key("second"));
    }

    #[tokio::test]
    async fn mid_plan_failure_keeps_partial_context() {
        let mut registry = demo_registry();
        registry.register_fn("explode", |_| Err("db connection refused".into()));
        let executor = PlanExecutor::new(registry);

        let failure = executor
            .execute_value(json!({
                "steps": [
                    {"id": "s1", "tool": "generate_users", "args": {"n": 1}},
                    {"id": "s2", "tool": "explode", "args": {"x": "@s1.id_list"}},
                    {"id": "s3", "tool": "generate_orders", "args": {"user_ids": "@s2"}}
                ]
            }))
            .await
            .unwrap_err();

        assert!(matches!(failure.error, PlanError::ToolFailed { .. }));
        assert_eq!(failure.failed_step.as_deref(), Some("s2"));
        assert!(failure.completed.contains_key("s1"));
        assert!(!failure.completed.contains_key("s2"));
        assert!(!failure.completed.contains_key("s3"));

        let statuses: Vec<&StepStatus> = failure.records.iter().map(|r| &r.status).collect();
        assert_eq!(statuses, vec![&StepStatus::Completed, &StepStatus::Failed]);
        assert_eq!(
            failure.records[1].error.as_deref(),
            Some("db connection refused")
        );
    }

    #[tokio::test]
    async fn schema_violation_halts_before_invocation() {
        let invocations = Arc::new(AtomicUsize::new(0));
        let counter = invocations.clone();
        let mut registry = ToolRegistry::new();
        registry.register(
            crate::tools::ToolDefinition::new(
                "strict",
                Arc::new(crate::tools::SyncTool(
                    move |args: Map<String, Value>| -> Result<Value, crate::error::ToolError> {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Ok(Value::Object(args))
                    },
                )),
            )
            .with_input_schema(json!({"type": "object", "required": ["n"]})),
        );
        let executor = PlanExecutor::new(registry);

        let failure = executor
            .execute_value(json!({
                "steps": [{"id": "a", "tool": "strict", "args": {}}]
            }))
            .await
            .unwrap_err();

        assert!(matches!(failure.error, PlanError::InvalidArgs { .. }));
        assert_eq!(invocations.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn deterministic_order_across_runs() {
        let executor = PlanExecutor::new(demo_registry());
        let plan = Plan::from_value(json!({
            "steps": [
                {"id": "u", "tool": "generate_users", "args": {"n": 1}},
                {"id": "p", "tool": "generate_products", "args": {"n": 1}},
                {
                    "id": "o",
                    "tool": "generate_orders",
                    "args": {"user_ids": "@u.id_list", "product_ids": "@p.id_list"}
                }
            ]
        }))
        .unwrap();

        let first = executor.execute(&plan).await.unwrap();
        let second = executor.execute(&plan).await.unwrap();
        let order = |report: &ExecutionReport| {
            report
                .records
                .iter()
                .map(|r| r.step_id.clone())
                .collect::<Vec<_>>()
        };
        assert_eq!(order(&first), order(&second));
    }

    #[tokio::test]
    async fn execute_json_runs_fenced_plan() {
        let executor = PlanExecutor::new(demo_registry());
        let text = "```json\n{\"steps\": [{\"id\": \"u\", \"tool\": \"generate_users\", \"args\": {\"n\": 2}}]}\n```";
        let report = executor.execute_json(text).await.unwrap();
        assert_eq!(report.context["u"]["count"], json!(2));
    }

    #[tokio::test]
    async fn malformed_json_fails_before_execution() {
        let executor = PlanExecutor::new(demo_registry());
        let failure = executor.execute_json("{steps: nope}").await.unwrap_err();
        assert!(matches!(failure.error, PlanError::Malformed(_)));
        assert!(failure.failed_step.is_none());
    }

    #[tokio::test]
    async fn execute_blocking_rejects_nested_runtime() {
        let executor = PlanExecutor::new(demo_registry());
        let plan = Plan::new(Vec::new());
        let failure = executor.execute_blocking(&plan).unwrap_err();
        assert!(matches!(failure.error, PlanError::NestedRuntime));
    }

    #[test]
    fn execute_blocking_runs_without_runtime() {
        let executor = PlanExecutor::new(demo_registry());
        let plan = Plan::from_value(json!({
            "steps": [
                {"id": "u", "tool": "generate_users", "args": {"n": 2}},
                {"id": "p", "tool": "generate_products", "args": {"n": 1}}
            ]
        }))
        .unwrap();

        let report = executor.execute_blocking(&plan).unwrap();
        assert_eq!(report.context["u"]["id_list"], json!([1, 2]));
        assert_eq!(report.context["p"]["count"], json!(1));
    }

    #[tokio::test]
    async fn empty_plan_yields_empty_report() {
        let executor = PlanExecutor::new(ToolRegistry::new());
        let report = executor.execute(&Plan::new(Vec::new())).await.unwrap();
        assert!(report.context.is_empty());
        assert!(report.records.is_empty());
    }

    #[tokio::test]
    async fn failure_display_names_step() {
        let executor = PlanExecutor::new(demo_registry());
        let failure = executor
            .execute_value(json!({
                "steps": [{"id": "x", "tool": "missing", "args": {}}]
            }))
            .await
            .unwrap_err();
        let text = failure.to_string();
        assert!(text.contains("failed at step 'x'"));
        assert!(text.contains("unknown tool 'missing'"));
    }
}
