//! Dependency graph construction and topological scheduling.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::error::{PlanError, PlanResult};
use crate::plan::model::Plan;
use crate::plan::reference::collect_references;

/// Derive the dependency set of every step from the references embedded in
/// its arguments.
///
/// Fails with [`PlanError::UndefinedStepReference`] when a reference cannot
/// be mapped onto any declared step id, so bad plans are caught before
/// scheduling rather than mid-run.
pub fn build_dependencies(plan: &Plan) -> PlanResult<HashMap<String, HashSet<String>>> {
    let declared: HashSet<&str> = plan.steps.iter().map(|s| s.id.as_str()).collect();
    let mut deps: HashMap<String, HashSet<String>> = HashMap::with_capacity(plan.len());

    for step in &plan.steps {
        let mut refs = Vec::new();
        for value in step.args.values() {
            collect_references(value, &mut refs);
        }
        let entry = deps.entry(step.id.clone()).or_default();
        for reference in refs {
            let target = reference
                .canonical_id(|id| declared.contains(id))
                .ok_or_else(|| PlanError::UndefinedStepReference {
                    step_id: step.id.clone(),
                    referenced: reference.step_id.clone(),
                })?;
            entry.insert(target);
        }
    }
    Ok(deps)
}

/// Order steps with Kahn's algorithm so every step follows everything it
/// depends on.
///
/// The ready queue is seeded, and dependents are visited, in declaration
/// order, so the result is a deterministic function of the plan. If the
/// order comes up short a cycle exists (a self-reference counts), reported
/// as [`PlanError::CyclicPlan`] with the unordered steps.
pub fn execution_order(
    plan: &Plan,
    deps: &HashMap<String, HashSet<String>>,
) -> PlanResult<Vec<String>> {
    let mut indegree: HashMap<&str, usize> = HashMap::with_capacity(plan.len());
    for step in &plan.steps {
        let count = deps.get(step.id.as_str()).map_or(0, HashSet::len);
        indegree.insert(step.id.as_str(), count);
    }

    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
    for step in &plan.steps {
        if let Some(step_deps) = deps.get(step.id.as_str()) {
            for dep in step_deps {
                dependents
                    .entry(dep.as_str())
                    .or_default()
                    .push(step.id.as_str());
            }
        }
    }

    let mut ready: VecDeque<&str> = plan
        .steps
        .iter()
        .filter(|s| indegree.get(s.id.as_str()) == Some(&0))
        .map(|s| s.id.as_str())
        .collect();

    let mut order: Vec<String> = Vec::with_capacity(plan.len());
    while let Some(node) = ready.pop_front() {
        order.push(node.to_string());
        if let Some(list) = dependents.get(node) {
            for &dependent in list {
                if let Some(count) = indegree.get_mut(dependent) {
                    *count -= 1;
                    if *count == 0 {
                        ready.push_back(dependent);
                    }
                }
            }
        }
    }

    if order.len() != plan.len() {
        let ordered: HashSet<&str> = order.iter().map(String::as_str).collect();
        let remaining = plan
            .steps
            .iter()
            .filter(|s| !ordered.contains(s.id.as_str()))
            .map(|s| s.id.clone())
            .collect();
        return Err(PlanError::CyclicPlan { remaining });
    }
    Ok(order)
}
