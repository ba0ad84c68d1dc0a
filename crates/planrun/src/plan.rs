//! Plan model, reference mini-language, and dependency scheduling.

pub mod graph;
pub mod model;
pub mod reference;

pub use graph::{build_dependencies, execution_order};
pub use model::{Plan, PlanStep};
pub use reference::{collect_references, resolve_args, resolve_value, Reference};
