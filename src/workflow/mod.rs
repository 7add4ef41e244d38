//! DAG workflow planning and execution for complex requests.

pub mod executor;
pub mod plan;

pub use executor::WorkflowExecutor;
pub use plan::{StepResult, TaskStatus, TaskStep, WorkflowPlan};
