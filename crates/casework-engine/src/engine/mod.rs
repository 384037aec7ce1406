//! Workflow execution engine.
//!
//! - **Trigger**: picks the workflow definition a domain event starts
//! - **Evaluator**: decides whether a step's conditions hold
//! - **Steps**: dispatches a step to its handler
//! - **Orchestrator**: the execution state machine (start/resume/cancel)
//! - **Tasks**: completes human tasks and resumes their executions

pub mod evaluator;
pub mod locks;
pub mod orchestrator;
pub mod steps;
pub mod tasks;
pub mod trigger;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

use crate::services::{AiAdvisor, Notifier};
use crate::store::{
    AssigneeResolver, CaseStore, ExecutionStore, SchedulingStore, TaskStore, WorkflowStore,
};

pub use evaluator::ConditionEvaluator;
pub use locks::ExecutionLocks;
pub use orchestrator::{StartOutcome, WorkflowEngine};
pub use steps::StepExecutor;
pub use tasks::{TaskBridge, TaskCompletion};
pub use trigger::TriggerResolver;

/// Everything the engine talks to outside its own state.
#[derive(Clone)]
pub struct Collaborators {
    pub cases: Arc<dyn CaseStore>,
    pub workflows: Arc<dyn WorkflowStore>,
    pub executions: Arc<dyn ExecutionStore>,
    pub tasks: Arc<dyn TaskStore>,
    pub scheduling: Arc<dyn SchedulingStore>,
    pub assignees: Arc<dyn AssigneeResolver>,
    pub notifier: Arc<dyn Notifier>,
    pub advisor: Arc<dyn AiAdvisor>,
}

impl Collaborators {
    /// Wire every store seam to one backing store.
    pub fn from_store<S>(store: Arc<S>, notifier: Arc<dyn Notifier>, advisor: Arc<dyn AiAdvisor>) -> Self
    where
        S: CaseStore
            + WorkflowStore
            + ExecutionStore
            + TaskStore
            + SchedulingStore
            + AssigneeResolver
            + 'static,
    {
        Self {
            cases: store.clone(),
            workflows: store.clone(),
            executions: store.clone(),
            tasks: store.clone(),
            scheduling: store.clone(),
            assignees: store,
            notifier,
            advisor,
        }
    }
}
