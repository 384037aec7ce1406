//! Domain records the engine reads and writes.
//!
//! Case records and workflow definitions are owned by the surrounding
//! case-management system; executions, tasks and inspections are written
//! by the engine itself.

pub mod case;
pub mod definition;
pub mod execution;
pub mod inspection;
pub mod notification;
pub mod task;

pub use case::{CaseRecord, CaseUpdate};
pub use definition::{
    validate_step_order, ClassificationConfig, Condition, DefinitionStatus, DocumentCheckConfig,
    InspectionConfig, ManualTaskConfig, NotifyConfig, ReviewConfig, StatusUpdateConfig, StepKind,
    WorkflowDefinition, WorkflowStep,
};
pub use execution::{ExecutionStatus, StepHistoryEntry, StepResult, WorkflowExecution};
pub use inspection::Inspection;
pub use notification::{Notification, Priority};
pub use task::{Task, TaskStatus};
