//! Persistence seams consumed by the engine.
//!
//! Case records, workflow definitions, executions and tasks live in the
//! surrounding case-management database. The engine only needs the narrow
//! load/save/query surface declared here, which keeps it testable against
//! [`memory::InMemoryStore`] and deployable on [`postgres::PgStore`].

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::EngineResult;
use crate::model::{
    CaseRecord, CaseUpdate, Inspection, Task, WorkflowDefinition, WorkflowExecution, WorkflowStep,
};

pub use memory::InMemoryStore;
pub use postgres::PgStore;

/// Inspections one inspector can take per day.
pub const MAX_DAILY_INSPECTIONS: usize = 4;

/// Staff role eligible for inspection assignments.
pub const INSPECTOR_ROLE: &str = "inspector";

/// Access to case records and their attachments.
#[async_trait]
pub trait CaseStore: Send + Sync {
    async fn load_case(&self, id: Uuid) -> EngineResult<Option<CaseRecord>>;

    async fn update_case(&self, id: Uuid, update: &CaseUpdate) -> EngineResult<()>;

    /// Number of documents attached to the case.
    async fn count_documents(&self, case_id: Uuid) -> EngineResult<u32>;

    /// Whether a completed payment exists for the case.
    async fn has_completed_payment(&self, case_id: Uuid) -> EngineResult<bool>;
}

/// Read access to published workflow definitions.
#[async_trait]
pub trait WorkflowStore: Send + Sync {
    /// Active definitions bound to `trigger`, in any order.
    async fn find_active_by_trigger(&self, trigger: &str) -> EngineResult<Vec<WorkflowDefinition>>;

    async fn load_definition(&self, id: Uuid) -> EngineResult<Option<WorkflowDefinition>>;

    /// Steps of a definition ordered by `order`.
    async fn load_steps(&self, definition_id: Uuid) -> EngineResult<Vec<WorkflowStep>>;
}

#[async_trait]
pub trait ExecutionStore: Send + Sync {
    async fn create_execution(&self, execution: &WorkflowExecution) -> EngineResult<()>;

    async fn load_execution(&self, id: Uuid) -> EngineResult<Option<WorkflowExecution>>;

    async fn update_execution(&self, execution: &WorkflowExecution) -> EngineResult<()>;

    /// Executions left `pending` or `in_progress`, oldest first.
    async fn find_interrupted(&self) -> EngineResult<Vec<WorkflowExecution>>;
}

#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn create_task(&self, task: &Task) -> EngineResult<()>;

    async fn load_task(&self, id: Uuid) -> EngineResult<Option<Task>>;

    /// Store a completed task only if the stored copy is still pending.
    /// Returns `false` when someone else completed it first.
    async fn complete_task(&self, task: &Task) -> EngineResult<bool>;

    async fn tasks_for_execution(&self, execution_id: Uuid) -> EngineResult<Vec<Task>>;
}

/// Inspection calendar.
#[async_trait]
pub trait SchedulingStore: Send + Sync {
    /// An inspector free on the given day, if any.
    async fn available_inspector(&self, on: DateTime<Utc>) -> EngineResult<Option<Uuid>>;

    async fn create_inspection(&self, inspection: &Inspection) -> EngineResult<()>;
}

/// Picks a staff member for manual steps without an explicit assignee.
#[async_trait]
pub trait AssigneeResolver: Send + Sync {
    /// Active member of `role` with the fewest pending tasks. Ties go to
    /// the member added earliest.
    async fn least_loaded(&self, role: &str) -> EngineResult<Option<Uuid>>;
}

/// Staff member eligible for task assignment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaffMember {
    pub id: Uuid,
    pub name: String,
    pub role: String,
    pub active: bool,
    pub added_at: DateTime<Utc>,
}

impl StaffMember {
    pub fn new(name: &str, role: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            role: role.to_string(),
            active: true,
            added_at: Utc::now(),
        }
    }
}
