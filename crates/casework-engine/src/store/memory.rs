//! In-memory implementations of the store traits.
//!
//! Suitable for development and tests. Every map is a [`DashMap`], so one
//! `InMemoryStore` can be shared behind an `Arc` across the engine and
//! the task bridge.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use super::{
    AssigneeResolver, CaseStore, ExecutionStore, SchedulingStore, StaffMember, TaskStore,
    WorkflowStore, INSPECTOR_ROLE, MAX_DAILY_INSPECTIONS,
};
use crate::error::{EngineError, EngineResult};
use crate::model::{
    validate_step_order, CaseRecord, CaseUpdate, ExecutionStatus, Inspection, Task,
    WorkflowDefinition, WorkflowExecution, WorkflowStep,
};

/// In-memory store backing every persistence trait.
#[derive(Default)]
pub struct InMemoryStore {
    cases: DashMap<Uuid, CaseRecord>,
    documents: DashMap<Uuid, u32>,
    payments: DashMap<Uuid, bool>,
    definitions: DashMap<Uuid, WorkflowDefinition>,
    steps: DashMap<Uuid, Vec<WorkflowStep>>,
    executions: DashMap<Uuid, WorkflowExecution>,
    tasks: DashMap<Uuid, Task>,
    staff: DashMap<Uuid, StaffMember>,
    inspections: DashMap<Uuid, Inspection>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_case(&self, case: CaseRecord) {
        self.cases.insert(case.id, case);
    }

    pub fn case(&self, id: Uuid) -> Option<CaseRecord> {
        self.cases.get(&id).map(|c| c.clone())
    }

    pub fn attach_documents(&self, case_id: Uuid, count: u32) {
        *self.documents.entry(case_id).or_insert(0) += count;
    }

    pub fn record_payment(&self, case_id: Uuid, completed: bool) {
        self.payments.insert(case_id, completed);
    }

    /// Publish a definition with its steps.
    pub fn publish(&self, definition: WorkflowDefinition, steps: Vec<WorkflowStep>) -> EngineResult<()> {
        validate_step_order(&steps)?;
        if let Some(step) = steps.iter().find(|s| s.definition_id != definition.id) {
            return Err(EngineError::Validation(format!(
                "step '{}' belongs to definition {}",
                step.name, step.definition_id
            )));
        }
        let mut steps = steps;
        steps.sort_by_key(|s| s.order);
        self.steps.insert(definition.id, steps);
        self.definitions.insert(definition.id, definition);
        Ok(())
    }

    pub fn add_staff(&self, member: StaffMember) {
        self.staff.insert(member.id, member);
    }

    pub fn execution(&self, id: Uuid) -> Option<WorkflowExecution> {
        self.executions.get(&id).map(|e| e.clone())
    }

    pub fn task(&self, id: Uuid) -> Option<Task> {
        self.tasks.get(&id).map(|t| t.clone())
    }

    pub fn tasks_for_case(&self, case_id: Uuid) -> Vec<Task> {
        let mut tasks: Vec<Task> = self
            .tasks
            .iter()
            .filter(|t| t.case_id == Some(case_id))
            .map(|t| t.value().clone())
            .collect();
        tasks.sort_by_key(|t| t.created_at);
        tasks
    }

    pub fn executions_for_case(&self, case_id: Uuid) -> Vec<WorkflowExecution> {
        self.executions
            .iter()
            .filter(|e| e.case_id == case_id)
            .map(|e| e.value().clone())
            .collect()
    }

    pub fn inspections_for_case(&self, case_id: Uuid) -> Vec<Inspection> {
        self.inspections
            .iter()
            .filter(|i| i.case_id == case_id)
            .map(|i| i.value().clone())
            .collect()
    }

    fn pending_tasks_for(&self, assignee: Uuid) -> usize {
        self.tasks
            .iter()
            .filter(|t| t.assignee_id == Some(assignee) && t.is_pending())
            .count()
    }
}

#[async_trait]
impl CaseStore for InMemoryStore {
    async fn load_case(&self, id: Uuid) -> EngineResult<Option<CaseRecord>> {
        Ok(self.case(id))
    }

    async fn update_case(&self, id: Uuid, update: &CaseUpdate) -> EngineResult<()> {
        let mut case = self
            .cases
            .get_mut(&id)
            .ok_or_else(|| EngineError::NotFound(format!("case {}", id)))?;
        case.apply(update);
        Ok(())
    }

    async fn count_documents(&self, case_id: Uuid) -> EngineResult<u32> {
        Ok(self.documents.get(&case_id).map(|d| *d).unwrap_or(0))
    }

    async fn has_completed_payment(&self, case_id: Uuid) -> EngineResult<bool> {
        Ok(self.payments.get(&case_id).map(|p| *p).unwrap_or(false))
    }
}

#[async_trait]
impl WorkflowStore for InMemoryStore {
    async fn find_active_by_trigger(&self, trigger: &str) -> EngineResult<Vec<WorkflowDefinition>> {
        Ok(self
            .definitions
            .iter()
            .filter(|d| d.is_active() && d.trigger == trigger)
            .map(|d| d.value().clone())
            .collect())
    }

    async fn load_definition(&self, id: Uuid) -> EngineResult<Option<WorkflowDefinition>> {
        Ok(self.definitions.get(&id).map(|d| d.clone()))
    }

    async fn load_steps(&self, definition_id: Uuid) -> EngineResult<Vec<WorkflowStep>> {
        Ok(self
            .steps
            .get(&definition_id)
            .map(|s| s.clone())
            .unwrap_or_default())
    }
}

#[async_trait]
impl ExecutionStore for InMemoryStore {
    async fn create_execution(&self, execution: &WorkflowExecution) -> EngineResult<()> {
        if self.executions.contains_key(&execution.id) {
            return Err(EngineError::Validation(format!(
                "execution {} already exists",
                execution.id
            )));
        }
        self.executions.insert(execution.id, execution.clone());
        Ok(())
    }

    async fn load_execution(&self, id: Uuid) -> EngineResult<Option<WorkflowExecution>> {
        Ok(self.execution(id))
    }

    async fn update_execution(&self, execution: &WorkflowExecution) -> EngineResult<()> {
        match self.executions.get_mut(&execution.id) {
            Some(mut stored) => {
                *stored = execution.clone();
                Ok(())
            }
            None => Err(EngineError::NotFound(format!("execution {}", execution.id))),
        }
    }

    async fn find_interrupted(&self) -> EngineResult<Vec<WorkflowExecution>> {
        let mut executions: Vec<WorkflowExecution> = self
            .executions
            .iter()
            .filter(|e| matches!(e.status, ExecutionStatus::Pending | ExecutionStatus::InProgress))
            .map(|e| e.value().clone())
            .collect();
        executions.sort_by_key(|e| e.created_at);
        Ok(executions)
    }
}

#[async_trait]
impl TaskStore for InMemoryStore {
    async fn create_task(&self, task: &Task) -> EngineResult<()> {
        self.tasks.insert(task.id, task.clone());
        Ok(())
    }

    async fn load_task(&self, id: Uuid) -> EngineResult<Option<Task>> {
        Ok(self.task(id))
    }

    async fn complete_task(&self, task: &Task) -> EngineResult<bool> {
        let mut stored = self
            .tasks
            .get_mut(&task.id)
            .ok_or_else(|| EngineError::NotFound(format!("task {}", task.id)))?;
        if !stored.is_pending() {
            return Ok(false);
        }
        *stored = task.clone();
        Ok(true)
    }

    async fn tasks_for_execution(&self, execution_id: Uuid) -> EngineResult<Vec<Task>> {
        let mut tasks: Vec<Task> = self
            .tasks
            .iter()
            .filter(|t| t.execution_id == Some(execution_id))
            .map(|t| t.value().clone())
            .collect();
        tasks.sort_by_key(|t| t.created_at);
        Ok(tasks)
    }
}

#[async_trait]
impl SchedulingStore for InMemoryStore {
    async fn available_inspector(&self, on: DateTime<Utc>) -> EngineResult<Option<Uuid>> {
        let day = on.date_naive();
        let mut candidates: Vec<(usize, DateTime<Utc>, Uuid)> = self
            .staff
            .iter()
            .filter(|m| m.active && m.role == INSPECTOR_ROLE)
            .map(|m| {
                let booked = self
                    .inspections
                    .iter()
                    .filter(|i| i.inspector_id == Some(m.id) && i.scheduled_for.date_naive() == day)
                    .count();
                (booked, m.added_at, m.id)
            })
            .filter(|(booked, _, _)| *booked < MAX_DAILY_INSPECTIONS)
            .collect();
        candidates.sort();
        Ok(candidates.first().map(|(_, _, id)| *id))
    }

    async fn create_inspection(&self, inspection: &Inspection) -> EngineResult<()> {
        self.inspections.insert(inspection.id, inspection.clone());
        Ok(())
    }
}

#[async_trait]
impl AssigneeResolver for InMemoryStore {
    async fn least_loaded(&self, role: &str) -> EngineResult<Option<Uuid>> {
        let mut candidates: Vec<(usize, DateTime<Utc>, Uuid)> = self
            .staff
            .iter()
            .filter(|m| m.active && m.role == role)
            .map(|m| (self.pending_tasks_for(m.id), m.added_at, m.id))
            .collect();
        candidates.sort();
        Ok(candidates.first().map(|(_, _, id)| *id))
    }
}
