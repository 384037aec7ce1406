//! Human tasks and the resume path.
//!
//! Completing a task that belongs to an execution is what moves a
//! `waiting` execution forward again.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use super::orchestrator::WorkflowEngine;
use crate::error::{EngineError, EngineResult};
use crate::model::{Task, WorkflowExecution};
use crate::store::TaskStore;

/// Outcome of [`TaskBridge::complete`].
#[derive(Debug, Clone)]
pub struct TaskCompletion {
    pub task: Task,
    /// The execution after resuming, when the task belonged to a waiting one.
    pub execution: Option<WorkflowExecution>,
}

/// Creates and completes tasks on behalf of callers outside the engine.
pub struct TaskBridge {
    tasks: Arc<dyn TaskStore>,
    engine: Arc<WorkflowEngine>,
}

impl TaskBridge {
    pub fn new(engine: Arc<WorkflowEngine>) -> Self {
        Self {
            tasks: engine.collaborators().tasks.clone(),
            engine,
        }
    }

    /// Mark a task completed and resume its execution, if any.
    ///
    /// The task is completed even when its execution is no longer parked
    /// on it (cancelled, or moved past it by an administrative resume);
    /// the resume is then skipped. Of two concurrent completions only one
    /// succeeds.
    pub async fn complete(
        &self,
        task_id: Uuid,
        completed_by: Option<Uuid>,
        result: Option<serde_json::Value>,
    ) -> EngineResult<TaskCompletion> {
        let mut task = self
            .tasks
            .load_task(task_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("task {}", task_id)))?;
        if !task.is_pending() {
            return Err(already_completed(&task));
        }

        task.complete(completed_by, result);
        if !self.tasks.complete_task(&task).await? {
            return Err(already_completed(&task));
        }
        info!(task_id = %task_id, completed_by = ?completed_by, "Task completed");

        let execution = match task.execution_id {
            Some(execution_id) => match self.engine.resume_for_task(execution_id, task_id).await {
                Ok(execution) => Some(execution),
                Err(EngineError::InvalidState(reason)) => {
                    warn!(
                        task_id = %task_id,
                        execution_id = %execution_id,
                        reason = %reason,
                        "Task completed but execution was not resumed"
                    );
                    None
                }
                Err(e) => return Err(e),
            },
            None => None,
        };

        Ok(TaskCompletion { task, execution })
    }

    /// Create a task that is not tied to any workflow execution.
    pub async fn create_task(
        &self,
        title: &str,
        description: &str,
        assignee_id: Option<Uuid>,
        case_id: Option<Uuid>,
        due_date: Option<DateTime<Utc>>,
    ) -> EngineResult<Task> {
        if title.trim().is_empty() {
            return Err(EngineError::Validation("task title is required".to_string()));
        }

        let mut task = Task::new(title, description);
        task.assignee_id = assignee_id;
        task.case_id = case_id;
        task.due_date = due_date;
        self.tasks.create_task(&task).await?;
        info!(task_id = %task.id, "Ad-hoc task created");
        Ok(task)
    }

    /// Tasks created for an execution, oldest first.
    pub async fn tasks_for_execution(&self, execution_id: Uuid) -> EngineResult<Vec<Task>> {
        self.tasks.tasks_for_execution(execution_id).await
    }
}

fn already_completed(task: &Task) -> EngineError {
    EngineError::InvalidState(format!("task {} is already completed", task.id))
}
