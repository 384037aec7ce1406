//! PostgreSQL implementations of the store traits.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use uuid::Uuid;

use super::{
    AssigneeResolver, CaseStore, ExecutionStore, SchedulingStore, TaskStore, WorkflowStore,
    INSPECTOR_ROLE, MAX_DAILY_INSPECTIONS,
};
use crate::db::models::{
    step_kind_columns, CaseRow, DefinitionRow, ExecutionRow, StepRow, TaskRow,
};
use crate::db::DbPool;
use crate::error::{EngineError, EngineResult};
use crate::model::{
    validate_step_order, CaseRecord, CaseUpdate, Inspection, Task, WorkflowDefinition,
    WorkflowExecution, WorkflowStep,
};

const EXECUTION_COLUMNS: &str = "id, definition_id, case_id, initiated_by, status, \
     current_step_order, step_history, context, created_at, started_at, completed_at";

const TASK_COLUMNS: &str = "id, execution_id, case_id, assignee_id, title, description, \
     status, due_date, created_at, completed_at, completed_by, result";

/// Store backed by the case-management PostgreSQL database.
#[derive(Clone)]
pub struct PgStore {
    db: DbPool,
}

impl PgStore {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    /// Publish a definition and its steps in one transaction.
    pub async fn publish(
        &self,
        definition: &WorkflowDefinition,
        steps: &[WorkflowStep],
    ) -> EngineResult<()> {
        validate_step_order(steps)?;

        let mut tx = self.db.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO workflow_definitions (id, name, trigger_name, trigger_case_type, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(definition.id)
        .bind(&definition.name)
        .bind(&definition.trigger)
        .bind(&definition.trigger_case_type)
        .bind(definition.status.to_string())
        .bind(definition.created_at)
        .execute(&mut *tx)
        .await?;

        for step in steps {
            let (step_type, config) = step_kind_columns(&step.kind)?;
            sqlx::query(
                r#"
                INSERT INTO workflow_steps (id, definition_id, name, step_order, step_type, config, conditions)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(step.id)
            .bind(definition.id)
            .bind(&step.name)
            .bind(step.order as i32)
            .bind(step_type)
            .bind(Json(config))
            .bind(Json(&step.conditions))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        tracing::info!(
            definition_id = %definition.id,
            trigger = %definition.trigger,
            steps = steps.len(),
            "Workflow definition published"
        );

        Ok(())
    }
}

#[async_trait]
impl CaseStore for PgStore {
    async fn load_case(&self, id: Uuid) -> EngineResult<Option<CaseRecord>> {
        let row = sqlx::query_as::<_, CaseRow>(
            r#"
            SELECT id, reference, case_type, category, status, title, description,
                   owner_id, fields, created_at, updated_at
            FROM cases
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;

        Ok(row.map(CaseRecord::from))
    }

    async fn update_case(&self, id: Uuid, update: &CaseUpdate) -> EngineResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE cases
            SET status = COALESCE($2, status),
                category = COALESCE($3, category),
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(&update.status)
        .bind(&update.category)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(EngineError::NotFound(format!("case {}", id)));
        }
        Ok(())
    }

    async fn count_documents(&self, case_id: Uuid) -> EngineResult<u32> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM case_documents WHERE case_id = $1")
                .bind(case_id)
                .fetch_one(&self.db)
                .await?;
        Ok(count.max(0) as u32)
    }

    async fn has_completed_payment(&self, case_id: Uuid) -> EngineResult<bool> {
        let (exists,): (bool,) = sqlx::query_as(
            "SELECT EXISTS (SELECT 1 FROM payments WHERE case_id = $1 AND status = 'completed')",
        )
        .bind(case_id)
        .fetch_one(&self.db)
        .await?;
        Ok(exists)
    }
}

#[async_trait]
impl WorkflowStore for PgStore {
    async fn find_active_by_trigger(&self, trigger: &str) -> EngineResult<Vec<WorkflowDefinition>> {
        let rows = sqlx::query_as::<_, DefinitionRow>(
            r#"
            SELECT id, name, trigger_name, trigger_case_type, status, created_at
            FROM workflow_definitions
            WHERE trigger_name = $1 AND status = 'active'
            "#,
        )
        .bind(trigger)
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().map(WorkflowDefinition::from).collect())
    }

    async fn load_definition(&self, id: Uuid) -> EngineResult<Option<WorkflowDefinition>> {
        let row = sqlx::query_as::<_, DefinitionRow>(
            r#"
            SELECT id, name, trigger_name, trigger_case_type, status, created_at
            FROM workflow_definitions
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;

        Ok(row.map(WorkflowDefinition::from))
    }

    async fn load_steps(&self, definition_id: Uuid) -> EngineResult<Vec<WorkflowStep>> {
        let rows = sqlx::query_as::<_, StepRow>(
            r#"
            SELECT id, definition_id, name, step_order, step_type, config, conditions
            FROM workflow_steps
            WHERE definition_id = $1
            ORDER BY step_order ASC
            "#,
        )
        .bind(definition_id)
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(WorkflowStep::try_from).collect()
    }
}

#[async_trait]
impl ExecutionStore for PgStore {
    async fn create_execution(&self, execution: &WorkflowExecution) -> EngineResult<()> {
        sqlx::query(
            r#"
            INSERT INTO workflow_executions (
                id, definition_id, case_id, initiated_by, status, current_step_order,
                step_history, context, created_at, started_at, completed_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(execution.id)
        .bind(execution.definition_id)
        .bind(execution.case_id)
        .bind(execution.initiated_by)
        .bind(execution.status.to_string())
        .bind(execution.current_step_order as i32)
        .bind(Json(&execution.step_history))
        .bind(Json(&execution.context))
        .bind(execution.created_at)
        .bind(execution.started_at)
        .bind(execution.completed_at)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn load_execution(&self, id: Uuid) -> EngineResult<Option<WorkflowExecution>> {
        let row = sqlx::query_as::<_, ExecutionRow>(&format!(
            "SELECT {} FROM workflow_executions WHERE id = $1",
            EXECUTION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;

        row.map(WorkflowExecution::try_from).transpose()
    }

    async fn update_execution(&self, execution: &WorkflowExecution) -> EngineResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE workflow_executions
            SET status = $2,
                current_step_order = $3,
                step_history = $4,
                context = $5,
                started_at = $6,
                completed_at = $7
            WHERE id = $1
            "#,
        )
        .bind(execution.id)
        .bind(execution.status.to_string())
        .bind(execution.current_step_order as i32)
        .bind(Json(&execution.step_history))
        .bind(Json(&execution.context))
        .bind(execution.started_at)
        .bind(execution.completed_at)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(EngineError::NotFound(format!("execution {}", execution.id)));
        }
        Ok(())
    }

    async fn find_interrupted(&self) -> EngineResult<Vec<WorkflowExecution>> {
        let rows = sqlx::query_as::<_, ExecutionRow>(&format!(
            "SELECT {} FROM workflow_executions \
             WHERE status IN ('pending', 'in_progress') ORDER BY created_at ASC",
            EXECUTION_COLUMNS
        ))
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(WorkflowExecution::try_from).collect()
    }
}

#[async_trait]
impl TaskStore for PgStore {
    async fn create_task(&self, task: &Task) -> EngineResult<()> {
        sqlx::query(
            r#"
            INSERT INTO tasks (
                id, execution_id, case_id, assignee_id, title, description, status,
                due_date, created_at, completed_at, completed_by, result
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(task.id)
        .bind(task.execution_id)
        .bind(task.case_id)
        .bind(task.assignee_id)
        .bind(&task.title)
        .bind(&task.description)
        .bind(task.status.to_string())
        .bind(task.due_date)
        .bind(task.created_at)
        .bind(task.completed_at)
        .bind(task.completed_by)
        .bind(task.result.as_ref().map(Json))
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn load_task(&self, id: Uuid) -> EngineResult<Option<Task>> {
        let row = sqlx::query_as::<_, TaskRow>(&format!(
            "SELECT {} FROM tasks WHERE id = $1",
            TASK_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;

        row.map(Task::try_from).transpose()
    }

    async fn complete_task(&self, task: &Task) -> EngineResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE tasks
            SET status = $2,
                completed_at = $3,
                completed_by = $4,
                result = $5
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(task.id)
        .bind(task.status.to_string())
        .bind(task.completed_at)
        .bind(task.completed_by)
        .bind(task.result.as_ref().map(Json))
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(true);
        }

        let (exists,): (bool,) = sqlx::query_as("SELECT EXISTS (SELECT 1 FROM tasks WHERE id = $1)")
            .bind(task.id)
            .fetch_one(&self.db)
            .await?;
        if !exists {
            return Err(EngineError::NotFound(format!("task {}", task.id)));
        }
        Ok(false)
    }

    async fn tasks_for_execution(&self, execution_id: Uuid) -> EngineResult<Vec<Task>> {
        let rows = sqlx::query_as::<_, TaskRow>(&format!(
            "SELECT {} FROM tasks WHERE execution_id = $1 ORDER BY created_at ASC",
            TASK_COLUMNS
        ))
        .bind(execution_id)
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(Task::try_from).collect()
    }
}

#[async_trait]
impl SchedulingStore for PgStore {
    async fn available_inspector(&self, on: DateTime<Utc>) -> EngineResult<Option<Uuid>> {
        let row: Option<(Uuid,)> = sqlx::query_as(
            r#"
            SELECT s.id
            FROM staff s
            LEFT JOIN inspections i
              ON i.inspector_id = s.id
             AND (i.scheduled_for AT TIME ZONE 'UTC')::date = $2
            WHERE s.active AND s.role = $1
            GROUP BY s.id, s.added_at
            HAVING COUNT(i.id) < $3
            ORDER BY COUNT(i.id) ASC, s.added_at ASC, s.id ASC
            LIMIT 1
            "#,
        )
        .bind(INSPECTOR_ROLE)
        .bind(on.date_naive())
        .bind(MAX_DAILY_INSPECTIONS as i64)
        .fetch_optional(&self.db)
        .await?;

        Ok(row.map(|(id,)| id))
    }

    async fn create_inspection(&self, inspection: &Inspection) -> EngineResult<()> {
        sqlx::query(
            r#"
            INSERT INTO inspections (
                id, case_id, execution_id, inspection_type, scheduled_for,
                inspector_id, status, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(inspection.id)
        .bind(inspection.case_id)
        .bind(inspection.execution_id)
        .bind(&inspection.inspection_type)
        .bind(inspection.scheduled_for)
        .bind(inspection.inspector_id)
        .bind(&inspection.status)
        .bind(inspection.created_at)
        .execute(&self.db)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl AssigneeResolver for PgStore {
    async fn least_loaded(&self, role: &str) -> EngineResult<Option<Uuid>> {
        let row: Option<(Uuid,)> = sqlx::query_as(
            r#"
            SELECT s.id
            FROM staff s
            LEFT JOIN tasks t ON t.assignee_id = s.id AND t.status = 'pending'
            WHERE s.active AND s.role = $1
            GROUP BY s.id, s.added_at
            ORDER BY COUNT(t.id) ASC, s.added_at ASC, s.id ASC
            LIMIT 1
            "#,
        )
        .bind(role)
        .fetch_optional(&self.db)
        .await?;

        Ok(row.map(|(id,)| id))
    }
}
