//! SQLx row types and their conversion into domain records.
//!
//! JSONB columns are decoded through [`sqlx::types::Json`]; step
//! configuration is stored without its `type` tag, which lives in the
//! `step_type` column and is merged back before decoding [`StepKind`].

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};
use crate::model::{
    CaseRecord, Condition, DefinitionStatus, ExecutionStatus, StepHistoryEntry, StepKind, Task,
    TaskStatus, WorkflowDefinition, WorkflowExecution, WorkflowStep,
};

#[derive(Debug, FromRow)]
pub struct CaseRow {
    pub id: Uuid,
    pub reference: String,
    pub case_type: String,
    pub category: Option<String>,
    pub status: String,
    pub title: String,
    pub description: String,
    pub owner_id: Option<Uuid>,
    pub fields: Json<HashMap<String, serde_json::Value>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<CaseRow> for CaseRecord {
    fn from(row: CaseRow) -> Self {
        CaseRecord {
            id: row.id,
            reference: row.reference,
            case_type: row.case_type,
            category: row.category,
            status: row.status,
            title: row.title,
            description: row.description,
            owner_id: row.owner_id,
            fields: row.fields.0,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, FromRow)]
pub struct DefinitionRow {
    pub id: Uuid,
    pub name: String,
    pub trigger_name: String,
    pub trigger_case_type: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl From<DefinitionRow> for WorkflowDefinition {
    fn from(row: DefinitionRow) -> Self {
        WorkflowDefinition {
            id: row.id,
            name: row.name,
            trigger: row.trigger_name,
            trigger_case_type: row.trigger_case_type,
            status: DefinitionStatus::from(row.status.as_str()),
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
pub struct StepRow {
    pub id: Uuid,
    pub definition_id: Uuid,
    pub name: String,
    pub step_order: i32,
    pub step_type: String,
    pub config: Json<serde_json::Value>,
    pub conditions: Json<Vec<Condition>>,
}

impl TryFrom<StepRow> for WorkflowStep {
    type Error = EngineError;

    fn try_from(row: StepRow) -> EngineResult<Self> {
        let mut config = match row.config.0 {
            serde_json::Value::Object(map) => map,
            serde_json::Value::Null => serde_json::Map::new(),
            other => {
                return Err(EngineError::Validation(format!(
                    "step '{}' config must be an object, got {}",
                    row.name, other
                )))
            }
        };
        config.insert("type".to_string(), serde_json::Value::String(row.step_type));
        let kind: StepKind = serde_json::from_value(serde_json::Value::Object(config))?;
        let order = u32::try_from(row.step_order).map_err(|_| {
            EngineError::Validation(format!("step '{}' has negative order", row.name))
        })?;

        Ok(WorkflowStep {
            id: row.id,
            definition_id: row.definition_id,
            name: row.name,
            order,
            kind,
            conditions: row.conditions.0,
        })
    }
}

/// Split a step kind into its `step_type` column and untagged config.
pub fn step_kind_columns(kind: &StepKind) -> EngineResult<(String, serde_json::Value)> {
    let mut value = serde_json::to_value(kind)?;
    if let Some(map) = value.as_object_mut() {
        map.remove("type");
    }
    Ok((kind.type_name().to_string(), value))
}

#[derive(Debug, FromRow)]
pub struct ExecutionRow {
    pub id: Uuid,
    pub definition_id: Uuid,
    pub case_id: Uuid,
    pub initiated_by: Option<Uuid>,
    pub status: String,
    pub current_step_order: i32,
    pub step_history: Json<Vec<StepHistoryEntry>>,
    pub context: Json<HashMap<String, serde_json::Value>>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl TryFrom<ExecutionRow> for WorkflowExecution {
    type Error = EngineError;

    fn try_from(row: ExecutionRow) -> EngineResult<Self> {
        Ok(WorkflowExecution {
            id: row.id,
            definition_id: row.definition_id,
            case_id: row.case_id,
            initiated_by: row.initiated_by,
            status: ExecutionStatus::try_from(row.status.as_str())?,
            current_step_order: row.current_step_order.max(0) as u32,
            step_history: row.step_history.0,
            context: row.context.0,
            created_at: row.created_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
        })
    }
}

#[derive(Debug, FromRow)]
pub struct TaskRow {
    pub id: Uuid,
    pub execution_id: Option<Uuid>,
    pub case_id: Option<Uuid>,
    pub assignee_id: Option<Uuid>,
    pub title: String,
    pub description: String,
    pub status: String,
    pub due_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub completed_by: Option<Uuid>,
    pub result: Option<Json<serde_json::Value>>,
}

impl TryFrom<TaskRow> for Task {
    type Error = EngineError;

    fn try_from(row: TaskRow) -> EngineResult<Self> {
        Ok(Task {
            id: row.id,
            execution_id: row.execution_id,
            case_id: row.case_id,
            assignee_id: row.assignee_id,
            title: row.title,
            description: row.description,
            status: TaskStatus::try_from(row.status.as_str())?,
            due_date: row.due_date,
            created_at: row.created_at,
            completed_at: row.completed_at,
            completed_by: row.completed_by,
            result: row.result.map(|r| r.0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::definition::DocumentCheckConfig;
    use serde_json::json;

    fn step_row(step_type: &str, config: serde_json::Value) -> StepRow {
        StepRow {
            id: Uuid::new_v4(),
            definition_id: Uuid::new_v4(),
            name: "docs".to_string(),
            step_order: 0,
            step_type: step_type.to_string(),
            config: Json(config),
            conditions: Json(vec![]),
        }
    }

    #[test]
    fn test_step_row_merges_type_tag() {
        let step = WorkflowStep::try_from(step_row("document_check", json!({"min_documents": 3})))
            .unwrap();
        assert_eq!(
            step.kind,
            StepKind::DocumentCheck(DocumentCheckConfig { min_documents: 3 })
        );
    }

    #[test]
    fn test_step_row_null_config_uses_defaults() {
        let step = WorkflowStep::try_from(step_row("payment_check", serde_json::Value::Null)).unwrap();
        assert_eq!(step.kind, StepKind::PaymentCheck);
    }

    #[test]
    fn test_step_row_rejects_non_object_config() {
        assert!(WorkflowStep::try_from(step_row("notify", json!([1, 2]))).is_err());
    }

    #[test]
    fn test_step_kind_columns_strip_tag() {
        let (step_type, config) =
            step_kind_columns(&StepKind::DocumentCheck(DocumentCheckConfig { min_documents: 2 }))
                .unwrap();
        assert_eq!(step_type, "document_check");
        assert_eq!(config, json!({"min_documents": 2}));
    }

    fn execution_row(status: &str) -> ExecutionRow {
        ExecutionRow {
            id: Uuid::new_v4(),
            definition_id: Uuid::new_v4(),
            case_id: Uuid::new_v4(),
            initiated_by: None,
            status: status.to_string(),
            current_step_order: 2,
            step_history: Json(vec![]),
            context: Json(HashMap::new()),
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    #[test]
    fn test_execution_row_parses_status() {
        let execution = WorkflowExecution::try_from(execution_row("waiting")).unwrap();
        assert_eq!(execution.status, ExecutionStatus::Waiting);
        assert_eq!(execution.current_step_order, 2);
    }

    #[test]
    fn test_execution_row_rejects_unknown_status() {
        assert!(matches!(
            WorkflowExecution::try_from(execution_row("archived")),
            Err(EngineError::Validation(_))
        ));
    }
}
