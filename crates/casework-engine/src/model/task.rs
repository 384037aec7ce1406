//! Human work items.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Completed,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Completed => write!(f, "completed"),
        }
    }
}

impl TryFrom<&str> for TaskStatus {
    type Error = EngineError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "pending" | "open" => Ok(Self::Pending),
            "completed" | "done" => Ok(Self::Completed),
            other => Err(EngineError::Validation(format!("unknown task status '{}'", other))),
        }
    }
}

/// A task assigned to a staff member.
///
/// Tasks created by manual workflow steps carry the execution they pause;
/// completing one resumes that execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub case_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee_id: Option<Uuid>,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_by: Option<Uuid>,
    /// Free-form outcome recorded by the person completing the task.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
}

impl Task {
    pub fn new(title: &str, description: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            execution_id: None,
            case_id: None,
            assignee_id: None,
            title: title.to_string(),
            description: description.to_string(),
            status: TaskStatus::Pending,
            due_date: None,
            created_at: Utc::now(),
            completed_at: None,
            completed_by: None,
            result: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == TaskStatus::Pending
    }

    /// Mark the task completed.
    pub fn complete(&mut self, completed_by: Option<Uuid>, result: Option<serde_json::Value>) {
        self.status = TaskStatus::Completed;
        self.completed_at = Some(Utc::now());
        self.completed_by = completed_by;
        self.result = result;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_complete_records_metadata() {
        let mut task = Task::new("Approve permit", "");
        assert!(task.is_pending());

        let who = Uuid::new_v4();
        task.complete(Some(who), Some(serde_json::json!({"decision": "approved"})));
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.completed_by, Some(who));
        assert!(task.completed_at.is_some());
        assert!(!task.is_pending());
    }

    #[test]
    fn test_status_parse_rejects_unknown() {
        assert_eq!(TaskStatus::try_from("DONE").unwrap(), TaskStatus::Completed);
        assert_eq!(TaskStatus::try_from("pending").unwrap(), TaskStatus::Pending);
        assert!(TaskStatus::try_from("archived").is_err());
    }
}
