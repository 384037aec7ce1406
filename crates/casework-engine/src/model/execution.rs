//! Workflow executions and their step history.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::definition::WorkflowStep;
use crate::error::EngineError;

/// Execution status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Created, not yet advanced.
    Pending,
    /// Steps are being executed.
    InProgress,
    /// Parked on a manual step until its task is completed.
    Waiting,
    /// Cursor passed the last step.
    Completed,
    /// A step handler failed.
    Failed,
    /// Cancelled by an operator.
    Cancelled,
}

impl ExecutionStatus {
    /// Terminal statuses accept no further transition.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Whether the state machine allows moving from `self` to `next`.
    pub fn can_transition_to(&self, next: ExecutionStatus) -> bool {
        use ExecutionStatus::*;
        matches!(
            (self, next),
            (Pending, InProgress)
                | (InProgress, Waiting)
                | (InProgress, Completed)
                | (InProgress, Failed)
                | (Waiting, Failed)
                | (Waiting, InProgress)
                | (Pending, Cancelled)
                | (InProgress, Cancelled)
                | (Waiting, Cancelled)
        )
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::InProgress => write!(f, "in_progress"),
            Self::Waiting => write!(f, "waiting"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl TryFrom<&str> for ExecutionStatus {
    type Error = EngineError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "pending" | "initial" => Ok(Self::Pending),
            "in_progress" | "running" => Ok(Self::InProgress),
            "waiting" | "paused" => Ok(Self::Waiting),
            "completed" | "success" => Ok(Self::Completed),
            "failed" | "error" => Ok(Self::Failed),
            "cancelled" | "canceled" => Ok(Self::Cancelled),
            other => Err(EngineError::Validation(format!(
                "unknown execution status '{}'",
                other
            ))),
        }
    }
}

/// Outcome reported by a step handler.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub success: bool,
    /// The handler could not run (condition false, collaborator down).
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub skipped: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Type-specific fields such as `passed`, `confidence` or `task_id`.
    #[serde(flatten)]
    pub details: serde_json::Map<String, serde_json::Value>,
}

impl StepResult {
    pub fn success() -> Self {
        Self {
            success: true,
            ..Default::default()
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn skipped(message: impl Into<String>) -> Self {
        Self {
            success: false,
            skipped: true,
            message: Some(message.into()),
            ..Default::default()
        }
    }

    /// A handler error captured in history.
    pub fn errored(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }

    /// Result of a pass/fail check: `success` mirrors `passed`.
    pub fn check(passed: bool) -> Self {
        Self {
            success: passed,
            ..Default::default()
        }
        .with("passed", passed)
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Attach a type-specific detail field.
    pub fn with(mut self, key: &str, value: impl Serialize) -> Self {
        let value = serde_json::to_value(value).unwrap_or(serde_json::Value::Null);
        self.details.insert(key.to_string(), value);
        self
    }

    pub fn detail(&self, key: &str) -> Option<&serde_json::Value> {
        self.details.get(key)
    }
}

/// One attempted step in an execution's audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepHistoryEntry {
    pub step_id: Uuid,
    pub step_name: String,
    pub step_type: String,
    pub order: u32,
    pub skipped: bool,
    pub result: StepResult,
    pub at: DateTime<Utc>,
}

impl StepHistoryEntry {
    pub fn executed(step: &WorkflowStep, result: StepResult) -> Self {
        Self {
            step_id: step.id,
            step_name: step.name.clone(),
            step_type: step.kind.type_name().to_string(),
            order: step.order,
            skipped: false,
            result,
            at: Utc::now(),
        }
    }

    pub fn skipped(step: &WorkflowStep) -> Self {
        Self {
            skipped: true,
            ..Self::executed(step, StepResult::skipped("condition not met"))
        }
    }

    /// The step ran and reported success.
    pub fn succeeded(&self) -> bool {
        !self.skipped && self.result.success
    }
}

/// One run of a workflow definition against one case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowExecution {
    pub id: Uuid,
    pub definition_id: Uuid,
    pub case_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initiated_by: Option<Uuid>,
    pub status: ExecutionStatus,
    /// Order of the step to run next (or the step waiting on a human).
    pub current_step_order: u32,
    #[serde(default)]
    pub step_history: Vec<StepHistoryEntry>,
    /// Cross-step data and terminal metadata (`error`, `cancel_reason`, ...).
    #[serde(default)]
    pub context: HashMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl WorkflowExecution {
    /// Create a pending execution with the cursor at the first step.
    pub fn new(definition_id: Uuid, case_id: Uuid, initiated_by: Option<Uuid>) -> Self {
        Self {
            id: Uuid::new_v4(),
            definition_id,
            case_id,
            initiated_by,
            status: ExecutionStatus::Pending,
            current_step_order: 0,
            step_history: Vec::new(),
            context: HashMap::new(),
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn last_entry(&self) -> Option<&StepHistoryEntry> {
        self.step_history.last()
    }

    pub fn set_context(&mut self, key: &str, value: impl Serialize) {
        let value = serde_json::to_value(value).unwrap_or(serde_json::Value::Null);
        self.context.insert(key.to_string(), value);
    }

    /// Task the execution is parked on, if a manual step created one.
    pub fn pending_task_id(&self) -> Option<Uuid> {
        self.context
            .get("pending_task_id")
            .and_then(|v| v.as_str())
            .and_then(|s| Uuid::parse_str(s).ok())
    }

    /// Record a terminal status and its timestamp.
    pub(crate) fn finish(&mut self, status: ExecutionStatus) {
        self.status = status;
        self.completed_at = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::definition::StepKind;
    use serde_json::json;

    #[test]
    fn test_status_display_and_parse() {
        assert_eq!(ExecutionStatus::InProgress.to_string(), "in_progress");
        assert_eq!(
            ExecutionStatus::try_from("WAITING").unwrap(),
            ExecutionStatus::Waiting
        );
        assert_eq!(
            ExecutionStatus::try_from("canceled").unwrap(),
            ExecutionStatus::Cancelled
        );
        assert!(matches!(
            ExecutionStatus::try_from("bogus"),
            Err(EngineError::Validation(_))
        ));
    }

    #[test]
    fn test_terminal_statuses_have_no_exits() {
        use ExecutionStatus::*;
        let all = [Pending, InProgress, Waiting, Completed, Failed, Cancelled];
        for from in [Completed, Failed, Cancelled] {
            assert!(from.is_terminal());
            for to in all {
                assert!(!from.can_transition_to(to), "{from} -> {to}");
            }
        }
        assert!(Waiting.can_transition_to(InProgress));
        assert!(!Waiting.can_transition_to(Completed));
        assert!(!Pending.can_transition_to(Waiting));
    }

    #[test]
    fn test_step_result_flattens_details() {
        let result = StepResult::check(false).with("documents", 0);
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value, json!({"success": false, "passed": false, "documents": 0}));

        let back: StepResult = serde_json::from_value(value).unwrap();
        assert_eq!(back.detail("passed"), Some(&json!(false)));
        assert!(!back.skipped);
    }

    #[test]
    fn test_history_entry_flags() {
        let step = WorkflowStep::new(Uuid::new_v4(), "pay", 3, StepKind::PaymentCheck);
        let skipped = StepHistoryEntry::skipped(&step);
        assert!(skipped.skipped);
        assert!(!skipped.succeeded());
        assert_eq!(skipped.step_type, "payment_check");
        assert_eq!(skipped.order, 3);

        let ran = StepHistoryEntry::executed(&step, StepResult::check(true));
        assert!(ran.succeeded());
    }

    #[test]
    fn test_pending_task_id_reads_context() {
        let mut execution = WorkflowExecution::new(Uuid::new_v4(), Uuid::new_v4(), None);
        assert_eq!(execution.pending_task_id(), None);

        let task_id = Uuid::new_v4();
        execution.set_context("pending_task_id", task_id);
        assert_eq!(execution.pending_task_id(), Some(task_id));

        execution.set_context("pending_task_id", json!(42));
        assert_eq!(execution.pending_task_id(), None);
    }
}
