//! Workflow definitions and their steps.
//!
//! A definition is published once with a dense, zero-based list of steps
//! and is read-only afterwards. Step configuration is stored as a JSON
//! object tagged by `type`:
//!
//! ```json
//! { "type": "document_check", "min_documents": 2 }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};

/// Publication status of a definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefinitionStatus {
    Active,
    Inactive,
}

impl std::fmt::Display for DefinitionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Inactive => write!(f, "inactive"),
        }
    }
}

impl From<&str> for DefinitionStatus {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "active" | "published" => Self::Active,
            _ => Self::Inactive,
        }
    }
}

/// A workflow definition bound to a trigger name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub id: Uuid,
    pub name: String,
    /// Domain event that starts this workflow, e.g. `case_submitted`.
    pub trigger: String,
    /// Restricts the workflow to one case type. `None` matches any type.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trigger_case_type: Option<String>,
    pub status: DefinitionStatus,
    pub created_at: DateTime<Utc>,
}

impl WorkflowDefinition {
    /// Create an active definition.
    pub fn new(name: &str, trigger: &str, trigger_case_type: Option<&str>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            trigger: trigger.to_string(),
            trigger_case_type: trigger_case_type.map(str::to_string),
            status: DefinitionStatus::Active,
            created_at: Utc::now(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == DefinitionStatus::Active
    }
}

/// One step of a workflow definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub id: Uuid,
    pub definition_id: Uuid,
    /// Name referenced by `step_succeeded` conditions.
    pub name: String,
    /// Zero-based position within the definition.
    pub order: u32,
    pub kind: StepKind,
    /// All conditions must hold for the step to run. Empty means always.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

impl WorkflowStep {
    pub fn new(definition_id: Uuid, name: &str, order: u32, kind: StepKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            definition_id,
            name: name.to_string(),
            order,
            kind,
            conditions: Vec::new(),
        }
    }

    pub fn with_conditions(mut self, conditions: Vec<Condition>) -> Self {
        self.conditions = conditions;
        self
    }
}

/// Check that step orders are unique and dense from zero.
pub fn validate_step_order(steps: &[WorkflowStep]) -> EngineResult<()> {
    let mut orders: Vec<u32> = steps.iter().map(|s| s.order).collect();
    orders.sort_unstable();
    for (expected, actual) in orders.iter().enumerate() {
        if *actual as usize != expected {
            return Err(EngineError::Validation(format!(
                "step orders must be unique and dense from 0; found {:?}",
                orders
            )));
        }
    }
    Ok(())
}

/// Step type with its type-specific configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepKind {
    /// Automatic AI review against an approval threshold.
    Review(ReviewConfig),
    /// AI re-classification of the case category.
    Classification(ClassificationConfig),
    DocumentCheck(DocumentCheckConfig),
    PaymentCheck,
    Notify(NotifyConfig),
    /// Human review task. Suspends the execution.
    #[serde(alias = "manual_review")]
    ManualTask(ManualTaskConfig),
    /// Human approval task. Suspends the execution.
    Approval(ManualTaskConfig),
    InspectionScheduling(InspectionConfig),
    StatusUpdate(StatusUpdateConfig),
    /// A stored type this build does not recognize.
    #[serde(other)]
    Unknown,
}

impl StepKind {
    /// Stable type name as stored in `workflow_steps.step_type`.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Review(_) => "review",
            Self::Classification(_) => "classification",
            Self::DocumentCheck(_) => "document_check",
            Self::PaymentCheck => "payment_check",
            Self::Notify(_) => "notify",
            Self::ManualTask(_) => "manual_task",
            Self::Approval(_) => "approval",
            Self::InspectionScheduling(_) => "inspection_scheduling",
            Self::StatusUpdate(_) => "status_update",
            Self::Unknown => "unknown",
        }
    }

    /// Whether executing this step parks the execution in `waiting`.
    pub fn suspends(&self) -> bool {
        matches!(self, Self::ManualTask(_) | Self::Approval(_))
    }
}

impl std::fmt::Display for StepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.type_name())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewConfig {
    /// Confidence the AI must exceed for auto-approval.
    pub approval_threshold: f64,
    /// Review criteria passed to the advisor.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub criteria: Vec<String>,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            approval_threshold: 0.8,
            criteria: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassificationConfig {
    /// Confidence the AI must exceed before the category is overwritten.
    pub min_confidence: f64,
}

impl Default for ClassificationConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.95,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentCheckConfig {
    pub min_documents: u32,
}

impl Default for DocumentCheckConfig {
    fn default() -> Self {
        Self { min_documents: 1 }
    }
}

/// Notification sent to the case owner. Title and message are templates
/// rendered against `case` and `execution`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    pub title: String,
    pub message: String,
    pub priority: super::Priority,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            title: "Update on {{ case.reference }}".to_string(),
            message: "Your case {{ case.reference }} has been updated.".to_string(),
            priority: super::Priority::Normal,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManualTaskConfig {
    /// Explicit assignee; falls back to the least-loaded staff member.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee: Option<Uuid>,
    /// Role used for the fallback lookup; the engine default when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_in_days: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InspectionConfig {
    pub inspection_type: String,
    pub days_out: u32,
}

impl Default for InspectionConfig {
    fn default() -> Self {
        Self {
            inspection_type: "site".to_string(),
            days_out: 7,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusUpdateConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

/// A single predicate gating a step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Condition {
    /// The case type equals `equals`.
    CaseType { equals: String },
    /// A numeric case field lies within the inclusive bounds.
    FieldRange {
        field: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max: Option<f64>,
    },
    /// The named step ran (not skipped) and reported success.
    StepSucceeded { step: String },
    /// Jinja-style boolean expression over `case` and `history`.
    Expression { when: String },
}
