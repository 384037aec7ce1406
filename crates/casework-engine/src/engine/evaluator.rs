//! Step condition evaluation.
//!
//! A step runs only when every one of its conditions holds. Evaluation is
//! a pure function of the case record and the execution's step history.

use serde_json::json;
use tracing::warn;

use crate::model::{CaseRecord, Condition, StepHistoryEntry};
use crate::template::TemplateRenderer;

/// Condition evaluator for step gating.
pub struct ConditionEvaluator {
    renderer: TemplateRenderer,
}

impl Default for ConditionEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl ConditionEvaluator {
    /// Create a new condition evaluator.
    pub fn new() -> Self {
        Self {
            renderer: TemplateRenderer::new(),
        }
    }

    /// Logical AND over `conditions`. An empty set is true.
    pub fn evaluate(
        &self,
        conditions: &[Condition],
        case: &CaseRecord,
        history: &[StepHistoryEntry],
    ) -> bool {
        conditions
            .iter()
            .all(|condition| self.evaluate_one(condition, case, history))
    }

    fn evaluate_one(
        &self,
        condition: &Condition,
        case: &CaseRecord,
        history: &[StepHistoryEntry],
    ) -> bool {
        match condition {
            Condition::CaseType { equals } => case.case_type == *equals,
            Condition::FieldRange { field, min, max } => match case.numeric_field(field) {
                Some(value) => {
                    min.map_or(true, |min| value >= min) && max.map_or(true, |max| value <= max)
                }
                None => false,
            },
            // The latest attempt of a step decides.
            Condition::StepSucceeded { step } => history
                .iter()
                .rev()
                .find(|entry| entry.step_name == *step)
                .is_some_and(StepHistoryEntry::succeeded),
            Condition::Expression { when } => {
                let context = json!({ "case": case, "history": history });
                match self.renderer.evaluate_condition(when, &context) {
                    Ok(result) => result,
                    Err(e) => {
                        warn!(expression = %when, error = %e, "Condition expression failed, treating as false");
                        false
                    }
                }
            }
        }
    }
}
