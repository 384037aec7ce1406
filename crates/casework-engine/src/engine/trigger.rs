//! Trigger resolution: which workflow a domain event starts.

use std::sync::Arc;

use tracing::debug;

use crate::error::EngineResult;
use crate::model::{CaseRecord, WorkflowDefinition};
use crate::store::WorkflowStore;

/// Picks the single active definition for a (case, trigger) pair.
///
/// A definition restricted to the case's type beats a wildcard definition.
/// Among equals the earliest published wins, then the smallest id.
pub struct TriggerResolver {
    workflows: Arc<dyn WorkflowStore>,
}

impl TriggerResolver {
    pub fn new(workflows: Arc<dyn WorkflowStore>) -> Self {
        Self { workflows }
    }

    pub async fn resolve(
        &self,
        case: &CaseRecord,
        trigger: &str,
    ) -> EngineResult<Option<WorkflowDefinition>> {
        let candidates = self.workflows.find_active_by_trigger(trigger).await?;
        let selected = select(candidates, trigger, &case.case_type);

        debug!(
            case_id = %case.id,
            trigger = %trigger,
            definition_id = ?selected.as_ref().map(|d| d.id),
            "Resolved trigger"
        );
        Ok(selected)
    }
}

/// 0 for an exact case-type match, 1 for a wildcard, `None` if excluded.
fn match_rank(definition: &WorkflowDefinition, case_type: &str) -> Option<u8> {
    match definition.trigger_case_type.as_deref() {
        Some(t) if t == case_type => Some(0),
        Some(_) => None,
        None => Some(1),
    }
}

fn select(
    candidates: Vec<WorkflowDefinition>,
    trigger: &str,
    case_type: &str,
) -> Option<WorkflowDefinition> {
    candidates
        .into_iter()
        .filter(|d| d.is_active() && d.trigger == trigger)
        .filter_map(|d| match_rank(&d, case_type).map(|rank| (rank, d)))
        .min_by(|(ra, a), (rb, b)| {
            ra.cmp(rb)
                .then(a.created_at.cmp(&b.created_at))
                .then(a.id.to_string().cmp(&b.id.to_string()))
        })
        .map(|(_, d)| d)
}
