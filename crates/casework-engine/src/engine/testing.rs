//! Fixtures shared by engine tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Notify;
use uuid::Uuid;

use super::{Collaborators, WorkflowEngine};
use crate::error::{EngineError, EngineResult};
use crate::model::{CaseRecord, StepKind, WorkflowDefinition, WorkflowStep};
use crate::services::{AiAdvisor, Classification, RecordingNotifier, ReviewVerdict};
use crate::store::InMemoryStore;

pub(crate) const TRIGGER: &str = "case_submitted";

/// Holds an advisor call open until the test releases it.
#[derive(Default)]
pub(crate) struct Gate {
    pub entered: Notify,
    pub release: Notify,
}

/// Advisor returning canned answers.
#[derive(Default)]
pub(crate) struct ScriptedAdvisor {
    verdict: Option<ReviewVerdict>,
    classification: Option<Classification>,
    failure: Option<String>,
    gate: Option<Arc<Gate>>,
    calls: AtomicUsize,
}

impl ScriptedAdvisor {
    /// Every call reports `CollaboratorUnavailable`.
    pub fn unavailable() -> Self {
        Self::default()
    }

    pub fn reviewing(approved: bool, confidence: f64) -> Self {
        Self {
            verdict: Some(ReviewVerdict {
                approved,
                confidence,
                reasoning: None,
            }),
            ..Default::default()
        }
    }

    pub fn classifying(category: &str, confidence: f64) -> Self {
        Self {
            classification: Some(Classification {
                category: category.to_string(),
                confidence,
            }),
            ..Default::default()
        }
    }

    /// Every call fails with a hard `ExternalService` error.
    pub fn failing(message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            ..Default::default()
        }
    }

    pub fn gated(mut self, gate: Arc<Gate>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn answer<T: Clone>(&self, canned: &Option<T>) -> EngineResult<T> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }
        if let Some(message) = &self.failure {
            return Err(EngineError::ExternalService(message.clone()));
        }
        canned
            .clone()
            .ok_or_else(|| EngineError::CollaboratorUnavailable("scripted".to_string()))
    }
}

#[async_trait]
impl AiAdvisor for ScriptedAdvisor {
    async fn review(&self, _case_text: &str, _criteria: &[String]) -> EngineResult<ReviewVerdict> {
        self.answer(&self.verdict).await
    }

    async fn classify(&self, _case_text: &str) -> EngineResult<Classification> {
        self.answer(&self.classification).await
    }
}

/// Engine over an in-memory store with a recording notifier.
pub(crate) struct Harness {
    pub store: Arc<InMemoryStore>,
    pub notifier: Arc<RecordingNotifier>,
    pub advisor: Arc<ScriptedAdvisor>,
    pub engine: Arc<WorkflowEngine>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_advisor(ScriptedAdvisor::unavailable())
    }

    pub fn with_advisor(advisor: ScriptedAdvisor) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let advisor = Arc::new(advisor);
        let collaborators = Collaborators::from_store(store.clone(), notifier.clone(), advisor.clone());
        let engine = Arc::new(WorkflowEngine::new(collaborators));
        Self {
            store,
            notifier,
            advisor,
            engine,
        }
    }

    /// Insert a case with an owner.
    pub fn case(&self, case_type: &str) -> CaseRecord {
        let mut case = CaseRecord::new("PRM-2024-0001", case_type, "Detached garage");
        case.owner_id = Some(Uuid::new_v4());
        self.store.insert_case(case.clone());
        case
    }

    /// Publish a wildcard definition on [`TRIGGER`] with the given steps in order.
    pub fn publish(&self, steps: Vec<(&str, StepKind)>) -> (WorkflowDefinition, Vec<WorkflowStep>) {
        let definition = WorkflowDefinition::new("intake", TRIGGER, None);
        let steps: Vec<WorkflowStep> = steps
            .into_iter()
            .enumerate()
            .map(|(i, (name, kind))| WorkflowStep::new(definition.id, name, i as u32, kind))
            .collect();
        self.publish_steps(definition, steps)
    }

    pub fn publish_steps(
        &self,
        definition: WorkflowDefinition,
        steps: Vec<WorkflowStep>,
    ) -> (WorkflowDefinition, Vec<WorkflowStep>) {
        self.store
            .publish(definition.clone(), steps.clone())
            .expect("valid definition");
        (definition, steps)
    }
}
