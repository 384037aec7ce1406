//! Step dispatch and handlers.
//!
//! Each [`StepKind`] variant maps to one handler. Handlers read the case,
//! the step configuration and the execution, and may call the stores,
//! the notifier or the AI advisor. A handler returning `Err` fails the
//! execution, except `CollaboratorUnavailable`, which is recorded as a
//! skipped result so the workflow keeps moving.

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::Collaborators;
use crate::error::EngineResult;
use crate::model::{
    CaseRecord, CaseUpdate, ClassificationConfig, DocumentCheckConfig, Inspection,
    InspectionConfig, ManualTaskConfig, Notification, NotifyConfig, Priority, ReviewConfig,
    StatusUpdateConfig, StepKind, StepResult, Task, WorkflowExecution, WorkflowStep,
};
use crate::services::{AiAdvisor, Notifier};
use crate::store::{AssigneeResolver, CaseStore, SchedulingStore, TaskStore};
use crate::template::TemplateRenderer;

/// Staff role used for manual steps that do not name one.
pub const DEFAULT_STAFF_ROLE: &str = "staff";

/// Runs a single workflow step.
pub struct StepExecutor {
    cases: Arc<dyn CaseStore>,
    tasks: Arc<dyn TaskStore>,
    scheduling: Arc<dyn SchedulingStore>,
    assignees: Arc<dyn AssigneeResolver>,
    notifier: Arc<dyn Notifier>,
    advisor: Arc<dyn AiAdvisor>,
    renderer: TemplateRenderer,
    staff_role: String,
}

impl StepExecutor {
    pub fn new(collaborators: &Collaborators) -> Self {
        Self {
            cases: collaborators.cases.clone(),
            tasks: collaborators.tasks.clone(),
            scheduling: collaborators.scheduling.clone(),
            assignees: collaborators.assignees.clone(),
            notifier: collaborators.notifier.clone(),
            advisor: collaborators.advisor.clone(),
            renderer: TemplateRenderer::new(),
            staff_role: DEFAULT_STAFF_ROLE.to_string(),
        }
    }

    /// Override the fallback role for manual-step assignment.
    pub fn with_staff_role(mut self, role: &str) -> Self {
        self.staff_role = role.to_string();
        self
    }

    /// Execute `step` for `execution` against the current case record.
    pub async fn execute(
        &self,
        step: &WorkflowStep,
        execution: &WorkflowExecution,
        case: &CaseRecord,
    ) -> EngineResult<StepResult> {
        debug!(
            execution_id = %execution.id,
            step = %step.name,
            step_type = %step.kind,
            "Executing step"
        );

        match self.dispatch(step, execution, case).await {
            Err(e) if e.is_unavailable() => {
                warn!(
                    execution_id = %execution.id,
                    step = %step.name,
                    error = %e,
                    "Collaborator unavailable, skipping step"
                );
                Ok(StepResult::skipped(e.to_string()))
            }
            other => other,
        }
    }

    async fn dispatch(
        &self,
        step: &WorkflowStep,
        execution: &WorkflowExecution,
        case: &CaseRecord,
    ) -> EngineResult<StepResult> {
        match &step.kind {
            StepKind::Review(config) => self.review(case, config).await,
            StepKind::Classification(config) => self.classify(case, config).await,
            StepKind::DocumentCheck(config) => self.check_documents(case, config).await,
            StepKind::PaymentCheck => self.check_payment(case).await,
            StepKind::Notify(config) => self.notify_owner(case, execution, config).await,
            StepKind::ManualTask(config) => {
                self.create_manual_task(case, execution, config, "Review").await
            }
            StepKind::Approval(config) => {
                self.create_manual_task(case, execution, config, "Approve").await
            }
            StepKind::InspectionScheduling(config) => {
                self.schedule_inspection(case, execution, config).await
            }
            StepKind::StatusUpdate(config) => self.update_status(case, config).await,
            StepKind::Unknown => Ok(StepResult::failure("unknown step type")),
        }
    }

    async fn review(&self, case: &CaseRecord, config: &ReviewConfig) -> EngineResult<StepResult> {
        let verdict = self
            .advisor
            .review(&case.descriptive_text(), &config.criteria)
            .await?;
        let passed = verdict.approved && verdict.confidence > config.approval_threshold;

        let mut result = StepResult::check(passed)
            .with("approved", verdict.approved)
            .with("confidence", verdict.confidence)
            .with("threshold", config.approval_threshold);
        if let Some(reasoning) = verdict.reasoning {
            result = result.with_message(reasoning);
        }
        Ok(result)
    }

    async fn classify(
        &self,
        case: &CaseRecord,
        config: &ClassificationConfig,
    ) -> EngineResult<StepResult> {
        let classification = self.advisor.classify(&case.descriptive_text()).await?;
        let changed = case.category.as_deref() != Some(classification.category.as_str());
        let updated = changed && classification.confidence > config.min_confidence;

        if updated {
            self.cases
                .update_case(case.id, &CaseUpdate::category(&classification.category))
                .await?;
            info!(
                case_id = %case.id,
                category = %classification.category,
                confidence = classification.confidence,
                "Case reclassified"
            );
        }

        Ok(StepResult::success()
            .with("category", &classification.category)
            .with("confidence", classification.confidence)
            .with("updated", updated))
    }

    async fn check_documents(
        &self,
        case: &CaseRecord,
        config: &DocumentCheckConfig,
    ) -> EngineResult<StepResult> {
        let count = self.cases.count_documents(case.id).await?;
        Ok(StepResult::check(count >= config.min_documents)
            .with("documents", count)
            .with("required", config.min_documents))
    }

    async fn check_payment(&self, case: &CaseRecord) -> EngineResult<StepResult> {
        let paid = self.cases.has_completed_payment(case.id).await?;
        Ok(StepResult::check(paid))
    }

    async fn notify_owner(
        &self,
        case: &CaseRecord,
        execution: &WorkflowExecution,
        config: &NotifyConfig,
    ) -> EngineResult<StepResult> {
        let Some(owner) = case.owner_id else {
            return Ok(StepResult::failure("case has no owner to notify"));
        };

        let context = json!({ "case": case, "execution": execution });
        let notification = Notification::new(
            "workflow_notification",
            self.renderer.render(&config.title, &context)?,
            self.renderer.render(&config.message, &context)?,
        )
        .with_priority(config.priority);
        self.notifier.send(owner, &notification).await?;

        Ok(StepResult::success().with("recipient", owner))
    }

    async fn create_manual_task(
        &self,
        case: &CaseRecord,
        execution: &WorkflowExecution,
        config: &ManualTaskConfig,
        verb: &str,
    ) -> EngineResult<StepResult> {
        let assignee = match config.assignee {
            Some(id) => Some(id),
            None => {
                let role = config.role.as_deref().unwrap_or(&self.staff_role);
                self.assignees.least_loaded(role).await?
            }
        };

        let context = json!({ "case": case, "execution": execution });
        let title = match &config.title {
            Some(t) => self.renderer.render(t, &context)?,
            None => format!("{} case {}", verb, case.reference),
        };
        let description = match &config.description {
            Some(d) => self.renderer.render(d, &context)?,
            None => case.title.clone(),
        };

        let mut task = Task::new(&title, &description);
        task.execution_id = Some(execution.id);
        task.case_id = Some(case.id);
        task.assignee_id = assignee;
        task.due_date = config
            .due_in_days
            .map(|days| Utc::now() + Duration::days(i64::from(days)));
        self.tasks.create_task(&task).await?;

        match assignee {
            Some(user) => {
                let notification = Notification::new(
                    "task_assigned",
                    format!("New task: {}", task.title),
                    format!("You have been assigned a task for case {}.", case.reference),
                )
                .with_priority(Priority::High);
                if let Err(e) = self.notifier.send(user, &notification).await {
                    warn!(task_id = %task.id, assignee = %user, error = %e, "Failed to notify assignee");
                }
            }
            None => warn!(
                execution_id = %execution.id,
                task_id = %task.id,
                "No staff member available, task left unassigned"
            ),
        }

        Ok(StepResult::success()
            .with("task_id", task.id)
            .with("assignee_id", assignee))
    }

    async fn schedule_inspection(
        &self,
        case: &CaseRecord,
        execution: &WorkflowExecution,
        config: &InspectionConfig,
    ) -> EngineResult<StepResult> {
        let scheduled_for = Utc::now() + Duration::days(i64::from(config.days_out));
        let inspector = self.scheduling.available_inspector(scheduled_for).await?;

        let inspection = Inspection {
            id: Uuid::new_v4(),
            case_id: case.id,
            execution_id: execution.id,
            inspection_type: config.inspection_type.clone(),
            scheduled_for,
            inspector_id: inspector,
            status: "scheduled".to_string(),
            created_at: Utc::now(),
        };
        self.scheduling.create_inspection(&inspection).await?;

        Ok(StepResult::success()
            .with("inspection_id", inspection.id)
            .with("scheduled_for", scheduled_for)
            .with("inspector_id", inspector))
    }

    async fn update_status(
        &self,
        case: &CaseRecord,
        config: &StatusUpdateConfig,
    ) -> EngineResult<StepResult> {
        let Some(status) = config.status.as_deref().filter(|s| !s.trim().is_empty()) else {
            return Ok(StepResult::failure("no status configured"));
        };
        self.cases.update_case(case.id, &CaseUpdate::status(status)).await?;
        Ok(StepResult::success().with("status", status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::{Harness, ScriptedAdvisor};
    use crate::model::TaskStatus;
    use crate::store::{StaffMember, INSPECTOR_ROLE};

    fn executor(h: &Harness) -> StepExecutor {
        StepExecutor::new(h.engine.collaborators())
    }

    fn step(kind: StepKind) -> WorkflowStep {
        WorkflowStep::new(Uuid::new_v4(), "step", 0, kind)
    }

    fn execution_for(case: &CaseRecord) -> WorkflowExecution {
        WorkflowExecution::new(Uuid::new_v4(), case.id, None)
    }

    #[tokio::test]
    async fn test_review_threshold_is_exclusive() {
        let h = Harness::with_advisor(ScriptedAdvisor::reviewing(true, 0.8));
        let case = h.case("building_permit");
        let result = executor(&h)
            .execute(&step(StepKind::Review(ReviewConfig::default())), &execution_for(&case), &case)
            .await
            .unwrap();
        assert!(!result.success);
        assert_eq!(result.detail("passed"), Some(&json!(false)));
        assert_eq!(result.detail("confidence"), Some(&json!(0.8)));

        let h = Harness::with_advisor(ScriptedAdvisor::reviewing(true, 0.93));
        let case = h.case("building_permit");
        let result = executor(&h)
            .execute(&step(StepKind::Review(ReviewConfig::default())), &execution_for(&case), &case)
            .await
            .unwrap();
        assert!(result.success);
    }

    #[tokio::test]
    async fn test_review_unavailable_is_skipped() {
        let h = Harness::new();
        let case = h.case("building_permit");
        let result = executor(&h)
            .execute(&step(StepKind::Review(ReviewConfig::default())), &execution_for(&case), &case)
            .await
            .unwrap();
        assert!(!result.success);
        assert!(result.skipped);
    }

    #[tokio::test]
    async fn test_classification_updates_category_above_bar() {
        let h = Harness::with_advisor(ScriptedAdvisor::classifying("residential", 0.97));
        let case = h.case("building_permit");
        let result = executor(&h)
            .execute(
                &step(StepKind::Classification(ClassificationConfig::default())),
                &execution_for(&case),
                &case,
            )
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.detail("updated"), Some(&json!(true)));
        assert_eq!(h.store.case(case.id).unwrap().category.as_deref(), Some("residential"));
    }

    #[tokio::test]
    async fn test_classification_below_bar_leaves_case() {
        let h = Harness::with_advisor(ScriptedAdvisor::classifying("commercial", 0.9));
        let case = h.case("building_permit");
        let result = executor(&h)
            .execute(
                &step(StepKind::Classification(ClassificationConfig::default())),
                &execution_for(&case),
                &case,
            )
            .await
            .unwrap();
        assert_eq!(result.detail("updated"), Some(&json!(false)));
        assert!(h.store.case(case.id).unwrap().category.is_none());
    }

    #[tokio::test]
    async fn test_classification_hard_failure_is_error() {
        let h = Harness::with_advisor(ScriptedAdvisor::failing("model returned garbage"));
        let case = h.case("building_permit");
        let err = executor(&h)
            .execute(
                &step(StepKind::Classification(ClassificationConfig::default())),
                &execution_for(&case),
                &case,
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("model returned garbage"));
    }

    #[tokio::test]
    async fn test_document_and_payment_checks() {
        let h = Harness::new();
        let case = h.case("building_permit");
        let exec = executor(&h);
        let docs = step(StepKind::DocumentCheck(DocumentCheckConfig { min_documents: 2 }));

        h.store.attach_documents(case.id, 1);
        let result = exec.execute(&docs, &execution_for(&case), &case).await.unwrap();
        assert_eq!(result.detail("passed"), Some(&json!(false)));
        assert_eq!(result.detail("documents"), Some(&json!(1)));

        h.store.attach_documents(case.id, 1);
        let result = exec.execute(&docs, &execution_for(&case), &case).await.unwrap();
        assert!(result.success);

        let pay = step(StepKind::PaymentCheck);
        let result = exec.execute(&pay, &execution_for(&case), &case).await.unwrap();
        assert!(!result.success);
        h.store.record_payment(case.id, true);
        let result = exec.execute(&pay, &execution_for(&case), &case).await.unwrap();
        assert!(result.success);
        assert_eq!(h.store.case(case.id).unwrap().status, "submitted");
    }

    #[tokio::test]
    async fn test_notify_renders_templates() {
        let h = Harness::new();
        let case = h.case("building_permit");
        let config = NotifyConfig {
            title: "Received {{ case.reference }}".to_string(),
            message: "We are reviewing your {{ case.case_type | humanize | lower }}.".to_string(),
            priority: Priority::Low,
        };
        let result = executor(&h)
            .execute(&step(StepKind::Notify(config)), &execution_for(&case), &case)
            .await
            .unwrap();
        assert!(result.success);

        let sent = h.notifier.sent_to(case.owner_id.unwrap());
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].title, "Received PRM-2024-0001");
        assert_eq!(sent[0].message, "We are reviewing your building permit.");
        assert_eq!(sent[0].priority, Priority::Low);
    }

    #[tokio::test]
    async fn test_notify_without_owner_fails_softly() {
        let h = Harness::new();
        let mut case = h.case("building_permit");
        case.owner_id = None;
        let result = executor(&h)
            .execute(&step(StepKind::Notify(NotifyConfig::default())), &execution_for(&case), &case)
            .await
            .unwrap();
        assert!(!result.success);
        assert!(h.notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn test_manual_task_assigns_least_loaded_staff() {
        let h = Harness::new();
        let case = h.case("building_permit");
        let busy = StaffMember::new("Busy Reviewer", "staff");
        let free = StaffMember::new("Free Reviewer", "staff");
        h.store.add_staff(busy.clone());
        h.store.add_staff(free.clone());
        let mut existing = Task::new("Earlier work", "");
        existing.assignee_id = Some(busy.id);
        h.store.create_task(&existing).await.unwrap();

        let execution = execution_for(&case);
        let config = ManualTaskConfig {
            due_in_days: Some(5),
            ..Default::default()
        };
        let result = executor(&h)
            .execute(&step(StepKind::Approval(config)), &execution, &case)
            .await
            .unwrap();
        assert!(result.success);

        let tasks = h.store.tasks_for_case(case.id);
        assert_eq!(tasks.len(), 1);
        let task = &tasks[0];
        assert_eq!(task.assignee_id, Some(free.id));
        assert_eq!(task.execution_id, Some(execution.id));
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.title, "Approve case PRM-2024-0001");
        assert!(task.due_date.is_some());
        assert_eq!(result.detail("task_id"), Some(&json!(task.id)));

        let sent = h.notifier.sent_to(free.id);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].kind, "task_assigned");
    }

    #[tokio::test]
    async fn test_manual_task_without_staff_is_unassigned() {
        let h = Harness::new();
        let case = h.case("building_permit");
        let result = executor(&h)
            .execute(
                &step(StepKind::ManualTask(ManualTaskConfig::default())),
                &execution_for(&case),
                &case,
            )
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.detail("assignee_id"), Some(&serde_json::Value::Null));
        assert!(h.store.tasks_for_case(case.id)[0].assignee_id.is_none());
    }

    #[tokio::test]
    async fn test_schedule_inspection() {
        let h = Harness::new();
        let case = h.case("building_permit");
        let inspector = StaffMember::new("Field Inspector", INSPECTOR_ROLE);
        h.store.add_staff(inspector.clone());

        let config = InspectionConfig {
            inspection_type: "framing".to_string(),
            days_out: 3,
        };
        let result = executor(&h)
            .execute(&step(StepKind::InspectionScheduling(config)), &execution_for(&case), &case)
            .await
            .unwrap();
        assert!(result.success);

        let inspections = h.store.inspections_for_case(case.id);
        assert_eq!(inspections.len(), 1);
        assert_eq!(inspections[0].inspector_id, Some(inspector.id));
        assert_eq!(inspections[0].inspection_type, "framing");
        assert!(inspections[0].scheduled_for > Utc::now() + Duration::days(2));
    }

    #[tokio::test]
    async fn test_status_update() {
        let h = Harness::new();
        let case = h.case("building_permit");
        let exec = executor(&h);

        let result = exec
            .execute(
                &step(StepKind::StatusUpdate(StatusUpdateConfig {
                    status: Some("under_review".to_string()),
                })),
                &execution_for(&case),
                &case,
            )
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(h.store.case(case.id).unwrap().status, "under_review");

        let result = exec
            .execute(
                &step(StepKind::StatusUpdate(StatusUpdateConfig::default())),
                &execution_for(&case),
                &case,
            )
            .await
            .unwrap();
        assert!(!result.success);
    }

    #[tokio::test]
    async fn test_unknown_step_type() {
        let h = Harness::new();
        let case = h.case("building_permit");
        let result = executor(&h)
            .execute(&step(StepKind::Unknown), &execution_for(&case), &case)
            .await
            .unwrap();
        assert!(!result.success);
        assert_eq!(result.message.as_deref(), Some("unknown step type"));
    }
}
