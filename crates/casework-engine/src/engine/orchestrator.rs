//! Workflow execution state machine.
//!
//! An execution moves `pending → in_progress`, then steps forward one
//! step at a time until it completes, fails, or parks in `waiting` on a
//! manual step. Each step runs under the execution's lock and the
//! execution is persisted after every step. [`WorkflowEngine::recover`]
//! restarts interrupted executions from the last recorded cursor, so only
//! a step whose result was never persisted runs again.

use std::sync::Arc;

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::evaluator::ConditionEvaluator;
use super::locks::ExecutionLocks;
use super::steps::StepExecutor;
use super::trigger::TriggerResolver;
use super::Collaborators;
use crate::error::{EngineError, EngineResult};
use crate::model::{
    CaseRecord, ExecutionStatus, Notification, StepHistoryEntry, StepResult, WorkflowExecution,
    WorkflowStep,
};
use crate::result_ext::ResultExt;

/// Result of [`WorkflowEngine::start`].
#[derive(Debug, Clone)]
pub enum StartOutcome {
    /// An execution was created and advanced as far as it could go.
    Started(WorkflowExecution),
    /// No active definition applies to the case and trigger.
    NoApplicableWorkflow,
}

impl StartOutcome {
    pub fn execution(&self) -> Option<&WorkflowExecution> {
        match self {
            Self::Started(execution) => Some(execution),
            Self::NoApplicableWorkflow => None,
        }
    }

    pub fn into_execution(self) -> Option<WorkflowExecution> {
        match self {
            Self::Started(execution) => Some(execution),
            Self::NoApplicableWorkflow => None,
        }
    }
}

/// Drives workflow executions.
pub struct WorkflowEngine {
    collaborators: Collaborators,
    resolver: TriggerResolver,
    evaluator: ConditionEvaluator,
    executor: StepExecutor,
    locks: ExecutionLocks,
}

impl WorkflowEngine {
    pub fn new(collaborators: Collaborators) -> Self {
        Self {
            resolver: TriggerResolver::new(collaborators.workflows.clone()),
            evaluator: ConditionEvaluator::new(),
            executor: StepExecutor::new(&collaborators),
            locks: ExecutionLocks::new(),
            collaborators,
        }
    }

    /// Fallback role for manual steps without an explicit assignee or role.
    pub fn with_staff_role(mut self, role: &str) -> Self {
        self.executor = self.executor.with_staff_role(role);
        self
    }

    pub fn collaborators(&self) -> &Collaborators {
        &self.collaborators
    }

    /// Start the workflow bound to `trigger` for a case.
    ///
    /// Returns the execution after the first advance, which may already be
    /// `completed`, `waiting` or `failed`. Step failures are recorded on
    /// the execution rather than returned.
    pub async fn start(
        &self,
        case: &CaseRecord,
        trigger: &str,
        initiated_by: Option<Uuid>,
    ) -> EngineResult<StartOutcome> {
        let Some(definition) = self.resolver.resolve(case, trigger).await? else {
            info!(case_id = %case.id, trigger = %trigger, "No applicable workflow");
            return Ok(StartOutcome::NoApplicableWorkflow);
        };

        let mut execution = WorkflowExecution::new(definition.id, case.id, initiated_by);
        self.collaborators
            .executions
            .create_execution(&execution)
            .await?;

        {
            let _guard = self.locks.acquire(execution.id).await;
            self.transition(&mut execution, ExecutionStatus::InProgress)?;
            execution.started_at = Some(Utc::now());
            self.collaborators
                .executions
                .update_execution(&execution)
                .await?;
        }

        info!(
            execution_id = %execution.id,
            case_id = %case.id,
            definition = %definition.name,
            "Workflow started"
        );

        let execution = self.advance(execution.id).await?;
        Ok(StartOutcome::Started(execution))
    }

    /// Load the case and start the workflow bound to `trigger`.
    pub async fn start_for_case(
        &self,
        case_id: Uuid,
        trigger: &str,
        initiated_by: Option<Uuid>,
    ) -> EngineResult<StartOutcome> {
        let case = self
            .collaborators
            .cases
            .load_case(case_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("case {}", case_id)))?;
        self.start(&case, trigger, initiated_by).await
    }

    /// Start a workflow without waiting for it. Errors are logged.
    pub fn start_detached(
        self: &Arc<Self>,
        case_id: Uuid,
        trigger: String,
        initiated_by: Option<Uuid>,
    ) -> JoinHandle<()> {
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            let _ = engine
                .start_for_case(case_id, &trigger, initiated_by)
                .await
                .log(format!("starting '{}' workflow for case {}", trigger, case_id));
        })
    }

    /// Continue a `waiting` execution past its manual step.
    ///
    /// Administrative path: the pending task, if any, is left as it is.
    pub async fn resume(&self, execution_id: Uuid) -> EngineResult<WorkflowExecution> {
        self.resume_waiting(execution_id, None).await
    }

    /// Continue a `waiting` execution because `task_id` was completed.
    ///
    /// Fails with `InvalidState` unless the execution is parked on exactly
    /// that task.
    pub async fn resume_for_task(
        &self,
        execution_id: Uuid,
        task_id: Uuid,
    ) -> EngineResult<WorkflowExecution> {
        self.resume_waiting(execution_id, Some(task_id)).await
    }

    async fn resume_waiting(
        &self,
        execution_id: Uuid,
        task_id: Option<Uuid>,
    ) -> EngineResult<WorkflowExecution> {
        {
            let _guard = self.locks.acquire(execution_id).await;
            let mut execution = self.load(execution_id).await?;
            if execution.status != ExecutionStatus::Waiting {
                return Err(EngineError::invalid_state(
                    execution_id,
                    execution.status,
                    "resume",
                ));
            }
            if let Some(task_id) = task_id {
                if execution.pending_task_id() != Some(task_id) {
                    return Err(EngineError::InvalidState(format!(
                        "execution {} is not waiting on task {}",
                        execution_id, task_id
                    )));
                }
            }

            self.transition(&mut execution, ExecutionStatus::InProgress)?;
            execution.current_step_order += 1;
            execution.context.remove("pending_task_id");
            self.collaborators
                .executions
                .update_execution(&execution)
                .await?;
            info!(
                execution_id = %execution_id,
                step_order = execution.current_step_order,
                task_id = ?task_id,
                "Execution resumed"
            );
        }

        self.advance(execution_id).await
    }

    /// Cancel a non-terminal execution. A step already running finishes,
    /// but nothing runs after it.
    pub async fn cancel(&self, execution_id: Uuid, reason: &str) -> EngineResult<WorkflowExecution> {
        let execution = {
            let _guard = self.locks.acquire(execution_id).await;
            let mut execution = self.load(execution_id).await?;
            if execution.is_terminal() {
                return Err(EngineError::invalid_state(
                    execution_id,
                    execution.status,
                    "cancel",
                ));
            }

            self.transition(&mut execution, ExecutionStatus::Cancelled)?;
            execution.set_context("cancel_reason", reason);
            execution.set_context("cancelled_at", Utc::now());
            self.collaborators
                .executions
                .update_execution(&execution)
                .await?;
            execution
        };

        self.locks.forget(execution_id);
        info!(execution_id = %execution_id, reason = %reason, "Execution cancelled");
        Ok(execution)
    }

    pub async fn get_execution(&self, execution_id: Uuid) -> EngineResult<WorkflowExecution> {
        self.load(execution_id).await
    }

    /// Pick up executions a previous process left `pending` or
    /// `in_progress` and advance them from their stored cursor.
    ///
    /// Returns the executions that were advanced. One that fails to
    /// advance is logged and left for the next sweep.
    pub async fn recover(&self) -> EngineResult<Vec<WorkflowExecution>> {
        let interrupted = self.collaborators.executions.find_interrupted().await?;
        if interrupted.is_empty() {
            return Ok(Vec::new());
        }
        info!(count = interrupted.len(), "Recovering interrupted executions");

        let mut recovered = Vec::with_capacity(interrupted.len());
        for execution in interrupted {
            let definition = self
                .collaborators
                .workflows
                .load_definition(execution.definition_id)
                .await?;
            let Some(definition) = definition else {
                warn!(
                    execution_id = %execution.id,
                    definition_id = %execution.definition_id,
                    "Definition missing, cannot recover execution"
                );
                continue;
            };
            info!(
                execution_id = %execution.id,
                definition = %definition.name,
                step_order = execution.current_step_order,
                "Recovering execution"
            );

            if let Ok(execution) = self
                .recover_one(execution.id)
                .await
                .log(format!("recovering execution {}", execution.id))
            {
                recovered.push(execution);
            }
        }
        Ok(recovered)
    }

    async fn recover_one(&self, execution_id: Uuid) -> EngineResult<WorkflowExecution> {
        {
            let _guard = self.locks.acquire(execution_id).await;
            let mut execution = self.load(execution_id).await?;
            if execution.status == ExecutionStatus::Pending {
                self.transition(&mut execution, ExecutionStatus::InProgress)?;
                execution.started_at = Some(Utc::now());
                self.collaborators
                    .executions
                    .update_execution(&execution)
                    .await?;
            }
        }
        self.advance(execution_id).await
    }

    /// Run steps until the execution leaves `in_progress`.
    async fn advance(&self, execution_id: Uuid) -> EngineResult<WorkflowExecution> {
        let definition_id = self.load(execution_id).await?.definition_id;
        let steps = self.collaborators.workflows.load_steps(definition_id).await?;

        // One iteration per remaining step plus the completing one.
        for _ in 0..=steps.len() {
            let execution = {
                let _guard = self.locks.acquire(execution_id).await;
                let mut execution = self.load(execution_id).await?;
                if execution.status != ExecutionStatus::InProgress {
                    debug!(
                        execution_id = %execution_id,
                        status = %execution.status,
                        "Execution no longer in progress, stopping"
                    );
                    return Ok(execution);
                }

                self.step_once(&mut execution, &steps).await?;
                self.collaborators
                    .executions
                    .update_execution(&execution)
                    .await?;
                execution
            };

            if execution.status == ExecutionStatus::InProgress {
                continue;
            }
            if execution.is_terminal() {
                self.locks.forget(execution_id);
            }
            if execution.status == ExecutionStatus::Completed {
                self.notify_completion(&execution).await;
            }
            return Ok(execution);
        }

        Err(EngineError::Internal(format!(
            "execution {} did not settle after {} steps",
            execution_id,
            steps.len()
        )))
    }

    /// Execute or skip the step under the cursor, or complete.
    async fn step_once(
        &self,
        execution: &mut WorkflowExecution,
        steps: &[WorkflowStep],
    ) -> EngineResult<()> {
        let Some(step) = steps.get(execution.current_step_order as usize) else {
            self.transition(execution, ExecutionStatus::Completed)?;
            info!(
                execution_id = %execution.id,
                steps = execution.step_history.len(),
                "Workflow completed"
            );
            return Ok(());
        };

        match self.run_step(step, execution).await {
            Ok(None) => {
                debug!(execution_id = %execution.id, step = %step.name, "Condition not met, skipping");
                execution.step_history.push(StepHistoryEntry::skipped(step));
                execution.current_step_order += 1;
            }
            Ok(Some(result)) => {
                let task_id = result.detail("task_id").cloned();
                execution
                    .step_history
                    .push(StepHistoryEntry::executed(step, result));

                if step.kind.suspends() {
                    self.transition(execution, ExecutionStatus::Waiting)?;
                    if let Some(task_id) = task_id {
                        execution.set_context("pending_task_id", task_id);
                    }
                    info!(execution_id = %execution.id, step = %step.name, "Waiting on manual step");
                } else {
                    execution.current_step_order += 1;
                }
            }
            Err(e) => {
                let failure = EngineError::StepExecution {
                    step: step.name.clone(),
                    message: e.to_string(),
                };
                error!(execution_id = %execution.id, error = %failure, "Workflow failed");

                execution
                    .step_history
                    .push(StepHistoryEntry::executed(step, StepResult::errored(e.to_string())));
                execution.set_context("error", failure.to_string());
                execution.set_context("failed_step", &step.name);
                execution.set_context("failed_at", Utc::now());
                self.transition(execution, ExecutionStatus::Failed)?;
            }
        }
        Ok(())
    }

    /// `Ok(None)` when the step's conditions do not hold.
    async fn run_step(
        &self,
        step: &WorkflowStep,
        execution: &WorkflowExecution,
    ) -> EngineResult<Option<StepResult>> {
        let case = self
            .collaborators
            .cases
            .load_case(execution.case_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("case {}", execution.case_id)))?;

        if !self
            .evaluator
            .evaluate(&step.conditions, &case, &execution.step_history)
        {
            return Ok(None);
        }
        self.executor.execute(step, execution, &case).await.map(Some)
    }

    fn transition(
        &self,
        execution: &mut WorkflowExecution,
        next: ExecutionStatus,
    ) -> EngineResult<()> {
        if !execution.status.can_transition_to(next) {
            return Err(EngineError::invalid_state(
                execution.id,
                execution.status,
                &format!("move to '{}'", next),
            ));
        }
        if next.is_terminal() {
            execution.finish(next);
        } else {
            execution.status = next;
        }
        Ok(())
    }

    async fn notify_completion(&self, execution: &WorkflowExecution) {
        let case = match self.collaborators.cases.load_case(execution.case_id).await {
            Ok(Some(case)) => case,
            Ok(None) => return,
            Err(e) => {
                warn!(execution_id = %execution.id, error = %e, "Could not load case for completion notice");
                return;
            }
        };
        let Some(owner) = case.owner_id else {
            return;
        };

        let notification = Notification::new(
            "workflow_completed",
            format!("Processing complete for {}", case.reference),
            format!(
                "All workflow steps for case {} have finished. Current status: {}.",
                case.reference, case.status
            ),
        );
        if let Err(e) = self.collaborators.notifier.send(owner, &notification).await {
            warn!(execution_id = %execution.id, error = %e, "Failed to send completion notice");
        }
    }

    async fn load(&self, execution_id: Uuid) -> EngineResult<WorkflowExecution> {
        self.collaborators
            .executions
            .load_execution(execution_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("execution {}", execution_id)))
    }
}
