//! Event intake over NATS.
//!
//! Three subjects feed the engine:
//! - case events (`{"case_id", "trigger", "initiated_by"?}`) start workflows
//! - task completions (`{"task_id", "completed_by"?, "result"?}`) resume them
//! - control commands (`{"action": "resume" | "cancel", "execution_id", "reason"?}`)

use std::future::Future;
use std::sync::Arc;

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::engine::{TaskBridge, TaskCompletion, WorkflowEngine};
use crate::error::{EngineError, EngineResult};
use crate::model::WorkflowExecution;
use crate::result_ext::ResultExt;

/// A domain event that may start a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseEvent {
    pub case_id: Uuid,
    pub trigger: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initiated_by: Option<Uuid>,
}

/// A human finished a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskCompletedEvent {
    pub task_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_by: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
}

/// Administrative command for one execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ControlCommand {
    Resume {
        execution_id: Uuid,
    },
    Cancel {
        execution_id: Uuid,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
}

const DEFAULT_CANCEL_REASON: &str = "cancelled by operator";

/// Routes decoded NATS messages to the engine.
#[derive(Clone)]
pub struct Intake {
    engine: Arc<WorkflowEngine>,
    bridge: Arc<TaskBridge>,
}

impl Intake {
    pub fn new(engine: Arc<WorkflowEngine>, bridge: Arc<TaskBridge>) -> Self {
        Self { engine, bridge }
    }

    /// Start the matching workflow in the background.
    pub fn handle_case_event(&self, payload: &[u8]) -> EngineResult<tokio::task::JoinHandle<()>> {
        let event: CaseEvent = decode(payload)?;
        debug!(case_id = %event.case_id, trigger = %event.trigger, "Case event received");
        Ok(self
            .engine
            .start_detached(event.case_id, event.trigger, event.initiated_by))
    }

    pub async fn handle_task_completed(&self, payload: &[u8]) -> EngineResult<TaskCompletion> {
        let event: TaskCompletedEvent = decode(payload)?;
        self.bridge
            .complete(event.task_id, event.completed_by, event.result)
            .await
    }

    pub async fn handle_control(&self, payload: &[u8]) -> EngineResult<WorkflowExecution> {
        match decode::<ControlCommand>(payload)? {
            ControlCommand::Resume { execution_id } => self.engine.resume(execution_id).await,
            ControlCommand::Cancel {
                execution_id,
                reason,
            } => {
                let reason = reason.as_deref().unwrap_or(DEFAULT_CANCEL_REASON);
                self.engine.cancel(execution_id, reason).await
            }
        }
    }

    /// Consume all three subjects until `shutdown` resolves.
    pub async fn run(
        self,
        client: async_nats::Client,
        config: &AppConfig,
        shutdown: impl Future<Output = ()>,
    ) -> EngineResult<()> {
        let mut cases = subscribe(&client, &config.case_event_subject).await?;
        let mut tasks = subscribe(&client, &config.task_event_subject).await?;
        let mut control = subscribe(&client, &config.control_subject).await?;

        info!(
            cases = %config.case_event_subject,
            tasks = %config.task_event_subject,
            control = %config.control_subject,
            "Listening for workflow events"
        );

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Intake stopping");
                    break;
                }
                Some(msg) = cases.next() => {
                    let _ = self.handle_case_event(&msg.payload).log("case event");
                }
                Some(msg) = tasks.next() => {
                    let intake = self.clone();
                    tokio::spawn(async move {
                        let _ = intake
                            .handle_task_completed(&msg.payload)
                            .await
                            .log("task completion");
                    });
                }
                Some(msg) = control.next() => {
                    let intake = self.clone();
                    tokio::spawn(async move {
                        let _ = intake.handle_control(&msg.payload).await.log("control command");
                    });
                }
                else => {
                    info!("All intake subscriptions closed");
                    break;
                }
            }
        }
        Ok(())
    }
}

fn decode<T: serde::de::DeserializeOwned>(payload: &[u8]) -> EngineResult<T> {
    serde_json::from_slice(payload)
        .map_err(|e| EngineError::Validation(format!("malformed message: {}", e)))
}

async fn subscribe(
    client: &async_nats::Client,
    subject: &str,
) -> EngineResult<async_nats::Subscriber> {
    client
        .subscribe(subject.to_string())
        .await
        .map_err(|e| EngineError::Nats(format!("subscribe to {}: {}", subject, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::{Harness, TRIGGER};
    use crate::model::{ExecutionStatus, ManualTaskConfig, StepKind};
    use serde_json::json;

    fn intake(h: &Harness) -> Intake {
        Intake::new(h.engine.clone(), Arc::new(TaskBridge::new(h.engine.clone())))
    }

    #[test]
    fn test_control_command_wire_format() {
        let id = Uuid::new_v4();
        let cmd: ControlCommand =
            serde_json::from_value(json!({"action": "cancel", "execution_id": id})).unwrap();
        assert_eq!(
            cmd,
            ControlCommand::Cancel {
                execution_id: id,
                reason: None
            }
        );

        let cmd: ControlCommand =
            serde_json::from_value(json!({"action": "resume", "execution_id": id})).unwrap();
        assert_eq!(cmd, ControlCommand::Resume { execution_id: id });

        assert!(serde_json::from_value::<ControlCommand>(
            json!({"action": "restart", "execution_id": id})
        )
        .is_err());
    }

    #[test]
    fn test_malformed_payload_is_validation_error() {
        let err = decode::<CaseEvent>(b"{\"case_id\": 42}").unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[tokio::test]
    async fn test_events_drive_an_execution() {
        let h = Harness::new();
        h.publish(vec![(
            "sign_off",
            StepKind::Approval(ManualTaskConfig::default()),
        )]);
        let case = h.case("building_permit");
        let intake = intake(&h);

        let payload = serde_json::to_vec(&CaseEvent {
            case_id: case.id,
            trigger: TRIGGER.to_string(),
            initiated_by: None,
        })
        .unwrap();
        intake.handle_case_event(&payload).unwrap().await.unwrap();

        let execution = &h.store.executions_for_case(case.id)[0];
        assert_eq!(execution.status, ExecutionStatus::Waiting);

        let task_id = h.store.tasks_for_case(case.id)[0].id;
        let payload = serde_json::to_vec(&json!({"task_id": task_id, "result": {"ok": true}})).unwrap();
        let completion = intake.handle_task_completed(&payload).await.unwrap();
        assert_eq!(
            completion.execution.map(|e| e.status),
            Some(ExecutionStatus::Completed)
        );
    }

    #[tokio::test]
    async fn test_control_cancel_uses_default_reason() {
        let h = Harness::new();
        h.publish(vec![(
            "triage",
            StepKind::ManualTask(ManualTaskConfig::default()),
        )]);
        let case = h.case("building_permit");
        let execution = h
            .engine
            .start(&case, TRIGGER, None)
            .await
            .unwrap()
            .into_execution()
            .unwrap();

        let payload =
            serde_json::to_vec(&json!({"action": "cancel", "execution_id": execution.id})).unwrap();
        let cancelled = intake(&h).handle_control(&payload).await.unwrap();
        assert_eq!(cancelled.status, ExecutionStatus::Cancelled);
        assert_eq!(
            cancelled.context.get("cancel_reason"),
            Some(&json!(DEFAULT_CANCEL_REASON))
        );

        let payload =
            serde_json::to_vec(&json!({"action": "resume", "execution_id": execution.id})).unwrap();
        assert!(matches!(
            intake(&h).handle_control(&payload).await,
            Err(EngineError::InvalidState(_))
        ));
    }
}
