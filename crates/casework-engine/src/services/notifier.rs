//! Notification delivery seam.

use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::EngineResult;
use crate::model::Notification;

/// Delivers a notification to a user.
///
/// Implementations return `CollaboratorUnavailable` when the channel is
/// down so step handlers can degrade instead of failing the execution.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, user_id: Uuid, notification: &Notification) -> EngineResult<()>;
}

/// Notifier that only logs. Used when no NATS server is configured.
#[derive(Debug, Default, Clone)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn send(&self, user_id: Uuid, notification: &Notification) -> EngineResult<()> {
        tracing::info!(
            user_id = %user_id,
            kind = %notification.kind,
            title = %notification.title,
            "Notification (log only)"
        );
        Ok(())
    }
}

/// Notifier that keeps every notification in memory.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(Uuid, Notification)>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<(Uuid, Notification)> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Notifications sent to one user.
    pub fn sent_to(&self, user_id: Uuid) -> Vec<Notification> {
        self.sent()
            .into_iter()
            .filter(|(to, _)| *to == user_id)
            .map(|(_, n)| n)
            .collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, user_id: Uuid, notification: &Notification) -> EngineResult<()> {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push((user_id, notification.clone()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_recording_notifier_filters_by_user() {
        let notifier = RecordingNotifier::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        notifier
            .send(a, &Notification::new("workflow_notification", "one", "1"))
            .await
            .unwrap();
        notifier
            .send(b, &Notification::new("task_assigned", "two", "2"))
            .await
            .unwrap();

        assert_eq!(notifier.sent().len(), 2);
        let to_b = notifier.sent_to(b);
        assert_eq!(to_b.len(), 1);
        assert_eq!(to_b[0].kind, "task_assigned");
    }
}
