//! NATS notification publisher.
//!
//! Each notification is published to `<prefix>.<user_id>` on a JetStream
//! stream, so a delivery service (email, in-app inbox) can consume per
//! user or for everyone with `<prefix>.>`.

use async_nats::jetstream::{self, Context};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};
use crate::model::Notification;
use crate::services::Notifier;

/// JetStream stream holding outgoing notifications.
pub const NOTIFICATION_STREAM: &str = "casework_notifications";

/// Notification as published on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationEnvelope {
    pub user_id: Uuid,
    #[serde(flatten)]
    pub notification: Notification,
    pub sent_at: DateTime<Utc>,
}

/// Subject a user's notifications are published to.
pub fn notification_subject(prefix: &str, user_id: Uuid) -> String {
    format!("{}.{}", prefix.trim_end_matches('.'), user_id)
}

/// [`Notifier`] publishing to NATS JetStream.
#[derive(Clone)]
pub struct NatsNotifier {
    js: Context,
    subject_prefix: String,
}

impl NatsNotifier {
    /// Create a notifier from a connected client, creating the stream if needed.
    pub async fn new(client: async_nats::Client, subject_prefix: &str) -> EngineResult<Self> {
        let js = jetstream::new(client);
        let subject_prefix = subject_prefix.trim_end_matches('.').to_string();
        Self::ensure_stream(&js, &subject_prefix).await?;
        Ok(Self { js, subject_prefix })
    }

    async fn ensure_stream(js: &Context, prefix: &str) -> EngineResult<()> {
        match js.get_stream(NOTIFICATION_STREAM).await {
            Ok(_) => {
                tracing::debug!(stream = %NOTIFICATION_STREAM, "Using existing NATS stream");
                Ok(())
            }
            Err(_) => {
                let config = jetstream::stream::Config {
                    name: NOTIFICATION_STREAM.to_string(),
                    subjects: vec![format!("{}.>", prefix)],
                    max_age: std::time::Duration::from_secs(7 * 24 * 3600),
                    storage: jetstream::stream::StorageType::File,
                    ..Default::default()
                };

                js.create_stream(config)
                    .await
                    .map_err(|e| EngineError::Nats(e.to_string()))?;

                tracing::info!(stream = %NOTIFICATION_STREAM, prefix = %prefix, "Created NATS stream");
                Ok(())
            }
        }
    }
}

#[async_trait]
impl Notifier for NatsNotifier {
    async fn send(&self, user_id: Uuid, notification: &Notification) -> EngineResult<()> {
        let envelope = NotificationEnvelope {
            user_id,
            notification: notification.clone(),
            sent_at: Utc::now(),
        };
        let payload = serde_json::to_vec(&envelope)?;
        let subject = notification_subject(&self.subject_prefix, user_id);

        self.js
            .publish(subject.clone(), payload.into())
            .await
            .map_err(|e| EngineError::CollaboratorUnavailable(format!("NATS publish: {}", e)))?
            .await
            .map_err(|e| EngineError::CollaboratorUnavailable(format!("NATS ack: {}", e)))?;

        tracing::debug!(
            subject = %subject,
            kind = %notification.kind,
            "Published notification"
        );
        Ok(())
    }
}
