//! Notifications handed to the notifier.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

/// Message delivered to a user through whatever channel the notifier uses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// Category such as `workflow_notification` or `task_assigned`.
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub priority: Priority,
}

impl Notification {
    pub fn new(kind: &str, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.to_string(),
            title: title.into(),
            message: message.into(),
            priority: Priority::Normal,
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }
}
