//! Inspection appointments created by scheduling steps.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Inspection {
    pub id: Uuid,
    pub case_id: Uuid,
    pub execution_id: Uuid,
    pub inspection_type: String,
    pub scheduled_for: DateTime<Utc>,
    /// `None` when no inspector was free; dispatch assigns one later.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inspector_id: Option<Uuid>,
    pub status: String,
    pub created_at: DateTime<Utc>,
}
