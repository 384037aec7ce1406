//! Case records.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A case (permit application, grant request, ...) being processed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseRecord {
    pub id: Uuid,
    /// Human-facing reference such as `PRM-2024-0113`.
    pub reference: String,
    pub case_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub status: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// User who owns (submitted) the case.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<Uuid>,
    /// Type-specific data, e.g. `estimated_value` or `square_footage`.
    #[serde(default)]
    pub fields: HashMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CaseRecord {
    /// Create a case in `submitted` status.
    pub fn new(reference: &str, case_type: &str, title: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            reference: reference.to_string(),
            case_type: case_type.to_string(),
            category: None,
            status: "submitted".to_string(),
            title: title.to_string(),
            description: String::new(),
            owner_id: None,
            fields: HashMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Look up a numeric value in `fields`. Numeric strings are accepted.
    pub fn numeric_field(&self, name: &str) -> Option<f64> {
        match self.fields.get(name)? {
            serde_json::Value::Number(n) => n.as_f64(),
            serde_json::Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Text handed to the AI advisor for review and classification.
    pub fn descriptive_text(&self) -> String {
        let mut text = format!("Type: {}\nTitle: {}", self.case_type, self.title);
        if let Some(category) = &self.category {
            text.push_str(&format!("\nCategory: {}", category));
        }
        if !self.description.is_empty() {
            text.push_str(&format!("\nDescription: {}", self.description));
        }
        text
    }

    /// Apply an update in place.
    pub fn apply(&mut self, update: &CaseUpdate) {
        if let Some(status) = &update.status {
            self.status = status.clone();
        }
        if let Some(category) = &update.category {
            self.category = Some(category.clone());
        }
        self.updated_at = Utc::now();
    }
}

/// Partial update written back to the case store by step handlers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CaseUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl CaseUpdate {
    pub fn status(status: &str) -> Self {
        Self {
            status: Some(status.to_string()),
            ..Default::default()
        }
    }

    pub fn category(category: &str) -> Self {
        Self {
            category: Some(category.to_string()),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_numeric_field_accepts_strings() {
        let mut case = CaseRecord::new("PRM-1", "building_permit", "Garage");
        case.fields.insert("square_footage".to_string(), json!(420));
        case.fields.insert("estimated_value".to_string(), json!("15000.50"));
        case.fields.insert("zone".to_string(), json!("R1"));

        assert_eq!(case.numeric_field("square_footage"), Some(420.0));
        assert_eq!(case.numeric_field("estimated_value"), Some(15000.5));
        assert_eq!(case.numeric_field("zone"), None);
        assert_eq!(case.numeric_field("missing"), None);
    }

    #[test]
    fn test_apply_update() {
        let mut case = CaseRecord::new("PRM-2", "building_permit", "Deck");
        case.apply(&CaseUpdate::status("under_review"));
        assert_eq!(case.status, "under_review");
        assert!(case.category.is_none());

        case.apply(&CaseUpdate::category("residential"));
        assert_eq!(case.status, "under_review");
        assert_eq!(case.category.as_deref(), Some("residential"));
    }

    #[test]
    fn test_descriptive_text() {
        let mut case = CaseRecord::new("PRM-3", "event_permit", "Street fair");
        case.description = "Closing Main St for a day".to_string();
        let text = case.descriptive_text();
        assert!(text.contains("Type: event_permit"));
        assert!(text.contains("Description: Closing Main St"));
        assert!(!text.contains("Category"));
    }
}
