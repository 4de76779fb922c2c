// Event types and structures
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    /// Topic, e.g. `mod_glossary.auto_synced`
    pub topic: String,
    /// Site the event belongs to; subscribers filter on it
    pub site_id: String,
    pub data: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl Event {
    pub fn new(topic: &str, site_id: &str, data: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            topic: topic.to_string(),
            site_id: site_id.to_string(),
            data,
            timestamp: Utc::now(),
        }
    }
}
