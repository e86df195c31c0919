use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A live relay session holding one slot of a MAC
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OccupancyRecord {
    pub portal_id: String,
    pub mac: String,
    pub channel_id: String,
    pub client: String,
    pub channel_name: String,
    pub start_time: DateTime<Utc>,
}
