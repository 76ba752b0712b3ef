use serde::{Deserialize, Serialize};

use crate::domain::REQUIRED_FIELDS;
use crate::error::ValidationError;
use crate::platform::{Admission, QueueStats};
use crate::services::{BroadcasterStats, MetricsSnapshot};

// ============================================================================
// Order Types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderAccepted {
    pub order_id: String,
    pub job_id: String,
    pub deduplicated: bool,
}

impl From<Admission> for OrderAccepted {
    fn from(a: Admission) -> Self {
        Self {
            order_id: a.order_id,
            job_id: a.job_id,
            deduplicated: a.deduplicated,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub missing: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub invalid: Vec<String>,
}

impl ErrorResponse {
    pub fn message(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            required: Vec::new(),
            missing: Vec::new(),
            invalid: Vec::new(),
        }
    }

    pub fn validation(err: &ValidationError) -> Self {
        Self {
            error: if err.missing.is_empty() {
                "Invalid order".to_string()
            } else {
                "Missing required fields".to_string()
            },
            required: REQUIRED_FIELDS.iter().map(|f| f.to_string()).collect(),
            missing: err.missing.iter().map(|f| f.to_string()).collect(),
            invalid: err.invalid.clone(),
        }
    }
}

// ============================================================================
// System Types
// ============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub uptime_secs: i64,
    pub in_flight: usize,
    pub queued: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    pub pipeline: MetricsSnapshot,
    pub queue: QueueStats,
    pub broadcaster: BroadcasterStats,
}

// ============================================================================
// WebSocket Types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeQuery {
    pub order_id: Option<String>,
}

/// Control frames sent alongside lifecycle events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WsMessage {
    #[serde(rename_all = "camelCase")]
    Connected { order_id: String },
}
