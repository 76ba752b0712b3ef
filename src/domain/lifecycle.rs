use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::error::{DexflowError, Result};

/// Order lifecycle states, in emission order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleStatus {
    /// Job claimed by a worker
    Pending,
    /// Fetching venue quotes
    Routing,
    /// Best venue selected, building the transaction
    Building,
    /// Transaction sent, awaiting settlement
    Submitted,
    /// Settled (terminal success)
    Confirmed,
    /// Pass aborted (terminal failure)
    Failed,
}

impl LifecycleStatus {
    /// The full success path of one lifecycle pass.
    pub const SUCCESS_PATH: [LifecycleStatus; 5] = [
        LifecycleStatus::Pending,
        LifecycleStatus::Routing,
        LifecycleStatus::Building,
        LifecycleStatus::Submitted,
        LifecycleStatus::Confirmed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleStatus::Pending => "pending",
            LifecycleStatus::Routing => "routing",
            LifecycleStatus::Building => "building",
            LifecycleStatus::Submitted => "submitted",
            LifecycleStatus::Confirmed => "confirmed",
            LifecycleStatus::Failed => "failed",
        }
    }

    /// Check if this state can transition to another state
    pub fn can_transition_to(&self, target: LifecycleStatus) -> bool {
        use LifecycleStatus::*;

        match (self, target) {
            (Pending, Routing) => true,
            (Routing, Building) => true,
            (Building, Submitted) => true,
            (Submitted, Confirmed) => true,

            // Failure is reachable from any non-terminal state
            (from, Failed) => !from.is_terminal(),

            _ => false,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, LifecycleStatus::Confirmed | LifecycleStatus::Failed)
    }
}

impl fmt::Display for LifecycleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Tracks the position of one lifecycle pass and refuses out-of-order steps.
///
/// A fresh tracker sits in the implicit "claimed" state, from which only
/// `Pending` (or an immediate `Failed`) is accepted.
#[derive(Debug, Default, Clone)]
pub struct LifecycleTracker {
    current: Option<LifecycleStatus>,
}

impl LifecycleTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<LifecycleStatus> {
        self.current
    }

    /// Move to `next`, or fail without changing state.
    pub fn advance(&mut self, next: LifecycleStatus) -> Result<LifecycleStatus> {
        let allowed = match self.current {
            None => matches!(next, LifecycleStatus::Pending | LifecycleStatus::Failed),
            Some(current) => current.can_transition_to(next),
        };

        if !allowed {
            return Err(DexflowError::InvalidTransition {
                from: self
                    .current
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "claimed".to_string()),
                to: next.to_string(),
            });
        }

        self.current = Some(next);
        Ok(next)
    }

    pub fn is_finished(&self) -> bool {
        self.current.map(|s| s.is_terminal()).unwrap_or(false)
    }
}

/// Status update delivered to an order's subscriber
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleEvent {
    pub order_id: String,
    pub status: LifecycleStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Map<String, Value>>,
}

impl LifecycleEvent {
    pub fn new(order_id: impl Into<String>, status: LifecycleStatus) -> Self {
        Self {
            order_id: order_id.into(),
            status,
            details: None,
        }
    }

    /// Attach one key/value pair to the event details
    pub fn with_detail(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.details
            .get_or_insert_with(Map::new)
            .insert(key.to_string(), value.into());
        self
    }

    pub fn detail(&self, key: &str) -> Option<&Value> {
        self.details.as_ref().and_then(|d| d.get(key))
    }

    /// Whether a subscriber will see anything further for this order
    pub fn is_final(&self) -> bool {
        match self.status {
            LifecycleStatus::Confirmed => true,
            LifecycleStatus::Failed => !self
                .detail("willRetry")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            _ => false,
        }
    }
}
