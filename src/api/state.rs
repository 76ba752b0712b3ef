use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::platform::{AdmissionGate, InMemoryJobQueue};
use crate::services::{LifecycleBroadcaster, Metrics};

/// Shared application state for API handlers
#[derive(Clone)]
pub struct AppState {
    /// Validates and enqueues incoming orders
    pub gate: Arc<AdmissionGate>,

    /// Per-order lifecycle fan-out
    pub broadcaster: Arc<LifecycleBroadcaster>,

    pub queue: Arc<InMemoryJobQueue>,

    pub metrics: Arc<Metrics>,

    /// Application start time
    pub start_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        gate: Arc<AdmissionGate>,
        broadcaster: Arc<LifecycleBroadcaster>,
        queue: Arc<InMemoryJobQueue>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            gate,
            broadcaster,
            queue,
            metrics,
            start_time: Utc::now(),
        }
    }

    pub fn uptime_seconds(&self) -> i64 {
        (Utc::now() - self.start_time).num_seconds()
    }
}
