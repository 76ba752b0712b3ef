//! Admission Gate - validates orders and hands them to the job queue
//!
//! Returns as soon as the job is durably queued; execution happens later on
//! the worker pool. Shape problems and queue problems are reported apart.

use std::sync::Arc;
use tracing::{debug, info, warn};

use super::queue::{EnqueueOptions, JobQueue, RetryPolicy};
use crate::domain::{Order, OrderDraft};
use crate::error::{DexflowError, Result};
use crate::services::Metrics;

/// Receipt for an accepted order
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Admission {
    pub order_id: String,
    pub job_id: String,
    /// The order id was already known; no new job was created
    pub deduplicated: bool,
}

pub struct AdmissionGate {
    queue: Arc<dyn JobQueue>,
    retry: RetryPolicy,
    metrics: Arc<Metrics>,
}

impl AdmissionGate {
    pub fn new(queue: Arc<dyn JobQueue>, retry: RetryPolicy, metrics: Arc<Metrics>) -> Self {
        Self {
            queue,
            retry,
            metrics,
        }
    }

    /// Validate a raw order and enqueue it.
    ///
    /// Fails with [`DexflowError::Validation`] for a malformed order and with
    /// [`DexflowError::Admission`] when the queue refuses the job.
    pub async fn submit(&self, draft: OrderDraft) -> Result<Admission> {
        let order = draft.validate().map_err(|e| {
            debug!("Rejected order: {}", e);
            DexflowError::Validation(e)
        })?;
        self.enqueue(order).await
    }

    /// Enqueue an already typed order, re-checking its shape first
    pub async fn submit_order(&self, order: Order) -> Result<Admission> {
        self.submit(OrderDraft::from(order)).await
    }

    async fn enqueue(&self, order: Order) -> Result<Admission> {
        let order_id = order.id.clone();
        let options = EnqueueOptions::for_order(&order, self.retry);

        let job = self.queue.enqueue(order, options).await.map_err(|e| {
            warn!("Queue refused order {}: {}", order_id, e);
            DexflowError::Admission(e.to_string())
        })?;

        self.metrics.inc_admitted(job.deduplicated);
        if job.deduplicated {
            info!("Order {} already admitted as job {}", order_id, job.job_id);
        } else {
            info!("Order {} admitted as job {}", order_id, job.job_id);
        }

        Ok(Admission {
            order_id,
            job_id: job.job_id,
            deduplicated: job.deduplicated,
        })
    }
}
