//! Engine - wires queue, router, broadcaster, executor and admission together

use std::sync::Arc;
use tracing::info;

use super::admission::AdmissionGate;
use super::executor::OrderExecutor;
use super::queue::{InMemoryJobQueue, JobQueue, RetryPolicy};
use super::worker::{PoolHandle, WorkerPool};
use crate::config::{AppConfig, PipelineConfig};
use crate::routing::{QuoteRouter, QuoteSource, RandomSource, StdRandom};
use crate::services::{EventSink, LifecycleBroadcaster, Metrics};

/// Shared components of one running execution engine
pub struct Engine {
    pub queue: Arc<InMemoryJobQueue>,
    pub broadcaster: Arc<LifecycleBroadcaster>,
    pub metrics: Arc<Metrics>,
    pub gate: Arc<AdmissionGate>,
    executor: Arc<OrderExecutor>,
    pipeline: PipelineConfig,
}

impl Engine {
    /// Build with the simulated router and an entropy-seeded random source
    pub fn new(config: &AppConfig) -> Self {
        let rng: Arc<dyn RandomSource> = Arc::new(StdRandom::from_entropy());
        let router = Arc::new(QuoteRouter::new(config.router.clone(), rng.clone()));
        Self::with_parts(config, router, rng)
    }

    /// Build around a caller-supplied quote source and random source
    pub fn with_parts(
        config: &AppConfig,
        quotes: Arc<dyn QuoteSource>,
        rng: Arc<dyn RandomSource>,
    ) -> Self {
        let queue = Arc::new(InMemoryJobQueue::from_config(&config.queue));
        let broadcaster = Arc::new(LifecycleBroadcaster::new());
        let metrics = Arc::new(Metrics::new());

        let sink: Arc<dyn EventSink> = broadcaster.clone();
        let executor = Arc::new(OrderExecutor::new(
            quotes,
            sink,
            rng,
            config.pipeline.clone(),
        ));

        let dyn_queue: Arc<dyn JobQueue> = queue.clone();
        let gate = Arc::new(AdmissionGate::new(
            dyn_queue,
            RetryPolicy::from(&config.queue),
            metrics.clone(),
        ));

        Self {
            queue,
            broadcaster,
            metrics,
            gate,
            executor,
            pipeline: config.pipeline.clone(),
        }
    }

    /// Start consuming the queue with `pipeline.concurrency` slots
    pub fn spawn_workers(&self) -> PoolHandle {
        let queue: Arc<dyn JobQueue> = self.queue.clone();
        let pool = WorkerPool::new(
            queue,
            self.executor.clone(),
            self.metrics.clone(),
            self.pipeline.clone(),
        );
        info!("Spawning worker pool ({} slots)", pool.concurrency());
        pool.start()
    }
}
