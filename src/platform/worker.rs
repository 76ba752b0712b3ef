//! Worker Pool - bounded-concurrency consumer of the job queue
//!
//! A slot is reserved before a job is claimed, so no more than `concurrency`
//! lifecycle passes are ever in flight and excess jobs stay in the queue.

use std::sync::Arc;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::executor::OrderExecutor;
use super::queue::{FailOutcome, Job, JobQueue};
use crate::config::{PipelineConfig, MAX_CONCURRENCY};
use crate::error::DexflowError;
use crate::services::Metrics;

pub struct WorkerPool {
    queue: Arc<dyn JobQueue>,
    executor: Arc<OrderExecutor>,
    metrics: Arc<Metrics>,
    config: PipelineConfig,
    slots: Arc<Semaphore>,
    concurrency: usize,
}

/// Control handle for a running pool. Dropping it also stops the pool.
pub struct PoolHandle {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl PoolHandle {
    /// Stop claiming new jobs and wait for in-flight passes to finish
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.task.await {
            error!("Worker pool task ended abnormally: {}", e);
        }
    }
}

impl WorkerPool {
    pub fn new(
        queue: Arc<dyn JobQueue>,
        executor: Arc<OrderExecutor>,
        metrics: Arc<Metrics>,
        config: PipelineConfig,
    ) -> Self {
        let concurrency = config.concurrency.clamp(1, MAX_CONCURRENCY);
        if concurrency != config.concurrency {
            warn!(
                "pipeline.concurrency {} out of range, using {}",
                config.concurrency, concurrency
            );
        }
        Self {
            queue,
            executor,
            metrics,
            config,
            slots: Arc::new(Semaphore::new(concurrency)),
            concurrency,
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Spawn the dispatch loop
    pub fn start(self) -> PoolHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(self.run(shutdown_rx));
        PoolHandle { shutdown_tx, task }
    }

    /// Dispatch until shutdown is signalled, then drain in-flight passes
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!("Worker pool started with {} slots", self.concurrency);

        loop {
            if *shutdown.borrow() {
                break;
            }

            let permit = tokio::select! {
                permit = self.slots.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
                _ = shutdown.changed() => break,
            };

            let Some(job) = self.next_job(&mut shutdown).await else {
                break;
            };

            let queue = self.queue.clone();
            let executor = self.executor.clone();
            let metrics = self.metrics.clone();
            tokio::spawn(async move {
                let _permit = permit;
                process_job(queue, executor, metrics, job).await;
            });
        }

        info!("Worker pool stopping, waiting for in-flight passes");
        match u32::try_from(self.concurrency) {
            Ok(slots) => {
                if let Ok(all) = self.slots.acquire_many(slots).await {
                    drop(all);
                }
            }
            Err(_) => warn!("Cannot drain {} slots at once", self.concurrency),
        }
        info!("Worker pool stopped");
    }

    /// Claim the next job, parking on the queue while it is empty
    async fn next_job(&self, shutdown: &mut watch::Receiver<bool>) -> Option<Job> {
        loop {
            match self.queue.claim_next().await {
                Ok(Some(job)) => return Some(job),
                Ok(None) => {}
                Err(e) => warn!("Failed to claim job: {}", e),
            }

            tokio::select! {
                _ = self.queue.wait_for_work(self.config.poll_interval()) => {}
                _ = shutdown.changed() => return None,
            }
        }
    }
}

async fn process_job(
    queue: Arc<dyn JobQueue>,
    executor: Arc<OrderExecutor>,
    metrics: Arc<Metrics>,
    job: Job,
) {
    let _in_flight = metrics.enter_pass();
    debug!("Processing job {} (attempt {}/{})", job.id, job.attempt(), job.max_attempts);

    match executor.execute(&job).await {
        Ok(confirmation) => {
            metrics.inc_confirmed();
            if let Err(e) = queue.ack(&job).await {
                error!("Failed to ack job {}: {}", confirmation.order_id, e);
            }
        }
        Err(e) => {
            metrics.inc_failed();
            match queue.fail(&job, &e.to_string()).await {
                Ok(FailOutcome::RetryScheduled { attempt, delay }) => {
                    metrics.inc_retry_scheduled();
                    warn!(
                        "Order {} attempt {} failed: {}. Retrying as attempt {} in {:?}",
                        job.id,
                        job.attempt(),
                        e,
                        attempt,
                        delay
                    );
                }
                Ok(FailOutcome::Exhausted { attempts }) => {
                    metrics.inc_exhausted();
                    let exhausted = DexflowError::ExhaustedRetries {
                        order_id: job.id.clone(),
                        attempts,
                    };
                    error!("{}: {}", exhausted, e);
                }
                Err(qe) => error!("Failed to report failure of job {}: {}", job.id, qe),
            }
        }
    }
}
