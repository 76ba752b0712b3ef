//! Job Queue - admission queue contract and in-process implementation
//!
//! The pipeline only relies on [`JobQueue`]: idempotent enqueue keyed by
//! order id, leased claims, ack, and fail with exponential-backoff retries.

use async_trait::async_trait;
use serde::Serialize;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::time::{timeout, Instant};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::QueueConfig;
use crate::domain::Order;
use crate::error::QueueError;

/// Default number of completed/failed records kept for deduplication
pub const DEFAULT_RETAIN_TERMINAL: usize = 10_000;

/// Attempt budget and exponential retry spacing for a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Delay before the first retry; doubles on each further failure
    pub backoff_base_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base_ms: 2000,
        }
    }
}

impl From<&QueueConfig> for RetryPolicy {
    fn from(config: &QueueConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            backoff_base_ms: config.backoff_base_ms,
        }
    }
}

impl RetryPolicy {
    /// `base * 2^(attempts_made - 1)`, given how many attempts have failed so far
    pub fn delay_for(&self, attempts_made: u32) -> Duration {
        let exp = attempts_made.saturating_sub(1).min(32);
        let factor = 2u64.saturating_pow(exp);
        Duration::from_millis(self.backoff_base_ms.saturating_mul(factor))
    }
}

/// Per-enqueue options
#[derive(Debug, Clone)]
pub struct EnqueueOptions {
    /// Duplicate enqueues with the same key collapse onto one job
    pub idempotency_key: String,
    pub retry: RetryPolicy,
}

impl EnqueueOptions {
    pub fn for_order(order: &Order, retry: RetryPolicy) -> Self {
        Self {
            idempotency_key: order.id.clone(),
            retry,
        }
    }
}

/// Reference returned by enqueue
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRef {
    pub job_id: String,
    /// True when the enqueue was absorbed by an existing job
    pub deduplicated: bool,
}

/// Proof that the caller holds the claim on a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LeaseToken(Uuid);

impl LeaseToken {
    fn issue() -> Self {
        Self(Uuid::new_v4())
    }
}

/// A claimed job. Only the holder of `lease` may ack or fail it.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: String,
    pub order: Order,
    /// Attempts finished before this one
    pub attempts_made: u32,
    pub max_attempts: u32,
    lease: LeaseToken,
}

impl Job {
    /// 1-based number of the attempt this claim represents
    pub fn attempt(&self) -> u32 {
        self.attempts_made + 1
    }

    pub fn is_last_attempt(&self) -> bool {
        self.attempt() >= self.max_attempts
    }

    pub fn lease(&self) -> LeaseToken {
        self.lease
    }
}

/// Result of reporting a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailOutcome {
    /// Another pass will run as `attempt` after `delay`
    RetryScheduled { attempt: u32, delay: Duration },
    /// No attempts left; the job is terminally failed
    Exhausted { attempts: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Waiting,
    Delayed,
    Active,
    Completed,
    Failed,
}

/// Read-only view of a job's bookkeeping
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSnapshot {
    pub id: String,
    pub state: JobState,
    pub attempts_made: u32,
    pub max_attempts: u32,
    pub failed_reason: Option<String>,
    /// Error message of every failed attempt, oldest first
    pub attempt_errors: Vec<String>,
    /// Backoff applied before each retry, oldest first
    pub backoff_delays_ms: Vec<u64>,
    pub order: Order,
}

/// The queue contract the pipeline and admission gate depend on
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Add a job, or return the existing one for the same idempotency key
    async fn enqueue(&self, order: Order, options: EnqueueOptions) -> Result<JobRef, QueueError>;

    /// Lease the next ready job, if any
    async fn claim_next(&self) -> Result<Option<Job>, QueueError>;

    /// Mark a leased job completed
    async fn ack(&self, job: &Job) -> Result<(), QueueError>;

    /// Record a failed attempt and schedule a retry or give up
    async fn fail(&self, job: &Job, error: &str) -> Result<FailOutcome, QueueError>;

    /// Park until work may be ready or `max_wait` elapses
    async fn wait_for_work(&self, max_wait: Duration);
}

struct JobRecord {
    order: Order,
    state: JobState,
    retry: RetryPolicy,
    attempts_made: u32,
    lease: Option<LeaseToken>,
    attempt_errors: Vec<String>,
    backoff_delays: Vec<Duration>,
}

impl JobRecord {
    fn snapshot(&self, id: &str) -> JobSnapshot {
        JobSnapshot {
            id: id.to_string(),
            state: self.state,
            attempts_made: self.attempts_made,
            max_attempts: self.retry.max_attempts,
            failed_reason: if self.state == JobState::Failed {
                self.attempt_errors.last().cloned()
            } else {
                None
            },
            attempt_errors: self.attempt_errors.clone(),
            backoff_delays_ms: self
                .backoff_delays
                .iter()
                .map(|d| d.as_millis() as u64)
                .collect(),
            order: self.order.clone(),
        }
    }
}

/// Number of records in each state, kept in step with every transition
#[derive(Debug, Default, Clone, Copy)]
struct StateCounts {
    waiting: usize,
    delayed: usize,
    active: usize,
    completed: usize,
    failed: usize,
}

impl StateCounts {
    fn slot(&mut self, state: JobState) -> &mut usize {
        match state {
            JobState::Waiting => &mut self.waiting,
            JobState::Delayed => &mut self.delayed,
            JobState::Active => &mut self.active,
            JobState::Completed => &mut self.completed,
            JobState::Failed => &mut self.failed,
        }
    }

    fn added(&mut self, state: JobState) {
        *self.slot(state) += 1;
    }

    fn removed(&mut self, state: JobState) {
        let slot = self.slot(state);
        *slot = slot.saturating_sub(1);
    }

    fn moved(&mut self, from: JobState, to: JobState) {
        self.removed(from);
        self.added(to);
    }

    /// Jobs not yet completed or failed
    fn live(&self) -> usize {
        self.waiting + self.delayed + self.active
    }
}

#[derive(Default)]
struct QueueState {
    jobs: HashMap<String, JobRecord>,
    waiting: VecDeque<String>,
    /// (ready_at, sequence, job id); sequence keeps equal deadlines FIFO
    delayed: BinaryHeap<Reverse<(Instant, u64, String)>>,
    /// Terminal job ids, oldest first
    terminal: VecDeque<String>,
    counts: StateCounts,
    sequence: u64,
    closed: bool,
    enqueued_total: u64,
    deduplicated_total: u64,
    evicted_total: u64,
}

impl QueueState {
    fn promote_due(&mut self, now: Instant) {
        while let Some(Reverse((ready_at, _, _))) = self.delayed.peek() {
            if *ready_at > now {
                break;
            }
            if let Some(Reverse((_, _, id))) = self.delayed.pop() {
                if let Some(record) = self.jobs.get_mut(&id) {
                    if record.state == JobState::Delayed {
                        record.state = JobState::Waiting;
                        self.counts.moved(JobState::Delayed, JobState::Waiting);
                        self.waiting.push_back(id);
                    }
                }
            }
        }
    }

    /// Track a job that just reached a terminal state and drop the oldest
    /// terminal records beyond `retain`. Dropped ids can be admitted again.
    fn retire(&mut self, id: String, retain: usize) {
        self.terminal.push_back(id);
        while self.terminal.len() > retain {
            let Some(oldest) = self.terminal.pop_front() else {
                break;
            };
            if let Some(record) = self.jobs.remove(&oldest) {
                self.counts.removed(record.state);
                self.evicted_total += 1;
                debug!("Evicted terminal job {}", oldest);
            }
        }
    }

    fn next_due(&self) -> Option<Instant> {
        self.delayed.peek().map(|Reverse((at, _, _))| *at)
    }

    fn leased_record(&mut self, job: &Job) -> Result<&mut JobRecord, QueueError> {
        let record = self
            .jobs
            .get_mut(&job.id)
            .ok_or_else(|| QueueError::UnknownJob(job.id.clone()))?;
        if record.state != JobState::Active || record.lease != Some(job.lease) {
            return Err(QueueError::LeaseMismatch {
                job_id: job.id.clone(),
            });
        }
        Ok(record)
    }
}

/// Queue statistics
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStats {
    pub waiting: usize,
    pub delayed: usize,
    pub active: usize,
    pub completed: usize,
    pub failed: usize,
    pub capacity: usize,
    pub enqueued_total: u64,
    pub deduplicated_total: u64,
    /// Terminal records dropped by the retention bound
    pub evicted_total: u64,
}

impl std::fmt::Display for QueueStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Queue[wait={}, delayed={}, active={}, done={}, failed={}, cap={}, enq={}, dedup={}, evicted={}]",
            self.waiting,
            self.delayed,
            self.active,
            self.completed,
            self.failed,
            self.capacity,
            self.enqueued_total,
            self.deduplicated_total,
            self.evicted_total
        )
    }
}

/// In-process [`JobQueue`].
///
/// Keeps up to `retain_terminal` completed/failed jobs so their ids stay
/// deduplicated. Older terminal records are evicted first, after which the
/// same id is admitted as a new job.
pub struct InMemoryJobQueue {
    state: Mutex<QueueState>,
    notify: Notify,
    capacity: usize,
    retain_terminal: usize,
}

impl InMemoryJobQueue {
    /// `capacity` bounds jobs that are not yet completed or failed
    pub fn new(capacity: usize) -> Self {
        Self::with_retention(capacity, DEFAULT_RETAIN_TERMINAL)
    }

    pub fn with_retention(capacity: usize, retain_terminal: usize) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
            capacity: capacity.max(1),
            retain_terminal,
        }
    }

    pub fn from_config(config: &QueueConfig) -> Self {
        Self::with_retention(config.capacity, config.retain_terminal)
    }

    /// Refuse further enqueues. Already admitted jobs can still be claimed.
    pub async fn close(&self) {
        self.state.lock().await.closed = true;
        self.notify.notify_waiters();
    }

    pub async fn job(&self, id: &str) -> Option<JobSnapshot> {
        let state = self.state.lock().await;
        state.jobs.get(id).map(|r| r.snapshot(id))
    }

    pub async fn stats(&self) -> QueueStats {
        let state = self.state.lock().await;
        let counts = state.counts;
        QueueStats {
            waiting: counts.waiting,
            delayed: counts.delayed,
            active: counts.active,
            completed: counts.completed,
            failed: counts.failed,
            capacity: self.capacity,
            enqueued_total: state.enqueued_total,
            deduplicated_total: state.deduplicated_total,
            evicted_total: state.evicted_total,
        }
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn enqueue(&self, order: Order, options: EnqueueOptions) -> Result<JobRef, QueueError> {
        let mut state = self.state.lock().await;

        if state.closed {
            return Err(QueueError::Unavailable);
        }

        let key = options.idempotency_key;
        if state.jobs.contains_key(&key) {
            state.deduplicated_total += 1;
            debug!("Enqueue of {} absorbed by existing job", key);
            return Ok(JobRef {
                job_id: key,
                deduplicated: true,
            });
        }

        if state.counts.live() >= self.capacity {
            return Err(QueueError::Full {
                capacity: self.capacity,
            });
        }

        state.jobs.insert(
            key.clone(),
            JobRecord {
                order,
                state: JobState::Waiting,
                retry: options.retry,
                attempts_made: 0,
                lease: None,
                attempt_errors: Vec::new(),
                backoff_delays: Vec::new(),
            },
        );
        state.counts.added(JobState::Waiting);
        state.waiting.push_back(key.clone());
        state.enqueued_total += 1;
        drop(state);

        self.notify.notify_one();
        Ok(JobRef {
            job_id: key,
            deduplicated: false,
        })
    }

    async fn claim_next(&self) -> Result<Option<Job>, QueueError> {
        let mut state = self.state.lock().await;
        state.promote_due(Instant::now());

        while let Some(id) = state.waiting.pop_front() {
            let Some(record) = state.jobs.get_mut(&id) else {
                continue;
            };
            if record.state != JobState::Waiting {
                continue;
            }

            let lease = LeaseToken::issue();
            record.state = JobState::Active;
            record.lease = Some(lease);
            let job = Job {
                id,
                order: record.order.clone(),
                attempts_made: record.attempts_made,
                max_attempts: record.retry.max_attempts,
                lease,
            };
            state.counts.moved(JobState::Waiting, JobState::Active);

            return Ok(Some(job));
        }

        Ok(None)
    }

    async fn ack(&self, job: &Job) -> Result<(), QueueError> {
        let mut state = self.state.lock().await;
        let record = state.leased_record(job)?;
        record.attempts_made += 1;
        record.state = JobState::Completed;
        record.lease = None;
        state.counts.moved(JobState::Active, JobState::Completed);
        state.retire(job.id.clone(), self.retain_terminal);
        Ok(())
    }

    async fn fail(&self, job: &Job, error: &str) -> Result<FailOutcome, QueueError> {
        let mut state = self.state.lock().await;
        let record = state.leased_record(job)?;

        record.attempts_made += 1;
        record.lease = None;
        record.attempt_errors.push(error.to_string());

        if record.attempts_made >= record.retry.max_attempts {
            record.state = JobState::Failed;
            let attempts = record.attempts_made;
            warn!(
                "Job {} failed permanently after {} attempts: {}",
                job.id, attempts, error
            );
            state.counts.moved(JobState::Active, JobState::Failed);
            state.retire(job.id.clone(), self.retain_terminal);
            return Ok(FailOutcome::Exhausted { attempts });
        }

        let delay = record.retry.delay_for(record.attempts_made);
        let attempt = record.attempts_made + 1;
        record.state = JobState::Delayed;
        record.backoff_delays.push(delay);
        state.counts.moved(JobState::Active, JobState::Delayed);

        let sequence = state.sequence;
        state.sequence += 1;
        state
            .delayed
            .push(Reverse((Instant::now() + delay, sequence, job.id.clone())));
        drop(state);

        // Wake the dispatcher so it re-arms its wait against the new deadline
        self.notify.notify_one();
        Ok(FailOutcome::RetryScheduled { attempt, delay })
    }

    async fn wait_for_work(&self, max_wait: Duration) {
        let wait = {
            let state = self.state.lock().await;
            if !state.waiting.is_empty() {
                return;
            }
            match state.next_due() {
                Some(due) => due.saturating_duration_since(Instant::now()).min(max_wait),
                None => max_wait,
            }
        };
        let _ = timeout(wait, self.notify.notified()).await;
    }
}
