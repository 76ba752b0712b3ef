//! Execution platform: admission, job queue, worker pool and lifecycle passes

mod admission;
mod engine;
mod executor;
pub mod queue;
mod worker;

pub use admission::{Admission, AdmissionGate};
pub use engine::Engine;
pub use executor::{Confirmation, OrderExecutor};
pub use queue::{
    EnqueueOptions, FailOutcome, InMemoryJobQueue, Job, JobQueue, JobRef, JobSnapshot,
    JobState, LeaseToken, QueueStats, RetryPolicy,
};
pub use worker::{PoolHandle, WorkerPool};
