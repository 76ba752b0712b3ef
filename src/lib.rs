pub mod api;
pub mod cli;
pub mod config;
pub mod domain;
pub mod error;
pub mod platform;
pub mod routing;
pub mod services;

pub use config::AppConfig;
pub use domain::{LifecycleEvent, LifecycleStatus, Order, OrderDraft, OrderSide};
pub use error::{DexflowError, QueueError, Result, ValidationError};
pub use platform::{
    Admission, AdmissionGate, Engine, InMemoryJobQueue, JobQueue, OrderExecutor, PoolHandle,
    RetryPolicy, WorkerPool,
};
pub use routing::{Quote, QuoteRouter, QuoteSource, Venue};
pub use services::{EventSink, LifecycleBroadcaster, Metrics};
