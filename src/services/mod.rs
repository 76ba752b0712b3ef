pub mod broadcaster;
pub mod metrics;

pub use broadcaster::{
    BroadcasterStats, EventChannel, EventSink, LifecycleBroadcaster, SubscriptionId,
};
pub use metrics::{InFlightGuard, Metrics, MetricsSnapshot};
