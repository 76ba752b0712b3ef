//! Order Executor - one lifecycle pass for a claimed job
//!
//! pending -> routing -> building -> submitted -> confirmed, or failed from
//! any non-terminal step. Build and settlement are simulated with delays.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tokio::time::sleep;
use tracing::{debug, info, info_span, warn, Instrument};

use super::queue::Job;
use crate::config::PipelineConfig;
use crate::domain::{LifecycleEvent, LifecycleStatus, LifecycleTracker};
use crate::error::{DexflowError, Result};
use crate::routing::{select_best, QuoteSource, RandomSource, Venue};
use crate::services::EventSink;

/// Outcome of a confirmed pass
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Confirmation {
    pub order_id: String,
    pub venue: Venue,
    pub price: Decimal,
    pub tx_hash: String,
}

pub struct OrderExecutor {
    quotes: Arc<dyn QuoteSource>,
    sink: Arc<dyn EventSink>,
    rng: Arc<dyn RandomSource>,
    config: PipelineConfig,
}

impl OrderExecutor {
    pub fn new(
        quotes: Arc<dyn QuoteSource>,
        sink: Arc<dyn EventSink>,
        rng: Arc<dyn RandomSource>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            quotes,
            sink,
            rng,
            config,
        }
    }

    /// Run one pass. On error the `failed` event has already been published,
    /// so the caller only has to report the failure to the queue.
    pub async fn execute(&self, job: &Job) -> Result<Confirmation> {
        let span = info_span!("lifecycle", order_id = %job.id, attempt = job.attempt());
        async {
            let mut tracker = LifecycleTracker::new();
            match self.run_pass(job, &mut tracker).await {
                Ok(confirmation) => Ok(confirmation),
                Err(e) => {
                    let will_retry = !job.is_last_attempt();
                    warn!(
                        "Pass failed at {:?}: {} (will_retry={})",
                        tracker.current(),
                        e,
                        will_retry
                    );
                    let event = LifecycleEvent::new(&job.id, LifecycleStatus::Failed)
                        .with_detail("error", e.to_string())
                        .with_detail("attempt", job.attempt())
                        .with_detail("willRetry", will_retry);
                    // Only a confirmed pass refuses failed, and it cannot error after that
                    if tracker.advance(LifecycleStatus::Failed).is_ok() {
                        self.sink.publish(event);
                    }
                    Err(e)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn run_pass(&self, job: &Job, tracker: &mut LifecycleTracker) -> Result<Confirmation> {
        let order = &job.order;

        self.emit(tracker, LifecycleEvent::new(&order.id, LifecycleStatus::Pending))?;
        self.emit(tracker, LifecycleEvent::new(&order.id, LifecycleStatus::Routing))?;

        let quotes = self
            .quotes
            .quote(&order.pair, order.amount)
            .await
            .map_err(|e| match e {
                DexflowError::Routing(_) => e,
                other => DexflowError::Routing(other.to_string()),
            })?;

        let best = select_best(&quotes, order.side)
            .cloned()
            .ok_or_else(|| DexflowError::Routing(format!("no venue quoted {}", order.pair)))?;

        debug!(
            "Selected {} at {} from {} quotes",
            best.venue,
            best.price,
            quotes.len()
        );

        self.emit(
            tracker,
            LifecycleEvent::new(&order.id, LifecycleStatus::Building)
                .with_detail("selectedVenue", best.venue.as_str())
                .with_detail("price", decimal_value(best.price)),
        )?;
        sleep(self.config.build_delay()).await;

        self.emit(tracker, LifecycleEvent::new(&order.id, LifecycleStatus::Submitted))?;
        sleep(self.config.settlement_delay()).await;

        let tx_hash = self.rng.token();
        self.emit(
            tracker,
            LifecycleEvent::new(&order.id, LifecycleStatus::Confirmed)
                .with_detail("syntheticTxId", tx_hash.clone())
                .with_detail("price", decimal_value(best.price))
                .with_detail("venue", best.venue.as_str()),
        )?;

        info!(
            "Order {} confirmed on {} at {} ({} {})",
            order.id, best.venue, best.price, order.side, order.amount
        );

        Ok(Confirmation {
            order_id: order.id.clone(),
            venue: best.venue,
            price: best.price,
            tx_hash,
        })
    }

    fn emit(&self, tracker: &mut LifecycleTracker, event: LifecycleEvent) -> Result<()> {
        tracker.advance(event.status)?;
        self.sink.publish(event);
        Ok(())
    }
}

fn decimal_value(value: Decimal) -> serde_json::Value {
    value
        .to_f64()
        .map(serde_json::Value::from)
        .unwrap_or_else(|| serde_json::Value::String(value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Order, OrderSide};
    use crate::platform::queue::{EnqueueOptions, InMemoryJobQueue, JobQueue, RetryPolicy};
    use crate::routing::{MockQuoteSource, Quote, SequenceRandom};
    use rust_decimal_macros::dec;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<LifecycleEvent>>,
    }

    impl EventSink for Recorder {
        fn publish(&self, event: LifecycleEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

    impl Recorder {
        fn statuses(&self) -> Vec<LifecycleStatus> {
            self.events.lock().unwrap().iter().map(|e| e.status).collect()
        }
    }

    fn fast_config() -> PipelineConfig {
        PipelineConfig {
            concurrency: 1,
            build_delay_ms: 1,
            settlement_delay_ms: 1,
            poll_interval_ms: 5,
        }
    }

    async fn claimed(side: OrderSide, max_attempts: u32) -> Job {
        let queue = InMemoryJobQueue::new(4);
        let order = Order::new("ord-1", "SOL/USDC", side, dec!(2));
        let policy = RetryPolicy {
            max_attempts,
            ..RetryPolicy::default()
        };
        queue
            .enqueue(order.clone(), EnqueueOptions::for_order(&order, policy))
            .await
            .unwrap();
        queue.claim_next().await.unwrap().unwrap()
    }

    fn executor(quotes: MockQuoteSource, sink: Arc<Recorder>) -> OrderExecutor {
        OrderExecutor::new(
            Arc::new(quotes),
            sink,
            Arc::new(SequenceRandom::midpoint()),
            fast_config(),
        )
    }

    #[tokio::test]
    async fn test_success_emits_full_path_with_details() {
        let mut quotes = MockQuoteSource::new();
        quotes.expect_quote().times(1).returning(|_, _| {
            Ok(vec![
                Quote::new(Venue::Raydium, dec!(150.5), dec!(0.003)),
                Quote::new(Venue::Meteora, dec!(149.8), dec!(0.002)),
            ])
        });
        let sink = Arc::new(Recorder::default());
        let job = claimed(OrderSide::Buy, 3).await;

        let confirmation = executor(quotes, sink.clone()).execute(&job).await.unwrap();

        assert_eq!(confirmation.venue, Venue::Meteora);
        assert_eq!(confirmation.price, dec!(149.8));
        assert_eq!(sink.statuses(), LifecycleStatus::SUCCESS_PATH.to_vec());

        let events = sink.events.lock().unwrap();
        assert_eq!(events[2].detail("selectedVenue").unwrap(), "meteora");
        assert_eq!(events[4].detail("syntheticTxId").unwrap(), confirmation.tx_hash.as_str());
        assert!(events[4].is_final());
    }

    #[tokio::test]
    async fn test_sell_picks_highest_price() {
        let mut quotes = MockQuoteSource::new();
        quotes.expect_quote().returning(|_, _| {
            Ok(vec![
                Quote::new(Venue::Raydium, dec!(150.5), dec!(0.003)),
                Quote::new(Venue::Meteora, dec!(149.8), dec!(0.002)),
            ])
        });
        let sink = Arc::new(Recorder::default());
        let job = claimed(OrderSide::Sell, 3).await;

        let confirmation = executor(quotes, sink).execute(&job).await.unwrap();
        assert_eq!(confirmation.venue, Venue::Raydium);
    }

    #[tokio::test]
    async fn test_router_failure_emits_failed_with_retry_flag() {
        let mut quotes = MockQuoteSource::new();
        quotes
            .expect_quote()
            .returning(|_, _| Err(DexflowError::Internal("venue timeout".into())));
        let sink = Arc::new(Recorder::default());
        let job = claimed(OrderSide::Buy, 3).await;

        let err = executor(quotes, sink.clone()).execute(&job).await.unwrap_err();
        assert!(matches!(err, DexflowError::Routing(_)));

        assert_eq!(
            sink.statuses(),
            vec![
                LifecycleStatus::Pending,
                LifecycleStatus::Routing,
                LifecycleStatus::Failed
            ]
        );
        let events = sink.events.lock().unwrap();
        let failed = events.last().unwrap();
        assert_eq!(failed.detail("attempt").unwrap(), 1);
        assert_eq!(failed.detail("willRetry").unwrap(), true);
        assert!(failed.detail("error").unwrap().as_str().unwrap().contains("venue timeout"));
        assert!(!failed.is_final());
    }

    #[tokio::test]
    async fn test_last_attempt_failure_is_final() {
        let mut quotes = MockQuoteSource::new();
        quotes.expect_quote().returning(|_, _| Ok(Vec::new()));
        let sink = Arc::new(Recorder::default());
        let job = claimed(OrderSide::Buy, 1).await;

        assert!(executor(quotes, sink.clone()).execute(&job).await.is_err());

        let events = sink.events.lock().unwrap();
        let failed = events.last().unwrap();
        assert_eq!(failed.status, LifecycleStatus::Failed);
        assert_eq!(failed.detail("willRetry").unwrap(), false);
        assert!(failed.is_final());
    }
}
