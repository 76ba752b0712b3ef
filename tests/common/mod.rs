#![allow(dead_code)]

use async_trait::async_trait;
use dexflow::config::AppConfig;
use dexflow::domain::{LifecycleEvent, Order, OrderDraft, OrderSide};
use dexflow::error::{DexflowError, Result};
use dexflow::platform::Engine;
use dexflow::routing::{Quote, QuoteSource, SequenceRandom, Venue};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::{timeout, Instant};

/// Quote source with fixed prices that can be told to fail its first calls
pub struct ScriptedQuotes {
    quotes: Vec<Quote>,
    delay: Duration,
    fail_first: usize,
    calls: AtomicUsize,
}

impl ScriptedQuotes {
    pub fn new(delay: Duration) -> Self {
        Self {
            quotes: vec![
                Quote::new(Venue::Raydium, dec!(150.5), dec!(0.003)),
                Quote::new(Venue::Meteora, dec!(149.8), dec!(0.002)),
            ],
            delay,
            fail_first: 0,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing_first(mut self, n: usize) -> Self {
        self.fail_first = n;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QuoteSource for ScriptedQuotes {
    async fn quote(&self, _pair: &str, _amount: Decimal) -> Result<Vec<Quote>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        if call < self.fail_first {
            return Err(DexflowError::Routing(format!("venue timeout on call {}", call + 1)));
        }
        Ok(self.quotes.clone())
    }
}

/// Config with millisecond delays
pub fn fast_config(concurrency: usize, max_attempts: u32, backoff_base_ms: u64) -> AppConfig {
    let mut config = AppConfig::default();
    config.pipeline.concurrency = concurrency;
    config.pipeline.build_delay_ms = 5;
    config.pipeline.settlement_delay_ms = 5;
    config.pipeline.poll_interval_ms = 10;
    config.queue.max_attempts = max_attempts;
    config.queue.backoff_base_ms = backoff_base_ms;
    config
}

pub fn engine(config: &AppConfig, quotes: Arc<ScriptedQuotes>) -> Engine {
    Engine::with_parts(config, quotes, Arc::new(SequenceRandom::midpoint()))
}

pub fn draft(id: &str) -> OrderDraft {
    OrderDraft::from(Order::new(id, "SOL/USDC", OrderSide::Buy, dec!(2)))
}

/// Receive events until one is final, stamping each with its arrival time
pub async fn collect_until_final(
    rx: &mut UnboundedReceiver<LifecycleEvent>,
) -> Vec<(Instant, LifecycleEvent)> {
    let mut events = Vec::new();
    let collected = timeout(Duration::from_secs(10), async {
        while let Some(event) = rx.recv().await {
            let last = event.is_final();
            events.push((Instant::now(), event));
            if last {
                break;
            }
        }
    })
    .await;
    assert!(collected.is_ok(), "timed out waiting for a final event");
    events
}
