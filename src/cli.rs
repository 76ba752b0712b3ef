use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use std::time::Instant;
use tokio::task::JoinSet;
use uuid::Uuid;

use crate::domain::{LifecycleStatus, OrderDraft, OrderSide};
use crate::error::Result;
use crate::platform::Engine;

#[derive(Parser)]
#[command(name = "dexflow")]
#[command(version = "0.1.0")]
#[command(about = "Simulated DEX order execution engine", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Directory holding default.toml and environment overrides
    #[arg(short, long, default_value = "config", env = "DEXFLOW_CONFIG_DIR")]
    pub config: String,

    /// Emit JSON log lines
    #[arg(long)]
    pub json_logs: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP/WebSocket server and worker pool
    Serve {
        /// Override server.port
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Submit a burst of orders in-process and print their lifecycles
    Simulate {
        /// Number of orders to submit
        #[arg(short, long, default_value = "5")]
        orders: usize,
        /// Trading pair
        #[arg(short, long, default_value = "SOL/USDC")]
        pair: String,
        /// buy or sell
        #[arg(short, long, default_value = "buy")]
        side: String,
        /// Amount per order
        #[arg(short, long, default_value = "1")]
        amount: Decimal,
    },
}

/// Summary of one simulated order
#[derive(Debug, Clone)]
pub struct SimulatedOutcome {
    pub order_id: String,
    pub final_status: Option<LifecycleStatus>,
    pub events: usize,
}

/// Submit `orders` orders through `engine` and follow each to a final event.
///
/// The engine's workers must already be running.
pub async fn run_simulation(
    engine: &Engine,
    orders: usize,
    pair: &str,
    side: OrderSide,
    amount: Decimal,
) -> Result<Vec<SimulatedOutcome>> {
    let started = Instant::now();
    let mut followers = JoinSet::new();

    for i in 0..orders {
        let order_id = format!("sim-{}-{}", i + 1, &Uuid::new_v4().simple().to_string()[..8]);

        // Subscribe first so the pending event cannot be missed
        let (_, mut rx) = engine.broadcaster.channel(&order_id);

        let admission = engine
            .gate
            .submit(OrderDraft {
                id: Some(order_id.clone()),
                user_id: Some("simulator".to_string()),
                pair: Some(pair.to_string()),
                side: Some(side.to_string()),
                amount: Some(amount),
                timestamp: Some(chrono::Utc::now()),
            })
            .await?;
        println!("  queued {} as job {}", admission.order_id, admission.job_id);

        followers.spawn(async move {
            let mut outcome = SimulatedOutcome {
                order_id: order_id.clone(),
                final_status: None,
                events: 0,
            };
            while let Some(event) = rx.recv().await {
                outcome.events += 1;
                let details = event
                    .details
                    .as_ref()
                    .map(|d| serde_json::Value::Object(d.clone()).to_string())
                    .unwrap_or_default();
                println!(
                    "  [{:>7.3}s] {:<20} {:<10} {}",
                    started.elapsed().as_secs_f64(),
                    event.order_id,
                    event.status,
                    details
                );
                if event.is_final() {
                    outcome.final_status = Some(event.status);
                    break;
                }
            }
            outcome
        });
    }

    let mut outcomes = Vec::with_capacity(orders);
    while let Some(joined) = followers.join_next().await {
        match joined {
            Ok(outcome) => outcomes.push(outcome),
            Err(e) => tracing::error!("Simulation follower panicked: {}", e),
        }
    }
    outcomes.sort_by(|a, b| a.order_id.cmp(&b.order_id));
    Ok(outcomes)
}

/// Print the end-of-run table
pub fn print_summary(outcomes: &[SimulatedOutcome]) {
    let confirmed = outcomes
        .iter()
        .filter(|o| o.final_status == Some(LifecycleStatus::Confirmed))
        .count();

    println!();
    println!("{:<22} {:<10} {:>6}", "ORDER", "RESULT", "EVENTS");
    for o in outcomes {
        let result = o
            .final_status
            .map(|s| s.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        println!("{:<22} {:<10} {:>6}", o.order_id, result, o.events);
    }
    println!();
    println!("{}/{} orders confirmed", confirmed, outcomes.len());
}
