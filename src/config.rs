use config::{Config, Environment, File};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use crate::routing::Venue;

/// Upper bound for `pipeline.concurrency`
pub const MAX_CONCURRENCY: usize = 10_000;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub router: RouterConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Simulated venue quoting
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Lower bound of the simulated network delay per quote call
    pub min_delay_ms: u64,
    /// Upper bound of the simulated network delay per quote call
    pub max_delay_ms: u64,
    /// Reference price for pairs not listed in `base_prices`
    pub default_base_price: Decimal,
    /// Reference price per pair (e.g., "SOL/USDC" = 150)
    pub base_prices: HashMap<String, Decimal>,
    /// Venues quoted on every call, in tie-break order
    pub venues: Vec<VenueConfig>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        let mut base_prices = HashMap::new();
        base_prices.insert("SOL/USDC".to_string(), dec!(150));
        Self {
            min_delay_ms: 200,
            max_delay_ms: 500,
            default_base_price: dec!(100),
            base_prices,
            venues: vec![
                VenueConfig {
                    venue: Venue::Raydium,
                    variance: 0.04,
                    fee: dec!(0.003),
                },
                VenueConfig {
                    venue: Venue::Meteora,
                    variance: 0.05,
                    fee: dec!(0.002),
                },
            ],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct VenueConfig {
    pub venue: Venue,
    /// Maximum relative deviation from the base price (0.04 = ±4%)
    pub variance: f64,
    /// Fee fraction charged by the venue (0.003 = 0.3%)
    pub fee: Decimal,
}

/// Worker pool and lifecycle timing
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Maximum lifecycle passes in flight at once
    pub concurrency: usize,
    /// Simulated transaction build time
    pub build_delay_ms: u64,
    /// Simulated settlement time between submit and confirm
    pub settlement_delay_ms: u64,
    /// How long an idle slot waits before re-polling the queue
    pub poll_interval_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            concurrency: 10,
            build_delay_ms: 500,
            settlement_delay_ms: 1000,
            poll_interval_ms: 100,
        }
    }
}

impl PipelineConfig {
    pub fn build_delay(&self) -> Duration {
        Duration::from_millis(self.build_delay_ms)
    }

    pub fn settlement_delay(&self) -> Duration {
        Duration::from_millis(self.settlement_delay_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

/// Admission queue and retry policy
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Jobs held in non-terminal states before enqueue is refused
    pub capacity: usize,
    /// Lifecycle passes per job before it is moved to failed
    pub max_attempts: u32,
    /// First retry delay; doubles per attempt
    pub backoff_base_ms: u64,
    /// Completed/failed jobs kept for deduplication, oldest evicted first
    pub retain_terminal: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: 10_000,
            max_attempts: 3,
            backoff_base_ms: 2000,
            retain_terminal: 10_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> crate::error::Result<Self> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load environment-specific config (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("DEXFLOW_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (DEXFLOW__PIPELINE__CONCURRENCY, etc.)
            .add_source(
                Environment::with_prefix("DEXFLOW")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            );

        Ok(builder.build()?.try_deserialize()?)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.pipeline.concurrency == 0 {
            errors.push("pipeline.concurrency must be at least 1".to_string());
        }
        if self.pipeline.concurrency > MAX_CONCURRENCY {
            errors.push(format!(
                "pipeline.concurrency ({}) exceeds {}",
                self.pipeline.concurrency, MAX_CONCURRENCY
            ));
        }

        if self.router.min_delay_ms > self.router.max_delay_ms {
            errors.push(format!(
                "router.min_delay_ms ({}) exceeds router.max_delay_ms ({})",
                self.router.min_delay_ms, self.router.max_delay_ms
            ));
        }

        if self.router.venues.is_empty() {
            errors.push("router.venues must list at least one venue".to_string());
        }

        if self.router.default_base_price <= Decimal::ZERO {
            errors.push("router.default_base_price must be positive".to_string());
        }

        for venue in &self.router.venues {
            if venue.fee < Decimal::ZERO || venue.fee >= Decimal::ONE {
                errors.push(format!("fee for {} must be in [0, 1)", venue.venue));
            }
            if !(0.0..1.0).contains(&venue.variance) {
                errors.push(format!("variance for {} must be in [0, 1)", venue.venue));
            }
        }

        if self.queue.max_attempts == 0 {
            errors.push("queue.max_attempts must be at least 1".to_string());
        }

        if self.queue.capacity == 0 {
            errors.push("queue.capacity must be at least 1".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
