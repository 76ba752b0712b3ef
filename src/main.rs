use anyhow::Context;
use clap::Parser;
use dexflow::api::{create_router, AppState};
use dexflow::cli::{self, Cli, Commands};
use dexflow::config::AppConfig;
use dexflow::domain::OrderSide;
use dexflow::platform::Engine;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load_from(&cli.config)
        .with_context(|| format!("loading configuration from {}", cli.config))?;

    if let Err(errors) = config.validate() {
        for e in &errors {
            eprintln!("config: {}", e);
        }
        anyhow::bail!("invalid configuration ({} problems)", errors.len());
    }

    match cli.command {
        Some(Commands::Simulate {
            orders,
            pair,
            side,
            amount,
        }) => {
            init_logging_simple();
            let side = OrderSide::try_from(side.as_str()).map_err(anyhow::Error::msg)?;
            run_simulate(&config, orders, &pair, side, amount).await?;
        }
        Some(Commands::Serve { port }) => {
            init_logging(&config.logging.level, cli.json_logs || config.logging.json);
            run_serve(config, port).await?;
        }
        None => {
            init_logging(&config.logging.level, cli.json_logs || config.logging.json);
            run_serve(config, None).await?;
        }
    }

    Ok(())
}

async fn run_serve(config: AppConfig, port: Option<u16>) -> anyhow::Result<()> {
    let engine = Engine::new(&config);
    let pool = engine.spawn_workers();

    let state = AppState::new(
        engine.gate.clone(),
        engine.broadcaster.clone(),
        engine.queue.clone(),
        engine.metrics.clone(),
    );
    let app = create_router(state);

    let addr = format!("{}:{}", config.server.host, port.unwrap_or(config.server.port));
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    info!("Listening on {}", addr);

    let metrics = engine.metrics.clone();
    let status_task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(60));
        ticker.tick().await;
        loop {
            ticker.tick().await;
            metrics.log_status();
        }
    });

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("Server error: {}", e);
    }

    info!("Shutting down: closing admission and draining workers");
    engine.queue.close().await;
    pool.shutdown().await;
    status_task.abort();
    info!("Final queue state: {}", engine.queue.stats().await);

    Ok(())
}

async fn run_simulate(
    config: &AppConfig,
    orders: usize,
    pair: &str,
    side: OrderSide,
    amount: rust_decimal::Decimal,
) -> anyhow::Result<()> {
    let engine = Engine::new(config);
    let pool = engine.spawn_workers();

    println!(
        "Simulating {} {} orders on {} with {} worker slots",
        orders, side, pair, config.pipeline.concurrency
    );
    let outcomes = cli::run_simulation(&engine, orders, pair, side, amount).await?;

    pool.shutdown().await;
    cli::print_summary(&outcomes);
    println!("{}", engine.queue.stats().await);

    Ok(())
}

fn init_logging(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},dexflow=debug,tower_http=warn", level)));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn init_logging_simple() {
    // Keep the simulation table readable
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .try_init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => error!("Failed to install SIGTERM handler: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
