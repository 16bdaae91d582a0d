//! Load harness for the DarkRift message core.
//!
//! Builds an object cache and a dispatcher owned by the main thread, starts
//! producer threads that push framed player updates through it, and pumps the
//! dispatcher on a fixed tick until the run completes or a shutdown signal
//! arrives.

mod cli;
mod config;
mod signals;
mod workload;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use darkrift::{Dispatcher, DispatcherError, ObjectCache};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::cli::CliArgs;
use crate::config::{AppConfig, LoggingSettings};
use crate::workload::Workload;

/// Initialize logging
fn setup_logging(config: &LoggingSettings) {
    let log_level = config.level.as_str();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if config.json_format {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_file(false)
                    .with_line_number(false)
                    .with_thread_ids(true)
                    .with_thread_names(true),
            )
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_file(false)
                    .with_line_number(false)
                    .with_thread_ids(true)
                    .with_thread_names(true),
            )
            .init();
    }

    info!("🔧 Logging initialized with level: {}", log_level);
}

/// Runs every queued handler and logs any that failed.
fn pump(dispatcher: &Dispatcher) -> usize {
    match dispatcher.execute_dispatcher_tasks() {
        Ok(executed) => executed,
        Err(DispatcherError::TaskFailed { source, failed }) => {
            warn!("⚠️ {} handler(s) failed this tick, first: {}", failed, source);
            0
        }
        Err(e) => {
            error!("❌ Dispatcher error: {}", e);
            0
        }
    }
}

fn log_cache_statistics(cache: &ObjectCache) {
    let stats = cache.statistics();
    info!("📊 Cache statistics:");
    for tier in &stats.memory {
        info!(
            "  🧱 {:<11} {:>5}B  hit rate {:>5.1}%  idle {}/{}",
            tier.name,
            tier.block_size,
            tier.stats.hit_rate() * 100.0,
            tier.stats.available,
            tier.stats.capacity
        );
    }
    info!(
        "  🗃️ message buffers  hit rate {:>5.1}%  idle {}/{}",
        stats.message_buffers.hit_rate() * 100.0,
        stats.message_buffers.available,
        stats.message_buffers.capacity
    );
    info!(
        "  🧵 dispatcher tasks hit rate {:>5.1}%  idle {}/{}",
        stats.action_dispatcher_tasks.hit_rate() * 100.0,
        stats.action_dispatcher_tasks.available,
        stats.action_dispatcher_tasks.capacity
    );
}

async fn run(config: AppConfig) -> anyhow::Result<()> {
    let cache = ObjectCache::new(config.cache.clone()).context("invalid cache settings")?;

    let dispatcher = if config.dispatcher.invoke_directly {
        Dispatcher::direct(&cache)
    } else {
        Dispatcher::new(&cache)
    };
    let dispatcher = Arc::new(dispatcher.report_failures(config.dispatcher.report_failures));

    info!("📋 Configuration Summary:");
    info!("  🚚 Producers: {}", config.workload.producer_threads);
    info!("  ✉️ Messages per producer: {}", config.workload.messages_per_producer);
    info!("  ⏱️ Tick interval: {}ms", config.workload.tick_interval_ms);
    info!("  🧵 Direct dispatch: {}", config.dispatcher.invoke_directly);

    let workload = Workload::start(&config.workload, &cache, dispatcher.clone())?;

    let mut interval =
        tokio::time::interval(Duration::from_millis(config.workload.tick_interval_ms));
    let shutdown = signals::wait_for_shutdown();
    tokio::pin!(shutdown);

    info!("✅ Harness is running, press Ctrl+C to stop early");

    let mut ticks = 0u64;
    loop {
        tokio::select! {
            _ = interval.tick() => {
                // Checked before pumping so the last messages are drained below
                let finished = workload.is_finished();
                pump(&dispatcher);
                ticks += 1;
                if ticks % 250 == 0 {
                    info!(
                        "📈 {} sent | {} handled | {} queued",
                        workload.sent(),
                        workload.handled(),
                        dispatcher.count()
                    );
                }
                if finished {
                    break;
                }
            }
            received = &mut shutdown => {
                info!("📡 Received {}, stopping producers...", received?);
                workload.stop();
                break;
            }
        }
    }

    // Producers may still be finishing a message after a stop request
    while !workload.is_finished() {
        pump(&dispatcher);
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    pump(&dispatcher);

    let report = workload.join()?;
    info!("🏁 Run complete after {} ticks", ticks);
    info!(
        "  ✉️ {} sent | {} handled | {} pings | {} bytes framed",
        report.sent, report.handled, report.pings, report.framed_bytes
    );
    info!(
        "  ⚡ {:.0} messages/s over {:.2}s",
        report.messages_per_second(),
        report.elapsed.as_secs_f64()
    );
    if report.handled != report.sent {
        warn!("⚠️ {} messages were not handled", report.sent.saturating_sub(report.handled));
    }

    log_cache_statistics(&cache);
    Ok(())
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();

    let mut config = AppConfig::load_from_file(&args.config_path).await?;
    config.apply_cli(&args);
    if let Err(e) = config.validate() {
        anyhow::bail!("Configuration validation failed: {}", e);
    }

    setup_logging(&config.logging);
    info!("🚀 DarkRift Harness v{}", env!("CARGO_PKG_VERSION"));
    info!("📂 Config: {}", args.config_path.display());

    if let Err(e) = run(config).await {
        error!("❌ Harness error: {:?}", e);
        std::process::exit(1);
    }

    info!("👋 Harness shutdown complete");
    Ok(())
}
