use chrono::{DateTime, FixedOffset, Utc};
use env_logger::Builder;
use log::LevelFilter;
use pairsignal::backtest::Backtest;
use pairsignal::config::PairSignalConfig;
use std::env;
use std::io::Write;
use std::str::FromStr;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging with local timezone
    let offset_seconds = env::var("TIMEZONE_OFFSET")
        .unwrap_or_else(|_| "3600".to_string())
        .parse::<i32>()
        .map_err(|e| anyhow::anyhow!("Invalid TIMEZONE_OFFSET: {}", e))?;
    let offset = FixedOffset::east_opt(offset_seconds)
        .ok_or_else(|| anyhow::anyhow!("Invalid offset: {}", offset_seconds))?;
    Builder::from_default_env()
        .format(move |buf, record| {
            let utc_now: DateTime<Utc> = Utc::now();
            let local_now = utc_now.with_timezone(&offset);
            writeln!(
                buf,
                "{} [{}] - {}",
                local_now.format("%Y-%m-%dT%H:%M:%S%z"),
                record.level(),
                record.args()
            )
        })
        .filter(
            None,
            LevelFilter::from_str(&env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()))
                .unwrap_or(LevelFilter::Info),
        )
        .init();

    let git_hash = option_env!("PAIRSIGNAL_GIT_HASH").unwrap_or("unknown");
    log::info!("pairsignal git: {}", git_hash);
    let cfg = PairSignalConfig::from_env_or_yaml()?;
    log::info!("[CONFIG] {:?}", cfg);

    let mut backtest = Backtest::from_config(&cfg)?;
    let summary = backtest.run().await?;
    log::info!(
        "[SUMMARY] ticks={} missing={} warmup={} entries={} exits={} fills={} cancels={} calibrations={} intent={:?} equity={:?}",
        summary.ticks,
        summary.missing,
        summary.warmup,
        summary.entries,
        summary.exits,
        summary.fills,
        summary.cancels,
        summary.calibrations.len(),
        summary.final_intent,
        summary.equity
    );
    Ok(())
}
