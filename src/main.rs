use anyhow::Result;
use chrono::Local;
use clap::Parser;
use std::sync::Arc;
use tsdb_bench::cli::Args;
use tsdb_bench::config::Config;
use tsdb_bench::report::{render_console, write_csv, write_json};
use tsdb_bench::runner::run_benchmark;

fn init_tracing() -> Result<()> {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tsdb_bench=info".into());
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(true);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing()?;
    let args = Args::parse();

    let mut config = Config::load(args.config.as_deref())?;
    args.apply(&mut config);
    let config = Arc::new(config.prepare()?);

    let summary = run_benchmark(config.clone()).await?;
    println!("{}", render_console(&summary.report, &config));

    if let Some(replication) = summary.replication {
        tracing::info!(
            forwarded = replication.forwarded,
            dropped = replication.dropped,
            failed = replication.failed,
            points = replication.points,
            "secondary backend summary"
        );
    }
    if config.csv_output {
        write_csv(&summary.report, &config, Local::now())?;
    }
    if let Some(path) = &args.json_output {
        write_json(&summary.report, path)?;
        tracing::info!(path = %path.display(), "wrote json report");
    }
    tracing::info!(
        wall_ms = summary.wall_time.as_millis() as u64,
        "benchmark complete"
    );
    Ok(())
}
