use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use loadline::{
    ConfigError, Error, Reporter, Scenario, SinkError, SystemClock,
    config::{Args, Output, RunConfig},
    http,
    report::{CsvReporter, StdoutReporter},
};
use tracing_subscriber::{EnvFilter, fmt};

fn main() {
    let args = Args::parse();
    if let Err(err) = run(args) {
        eprintln!("error: {err:#}");
        std::process::exit(exit_code(&err));
    }
}

/// 2 for bad settings, 3 when the output could not be written, 1 otherwise.
fn exit_code(err: &anyhow::Error) -> i32 {
    for cause in err.chain() {
        if cause.downcast_ref::<ConfigError>().is_some() {
            return 2;
        }
        if cause.downcast_ref::<SinkError>().is_some() {
            return 3;
        }
        if let Some(e) = cause.downcast_ref::<Error>() {
            return match e {
                Error::Config(_) => 2,
                Error::Sink(_) => 3,
                Error::Client(_) => 1,
            };
        }
    }
    1
}

fn run(args: Args) -> Result<()> {
    // RUST_LOG takes precedence over --log-level
    let filter = match std::env::var("RUST_LOG") {
        Ok(directives) if !directives.is_empty() => EnvFilter::try_new(&directives)
            .with_context(|| format!("invalid RUST_LOG: {directives}"))?,
        _ => EnvFilter::try_new(&args.log_level)
            .with_context(|| format!("invalid log level: {}", args.log_level))?,
    };
    // Rows may go to stdout, so logs always go to stderr
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let config = args.into_config()?;

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("building tokio runtime")?;

    rt.block_on(execute(config))
}

async fn execute(config: RunConfig) -> Result<()> {
    let client = http::client(config.pool.request_timeout).map_err(Error::Client)?;

    let mut reporter: Box<dyn Reporter> = match &config.output {
        Output::File(path) => {
            let csv = CsvReporter::create(path)?;
            tracing::info!(path = %csv.path().display(), "writing rows");
            Box::new(csv)
        }
        Output::Stdout => Box::new(StdoutReporter::new()?),
    };

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        workers = config.pool.workers,
        target_rps = config.pool.target_rps,
        targets = config.targets.len(),
        warmup = ?config.warmup,
        run_secs = config.run_secs,
        output = ?config.output,
        "starting loadline"
    );

    let scenario = Scenario::builder()
        .targets(Arc::new(config.targets))
        .action(http::action(client))
        .pool(config.pool)
        .warmup(config.warmup)
        .run_secs(config.run_secs)
        .poll_interval(config.poll_interval)
        .clock(SystemClock)
        .build();

    tokio::select! {
        summary = scenario.run(reporter.as_mut()) => {
            let summary = summary?;
            tracing::info!(
                summary = %serde_json::to_string(&summary).unwrap_or_default(),
                "done"
            );
        }
        _ = tokio::signal::ctrl_c() => {
            // Rows already written were flushed one by one
            tracing::warn!("interrupted, output holds every second completed so far");
        }
    }

    Ok(())
}
