use anyhow::{Context, Result};
use clap::Parser;
use grotto_agent::batcher::collect_reports;
use grotto_agent::config::{AgentConfig, DEFAULT_CONFIG_PATH};
use grotto_agent::context::{resolve_hostname, AgentContext};
use grotto_agent::pipeline;
use grotto_agent::sender::{LibratoSender, MetricSink};
use std::ffi::OsString;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "grotto", about = "Ships per-CPU utilization gauges to Librato")]
struct Args {
    /// The config file (`-conf <PATH>` is accepted as well)
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    conf: PathBuf,
}

/// Rewrites the single-dash `-conf` spelling to `--conf` so older
/// invocations keep working.
fn legacy_args(args: impl IntoIterator<Item = OsString>) -> Vec<OsString> {
    args.into_iter()
        .map(|arg| {
            let rewritten = match arg.to_str() {
                Some("-conf") => Some(OsString::from("--conf")),
                Some(s) if s.starts_with("-conf=") => Some(OsString::from(format!("-{s}"))),
                _ => None,
            };
            rewritten.unwrap_or(arg)
        })
        .collect()
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("grotto=info".parse()?))
        .init();

    let args = Args::parse_from(legacy_args(std::env::args_os()));

    let config = AgentConfig::load(&args.conf).context("Could not read config file")?;
    let hostname = resolve_hostname().context("Could not read hostname")?;
    let ctx = AgentContext::new(config, hostname);
    tracing::info!(host = %ctx.hostname, url = %ctx.config.librato.url, "grotto starting");

    let sink: Arc<dyn MetricSink> = Arc::new(LibratoSender::from_config(&ctx.config)?);
    let (report_tx, report_rx) = mpsc::unbounded_channel();
    let reporter = tokio::spawn(collect_reports(report_rx));

    let shutdown = CancellationToken::new();
    let running = pipeline::start(&ctx, sink, Some(report_tx), shutdown.clone());

    signal::ctrl_c().await?;
    tracing::info!("Shutting down gracefully");
    shutdown.cancel();
    running.join().await;

    let tally = reporter.await?;
    tracing::info!(
        delivered_payloads = tally.delivered_payloads,
        delivered_metrics = tally.delivered_metrics,
        failed_payloads = tally.failed_payloads,
        dropped_metrics = tally.dropped_metrics,
        "grotto stopped"
    );
    Ok(())
}
