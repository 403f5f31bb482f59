use grotto_collector::Collector;
use grotto_common::types::Metric;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

pub const DEFAULT_PERIOD: Duration = Duration::from_secs(1);

/// Longest accepted sampling period; larger values are capped.
pub const MAX_PERIOD: Duration = Duration::from_secs(86_400);

/// Drives the registered collectors on a fixed period and forwards their
/// metrics, in order, onto the metric channel.
pub struct Sampler {
    collectors: Vec<Box<dyn Collector>>,
    period: Duration,
    source: String,
}

impl Sampler {
    pub fn new(period: Duration, source: impl Into<String>) -> Self {
        let period = if period.is_zero() {
            DEFAULT_PERIOD
        } else {
            period.min(MAX_PERIOD)
        };
        Self {
            collectors: Vec::new(),
            period,
            source: source.into(),
        }
    }

    pub fn with_collector(mut self, collector: Box<dyn Collector>) -> Self {
        self.collectors.push(collector);
        self
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Runs one cycle over every collector. A collector that fails loses only
    /// its own cycle.
    pub fn sample_once(&mut self) -> Vec<Metric> {
        let mut all = Vec::new();
        for collector in &mut self.collectors {
            match collector.collect(&self.source) {
                Ok(metrics) => all.extend(metrics),
                Err(e) => {
                    tracing::warn!(collector = collector.name(), error = %e, "Could not get stats")
                }
            }
        }
        all
    }

    /// Samples until `shutdown` is cancelled or the receiving side of the
    /// metric channel is gone.
    pub async fn run(mut self, metrics: mpsc::UnboundedSender<Metric>, shutdown: CancellationToken) {
        tracing::info!(
            period_secs = self.period.as_secs_f64(),
            collectors = self.collectors.len(),
            source = %self.source,
            "Sampler started"
        );

        let mut tick = interval(self.period);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tick.tick() => {
                    let batch = self.sample_once();
                    tracing::debug!(count = batch.len(), "Sampled metrics");
                    for metric in batch {
                        if metrics.send(metric).is_err() {
                            tracing::warn!("Metric channel closed, stopping sampler");
                            return;
                        }
                    }
                }
            }
        }

        tracing::info!("Sampler stopped");
    }
}
