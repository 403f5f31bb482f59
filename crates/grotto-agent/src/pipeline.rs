use crate::batcher::{Batcher, DeliveryReport};
use crate::context::AgentContext;
use crate::sampler::Sampler;
use crate::sender::MetricSink;
use grotto_collector::cpu::CpuCollector;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Handles to the running sampler and batcher tasks.
pub struct Pipeline {
    sampler: JoinHandle<()>,
    batcher: JoinHandle<()>,
}

/// Wires sampler -> metric channel -> batcher -> `sink` and spawns both
/// loops. Both stop once `shutdown` is cancelled.
pub fn start(
    ctx: &AgentContext,
    sink: Arc<dyn MetricSink>,
    reports: Option<mpsc::UnboundedSender<DeliveryReport>>,
    shutdown: CancellationToken,
) -> Pipeline {
    let (tx, rx) = mpsc::unbounded_channel();

    let sampler = Sampler::new(ctx.config.sample_period(), ctx.hostname.as_str())
        .with_collector(Box::new(CpuCollector::with_path(ctx.config.stat_path())));

    let mut batcher = Batcher::new(ctx.config.flush_period(), sink, ctx.config.max_in_flight());
    if let Some(reports) = reports {
        batcher = batcher.with_reports(reports);
    }

    Pipeline {
        sampler: tokio::spawn(sampler.run(tx, shutdown.clone())),
        batcher: tokio::spawn(batcher.run(rx, shutdown)),
    }
}

impl Pipeline {
    /// Waits for both loops to finish, including outstanding deliveries.
    pub async fn join(self) {
        if let Err(e) = self.sampler.await {
            tracing::error!(error = %e, "Sampler task panicked");
        }
        if let Err(e) = self.batcher.await {
            tracing::error!(error = %e, "Batcher task panicked");
        }
    }
}
