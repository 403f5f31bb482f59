//! Time-windowed batching of metric events.
//!
//! The batcher owns exactly one open [`Payload`]. Every window it detaches
//! that payload, opens a fresh one, and hands the detached payload to a
//! [`MetricSink`] on its own task. It never waits on a delivery.

use crate::error::DeliveryError;
use crate::sender::MetricSink;
use grotto_common::types::{Metric, Payload};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

pub const DEFAULT_WINDOW: Duration = Duration::from_secs(5);

/// Longest accepted window; larger values are capped.
pub const MAX_WINDOW: Duration = Duration::from_secs(86_400);

/// Outcome of one flush.
#[derive(Debug)]
pub struct DeliveryReport {
    pub sink: String,
    pub metrics: usize,
    pub result: Result<(), DeliveryError>,
}

impl DeliveryReport {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

pub struct Batcher {
    window: Duration,
    sink: Arc<dyn MetricSink>,
    permits: Arc<Semaphore>,
    max_in_flight: usize,
    tracker: TaskTracker,
    reports: Option<mpsc::UnboundedSender<DeliveryReport>>,
}

impl Batcher {
    /// Creates a batcher flushing every `window` into `sink`, with at most
    /// `max_in_flight` deliveries outstanding. A zero window falls back to
    /// [`DEFAULT_WINDOW`] and anything above [`MAX_WINDOW`] is capped.
    pub fn new(window: Duration, sink: Arc<dyn MetricSink>, max_in_flight: usize) -> Self {
        let window = if window.is_zero() {
            DEFAULT_WINDOW
        } else {
            window.min(MAX_WINDOW)
        };
        let max_in_flight = max_in_flight.max(1);
        Self {
            window,
            sink,
            permits: Arc::new(Semaphore::new(max_in_flight)),
            max_in_flight,
            tracker: TaskTracker::new(),
            reports: None,
        }
    }

    /// Publishes a [`DeliveryReport`] for every flush on `reports`.
    pub fn with_reports(mut self, reports: mpsc::UnboundedSender<DeliveryReport>) -> Self {
        self.reports = Some(reports);
        self
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    fn next_deadline(&self) -> Instant {
        let now = Instant::now();
        now.checked_add(self.window)
            .or_else(|| now.checked_add(MAX_WINDOW))
            .unwrap_or(now)
    }

    /// Runs until every metric sender is dropped. Cancelling `shutdown` only
    /// marks the batcher as stopping: metrics keep being accepted until the
    /// producers hang up, so nothing sent before they exit is lost. The open
    /// payload is then flushed one last time (if non-empty) and all
    /// outstanding deliveries are joined before returning.
    pub async fn run(self, mut metrics: mpsc::UnboundedReceiver<Metric>, shutdown: CancellationToken) {
        tracing::info!(
            window_secs = self.window.as_secs_f64(),
            max_in_flight = self.max_in_flight,
            sink = self.sink.name(),
            "Batcher started"
        );

        let mut payload = Payload::new();
        let deadline = sleep_until(self.next_deadline());
        tokio::pin!(deadline);
        let mut stopping = false;

        loop {
            tokio::select! {
                _ = shutdown.cancelled(), if !stopping => {
                    tracing::debug!("Shutdown requested, draining metric channel");
                    stopping = true;
                }
                received = metrics.recv() => match received {
                    Some(metric) => payload.push(metric),
                    None => {
                        tracing::debug!("Metric channel closed");
                        break;
                    }
                },
                () = &mut deadline => {
                    let detached = std::mem::take(&mut payload);
                    deadline.as_mut().reset(self.next_deadline());
                    self.dispatch(detached);
                }
            }
        }

        if !payload.is_empty() {
            self.dispatch(payload);
        }

        self.tracker.close();
        tracing::debug!(outstanding = self.tracker.len(), "Waiting for deliveries");
        self.tracker.wait().await;
        tracing::info!("Batcher stopped");
    }

    fn dispatch(&self, payload: Payload) {
        let count = payload.len();
        tracing::info!(count, sink = self.sink.name(), "Sending metrics");

        let Ok(permit) = self.permits.clone().try_acquire_owned() else {
            let err = DeliveryError::Saturated {
                in_flight: self.max_in_flight,
            };
            tracing::error!(count, error = %err, "Could not send payload");
            self.report(self.sink.name(), count, Err(err));
            return;
        };

        let sink = self.sink.clone();
        let reports = self.reports.clone();
        self.tracker.spawn(async move {
            let result = sink.deliver(&payload).await;
            drop(permit);
            if let Err(e) = &result {
                tracing::error!(count, sink = sink.name(), error = %e, "Could not send payload");
            }
            if let Some(reports) = reports {
                let _ = reports.send(DeliveryReport {
                    sink: sink.name().to_string(),
                    metrics: count,
                    result,
                });
            }
        });
    }

    fn report(&self, sink: &str, metrics: usize, result: Result<(), DeliveryError>) {
        if let Some(reports) = &self.reports {
            let _ = reports.send(DeliveryReport {
                sink: sink.to_string(),
                metrics,
                result,
            });
        }
    }
}

/// Running totals of delivery outcomes.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryTally {
    pub delivered_payloads: u64,
    pub delivered_metrics: u64,
    pub failed_payloads: u64,
    pub dropped_metrics: u64,
}

impl DeliveryTally {
    pub fn record(&mut self, report: &DeliveryReport) {
        match &report.result {
            Ok(()) => {
                self.delivered_payloads += 1;
                self.delivered_metrics += report.metrics as u64;
            }
            Err(_) => {
                self.failed_payloads += 1;
                self.dropped_metrics += report.metrics as u64;
            }
        }
    }
}

/// Consumes delivery reports until every producer is gone and returns the
/// totals.
pub async fn collect_reports(mut reports: mpsc::UnboundedReceiver<DeliveryReport>) -> DeliveryTally {
    let mut tally = DeliveryTally::default();
    while let Some(report) = reports.recv().await {
        tally.record(&report);
        if let Err(e) = &report.result {
            tracing::debug!(
                sink = %report.sink,
                status = ?e.status(),
                failed = tally.failed_payloads,
                "Delivery failure recorded"
            );
        }
    }
    tally
}
