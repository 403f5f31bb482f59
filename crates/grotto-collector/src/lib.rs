//! Metric collection framework for the grotto agent.
//!
//! Each [`Collector`] implementation reads a category of host counters and
//! turns them into [`Metric`]s ready to be batched and shipped.

pub mod cpu;
pub mod error;

use grotto_common::types::Metric;

pub use error::{CollectError, Result};

/// A host metric collector driven by the agent's sampling loop.
///
/// Collectors keep whatever state they need between cycles (for example a
/// baseline of cumulative counters), so `collect` takes `&mut self`.
pub trait Collector: Send {
    /// Returns the collector name (e.g., `"cpu"`), used for logging.
    fn name(&self) -> &str;

    /// Collects one cycle of metrics, tagging each with `source`.
    ///
    /// # Errors
    ///
    /// Returns an error if the counter source cannot be read or parsed. The
    /// whole cycle is abandoned in that case and nothing is emitted.
    fn collect(&mut self, source: &str) -> Result<Vec<Metric>>;
}
