//! Host telemetry agent: samples per-CPU counters, batches the derived
//! gauges into time windows and posts each batch to a Librato-compatible
//! collector.

pub mod batcher;
pub mod config;
pub mod context;
pub mod error;
pub mod pipeline;
pub mod sampler;
pub mod sender;
