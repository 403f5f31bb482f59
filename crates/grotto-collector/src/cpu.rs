//! Per-CPU utilization from the kernel's cumulative counters.
//!
//! `/proc/stat` exposes one line per CPU (`cpu` for the aggregate, `cpuN` per
//! logical core) followed by jiffy counters in the order
//! `user nice system idle iowait irq softirq steal guest guest_nice`.
//! Rates are derived by differencing two consecutive samples of the same id.

use crate::error::{CollectError, Result};
use crate::Collector;
use chrono::Utc;
use grotto_common::types::{Gauge, Metric};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub const DEFAULT_STAT_PATH: &str = "/proc/stat";

const CPU_PREFIX: &str = "cpu";

/// One CPU line captured at a point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CpuSample {
    pub id: String,
    pub user: u64,
    pub nice: u64,
    pub system: u64,
    pub idle: u64,
    /// Sum of every counter on the line, including the ones past `idle`.
    pub total: u64,
    /// Epoch seconds
    pub captured_at: i64,
}

impl CpuSample {
    /// Parses a single counter line. Returns `Ok(None)` for lines that do not
    /// describe a CPU.
    ///
    /// # Examples
    ///
    /// ```
    /// use grotto_collector::cpu::CpuSample;
    ///
    /// let sample = CpuSample::parse_line("cpu0 100 10 50 300 4 0 1 0 0 0", 42)
    ///     .unwrap()
    ///     .unwrap();
    /// assert_eq!(sample.id, "cpu0");
    /// assert_eq!(sample.idle, 300);
    /// assert_eq!(sample.total, 465);
    /// ```
    pub fn parse_line(line: &str, captured_at: i64) -> Result<Option<Self>> {
        let mut tokens = line.split_whitespace();
        let Some(id) = tokens.next() else {
            return Ok(None);
        };
        if !id.starts_with(CPU_PREFIX) {
            return Ok(None);
        }

        let mut sample = CpuSample {
            id: id.to_string(),
            user: 0,
            nice: 0,
            system: 0,
            idle: 0,
            total: 0,
            captured_at,
        };

        for (index, token) in tokens.enumerate() {
            let value: u64 = token.parse().map_err(|_| CollectError::Parse {
                token: token.to_string(),
                line: line.to_string(),
            })?;
            match index {
                0 => sample.user = value,
                1 => sample.nice = value,
                2 => sample.system = value,
                3 => sample.idle = value,
                _ => {}
            }
            sample.total = sample.total.saturating_add(value);
        }

        Ok(Some(sample))
    }

    /// Field-wise `self - previous`, stamped with this sample's capture time.
    pub fn delta_since(&self, previous: &CpuSample) -> CpuDelta {
        CpuDelta {
            id: self.id.clone(),
            user: diff(self.user, previous.user),
            nice: diff(self.nice, previous.nice),
            system: diff(self.system, previous.system),
            idle: diff(self.idle, previous.idle),
            total: diff(self.total, previous.total),
            measure_time: self.captured_at,
        }
    }
}

// Signed so that a counter reset shows up as a non-positive total.
fn diff(current: u64, previous: u64) -> i64 {
    current.wrapping_sub(previous) as i64
}

/// Counter movement between two consecutive samples of one CPU.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CpuDelta {
    pub id: String,
    pub user: i64,
    pub nice: i64,
    pub system: i64,
    pub idle: i64,
    pub total: i64,
    pub measure_time: i64,
}

impl CpuDelta {
    fn ratio(&self, part: i64) -> f64 {
        part as f64 / self.total as f64
    }

    pub fn user_ratio(&self) -> f64 {
        self.ratio(self.user)
    }

    pub fn nice_ratio(&self) -> f64 {
        self.ratio(self.nice)
    }

    pub fn system_ratio(&self) -> f64 {
        self.ratio(self.system)
    }

    pub fn idle_ratio(&self) -> f64 {
        self.ratio(self.idle)
    }

    /// Busy share: `(user + nice + system) / total`.
    pub fn usage_ratio(&self) -> f64 {
        self.ratio(self.user + self.nice + self.system)
    }

    /// Builds the five gauges for this delta, in the order user, nice,
    /// system, idle, usage.
    ///
    /// Returns `None` when `total <= 0`, so no NaN or infinite value can be
    /// produced.
    pub fn gauges(&self, source: &str) -> Option<Vec<Gauge>> {
        if self.total <= 0 {
            return None;
        }
        let gauge = |field: &str, value: f64| {
            Gauge::new(format!("{}-{field}", self.id), self.measure_time, value)
                .with_source(source)
        };
        Some(vec![
            gauge("user", self.user_ratio()),
            gauge("nice", self.nice_ratio()),
            gauge("system", self.system_ratio()),
            gauge("idle", self.idle_ratio()),
            gauge("usage", self.usage_ratio()),
        ])
    }
}

/// Parses the full counter file. Any malformed counter fails the whole read.
pub fn parse_stat(content: &str, captured_at: i64) -> Result<Vec<CpuSample>> {
    let mut samples = Vec::new();
    for line in content.lines() {
        if let Some(sample) = CpuSample::parse_line(line, captured_at)? {
            samples.push(sample);
        }
    }
    Ok(samples)
}

/// Emits per-CPU utilization gauges, keeping the last sample of each CPU id
/// as the baseline for the next cycle.
pub struct CpuCollector {
    path: PathBuf,
    baseline: HashMap<String, CpuSample>,
}

impl CpuCollector {
    pub fn new() -> Self {
        Self::with_path(DEFAULT_STAT_PATH)
    }

    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            baseline: HashMap::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of CPU ids that currently have a baseline.
    pub fn baseline_len(&self) -> usize {
        self.baseline.len()
    }

    /// Folds one cycle of samples into the baseline table and returns the
    /// metrics for every id that already had a baseline.
    pub fn observe(&mut self, samples: Vec<CpuSample>, source: &str) -> Vec<Metric> {
        let mut metrics = Vec::new();
        for sample in samples {
            match self.baseline.get(&sample.id) {
                None => {
                    tracing::debug!(cpu = %sample.id, "Baseline established");
                }
                Some(previous) => {
                    let delta = sample.delta_since(previous);
                    match delta.gauges(source) {
                        Some(gauges) => metrics.extend(gauges.into_iter().map(Metric::Gauge)),
                        None => tracing::debug!(
                            cpu = %sample.id,
                            total = delta.total,
                            "Counters did not advance, skipping"
                        ),
                    }
                }
            }
            self.baseline.insert(sample.id.clone(), sample);
        }
        metrics
    }
}

impl Default for CpuCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl Collector for CpuCollector {
    fn name(&self) -> &str {
        "cpu"
    }

    fn collect(&mut self, source: &str) -> Result<Vec<Metric>> {
        let content = std::fs::read_to_string(&self.path).map_err(|e| CollectError::Read {
            path: self.path.clone(),
            source: e,
        })?;
        let samples = parse_stat(&content, Utc::now().timestamp())?;
        Ok(self.observe(samples, source))
    }
}
