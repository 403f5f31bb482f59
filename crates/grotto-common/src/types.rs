use serde::{Deserialize, Serialize};

/// A one-off reading sent to the collector.
///
/// # Examples
///
/// ```
/// use grotto_common::types::Gauge;
///
/// let gauge = Gauge::new("cpu0-usage", 1_700_000_000, 0.25).with_source("web-01");
/// assert_eq!(gauge.name, "cpu0-usage");
/// assert_eq!(gauge.source.as_deref(), Some("web-01"));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gauge {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Epoch seconds
    pub measure_time: i64,
    pub value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl Gauge {
    pub fn new(name: impl Into<String>, measure_time: i64, value: f64) -> Self {
        Self {
            name: name.into(),
            description: None,
            display_name: None,
            measure_time,
            value,
            source: None,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

/// A metric event carried from the sampler to the batcher.
#[derive(Debug, Clone, PartialEq)]
pub enum Metric {
    Gauge(Gauge),
}

impl Metric {
    pub fn name(&self) -> &str {
        match self {
            Metric::Gauge(g) => &g.name,
        }
    }
}

impl From<Gauge> for Metric {
    fn from(gauge: Gauge) -> Self {
        Metric::Gauge(gauge)
    }
}

/// The request body accumulated over one batching window.
///
/// Serializes to `{"gauges": [...]}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    #[serde(default)]
    pub gauges: Vec<Gauge>,
}

impl Payload {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, metric: Metric) {
        match metric {
            Metric::Gauge(g) => self.gauges.push(g),
        }
    }

    pub fn len(&self) -> usize {
        self.gauges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
