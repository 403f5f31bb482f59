use std::path::PathBuf;

/// Errors raised while loading the agent configuration. All of them are
/// fatal at startup.
///
/// # Examples
///
/// ```rust
/// use grotto_agent::error::ConfigError;
///
/// let err = ConfigError::MissingField("Missing Url for Librato");
/// assert!(err.to_string().contains("Url"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("Config: failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The file is not valid JSON for the expected schema.
    #[error("Config: invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The file is not valid TOML for the expected schema.
    #[error("Config: invalid TOML: {0}")]
    Toml(#[from] toml::de::Error),

    /// A required field is missing or empty.
    #[error("Config: {0}")]
    MissingField(&'static str),
}

/// Reasons a payload was not delivered. Delivery is never retried, so each of
/// these means the payload's metrics are lost.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    /// The payload could not be encoded.
    #[error("Delivery: serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Transport failure, including request timeouts.
    #[error("Delivery: HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The collector answered with a status code of 300 or above.
    #[error("Delivery: {sink} responded with {status}: {body}")]
    Status {
        sink: String,
        status: u16,
        body: String,
    },

    /// Too many deliveries were already outstanding; the payload was dropped
    /// without a request being made.
    #[error("Delivery: {in_flight} deliveries already in flight, payload dropped")]
    Saturated { in_flight: usize },
}

impl DeliveryError {
    /// HTTP status returned by the collector, when there was a response.
    pub fn status(&self) -> Option<u16> {
        match self {
            DeliveryError::Status { status, .. } => Some(*status),
            DeliveryError::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}
