//! Payload delivery.
//!
//! A [`MetricSink`] makes exactly one attempt per payload. There is no retry
//! and no queue: a failed payload is reported and dropped.

use crate::config::AgentConfig;
use crate::error::DeliveryError;
use async_trait::async_trait;
use grotto_common::types::Payload;
use reqwest::header::CONTENT_TYPE;
use std::time::Duration;

/// Longest response body kept in a [`DeliveryError::Status`].
pub const MAX_BODY_LENGTH: usize = 512;

/// A destination for batched metrics.
#[async_trait]
pub trait MetricSink: Send + Sync {
    /// Delivers one payload, making a single attempt.
    ///
    /// # Errors
    ///
    /// Returns an error on serialization failure, transport failure, or a
    /// response status of 300 or above.
    async fn deliver(&self, payload: &Payload) -> Result<(), DeliveryError>;

    /// Returns the sink name, used in logs and delivery reports.
    fn name(&self) -> &str;
}

/// Posts payloads to a Librato-compatible metrics endpoint using HTTP Basic
/// authentication.
pub struct LibratoSender {
    client: reqwest::Client,
    url: String,
    email: String,
    token: String,
}

impl LibratoSender {
    pub fn new(
        url: impl Into<String>,
        email: impl Into<String>,
        token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, DeliveryError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
            email: email.into(),
            token: token.into(),
        })
    }

    pub fn from_config(config: &AgentConfig) -> Result<Self, DeliveryError> {
        Self::new(
            config.librato.url.as_str(),
            config.librato.email.as_str(),
            config.librato.token.as_str(),
            config.request_timeout(),
        )
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl MetricSink for LibratoSender {
    async fn deliver(&self, payload: &Payload) -> Result<(), DeliveryError> {
        let body = serde_json::to_vec(payload)?;

        let resp = self
            .client
            .post(self.url.as_str())
            .basic_auth(&self.email, Some(&self.token))
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;

        let status = resp.status();
        if status.as_u16() >= 300 {
            let body = match resp.text().await {
                Ok(text) => truncate_string(&text, MAX_BODY_LENGTH),
                Err(e) => format!("[Failed to read response body: {e}]"),
            };
            return Err(DeliveryError::Status {
                sink: self.name().to_string(),
                status: status.as_u16(),
                body,
            });
        }

        tracing::debug!(count = payload.len(), status = %status, "Payload delivered");
        Ok(())
    }

    fn name(&self) -> &str {
        "librato"
    }
}

/// Truncates `s` to at most `max` bytes without splitting a character.
pub fn truncate_string(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &s[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_keeps_short_strings() {
        assert_eq!(truncate_string("ok", 10), "ok");
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        let s = "ééé";
        assert_eq!(truncate_string(s, 3), "é...");
    }
}
