use crate::error::ConfigError;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "grotto.conf";

const DEFAULT_FLUSH_PERIOD_SECS: i64 = 5;
const DEFAULT_SAMPLE_PERIOD_SECS: i64 = 1;
const DEFAULT_REQUEST_TIMEOUT_SECS: i64 = 10;
const DEFAULT_MAX_IN_FLIGHT: i64 = 16;

/// Upper bound for every period and timeout, in seconds.
pub const MAX_PERIOD_SECS: i64 = 86_400;
const MAX_IN_FLIGHT: i64 = 1024;

/// Agent configuration as read from `grotto.conf`.
///
/// ```json
/// {
///   "Librato": { "Email": "ops@example.com", "Token": "abc", "Url": "https://..." },
///   "Cpu": { "PeriodSeconds": 1 }
/// }
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AgentConfig {
    pub librato: LibratoConfig,
    #[serde(default)]
    pub cpu: CpuConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LibratoConfig {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub url: String,
    /// Batching window; values <= 0 fall back to 5 seconds.
    #[serde(default)]
    pub period_seconds: i64,
    /// Per-request timeout; values <= 0 fall back to 10 seconds.
    #[serde(default)]
    pub timeout_seconds: i64,
    /// Upper bound on outstanding deliveries; values <= 0 fall back to 16.
    #[serde(default)]
    pub max_in_flight: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CpuConfig {
    /// Sampling period; values <= 0 fall back to 1 second.
    #[serde(default)]
    pub period_seconds: i64,
    /// Counter source, `/proc/stat` when unset.
    #[serde(default)]
    pub stat_path: Option<String>,
}

/// Non-positive values take `default`; larger ones are capped at `max`.
fn positive_or(value: i64, default: i64, max: i64) -> u64 {
    if value > 0 {
        value.min(max) as u64
    } else {
        default as u64
    }
}

impl AgentConfig {
    /// Reads and validates the config file. Paths ending in `.toml` are
    /// parsed as TOML, everything else as JSON.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        let is_toml = path.extension().is_some_and(|ext| ext == "toml");
        let config = if is_toml {
            Self::from_toml(&content)?
        } else {
            Self::from_json(&content)?
        };
        Ok(config)
    }

    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let librato = &self.librato;
        if librato.token.trim().is_empty() {
            return Err(ConfigError::MissingField("Missing an API token for Librato"));
        }
        if librato.email.trim().is_empty() {
            return Err(ConfigError::MissingField("Missing Email address for Librato"));
        }
        if librato.url.trim().is_empty() {
            return Err(ConfigError::MissingField("Missing Url for Librato"));
        }
        Ok(())
    }

    pub fn flush_period(&self) -> Duration {
        Duration::from_secs(positive_or(
            self.librato.period_seconds,
            DEFAULT_FLUSH_PERIOD_SECS,
            MAX_PERIOD_SECS,
        ))
    }

    pub fn sample_period(&self) -> Duration {
        Duration::from_secs(positive_or(
            self.cpu.period_seconds,
            DEFAULT_SAMPLE_PERIOD_SECS,
            MAX_PERIOD_SECS,
        ))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(positive_or(
            self.librato.timeout_seconds,
            DEFAULT_REQUEST_TIMEOUT_SECS,
            MAX_PERIOD_SECS,
        ))
    }

    pub fn max_in_flight(&self) -> usize {
        positive_or(self.librato.max_in_flight, DEFAULT_MAX_IN_FLIGHT, MAX_IN_FLIGHT) as usize
    }

    pub fn stat_path(&self) -> &str {
        self.cpu
            .stat_path
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .unwrap_or(grotto_collector::cpu::DEFAULT_STAT_PATH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"{
        "Librato": {
            "Email": "ops@example.com",
            "Token": "secret",
            "Url": "https://metrics-api.librato.com/v1/metrics",
            "PeriodSeconds": 3
        },
        "Cpu": { "PeriodSeconds": 2, "StatPath": "/tmp/stat" }
    }"#;

    #[test]
    fn parses_full_json_config() {
        let config = AgentConfig::from_json(FULL).unwrap();
        assert_eq!(config.librato.email, "ops@example.com");
        assert_eq!(config.flush_period(), Duration::from_secs(3));
        assert_eq!(config.sample_period(), Duration::from_secs(2));
        assert_eq!(config.stat_path(), "/tmp/stat");
    }

    #[test]
    fn periods_fall_back_to_defaults() {
        let config = AgentConfig::from_json(
            r#"{"Librato": {"Email": "a@b.c", "Token": "t", "Url": "http://x", "PeriodSeconds": -4},
                "Cpu": {"PeriodSeconds": 0}}"#,
        )
        .unwrap();
        assert_eq!(config.flush_period(), Duration::from_secs(5));
        assert_eq!(config.sample_period(), Duration::from_secs(1));
        assert_eq!(config.request_timeout(), Duration::from_secs(10));
        assert_eq!(config.max_in_flight(), 16);
        assert_eq!(config.stat_path(), "/proc/stat");
    }

    #[test]
    fn oversized_values_are_capped() {
        let config = AgentConfig::from_json(
            r#"{"Librato": {"Email": "a@b.c", "Token": "t", "Url": "http://x",
                            "PeriodSeconds": 9223372036854775807,
                            "TimeoutSeconds": 9223372036854775807,
                            "MaxInFlight": 9223372036854775807},
                "Cpu": {"PeriodSeconds": 9223372036854775807}}"#,
        )
        .unwrap();
        let cap = Duration::from_secs(MAX_PERIOD_SECS as u64);
        assert_eq!(config.flush_period(), cap);
        assert_eq!(config.sample_period(), cap);
        assert_eq!(config.request_timeout(), cap);
        assert_eq!(config.max_in_flight(), 1024);
    }

    #[test]
    fn missing_cpu_section_uses_defaults() {
        let config = AgentConfig::from_json(
            r#"{"Librato": {"Email": "a@b.c", "Token": "t", "Url": "http://x"}}"#,
        )
        .unwrap();
        assert_eq!(config.sample_period(), Duration::from_secs(1));
    }

    #[test]
    fn missing_token_fails_validation() {
        let err = AgentConfig::from_json(r#"{"Librato": {"Email": "a@b.c", "Url": "http://x"}}"#)
            .unwrap_err();
        assert!(err.to_string().contains("API token"), "got: {err}");
    }

    #[test]
    fn empty_email_and_url_fail_validation() {
        let err = AgentConfig::from_json(
            r#"{"Librato": {"Email": "", "Token": "t", "Url": "http://x"}}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("Email"));

        let err = AgentConfig::from_json(r#"{"Librato": {"Email": "a@b.c", "Token": "t"}}"#)
            .unwrap_err();
        assert!(err.to_string().contains("Url"));
    }

    #[test]
    fn malformed_json_is_rejected() {
        let err = AgentConfig::from_json("{not json").unwrap_err();
        assert!(matches!(err, ConfigError::Json(_)));
    }

    #[test]
    fn loads_toml_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grotto.toml");
        std::fs::write(
            &path,
            "[Librato]\nEmail = \"a@b.c\"\nToken = \"t\"\nUrl = \"http://x\"\nPeriodSeconds = 7\n",
        )
        .unwrap();
        let config = AgentConfig::load(&path).unwrap();
        assert_eq!(config.flush_period(), Duration::from_secs(7));
    }

    #[test]
    fn missing_file_is_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = AgentConfig::load(dir.path().join("grotto.conf")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
