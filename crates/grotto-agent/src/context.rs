use crate::config::AgentConfig;
use anyhow::{anyhow, Result};

/// Everything a task needs from the outside world, resolved once at startup.
#[derive(Debug, Clone)]
pub struct AgentContext {
    pub config: AgentConfig,
    /// Reported as the `source` of every gauge.
    pub hostname: String,
}

impl AgentContext {
    pub fn new(config: AgentConfig, hostname: impl Into<String>) -> Self {
        Self {
            config,
            hostname: hostname.into(),
        }
    }
}

/// Resolves the host name used as the metric source.
pub fn resolve_hostname() -> Result<String> {
    sysinfo::System::host_name()
        .filter(|name| !name.trim().is_empty())
        .ok_or_else(|| anyhow!("host name is not available"))
}
