use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

/// Runtime-wide tunables.
///
/// Deserialized from an optional TOML file; any field omitted from the file
/// keeps its `Default` value, which matches the constants called out in the
/// spec (§6, §4.1, §4.3).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Host the name broker listens on and clients connect to.
    pub broker_host: String,
    /// Fixed TCP port for the name broker.
    pub broker_port: u16,
    /// Inclusive range of ephemeral TCP ports a Receiver may bind.
    pub tcp_port_min: u16,
    pub tcp_port_max: u16,
    /// Directory under which per-user Unix domain sockets are created.
    pub ipc_directory: String,
    /// How long a Sender waits for a low-level pong before failing.
    #[serde(with = "duration_millis")]
    pub liveness_probe_timeout: Duration,
    /// How long a broker RPC waits before `BrokerUnavailable`.
    #[serde(with = "duration_millis")]
    pub broker_rpc_timeout: Duration,
    /// Poll granularity of `Actor::receive` while waiting on the mailbox.
    #[serde(with = "duration_millis")]
    pub inbox_polling_timeout: Duration,
    /// Deadline for the spawn handshake (`ok`, then `finished_init`).
    #[serde(with = "duration_millis")]
    pub spawn_timeout: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            broker_host: "localhost".to_string(),
            broker_port: 5555,
            tcp_port_min: 50000,
            tcp_port_max: 60000,
            ipc_directory: default_ipc_directory(),
            liveness_probe_timeout: Duration::from_secs(1),
            broker_rpc_timeout: Duration::from_secs(1),
            inbox_polling_timeout: Duration::from_millis(10),
            spawn_timeout: Duration::from_secs(5),
        }
    }
}

impl RuntimeConfig {
    pub fn from_toml_str(s: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(s)?)
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Load from `path` if it exists, falling back to defaults otherwise.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }
}

fn default_ipc_directory() -> String {
    let user = std::env::var("USER").unwrap_or_else(|_| "NO_USER".to_string());
    format!("/tmp/actors_{}", user)
}

mod duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let millis = u64::deserialize(d)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_constants() {
        let cfg = RuntimeConfig::default();
        assert_eq!(cfg.broker_port, 5555);
        assert_eq!(cfg.tcp_port_min, 50000);
        assert_eq!(cfg.tcp_port_max, 60000);
        assert_eq!(cfg.inbox_polling_timeout, Duration::from_millis(10));
    }

    #[test]
    fn partial_toml_overrides_only_named_fields() {
        let cfg = RuntimeConfig::from_toml_str("broker_port = 6000\n").unwrap();
        assert_eq!(cfg.broker_port, 6000);
        assert_eq!(cfg.tcp_port_min, 50000);
    }
}
