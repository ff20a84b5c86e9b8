use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Environment variable naming the config file.
pub const CONFIG_PATH_ENV: &str = "ESM_FILTER_CONFIG_PATH";
/// Prefix for per-field overrides, e.g. `ESM_FILTER_AGGREGATION_INTERVAL_SECS`.
pub const ENV_PREFIX: &str = "ESM_FILTER";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub aggregation: AggregationConfig,
    pub downstream: DownstreamConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub hostname: String,
    /// UDP address datagrams are received on.
    pub bind_address: String,
    /// Largest datagram read in one receive.
    pub read_buffer_size: usize,
    /// How often to log pipeline counters at INFO level.
    pub stats_log_interval_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            hostname: "localhost".into(),
            bind_address: "0.0.0.0:8286".into(),
            read_buffer_size: 65_536,
            stats_log_interval_secs: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregationConfig {
    /// Window length.
    pub interval_secs: u64,
    /// Cap on concurrently running mapper tasks per window.
    pub max_workers: usize,
    /// Observations buffered between ingestion and a window's dispatcher.
    pub input_channel_capacity: usize,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            interval_secs: 10,
            max_workers: crate::mapreduce::MAX_WORKERS,
            input_channel_capacity: 1024,
        }
    }
}

impl AggregationConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownstreamKind {
    /// Line protocol over UDP.
    Udp,
    /// JSON log events only.
    Log,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownstreamConfig {
    pub kind: DownstreamKind,
    pub address: String,
    /// Upper bound for one outgoing datagram.
    pub max_payload_bytes: usize,
}

impl Default for DownstreamConfig {
    fn default() -> Self {
        Self {
            kind: DownstreamKind::Udp,
            address: "localhost:8086".into(),
            max_payload_bytes: 1400,
        }
    }
}

impl AppConfig {
    /// Resolves the config path, parses it (or uses defaults) and applies env overrides.
    pub fn load(flag_path: Option<&str>) -> anyhow::Result<Self> {
        let mut config = match resolve_config_path(flag_path, |k| std::env::var(k).ok()) {
            Some(path) => {
                tracing::info!(path = %path.display(), "loading config");
                let s = std::fs::read_to_string(&path)
                    .with_context(|| format!("read config {}", path.display()))?;
                toml::from_str(&s).with_context(|| format!("parse config {}", path.display()))?
            }
            None => {
                tracing::info!("no configuration provided, using default settings");
                Self::default()
            }
        };
        config.apply_env_overrides(|k| std::env::var(k).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate config from a string (e.g. for tests). No env overrides.
    pub fn load_from_str(s: &str) -> anyhow::Result<Self> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Effective config as TOML.
    pub fn to_toml(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Applies `ESM_FILTER_<SECTION>_<FIELD>` overrides using `lookup`.
    pub fn apply_env_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> anyhow::Result<()> {
        let var = |section: &str, field: &str| {
            format!("{ENV_PREFIX}_{section}_{field}").to_uppercase()
        };

        override_string(&lookup, &var("server", "hostname"), &mut self.server.hostname);
        override_string(
            &lookup,
            &var("server", "bind_address"),
            &mut self.server.bind_address,
        );
        override_parsed(
            &lookup,
            &var("server", "read_buffer_size"),
            &mut self.server.read_buffer_size,
        )?;
        override_parsed(
            &lookup,
            &var("server", "stats_log_interval_secs"),
            &mut self.server.stats_log_interval_secs,
        )?;
        override_parsed(
            &lookup,
            &var("aggregation", "interval_secs"),
            &mut self.aggregation.interval_secs,
        )?;
        override_parsed(
            &lookup,
            &var("aggregation", "max_workers"),
            &mut self.aggregation.max_workers,
        )?;
        override_parsed(
            &lookup,
            &var("aggregation", "input_channel_capacity"),
            &mut self.aggregation.input_channel_capacity,
        )?;
        let kind_var = var("downstream", "kind");
        if let Some(value) = lookup(&kind_var).filter(|v| !v.is_empty()) {
            self.downstream.kind = match value.to_lowercase().as_str() {
                "udp" => DownstreamKind::Udp,
                "log" => DownstreamKind::Log,
                other => anyhow::bail!("{kind_var}: unknown downstream kind {other:?}"),
            };
        }
        override_string(
            &lookup,
            &var("downstream", "address"),
            &mut self.downstream.address,
        );
        override_parsed(
            &lookup,
            &var("downstream", "max_payload_bytes"),
            &mut self.downstream.max_payload_bytes,
        )?;
        Ok(())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            !self.server.bind_address.is_empty(),
            "server.bind_address must be non-empty"
        );
        anyhow::ensure!(
            self.server.read_buffer_size > 0,
            "server.read_buffer_size must be > 0, got {}",
            self.server.read_buffer_size
        );
        anyhow::ensure!(
            self.server.stats_log_interval_secs > 0,
            "server.stats_log_interval_secs must be > 0, got {}",
            self.server.stats_log_interval_secs
        );
        anyhow::ensure!(
            self.aggregation.interval_secs > 0,
            "aggregation.interval_secs must be > 0, got {}",
            self.aggregation.interval_secs
        );
        anyhow::ensure!(
            self.aggregation.max_workers >= 1,
            "aggregation.max_workers must be >= 1, got {}",
            self.aggregation.max_workers
        );
        anyhow::ensure!(
            self.aggregation.input_channel_capacity > 0,
            "aggregation.input_channel_capacity must be > 0, got {}",
            self.aggregation.input_channel_capacity
        );
        anyhow::ensure!(
            !self.downstream.address.is_empty(),
            "downstream.address must be non-empty"
        );
        anyhow::ensure!(
            self.downstream.max_payload_bytes >= 64,
            "downstream.max_payload_bytes must be >= 64, got {}",
            self.downstream.max_payload_bytes
        );
        Ok(())
    }
}

fn override_string(lookup: &impl Fn(&str) -> Option<String>, key: &str, target: &mut String) {
    if let Some(value) = lookup(key).filter(|v| !v.is_empty()) {
        *target = value;
    }
}

fn override_parsed<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    target: &mut T,
) -> anyhow::Result<()>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    if let Some(value) = lookup(key).filter(|v| !v.is_empty()) {
        *target = value
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("failed to apply {key} = {value:?}: {e}"))?;
    }
    Ok(())
}

/// Config path precedence: flag, `ESM_FILTER_CONFIG_PATH`, `~/.esm-filter/esm-filter.conf`,
/// `/etc/esm-filter/esm-filter.conf`. `None` means built-in defaults; so does a flag of
/// `/dev/null`.
pub fn resolve_config_path(
    flag_path: Option<&str>,
    env: impl Fn(&str) -> Option<String>,
) -> Option<PathBuf> {
    if let Some(path) = flag_path.filter(|p| !p.is_empty()) {
        if Path::new(path) == Path::new("/dev/null") {
            return None;
        }
        return Some(PathBuf::from(path));
    }
    if let Some(path) = env(CONFIG_PATH_ENV).filter(|p| !p.is_empty()) {
        return Some(PathBuf::from(path));
    }
    let mut candidates = Vec::with_capacity(2);
    if let Some(home) = env("HOME").filter(|h| !h.is_empty()) {
        candidates.push(Path::new(&home).join(".esm-filter/esm-filter.conf"));
    }
    candidates.push(PathBuf::from("/etc/esm-filter/esm-filter.conf"));
    candidates.into_iter().find(|p| p.is_file())
}
