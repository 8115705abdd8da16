use figment::{
    providers::{Env, Format, Json, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::types::Endpoint;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub endpoints: Vec<Endpoint>,
    pub flush_interval_secs: u64,
    pub dns_timeout_ms: u64,
    /// JSON file holding the endpoint list. When set it replaces
    /// `endpoints` and is where saved endpoint lists go.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoints_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoints: Vec::new(),
            flush_interval_secs: 60,
            dns_timeout_ms: 2000,
            endpoints_file: None,
        }
    }
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        Self::from_figment(
            Figment::from(Serialized::defaults(Config::default()))
                .merge(Toml::file("statsd-fanout.toml"))
                .merge(Json::file("statsd-fanout.json"))
                .merge(Env::prefixed("STATSD_FANOUT_")),
        )
    }

    fn from_figment(figment: Figment) -> anyhow::Result<Self> {
        let mut config: Config = figment
            .extract()
            .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;

        if let Some(ref path) = config.endpoints_file {
            if path.exists() {
                config.endpoints = load_endpoints(path)?;
            }
        }

        if config.flush_interval_secs == 0 {
            return Err(anyhow::anyhow!("flush_interval_secs must be positive"));
        }

        Ok(config)
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs)
    }

    pub fn dns_timeout(&self) -> Duration {
        Duration::from_millis(self.dns_timeout_ms)
    }

    /// Persists `endpoints` to the configured endpoints file.
    pub fn save_endpoints(&self, endpoints: &[Endpoint]) -> anyhow::Result<()> {
        let path = self
            .endpoints_file
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("No endpoints_file configured"))?;
        save_endpoints(path, endpoints)
    }
}

pub fn load_endpoints(path: &Path) -> anyhow::Result<Vec<Endpoint>> {
    let data = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", path.display(), e))?;
    serde_json::from_str(&data)
        .map_err(|e| anyhow::anyhow!("Invalid endpoints in {}: {}", path.display(), e))
}

pub fn save_endpoints(path: &Path, endpoints: &[Endpoint]) -> anyhow::Result<()> {
    let data = serde_json::to_string_pretty(endpoints)?;
    std::fs::write(path, data)
        .map_err(|e| anyhow::anyhow!("Failed to write {}: {}", path.display(), e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PrefixFilter, Tag};

    fn sample_endpoints() -> Vec<Endpoint> {
        vec![
            Endpoint::udp("localhost", 8125)
                .with_tags(vec![Tag::new("env", "prod")])
                .with_prefix_filters(vec![PrefixFilter::new("vm"), PrefixFilter::new("http")]),
            Endpoint::udp("invalid", 999999),
        ]
    }

    #[test]
    fn defaults() {
        let config = Config::default();
        assert!(config.endpoints.is_empty());
        assert_eq!(config.flush_interval(), Duration::from_secs(60));
        assert_eq!(config.dns_timeout(), Duration::from_secs(2));
    }

    #[test]
    fn endpoints_from_toml() {
        let toml = r#"
            flush_interval_secs = 10

            [[endpoints]]
            variant = "udp"
            host = "localhost"
            port = 8125
            tags = [{ key = "env", value = "prod" }]
            prefixFilters = [{ prefix = "vm" }]

            [[endpoints]]
            variant = "udp"
            host = "localhost"
            port = 18125
        "#;
        let config = Config::from_figment(
            Figment::from(Serialized::defaults(Config::default())).merge(Toml::string(toml)),
        )
        .unwrap();

        assert_eq!(config.flush_interval_secs, 10);
        assert_eq!(
            config.endpoints,
            vec![
                Endpoint::udp("localhost", 8125)
                    .with_tags(vec![Tag::new("env", "prod")])
                    .with_prefix_filters(vec![PrefixFilter::new("vm")]),
                Endpoint::udp("localhost", 18125),
            ]
        );
    }

    #[test]
    fn zero_interval_is_rejected() {
        let result = Config::from_figment(
            Figment::from(Serialized::defaults(Config::default()))
                .merge(Toml::string("flush_interval_secs = 0")),
        );
        assert!(result.is_err());
    }

    #[test]
    fn saved_endpoints_reload_equal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("endpoints.json");
        let endpoints = sample_endpoints();

        save_endpoints(&path, &endpoints).unwrap();
        assert_eq!(load_endpoints(&path).unwrap(), endpoints);
    }

    #[test]
    fn endpoints_file_overrides_inline_endpoints() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("endpoints.json");
        let config = Config {
            endpoints_file: Some(path.clone()),
            ..Config::default()
        };
        config.save_endpoints(&sample_endpoints()).unwrap();

        let toml = format!(
            "endpoints_file = {:?}\n[[endpoints]]\nvariant = \"udp\"\nhost = \"other\"\nport = 1\n",
            path.display().to_string()
        );
        let reloaded = Config::from_figment(
            Figment::from(Serialized::defaults(Config::default())).merge(Toml::string(&toml)),
        )
        .unwrap();
        assert_eq!(reloaded.endpoints, sample_endpoints());
    }

    #[test]
    fn save_without_file_fails() {
        assert!(Config::default().save_endpoints(&[]).is_err());
    }
}
