//! Configuration types for rift-vcr.

use crate::recording::{RecordMode, SessionOptions};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VcrConfig {
    /// Directory holding one cassette directory per namespace
    #[serde(default = "default_cassette_root")]
    pub cassette_root: PathBuf,

    /// Recording mode; `auto` is resolved when a session starts
    #[serde(default)]
    pub mode: RecordMode,

    /// Hosts always forwarded live, never recorded or replayed
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub passthrough_domains: Vec<String>,

    /// Hosts always aborted without a network round trip
    #[serde(
        default,
        alias = "blacklistDomains",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub deny_domains: Vec<String>,

    /// Upper bound on reading a live response body
    #[serde(default = "default_body_timeout_ms")]
    pub body_timeout_ms: u64,

    /// Upper bound on writing a recording to disk
    #[serde(default = "default_save_timeout_ms")]
    pub save_timeout_ms: u64,

    /// How long a navigation waits for outstanding recordings
    #[serde(default = "default_navigation_drain_timeout_ms")]
    pub navigation_drain_timeout_ms: u64,
}

fn default_cassette_root() -> PathBuf {
    PathBuf::from("./__recordings__")
}

fn default_body_timeout_ms() -> u64 {
    1000
}

fn default_save_timeout_ms() -> u64 {
    5000
}

fn default_navigation_drain_timeout_ms() -> u64 {
    600_000
}

impl Default for VcrConfig {
    fn default() -> Self {
        Self {
            cassette_root: default_cassette_root(),
            mode: RecordMode::default(),
            passthrough_domains: Vec::new(),
            deny_domains: Vec::new(),
            body_timeout_ms: default_body_timeout_ms(),
            save_timeout_ms: default_save_timeout_ms(),
            navigation_drain_timeout_ms: default_navigation_drain_timeout_ms(),
        }
    }
}

impl VcrConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, anyhow::Error> {
        let contents = std::fs::read_to_string(path)?;
        let config: VcrConfig = serde_yaml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.cassette_root.as_os_str().is_empty() {
            anyhow::bail!("cassetteRoot must not be empty");
        }

        for (name, value) in [
            ("bodyTimeoutMs", self.body_timeout_ms),
            ("saveTimeoutMs", self.save_timeout_ms),
            ("navigationDrainTimeoutMs", self.navigation_drain_timeout_ms),
        ] {
            if value == 0 {
                anyhow::bail!("{name} must be greater than zero");
            }
        }

        for domain in self.passthrough_domains.iter().chain(&self.deny_domains) {
            if domain.trim().is_empty() || domain.contains('/') {
                anyhow::bail!("Invalid domain '{domain}': expected a bare host name");
            }
        }

        Ok(())
    }

    pub fn body_timeout(&self) -> Duration {
        Duration::from_millis(self.body_timeout_ms)
    }

    pub fn save_timeout(&self) -> Duration {
        Duration::from_millis(self.save_timeout_ms)
    }

    pub fn navigation_drain_timeout(&self) -> Duration {
        Duration::from_millis(self.navigation_drain_timeout_ms)
    }

    /// Session tunables for this configuration, without hooks.
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            mode: self.mode,
            passthrough_domains: self.passthrough_domains.clone(),
            deny_domains: self.deny_domains.clone(),
            body_timeout: self.body_timeout(),
            save_timeout: self.save_timeout(),
            navigation_drain_timeout: self.navigation_drain_timeout(),
            on_request_completed: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_from_empty_document() {
        let config: VcrConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config.cassette_root, PathBuf::from("./__recordings__"));
        assert_eq!(config.mode, RecordMode::Auto);
        assert_eq!(config.body_timeout(), Duration::from_secs(1));
        assert_eq!(config.save_timeout(), Duration::from_secs(5));
        assert_eq!(config.navigation_drain_timeout(), Duration::from_secs(600));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_config() {
        let yaml = r#"
cassetteRoot: /tmp/cassettes
mode: replay-only-throw
passthroughDomains:
  - localhost
blacklistDomains:
  - ads.example.com
saveTimeoutMs: 250
"#;
        let config: VcrConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.cassette_root, PathBuf::from("/tmp/cassettes"));
        assert_eq!(config.mode, RecordMode::ReplayOnlyThrow);
        assert_eq!(config.passthrough_domains, vec!["localhost"]);
        assert_eq!(config.deny_domains, vec!["ads.example.com"]);
        assert_eq!(config.save_timeout_ms, 250);
        assert_eq!(config.body_timeout_ms, 1000);

        let options = config.session_options();
        assert_eq!(options.mode, RecordMode::ReplayOnlyThrow);
        assert_eq!(options.save_timeout, Duration::from_millis(250));
    }

    #[test]
    fn test_json_is_accepted() {
        let config: VcrConfig =
            serde_yaml::from_str(r#"{"mode": "record-only", "denyDomains": ["x.test"]}"#).unwrap();
        assert_eq!(config.mode, RecordMode::RecordOnly);
        assert_eq!(config.deny_domains, vec!["x.test"]);
    }

    #[test]
    fn test_unknown_mode_is_rejected() {
        assert!(serde_yaml::from_str::<VcrConfig>("mode: sometimes").is_err());
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let config = VcrConfig {
            body_timeout_ms: 0,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("bodyTimeoutMs"));
    }

    #[test]
    fn test_validate_rejects_url_as_domain() {
        let config = VcrConfig {
            deny_domains: vec!["https://ads.example.com/".to_string()],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "mode: passthrough\nnavigationDrainTimeoutMs: 10").unwrap();
        let config = VcrConfig::from_file(file.path()).unwrap();
        assert_eq!(config.mode, RecordMode::Passthrough);
        assert_eq!(config.navigation_drain_timeout(), Duration::from_millis(10));

        let mut bad = tempfile::NamedTempFile::new().unwrap();
        writeln!(bad, "saveTimeoutMs: 0").unwrap();
        assert!(VcrConfig::from_file(bad.path()).is_err());
    }
}
