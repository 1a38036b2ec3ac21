//! Layered configuration: built-in defaults, then a TOML file, then
//! `LANVAULT_`-prefixed environment variables, then CLI arguments. The CLI
//! layer is merged from the clap args struct serialized with
//! `skip_serializing_if = "Option::is_none"`, so only flags the user actually
//! passed override the file.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};

use crate::core::models::BackupFolder;

const CONFIG_FILE: &str = "lanvault.toml";
const ENV_PREFIX: &str = "LANVAULT_";

/// Credentials and location of the destination share. Consumed opaquely by
/// the transfer client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShareConfig {
    pub share_name: String,
    pub username: String,
    pub secret: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub remote_dir: String,
}

impl Default for ShareConfig {
    fn default() -> Self {
        Self {
            share_name: "sharedfolder".into(),
            username: String::new(),
            secret: String::new(),
            domain: String::new(),
            remote_dir: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Override for the /24 prefix, e.g. "192.168.1.". Detected from the
    /// active interface when unset.
    pub subnet_prefix: Option<String>,
    pub probe_timeout_ms: u64,
    pub worker_width: usize,
    pub cache_validity_secs: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            subnet_prefix: None,
            probe_timeout_ms: 200,
            worker_width: 20,
            cache_validity_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationChannelType {
    None,
    Webhook,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationConfig {
    pub channel: NotificationChannelType,
    pub webhook_url: Option<String>,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            channel: NotificationChannelType::None,
            webhook_url: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    pub db_path: PathBuf,
    #[serde(default)]
    pub folders: Vec<BackupFolder>,
    pub share: ShareConfig,
    pub scan: ScanConfig,
    pub retry_attempts: u32,
    pub retry_backoff_ms: u64,
    pub interval_mins: u64,
    pub simulation: bool,
    pub verbose: bool,
    pub notification: NotificationConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("lanvault.db"),
            folders: Vec::new(),
            share: ShareConfig::default(),
            scan: ScanConfig::default(),
            retry_attempts: 3,
            retry_backoff_ms: 1500,
            interval_mins: 30,
            simulation: false,
            verbose: false,
            notification: NotificationConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn new<A: Serialize>(cli: Option<&A>) -> Result<Self> {
        Self::load(Path::new(CONFIG_FILE), cli)
    }

    pub fn load<A: Serialize>(config_file: &Path, cli: Option<&A>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(config_file))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));

        if let Some(cli) = cli {
            figment = figment.merge(Serialized::defaults(cli));
        }

        figment.extract().context("invalid configuration")
    }

    /// Write a starter config file with the built-in defaults. Refuses to
    /// overwrite.
    pub fn write_default(path: &Path) -> Result<()> {
        if path.exists() {
            bail!("{} already exists", path.display());
        }
        let content =
            toml::to_string_pretty(&AppConfig::default()).context("failed to serialize config")?;
        std::fs::write(path, content).context("failed to write config file")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_carry_the_documented_constants() {
        let config = AppConfig::default();
        assert_eq!(config.scan.probe_timeout_ms, 200);
        assert_eq!(config.scan.worker_width, 20);
        assert_eq!(config.scan.cache_validity_secs, 300);
        assert_eq!(config.retry_attempts, 3);
        assert_eq!(config.retry_backoff_ms, 1500);
        assert_eq!(config.interval_mins, 30);
    }

    #[test]
    fn toml_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lanvault.toml");
        std::fs::write(
            &path,
            r#"
retry_attempts = 5

[[folders]]
path = "/data/photos"
extensions = ["jpg", "png"]

[share]
share_name = "backups"
username = "navi"
secret = "s3cret"

[scan]
subnet_prefix = "10.1.2."
"#,
        )
        .unwrap();

        let config = AppConfig::load(&path, None::<&AppConfig>).unwrap();
        assert_eq!(config.retry_attempts, 5);
        assert_eq!(config.folders.len(), 1);
        assert_eq!(config.folders[0].extensions, vec!["jpg", "png"]);
        assert_eq!(config.share.share_name, "backups");
        assert_eq!(config.scan.subnet_prefix.as_deref(), Some("10.1.2."));
        // Untouched keys keep their defaults.
        assert_eq!(config.scan.worker_width, 20);
    }

    #[test]
    fn write_default_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lanvault.toml");

        AppConfig::write_default(&path).unwrap();
        let written = AppConfig::load(&path, None::<&AppConfig>).unwrap();
        assert_eq!(written, AppConfig::default());

        assert!(AppConfig::write_default(&path).is_err());
    }
}
