use crate::client::ServiceCredentials;
use crate::global;
use crate::pipeline::{PipelineSettings, PollSettings, RetryPolicy};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

pub mod env_vars {
    pub const ENVIRONMENT: &str = "GENESYS_ENVIRONMENT";
    pub const CLIENT_ID: &str = "CLIENT_ID";
    pub const CLIENT_SECRET: &str = "CLIENT_SECRET";
    pub const MAX_DOWNLOAD_WORKERS: &str = "MAX_DOWNLOAD_WORKERS";
    pub const POLL_RETRIES: &str = "POLL_RETRIES";
    pub const POLL_INTERVAL: &str = "POLL_INTERVAL";
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub pipeline: PipelineConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Region domain, e.g. `mypurecloud.com`.
    pub environment: String,
    pub client_id: String,
    pub client_secret: String,
    pub api_base_url: Option<String>,
    pub login_base_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub max_download_workers: usize,
    pub poll_retries: u32,
    pub poll_interval_seconds: u64,
    pub max_stalled_polls: u32,
    pub metadata_workers: usize,
    pub metadata_max_retries: u32,
    pub metadata_retry_delay_seconds: u64,
    pub max_batch_size: usize,
    pub search_page_size: u32,
    pub output_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub log_dir: PathBuf,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            environment: "mypurecloud.com".to_string(),
            client_id: String::new(),
            client_secret: String::new(),
            api_base_url: None,
            login_base_url: None,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_download_workers: 10,
            poll_retries: 50,
            poll_interval_seconds: 25,
            max_stalled_polls: 30,
            metadata_workers: 5,
            metadata_max_retries: 3,
            metadata_retry_delay_seconds: 2,
            max_batch_size: 100,
            search_page_size: 100,
            output_dir: PathBuf::from("./recordings"),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("logs"),
        }
    }
}

impl ServiceConfig {
    pub fn credentials(&self) -> Result<ServiceCredentials> {
        if self.client_id.trim().is_empty() || self.client_secret.trim().is_empty() {
            bail!(
                "Client credentials are not configured. Set [service] client_id/client_secret or the {} and {} environment variables",
                env_vars::CLIENT_ID,
                env_vars::CLIENT_SECRET
            );
        }

        let mut credentials = ServiceCredentials::for_environment(
            &self.environment,
            &self.client_id,
            &self.client_secret,
        );
        if let Some(api) = &self.api_base_url {
            credentials.api_base_url = api.clone();
        }
        if let Some(login) = &self.login_base_url {
            credentials.login_base_url = login.clone();
        }
        Ok(credentials)
    }
}

impl PipelineConfig {
    pub fn to_settings(&self) -> PipelineSettings {
        PipelineSettings {
            search_page_size: self.search_page_size,
            metadata_workers: self.metadata_workers,
            metadata_retry: RetryPolicy {
                max_attempts: self.metadata_max_retries,
                delay: Duration::from_secs(self.metadata_retry_delay_seconds),
            },
            max_batch_size: self.max_batch_size,
            poll: PollSettings {
                max_attempts: self.poll_retries,
                max_stalled: self.max_stalled_polls,
                interval: Duration::from_secs(self.poll_interval_seconds),
            },
            download_workers: self.max_download_workers,
            output_dir: self.output_dir.clone(),
        }
    }
}

impl Config {
    /// Loads the config file (creating a default one if missing) and applies
    /// environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(path) => path.to_path_buf(),
            None => Self::config_path()?,
        };

        let mut config = if config_path.exists() {
            let content =
                std::fs::read_to_string(&config_path).context("Failed to read config file")?;
            let config: Self = toml::from_str(&content).context("Failed to parse config file")?;
            info!("Loaded config from {:?}", config_path);
            config
        } else {
            info!(
                "Config file not found, creating default at {:?}",
                config_path
            );
            let config = Self::default();
            config.save_to(&config_path)?;
            config
        };

        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(path, content).context("Failed to write config file")?;

        Ok(())
    }

    /// Overrides values from environment variables. Unparseable numbers keep
    /// the current value.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(value) = lookup(env_vars::ENVIRONMENT).filter(|v| !v.is_empty()) {
            self.service.environment = value;
        }
        if let Some(value) = lookup(env_vars::CLIENT_ID).filter(|v| !v.is_empty()) {
            self.service.client_id = value;
        }
        if let Some(value) = lookup(env_vars::CLIENT_SECRET).filter(|v| !v.is_empty()) {
            self.service.client_secret = value;
        }

        override_number(
            &lookup,
            env_vars::MAX_DOWNLOAD_WORKERS,
            &mut self.pipeline.max_download_workers,
        );
        override_number(&lookup, env_vars::POLL_RETRIES, &mut self.pipeline.poll_retries);
        override_number(
            &lookup,
            env_vars::POLL_INTERVAL,
            &mut self.pipeline.poll_interval_seconds,
        );
    }

    pub fn config_path() -> Result<PathBuf> {
        global::config_file()
    }
}

fn override_number<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    target: &mut T,
) {
    let Some(raw) = lookup(key) else {
        return;
    };
    match raw.trim().parse() {
        Ok(value) => *target = value,
        Err(_) => warn!("Ignoring invalid {}={:?}", key, raw),
    }
}
