//! Configuration management for the washboard service

use anyhow::{Context, Result};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Washboard control panel backend
#[derive(Parser, Debug, Default)]
#[command(name = "washboard")]
#[command(about = "Control panel backend for Docker stacks managed through Portainer", long_about = None)]
pub struct Args {
    /// TOML configuration file; command-line and environment values override it
    #[arg(long, env = "WASHBOARD_CONFIG")]
    pub config: Option<PathBuf>,

    /// HTTP port
    #[arg(long, env = "PORT")]
    pub port: Option<u16>,

    /// Base URL of the Portainer API (e.g. https://portainer.local/api)
    #[arg(long, env = "PORTAINER_URL")]
    pub portainer_url: Option<String>,

    /// Portainer API key
    #[arg(long, env = "PORTAINER_SECRET", hide_env_values = true)]
    pub portainer_secret: Option<String>,

    /// JSON file holding stack settings and ignored images
    #[arg(long, env = "SETTINGS_FILE")]
    pub settings_file: Option<PathBuf>,

    /// Lifetime of live image statuses in minutes
    #[arg(long, env = "CACHE_DURATION_MINUTES")]
    pub cache_duration_minutes: Option<u64>,

    /// Allowed CORS origins (comma separated)
    #[arg(long, env = "CORS", value_delimiter = ',')]
    pub cors: Option<Vec<String>>,

    /// Run the autostart sync once at launch
    #[arg(long, env = "START_STACKS_ON_LAUNCH")]
    pub start_stacks_on_launch: Option<bool>,

    /// Endpoint polled in the background and auto-started at launch
    #[arg(long, env = "START_ENDPOINT_ID")]
    pub start_endpoint_id: Option<i64>,

    /// Images that mark a stack as protected from start/stop (comma separated)
    #[arg(long, env = "PROTECTED_IMAGES", value_delimiter = ',')]
    pub protected_images: Option<Vec<String>>,

    /// Background image status refresh interval in hours
    #[arg(long)]
    pub poll_interval_hours: Option<u64>,

    /// Timeout for control plane and settings store calls in seconds
    #[arg(long)]
    pub request_timeout_secs: Option<u64>,

    /// Container image status requests in flight at once
    #[arg(long)]
    pub status_fetch_concurrency: Option<usize>,
}

/// Service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub port: u16,
    pub portainer_url: String,
    pub portainer_secret: String,
    pub settings_file: Option<PathBuf>,
    pub cache_duration_minutes: u64,
    pub cors: Vec<String>,
    pub start_stacks_on_launch: bool,
    pub start_endpoint_id: i64,
    pub protected_images: Vec<String>,
    pub poll_interval_hours: u64,
    pub request_timeout_secs: u64,
    pub status_fetch_concurrency: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            port: 8080,
            portainer_url: String::new(),
            portainer_secret: String::new(),
            settings_file: Some(PathBuf::from("washboard-settings.json")),
            cache_duration_minutes: 1,
            cors: Vec::new(),
            start_stacks_on_launch: false,
            start_endpoint_id: 1,
            protected_images: vec!["washboard".to_string()],
            poll_interval_hours: 24,
            request_timeout_secs: 10,
            status_fetch_concurrency: 8,
        }
    }
}

impl Config {
    /// Build the configuration from an optional file plus command-line/env overrides
    pub fn from_args(args: Args) -> Result<Self> {
        let mut config = match &args.config {
            Some(path) => Self::load_file(path)?,
            None => Config::default(),
        };

        if let Some(port) = args.port {
            config.port = port;
        }
        if let Some(url) = args.portainer_url {
            config.portainer_url = url;
        }
        if let Some(secret) = args.portainer_secret {
            config.portainer_secret = secret;
        }
        if let Some(file) = args.settings_file {
            config.settings_file = Some(file);
        }
        if let Some(minutes) = args.cache_duration_minutes {
            config.cache_duration_minutes = minutes;
        }
        if let Some(cors) = args.cors {
            config.cors = cors
                .into_iter()
                .map(|origin| origin.trim().to_string())
                .filter(|origin| !origin.is_empty())
                .collect();
        }
        if let Some(start) = args.start_stacks_on_launch {
            config.start_stacks_on_launch = start;
        }
        if let Some(endpoint_id) = args.start_endpoint_id {
            config.start_endpoint_id = endpoint_id;
        }
        if let Some(images) = args.protected_images {
            config.protected_images = images
                .into_iter()
                .map(|image| image.trim().to_string())
                .filter(|image| !image.is_empty())
                .collect();
        }
        if let Some(hours) = args.poll_interval_hours {
            config.poll_interval_hours = hours;
        }
        if let Some(secs) = args.request_timeout_secs {
            config.request_timeout_secs = secs;
        }
        if let Some(concurrency) = args.status_fetch_concurrency {
            config.status_fetch_concurrency = concurrency;
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn load_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config file: {:?}", path.as_ref()))?;

        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.portainer_url.trim().is_empty() {
            anyhow::bail!("portainer_url is required (--portainer-url or PORTAINER_URL)");
        }
        if self.cache_duration_minutes == 0 {
            anyhow::bail!("cache_duration_minutes must be at least 1");
        }
        if self.poll_interval_hours == 0 {
            anyhow::bail!("poll_interval_hours must be at least 1");
        }
        if self.status_fetch_concurrency == 0 {
            anyhow::bail!("status_fetch_concurrency must be at least 1");
        }
        if self.portainer_secret.is_empty() {
            tracing::warn!("No Portainer API key configured, requests will be unauthenticated");
        }
        Ok(())
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_duration_minutes * 60)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_hours * 60 * 60)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
