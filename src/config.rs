//! Config module.
//! Loads the Airtable credentials and event settings from a JSON file
//! (default `airtable.config.secret.json`) using serde.
//! `AIRTABLE_API_KEY` in the environment overrides the file's `apiKey`.

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "airtable.config.secret.json";
pub const API_KEY_ENV: &str = "AIRTABLE_API_KEY";

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub api_key: String,
    pub base_id: String,
    #[serde(default)]
    pub event_id: String,
    #[serde(default = "default_institution_domain")]
    pub institution_domain: String,
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_contacts_view")]
    pub contacts_view: String,
    #[serde(default = "default_scan_log")]
    pub scan_log: PathBuf,
    #[serde(default = "default_error_log")]
    pub error_log: PathBuf,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_institution_domain() -> String {
    "msstate.edu".to_string()
}

fn default_api_url() -> String {
    "https://api.airtable.com".to_string()
}

fn default_contacts_view() -> String {
    "Main View".to_string()
}

fn default_scan_log() -> PathBuf {
    PathBuf::from("scans.txt")
}

fn default_error_log() -> PathBuf {
    PathBuf::from("errors.txt")
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl Config {
    /// Reads the config file, then applies the environment override.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        let mut config = Self::from_json(&content)
            .with_context(|| format!("Failed to parse config: {}", path.display()))?;
        if let Ok(api_key) = std::env::var(API_KEY_ENV) {
            config.api_key = api_key;
        }
        Ok(config)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn with_event_id(mut self, event_id: Option<&str>) -> Self {
        if let Some(event_id) = event_id {
            self.event_id = event_id.to_string();
        }
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.api_key.trim().is_empty() {
            bail!("No Airtable API key: set apiKey in the config or {API_KEY_ENV}");
        }
        if self.base_id.trim().is_empty() {
            bail!("baseId must not be empty");
        }
        if self.event_id.trim().is_empty() {
            bail!("No event id: set eventId in the config or pass --event");
        }
        if self.request_timeout_secs == 0 {
            bail!("requestTimeoutSecs must be at least 1");
        }
        Ok(())
    }
}
