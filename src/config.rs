use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::poller::PollSettings;

/// Directory name under the platform config/data roots.
pub const APP_DIR: &str = "gsm-console";

/// Overrides `base_url` when set and non-empty.
pub const BASE_URL_ENV: &str = "GSM_API_BASE_URL";

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000/api";

pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;

/// Pause between two fetches of the same task.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 2_000;

/// Give up on a poll after five minutes.
pub const DEFAULT_POLL_TIMEOUT_MS: u64 = 5 * 60 * 1000;

/// `config.json`. Every field is optional in the file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    pub base_url: String,
    pub request_timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub poll_timeout_ms: u64,
    /// Session file and logs. Defaults to the platform data dir.
    pub data_dir: Option<PathBuf>,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            poll_timeout_ms: DEFAULT_POLL_TIMEOUT_MS,
            data_dir: None,
        }
    }
}

impl ConsoleConfig {
    /// `<config dir>/gsm-console/config.json`, then the environment.
    pub fn load() -> Result<Self, String> {
        let mut cfg = Self::read(&Self::config_path()?)?;
        if let Ok(url) = std::env::var(BASE_URL_ENV) {
            cfg.apply_base_url(&url);
        }
        Ok(cfg)
    }

    /// Missing file means defaults; a malformed one is an error.
    pub fn read(path: &Path) -> Result<Self, String> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
        serde_json::from_str(&text)
            .map_err(|e| format!("invalid config {}: {e}", path.to_string_lossy()))
    }

    pub fn config_path() -> Result<PathBuf, String> {
        Ok(dirs::config_dir()
            .ok_or_else(|| "failed to resolve config dir".to_string())?
            .join(APP_DIR)
            .join("config.json"))
    }

    pub fn apply_base_url(&mut self, url: &str) {
        let url = url.trim();
        if !url.is_empty() {
            self.base_url = url.to_string();
        }
    }

    pub fn data_dir(&self) -> Result<PathBuf, String> {
        if let Some(dir) = &self.data_dir {
            return Ok(dir.clone());
        }
        Ok(dirs::data_dir()
            .ok_or_else(|| "failed to resolve data dir".to_string())?
            .join(APP_DIR))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn poll_settings(&self) -> PollSettings {
        PollSettings {
            interval: Duration::from_millis(self.poll_interval_ms),
            timeout: Duration::from_millis(self.poll_timeout_ms),
        }
    }
}
