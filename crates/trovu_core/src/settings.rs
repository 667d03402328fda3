use std::env;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_SITE_BASE_URL: &str = "https://data.trovu.net/data";
pub const DEFAULT_RAW_GITHUB_BASE_URL: &str = "https://raw.githubusercontent.com";
pub const DEFAULT_IP_INFO_URL: &str = "https://api.db-ip.com/v2/free/self";
pub const DEFAULT_USER_AGENT: &str = "trovu/0.2";
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct Settings {
    #[serde(default)]
    pub data: DataSection,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct DataSection {
    pub site_base_url: Option<String>,
    pub raw_github_base_url: Option<String>,
    pub ip_info_url: Option<String>,
    pub user_agent: Option<String>,
    pub timeout_ms: Option<u64>,
}

impl Settings {
    /// Resolve the site shortcut-data base URL: env TROVU_SITE_BASE_URL >
    /// settings file > default.
    pub fn site_base_url(&self) -> String {
        env_override("TROVU_SITE_BASE_URL")
            .or_else(|| self.data.site_base_url.clone())
            .unwrap_or_else(|| DEFAULT_SITE_BASE_URL.to_string())
    }

    /// Resolve the raw Github content base URL: env TROVU_RAW_GITHUB_BASE_URL
    /// > settings file > default.
    pub fn raw_github_base_url(&self) -> String {
        env_override("TROVU_RAW_GITHUB_BASE_URL")
            .or_else(|| self.data.raw_github_base_url.clone())
            .unwrap_or_else(|| DEFAULT_RAW_GITHUB_BASE_URL.to_string())
    }

    /// Resolve the IP-geolocation endpoint used for country fallback.
    pub fn ip_info_url(&self) -> String {
        env_override("TROVU_IP_INFO_URL")
            .or_else(|| self.data.ip_info_url.clone())
            .unwrap_or_else(|| DEFAULT_IP_INFO_URL.to_string())
    }

    pub fn user_agent(&self) -> String {
        env_override("TROVU_USER_AGENT")
            .or_else(|| self.data.user_agent.clone())
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string())
    }

    pub fn timeout_ms(&self) -> u64 {
        env_override("TROVU_HTTP_TIMEOUT_MS")
            .and_then(|value| value.parse::<u64>().ok())
            .or(self.data.timeout_ms)
            .unwrap_or(DEFAULT_TIMEOUT_MS)
    }
}

fn env_override(name: &str) -> Option<String> {
    let value = env::var(name).ok()?;
    let trimmed = value.trim().to_string();
    if trimmed.is_empty() { None } else { Some(trimmed) }
}

/// Load settings from a TOML file. Returns defaults if the file doesn't exist.
pub fn load_settings(path: &Path) -> Result<Settings> {
    if !path.exists() {
        return Ok(Settings::default());
    }
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let parsed: Settings =
        toml::from_str(&content).with_context(|| format!("failed to parse {}", path.display()))?;
    Ok(parsed)
}
