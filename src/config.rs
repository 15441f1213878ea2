use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

pub const DEFAULT_PAGE_SIZE: u32 = 500;
pub const DEFAULT_CONFIG_FILE: &str = "badge-analytics.toml";

/// Values read from the optional TOML file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub api_url: Option<String>,
    pub token: Option<String>,
    pub organization_id: Option<u64>,
    pub page_size: Option<u32>,
}

impl FileConfig {
    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        toml::from_str(content).context("invalid configuration file")
    }

    /// Reads `path` when given; otherwise `badge-analytics.toml` in the working
    /// directory if it exists.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let (path, required) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
        };

        if !required && !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        tracing::debug!(path = %path.display(), "Loaded configuration file");
        Self::from_toml(&content)
    }
}

/// Values given on the command line or through the environment.
#[derive(Debug, Default)]
pub struct Overrides {
    pub api_url: Option<String>,
    pub token: Option<String>,
    pub organization_id: Option<u64>,
    pub page_size: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub api_url: String,
    pub token: String,
    pub organization_id: u64,
    pub page_size: u32,
}

impl Settings {
    /// Command line and environment win over the file; the page size falls back to 500.
    pub fn resolve(overrides: Overrides, file: FileConfig) -> anyhow::Result<Self> {
        let api_url = overrides
            .api_url
            .or(file.api_url)
            .context("API URL must be set (--api-url, BADGE_API_URL or api_url in the config file)")?;
        let token = overrides
            .token
            .or(file.token)
            .context("API token must be set (--token, BADGE_API_TOKEN or token in the config file)")?;
        let organization_id = overrides.organization_id.or(file.organization_id).context(
            "organization must be set (--org, BADGE_ORG_ID or organization_id in the config file)",
        )?;
        let page_size = overrides
            .page_size
            .or(file.page_size)
            .unwrap_or(DEFAULT_PAGE_SIZE);

        if page_size == 0 {
            anyhow::bail!("page size must be at least 1");
        }

        Ok(Self {
            api_url,
            token,
            organization_id,
            page_size,
        })
    }
}
