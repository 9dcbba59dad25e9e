use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Default platform REST base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.boomi.com/api/rest/v1";

/// Main configuration for the harbor tools.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarborConfig {
    /// Remote platform credentials and endpoints
    #[serde(default)]
    pub platform: PlatformConfig,
    /// Runner tuning
    #[serde(default)]
    pub runner: RunnerConfig,
}

/// Remote platform credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformConfig {
    /// Account the REST calls are scoped to
    #[serde(default)]
    pub account_id: Option<String>,
    /// API user name
    #[serde(default)]
    pub username: Option<String>,
    /// API password or token
    #[serde(default)]
    pub password: Option<String>,
    /// Runtime used when a test names none
    #[serde(default)]
    pub default_atom_id: Option<String>,
    /// REST base URL
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            account_id: None,
            username: None,
            password: None,
            default_atom_id: None,
            base_url: default_base_url(),
        }
    }
}

/// Runner tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Delay between execution polls in milliseconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
        }
    }
}

/// Which settings are present, without revealing their values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigSummary {
    /// Whether all required credentials are present
    pub configured: bool,
    /// Account id presence
    pub account_id: &'static str,
    /// Username presence
    pub username: &'static str,
    /// Password presence
    pub password: &'static str,
    /// Default atom presence
    pub default_atom_id: &'static str,
    /// REST base URL
    pub base_url: String,
}

impl HarborConfig {
    /// Get the default config directory path (`~/.harbor`)
    ///
    /// # Errors
    /// Returns an error if the home directory cannot be determined
    pub fn config_dir() -> Result<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| Error::Other("Could not determine home directory".to_owned()))?;
        Ok(home.join(".harbor"))
    }

    /// Get the default config file path (`~/.harbor/config.toml`)
    ///
    /// # Errors
    /// Returns an error if the home directory cannot be determined
    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load config from the default location, creating it with defaults when absent
    ///
    /// # Errors
    /// Returns an error if the config cannot be read or created
    pub fn load_or_create() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            Self::load_from_file(&config_path)
        } else {
            let config = Self::default();
            config.save_to_file(&config_path)?;
            Ok(config)
        }
    }

    /// Load config from a specific file
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .map_err(|error| Error::Other(format!("Failed to read config: {error}")))?;
        let config: Self = toml::from_str(&contents)?;

        tracing::debug!(
            "Loaded config from {:?}: account_id={}, username={}, password={}",
            path,
            presence(config.platform.account_id.as_ref()),
            presence(config.platform.username.as_ref()),
            presence(config.platform.password.as_ref()),
        );

        Ok(config)
    }

    /// Save config to a specific file
    ///
    /// # Errors
    /// Returns an error if the file cannot be written
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|error| {
                Error::Other(format!("Failed to create config directory: {error}"))
            })?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|error| Error::Other(format!("Failed to serialize config: {error}")))?;

        let header = "# Harbor Configuration File\n\
                      # Platform credentials may also come from BOOMI_ACCOUNT_ID,\n\
                      # BOOMI_USERNAME, BOOMI_PASSWORD and BOOMI_DEFAULT_ATOM_ID\n\n";

        fs::write(path, format!("{header}{contents}"))
            .map_err(|error| Error::Other(format!("Failed to write config: {error}")))?;

        Ok(())
    }

    /// Overlay values from a variable lookup; non-empty values win over the file.
    #[must_use]
    pub fn apply_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let read = |name: &str| lookup(name).filter(|value| !value.is_empty());
        let platform = &mut self.platform;
        if let Some(value) = read("BOOMI_ACCOUNT_ID") {
            platform.account_id = Some(value);
        }
        if let Some(value) = read("BOOMI_USERNAME") {
            platform.username = Some(value);
        }
        if let Some(value) = read("BOOMI_PASSWORD") {
            platform.password = Some(value);
        }
        if let Some(value) = read("BOOMI_DEFAULT_ATOM_ID") {
            platform.default_atom_id = Some(value);
        }
        self
    }

    /// Overlay `BOOMI_*` environment variables.
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        self.apply_overrides(|name| env::var(name).ok())
    }

    /// Whether account, username and password are all present.
    pub fn is_configured(&self) -> bool {
        self.platform.is_configured()
    }

    /// Presence summary for health output.
    pub fn summary(&self) -> ConfigSummary {
        let platform = &self.platform;
        ConfigSummary {
            configured: self.is_configured(),
            account_id: presence(platform.account_id.as_ref()),
            username: presence(platform.username.as_ref()),
            password: presence(platform.password.as_ref()),
            default_atom_id: presence(platform.default_atom_id.as_ref()),
            base_url: platform.base_url.clone(),
        }
    }
}

impl PlatformConfig {
    /// Whether account, username and password are all present.
    pub fn is_configured(&self) -> bool {
        [&self.account_id, &self.username, &self.password]
            .into_iter()
            .all(|field| field.as_deref().is_some_and(|value| !value.is_empty()))
    }
}

fn presence(value: Option<&String>) -> &'static str {
    if value.is_some_and(|text| !text.is_empty()) {
        "set"
    } else {
        "missing"
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_owned()
}

fn default_poll_interval() -> u64 {
    2_000
}
