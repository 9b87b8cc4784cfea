//! Startup configuration
//!
//! Read from a TOML or JSON file; every field has a default so an absent file
//! or a partial one is fine.

use crate::client::DEFAULT_ADDR;
use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Files looked for in the working directory when no path is given
pub const DEFAULT_FILES: [&str; 2] = ["padbridge.toml", "padbridge.json"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Json,
}

impl ConfigFormat {
    pub fn from_path(path: &Path) -> Result<Self> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("toml") => Ok(Self::Toml),
            Some(ext) if ext.eq_ignore_ascii_case("json") => Ok(Self::Json),
            _ => bail!("Unsupported config file type: {}", path.display()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub viiper: ViiperConfig,
    pub input: InputConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViiperConfig {
    /// host:port of the bus service API
    pub address: String,
    pub connect_timeout_ms: u64,
}

impl Default for ViiperConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDR.to_string(),
            connect_timeout_ms: 3000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    pub poll_interval_ms: u64,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 4,
        }
    }
}

impl Config {
    pub fn parse(contents: &str, format: ConfigFormat) -> Result<Self> {
        let config = match format {
            ConfigFormat::Toml => toml::from_str(contents).context("Invalid TOML config")?,
            ConfigFormat::Json => serde_json::from_str(contents).context("Invalid JSON config")?,
        };
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let format = ConfigFormat::from_path(path)?;
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::parse(&contents, format)
            .with_context(|| format!("Failed to load config {}", path.display()))
    }

    /// Load `path` if given, else the first default file present, else defaults
    pub fn discover(path: Option<&Path>) -> Result<(Self, Option<PathBuf>)> {
        if let Some(path) = path {
            return Ok((Self::load(path)?, Some(path.to_path_buf())));
        }

        for name in DEFAULT_FILES {
            let candidate = PathBuf::from(name);
            if candidate.is_file() {
                return Ok((Self::load(&candidate)?, Some(candidate)));
            }
        }
        Ok((Self::default(), None))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.input.poll_interval_ms.max(1))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.viiper.connect_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config = Config::parse("", ConfigFormat::Toml).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.viiper.address, "localhost:3242");
        assert_eq!(config.connect_timeout(), Duration::from_secs(3));
        assert_eq!(config.poll_interval(), Duration::from_millis(4));
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let config = Config::parse(
            "[viiper]\naddress = \"10.0.0.2:3242\"\n",
            ConfigFormat::Toml,
        )
        .unwrap();
        assert_eq!(config.viiper.address, "10.0.0.2:3242");
        assert_eq!(config.viiper.connect_timeout_ms, 3000);
        assert_eq!(config.input.poll_interval_ms, 4);
    }

    #[test]
    fn json_is_accepted() {
        let config = Config::parse(r#"{"input": {"poll_interval_ms": 10}}"#, ConfigFormat::Json)
            .unwrap();
        assert_eq!(config.poll_interval(), Duration::from_millis(10));
    }

    #[test]
    fn zero_poll_interval_is_clamped() {
        let config = Config::parse("[input]\npoll_interval_ms = 0\n", ConfigFormat::Toml).unwrap();
        assert_eq!(config.poll_interval(), Duration::from_millis(1));
    }

    #[test]
    fn format_follows_extension() {
        assert_eq!(
            ConfigFormat::from_path(Path::new("a/padbridge.TOML")).unwrap(),
            ConfigFormat::Toml
        );
        assert_eq!(
            ConfigFormat::from_path(Path::new("padbridge.json")).unwrap(),
            ConfigFormat::Json
        );
        assert!(ConfigFormat::from_path(Path::new("padbridge.yaml")).is_err());
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        assert!(Config::discover(Some(Path::new("/nonexistent/padbridge.toml"))).is_err());
    }
}
