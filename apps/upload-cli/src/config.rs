//! CLI configuration.
//!
//! Configuration is stored as TOML:
//! - Linux: `~/.config/capyupload/config.toml`
//! - Windows: `%APPDATA%/capyupload/config.toml`
//!
//! ```toml
//! endpoint = "https://uploads.example.com"
//! bucket = "media"
//!
//! [upload]
//! concurrency = 6
//! metadata = { owner = "ops" }
//! ```

use std::path::{Path, PathBuf};

use anyhow::Context;
use capyupload_uploader::{UploadOptions, UploadOptionsOverrides};
use serde::{Deserialize, Serialize};

/// CLI configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Base URL of the multipart upload service.
    #[serde(default)]
    pub endpoint: String,

    /// Target storage bucket.
    #[serde(default)]
    pub bucket: String,

    /// Directory for resume records (defaults next to the config file).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resume_dir: Option<PathBuf>,

    /// Upload option overrides.
    #[serde(default)]
    pub upload: UploadOptionsOverrides,
}

impl Config {
    /// Loads `path`, or the default location when `None`.
    ///
    /// A missing default file yields the default configuration; a missing
    /// explicit file is an error.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(path) => Self::load_from(path),
            None => {
                let path = config_dir()?.join("config.toml");
                if path.exists() {
                    Self::load_from(&path)
                } else {
                    tracing::debug!(path = %path.display(), "no configuration file, using defaults");
                    Ok(Self::default())
                }
            }
        }
    }

    fn load_from(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        tracing::debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// Effective upload options: defaults with the configured overrides.
    pub fn upload_options(&self) -> UploadOptions {
        UploadOptions::default().apply(self.upload.clone())
    }

    /// Directory of the file-backed resume store.
    pub fn resume_dir(&self) -> anyhow::Result<PathBuf> {
        match &self.resume_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(config_dir()?.join("resume")),
        }
    }
}

/// Returns the platform-specific configuration directory.
fn config_dir() -> anyhow::Result<PathBuf> {
    #[cfg(target_os = "linux")]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        Ok(PathBuf::from(home).join(".config").join("capyupload"))
    }

    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        Ok(PathBuf::from(appdata).join("capyupload"))
    }

    #[cfg(not(any(target_os = "linux", target_os = "windows")))]
    {
        Ok(PathBuf::from("/tmp/capyupload"))
    }
}
