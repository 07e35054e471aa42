//! Configuration passed to the programmer components at construction time.
//!
//! Nothing in this crate reads the environment or configuration files on its
//! own; loading and layering is done by the application.

use std::{path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{flashrom::DEFAULT_PROGRAMMER, runner::Elevation};

/// The public HDZero release catalog.
pub const DEFAULT_API_BASE: &str = "https://hdzero.go-next.co";

/// Complete configuration of the programmer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Remote catalog settings.
    pub catalog: CatalogConfig,
    /// How to find and drive `flashrom`.
    pub flashrom: FlashromConfig,
    /// How to obtain privileges for running `flashrom`.
    pub elevation: Elevation,
    /// Where backups are written. Defaults to the home directory.
    pub backup_dir: Option<PathBuf>,
}

/// Settings of the release catalog client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CatalogConfig {
    /// Base URL of the catalog API, without the `/api` suffix.
    pub api_base: String,
    /// Timeout for device and firmware listings, in seconds.
    pub listing_timeout_secs: u64,
    /// Timeout for firmware downloads, in seconds.
    pub download_timeout_secs: u64,
    /// Timeout for device pictures, in seconds.
    pub image_timeout_secs: u64,
}

impl CatalogConfig {
    /// Timeout applied to listing requests.
    pub fn listing_timeout(&self) -> Duration {
        Duration::from_secs(self.listing_timeout_secs)
    }

    /// Timeout applied to firmware downloads.
    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }

    /// Timeout applied to device picture requests.
    pub fn image_timeout(&self) -> Duration {
        Duration::from_secs(self.image_timeout_secs)
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            listing_timeout_secs: 15,
            download_timeout_secs: 30,
            image_timeout_secs: 10,
        }
    }
}

/// Settings for locating and invoking `flashrom`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FlashromConfig {
    /// Explicit path to the `flashrom` binary. Searched for when unset.
    pub path: Option<PathBuf>,
    /// `flashrom` programmer name passed with `-p`.
    pub programmer: String,
}

impl Default for FlashromConfig {
    fn default() -> Self {
        Self {
            path: None,
            programmer: DEFAULT_PROGRAMMER.to_string(),
        }
    }
}
