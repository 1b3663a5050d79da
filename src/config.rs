//! Configuration types for album-mirror

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// One remote collection to mirror
///
/// Collections are configured externally and read-only to the core; identity
/// is the `id`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CollectionConfig {
    /// Service-assigned collection identifier
    pub id: String,

    /// Optional display name, used as a directory-name suffix
    #[serde(default)]
    pub name: Option<String>,

    /// Whether this collection participates in runs (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// Local storage configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Base directory all collections are mirrored under (default: "./backups")
    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
        }
    }
}

/// Download pipeline behavior
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadOptions {
    /// Maximum concurrently executing download tasks (default: 3)
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Retries after the initial attempt of a single asset fetch (default: 3)
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    /// Fixed delay between attempts, in milliseconds (default: 2000)
    ///
    /// Deliberately non-exponential; see the crate documentation for the
    /// tradeoff.
    #[serde(default = "default_retry_delay", with = "duration_ms_serde")]
    pub retry_delay: Duration,

    /// Per-request network timeout, in milliseconds (default: 30000)
    #[serde(default = "default_timeout", with = "duration_ms_serde")]
    pub timeout: Duration,

    /// Skip assets whose destination file already exists on disk (default: true)
    #[serde(default = "default_true")]
    pub skip_existing: bool,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            retry_attempts: default_retry_attempts(),
            retry_delay: default_retry_delay(),
            timeout: default_timeout(),
            skip_existing: true,
        }
    }
}

/// Catalog enumeration behavior
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CatalogOptions {
    /// Items requested per page (default: 36, the service's batch size)
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Mandatory delay between page requests, in milliseconds (default: 1000)
    #[serde(default = "default_page_delay", with = "duration_ms_serde")]
    pub page_delay: Duration,

    /// Maximum albums requested in one listing call (default: 1000)
    #[serde(default = "default_album_list_limit")]
    pub album_list_limit: usize,
}

impl Default for CatalogOptions {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            page_delay: default_page_delay(),
            album_list_limit: default_album_list_limit(),
        }
    }
}

/// Recurring trigger configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Whether the recurring trigger may be started (default: false)
    #[serde(default)]
    pub enabled: bool,

    /// Five-field cron expression evaluated in local time
    #[serde(default)]
    pub cron: String,

    /// Free-form description shown in logs instead of the raw expression
    #[serde(default)]
    pub description: Option<String>,
}

/// Main configuration for the backup orchestrator
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Remote collections to mirror (at least one enabled entry required)
    pub collections: Vec<CollectionConfig>,

    /// Local storage settings
    #[serde(default)]
    pub storage: StorageConfig,

    /// Download pipeline settings
    #[serde(default)]
    pub download: DownloadOptions,

    /// Catalog enumeration settings
    #[serde(default)]
    pub catalog: CatalogOptions,

    /// Recurring trigger settings
    #[serde(default)]
    pub schedule: ScheduleConfig,
}

impl Config {
    /// Validate the configuration before constructing an orchestrator
    ///
    /// An empty collection set (or one with no enabled entry) is fatal at
    /// startup; a run over nothing would silently report success forever.
    pub fn validate(&self) -> Result<()> {
        if self.collections.is_empty() {
            return Err(Error::config("no collections configured", "collections"));
        }
        if !self.collections.iter().any(|c| c.enabled) {
            return Err(Error::config("no enabled collections", "collections"));
        }
        if self.download.max_concurrent == 0 {
            return Err(Error::config(
                "max_concurrent must be at least 1",
                "download.max_concurrent",
            ));
        }
        if self.catalog.page_size == 0 {
            return Err(Error::config(
                "page_size must be at least 1",
                "catalog.page_size",
            ));
        }
        Ok(())
    }

    /// Enabled collections in configuration order
    pub fn enabled_collections(&self) -> impl Iterator<Item = &CollectionConfig> {
        self.collections.iter().filter(|c| c.enabled)
    }
}

fn default_true() -> bool {
    true
}

fn default_base_dir() -> PathBuf {
    PathBuf::from("./backups")
}

fn default_max_concurrent() -> usize {
    3
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_delay() -> Duration {
    Duration::from_millis(2000)
}

fn default_timeout() -> Duration {
    Duration::from_millis(30_000)
}

fn default_page_size() -> usize {
    36
}

fn default_page_delay() -> Duration {
    Duration::from_millis(1000)
}

fn default_album_list_limit() -> usize {
    1000
}

// Durations travel as integer milliseconds in config files
mod duration_ms_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
