//! Engine configuration via `vecdex.toml`
//!
//! An [`IndexConfig`] is either built in code or read from a TOML file. The
//! dimension, metric and snapshot path are fixed for the lifetime of an
//! engine; changing them means starting a new engine (and, for dimension or
//! metric, a new snapshot file).

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use vecdex_core::{DistanceMetric, VecdexError, VecdexResult, MAX_DIMENSION};

/// Conventional config file name.
pub const CONFIG_FILE_NAME: &str = "vecdex.toml";

/// Index configuration.
///
/// # Example
///
/// ```toml
/// dimension = 128
/// metric = "l2"
/// snapshot_path = "data/index.vdx"
/// flush_interval_ms = 5000
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Number of components in every vector.
    #[serde(default = "default_dimension")]
    pub dimension: usize,
    /// Scoring metric: `"l2"` or `"cosine"`.
    #[serde(default)]
    pub metric: DistanceMetric,
    /// Location of the snapshot file.
    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: PathBuf,
    /// Background flush interval. `None` disables the flusher.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flush_interval_ms: Option<u64>,
    /// Extra attempts after a flush fails with an I/O error.
    #[serde(default = "default_flush_retries")]
    pub flush_retries: u32,
    /// Backoff step between flush attempts; attempt n waits n × this.
    #[serde(default = "default_flush_retry_backoff_ms")]
    pub flush_retry_backoff_ms: u64,
    /// Remove stale temp files left by interrupted flushes during recovery.
    #[serde(default = "default_true")]
    pub cleanup_temp_on_recover: bool,
    /// Squared L2 distance at which a search hit's confidence reaches 0.
    #[serde(default = "default_distance_normalization_factor")]
    pub distance_normalization_factor: f64,
}

fn default_dimension() -> usize {
    128
}

fn default_snapshot_path() -> PathBuf {
    PathBuf::from("data").join("index.vdx")
}

fn default_flush_retries() -> u32 {
    3
}

fn default_flush_retry_backoff_ms() -> u64 {
    50
}

fn default_true() -> bool {
    true
}

fn default_distance_normalization_factor() -> f64 {
    2.0
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            dimension: default_dimension(),
            metric: DistanceMetric::default(),
            snapshot_path: default_snapshot_path(),
            flush_interval_ms: None,
            flush_retries: default_flush_retries(),
            flush_retry_backoff_ms: default_flush_retry_backoff_ms(),
            cleanup_temp_on_recover: true,
            distance_normalization_factor: default_distance_normalization_factor(),
        }
    }
}

impl IndexConfig {
    /// Config with the given required fields and defaults for the rest.
    pub fn new(dimension: usize, metric: DistanceMetric, snapshot_path: impl Into<PathBuf>) -> Self {
        Self {
            dimension,
            metric,
            snapshot_path: snapshot_path.into(),
            ..Self::default()
        }
    }

    /// Enable the background flusher.
    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval_ms = Some(interval.as_millis() as u64);
        self
    }

    /// Set the flush retry policy.
    pub fn with_flush_retries(mut self, retries: u32, backoff: Duration) -> Self {
        self.flush_retries = retries;
        self.flush_retry_backoff_ms = backoff.as_millis() as u64;
        self
    }

    /// Set the distance at which L2 confidence reaches 0.
    pub fn with_distance_normalization_factor(mut self, factor: f64) -> Self {
        self.distance_normalization_factor = factor;
        self
    }

    /// Background flush interval, if enabled.
    pub fn flush_interval(&self) -> Option<Duration> {
        self.flush_interval_ms.map(Duration::from_millis)
    }

    /// Backoff before retry number `attempt` (1-based).
    pub fn retry_backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.flush_retry_backoff_ms.saturating_mul(attempt as u64))
    }

    /// Check every field.
    ///
    /// # Errors
    ///
    /// Returns `Config` describing the first invalid field.
    pub fn validate(&self) -> VecdexResult<()> {
        if self.dimension == 0 || self.dimension > MAX_DIMENSION {
            return Err(VecdexError::Config(format!(
                "dimension must be between 1 and {}, got {}",
                MAX_DIMENSION, self.dimension
            )));
        }
        if self.snapshot_path.as_os_str().is_empty() {
            return Err(VecdexError::Config("snapshot_path must not be empty".into()));
        }
        if self.snapshot_path.file_name().is_none() {
            return Err(VecdexError::Config(format!(
                "snapshot_path '{}' does not name a file",
                self.snapshot_path.display()
            )));
        }
        if !(self.distance_normalization_factor.is_finite()
            && self.distance_normalization_factor > 0.0)
        {
            return Err(VecdexError::Config(format!(
                "distance_normalization_factor must be a positive number, got {}",
                self.distance_normalization_factor
            )));
        }
        if self.flush_interval_ms == Some(0) {
            return Err(VecdexError::Config(
                "flush_interval_ms must be positive; omit it to disable the flusher".into(),
            ));
        }
        Ok(())
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# vecdex index configuration
#
# Number of components in every vector. Fixed for the life of the index.
dimension = 128

# Scoring metric: "l2" (squared Euclidean distance, lower is better)
# or "cosine" (cosine similarity, higher is better).
metric = "l2"

# Snapshot file. Its directory is created on first flush.
snapshot_path = "data/index.vdx"

# Background flush interval in milliseconds. Omit to flush only on
# explicit save and on shutdown.
# flush_interval_ms = 5000

# Extra attempts after a flush fails with an I/O error, and the backoff
# step between them (attempt n waits n * backoff).
flush_retries = 3
flush_retry_backoff_ms = 50

# Remove temp files left by an interrupted flush during recovery.
cleanup_temp_on_recover = true

# L2 search hits carry confidence = max(0, 1 - distance / factor).
distance_normalization_factor = 2.0
"#
    }

    /// Read, parse and validate config from a file path.
    ///
    /// # Errors
    ///
    /// Returns `Config` if the file cannot be read, parsed or validated.
    pub fn from_file(path: &Path) -> VecdexResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            VecdexError::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        let config = Self::from_toml_str(&content).map_err(|e| match e {
            VecdexError::Config(msg) => {
                VecdexError::Config(format!("{} (in '{}')", msg, path.display()))
            }
            other => other,
        })?;
        Ok(config)
    }

    /// Parse and validate config from TOML text.
    pub fn from_toml_str(content: &str) -> VecdexResult<Self> {
        let config: IndexConfig = toml::from_str(content)
            .map_err(|e| VecdexError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Write the default config file if it does not already exist.
    ///
    /// Returns `Ok(())` whether the file was created or already existed.
    pub fn write_default_if_missing(path: &Path) -> VecdexResult<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml()).map_err(|e| {
                VecdexError::Config(format!(
                    "Failed to write default config file '{}': {}",
                    path.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> VecdexResult<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| VecdexError::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content).map_err(|e| {
            VecdexError::Config(format!(
                "Failed to write config file '{}': {}",
                path.display(),
                e
            ))
        })
    }
}
