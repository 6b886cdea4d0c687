//! # Sync Configuration
//!
//! Tunables for the synchronization core, read from a single YAML file.
//!
//! ## YAML Format
//!
//! ```yaml
//! partition_name: "KidZone"
//! max_modify_attempts: 3
//! partition_retry_delay_ms: 250
//! operation_timeout_ms: 15000
//! default_share_permission: read_write
//! compensation_delete_attempts: 3
//! ```
//!
//! Every key is optional; a missing key (or a missing file) falls back to the
//! default shown above.

use anyhow::{Context, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use shared::SharePermission;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Name of the partition every owner keeps its kid profiles in
    pub partition_name: String,
    /// Bound on the refetch-reapply-modify loop
    pub max_modify_attempts: u32,
    /// Pause before the single retry of a failed partition creation
    pub partition_retry_delay_ms: u64,
    /// Applied to every individual remote call
    pub operation_timeout_ms: u64,
    pub default_share_permission: SharePermission,
    /// Attempts at deleting a reward record when a purchase is rolled back
    pub compensation_delete_attempts: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            partition_name: "KidZone".to_string(),
            max_modify_attempts: 3,
            partition_retry_delay_ms: 250,
            operation_timeout_ms: 15_000,
            default_share_permission: SharePermission::ReadWrite,
            compensation_delete_attempts: 3,
        }
    }
}

impl SyncConfig {
    /// Load the configuration file, falling back to defaults when it does not exist
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            warn!("Config file {} not found, using defaults", path.display());
            return Ok(Self::default());
        }

        let yaml = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config = Self::from_yaml_str(&yaml)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        info!("Loaded sync config from {}", path.display());
        Ok(config)
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: SyncConfig = if yaml.trim().is_empty() {
            SyncConfig::default()
        } else {
            serde_yaml::from_str(yaml).context("Failed to parse sync config YAML")?
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.partition_name.trim().is_empty() {
            anyhow::bail!("partition_name cannot be empty");
        }
        if self.max_modify_attempts == 0 {
            anyhow::bail!("max_modify_attempts must be at least 1");
        }
        if self.compensation_delete_attempts == 0 {
            anyhow::bail!("compensation_delete_attempts must be at least 1");
        }
        if self.operation_timeout_ms == 0 {
            anyhow::bail!("operation_timeout_ms must be positive");
        }
        Ok(())
    }

    pub fn partition_retry_delay(&self) -> Duration {
        Duration::from_millis(self.partition_retry_delay_ms)
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }
}
