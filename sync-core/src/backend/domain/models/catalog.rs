//! Static activity and reward catalogs.
//!
//! The catalog content is maintained outside the core; the core only needs
//! id lookups to validate references and to read coin values and costs. A
//! catalog is loaded once at startup and is read-only afterwards.
//!
//! ## YAML Format
//!
//! ```yaml
//! activities:
//!   - id: 6f1c0a52-8f0e-4b8e-9a57-3d1f2c1b7e10
//!     name: "Make the bed"
//!     coins: 5
//! rewards:
//!   - id: 1
//!     name: "Extra screen time"
//!     cost: 30
//! ```

use anyhow::{Context, Result};
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::Path;
use uuid::Uuid;

/// Catalog id of an activity, stored as a UUID string in register records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActivityId(pub Uuid);

impl fmt::Display for ActivityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Catalog id of a reward, stored as an integer in reward records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RewardId(pub i64);

impl fmt::Display for RewardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub id: ActivityId,
    pub name: String,
    /// Coins awarded when a scheduled occurrence is completed
    pub coins: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reward {
    pub id: RewardId,
    pub name: String,
    pub cost: i64,
}

/// Read-only lookup into the static catalogs
pub trait Catalog: Send + Sync {
    fn activity_by_id(&self, id: &ActivityId) -> Option<Activity>;
    fn reward_by_id(&self, id: RewardId) -> Option<Reward>;
}

#[derive(Debug, Default, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    activities: Vec<Activity>,
    #[serde(default)]
    rewards: Vec<Reward>,
}

/// In-memory catalog built once and shared process-wide
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    activities: HashMap<ActivityId, Activity>,
    rewards: HashMap<RewardId, Reward>,
}

impl StaticCatalog {
    pub fn new(activities: Vec<Activity>, rewards: Vec<Reward>) -> Self {
        Self {
            activities: activities.into_iter().map(|a| (a.id, a)).collect(),
            rewards: rewards.into_iter().map(|r| (r.id, r)).collect(),
        }
    }

    /// Parse a catalog from YAML text
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let file: CatalogFile =
            serde_yaml::from_str(yaml).context("Failed to parse catalog YAML")?;

        if let Some(bad) = file.rewards.iter().find(|r| r.cost <= 0) {
            anyhow::bail!("Reward {} must have a positive cost", bad.id);
        }
        if let Some(bad) = file.activities.iter().find(|a| a.coins < 0) {
            anyhow::bail!("Activity {} cannot award negative coins", bad.id);
        }

        Ok(Self::new(file.activities, file.rewards))
    }

    /// Load a catalog file from disk
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let yaml = fs::read_to_string(path)
            .with_context(|| format!("Failed to read catalog file {}", path.display()))?;
        let catalog = Self::from_yaml_str(&yaml)?;
        info!(
            "Loaded catalog from {} ({} activities, {} rewards)",
            path.display(),
            catalog.activities.len(),
            catalog.rewards.len()
        );
        Ok(catalog)
    }
}

impl Catalog for StaticCatalog {
    fn activity_by_id(&self, id: &ActivityId) -> Option<Activity> {
        self.activities.get(id).cloned()
    }

    fn reward_by_id(&self, id: RewardId) -> Option<Reward> {
        self.rewards.get(&id).cloned()
    }
}
