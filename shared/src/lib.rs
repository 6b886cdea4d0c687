use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Which side of the family link the acting account is on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Parent account that owns the kid aggregate
    Owner,
    /// Child account that reaches the aggregate through a share grant
    Guest,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Owner => write!(f, "owner"),
            Role::Guest => write!(f, "guest"),
        }
    }
}

/// Access level carried by a share grant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SharePermission {
    ReadOnly,
    ReadWrite,
}

impl fmt::Display for SharePermission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SharePermission::ReadOnly => write!(f, "read-only"),
            SharePermission::ReadWrite => write!(f, "read-write"),
        }
    }
}

/// Progress of a scheduled activity.
///
/// The wire code is what the `status` field of a register record holds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActivityStatus {
    #[default]
    NotStarted,
    InProgress,
    Completed,
}

impl ActivityStatus {
    /// Integer stored in the remote record
    pub fn code(&self) -> i64 {
        match self {
            ActivityStatus::NotStarted => 0,
            ActivityStatus::InProgress => 1,
            ActivityStatus::Completed => 2,
        }
    }

    /// Parse the integer stored in the remote record
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(ActivityStatus::NotStarted),
            1 => Some(ActivityStatus::InProgress),
            2 => Some(ActivityStatus::Completed),
            _ => None,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, ActivityStatus::Completed)
    }
}

/// A kid profile as presented to the UI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Kid {
    pub id: String,
    pub name: String,
    pub coins: i64,
    /// True while a share grant is attached to the profile
    pub is_shared: bool,
}

/// Kids visible to the acting account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KidListResponse {
    pub kids: Vec<Kid>,
}

/// A scheduled activity as presented to the UI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledActivity {
    pub id: String,
    pub kid_id: String,
    pub activity_id: Uuid,
    /// Scheduled start (RFC 3339)
    pub date: String,
    pub duration_secs: f64,
    pub status: ActivityStatus,
}

/// A purchased reward as presented to the UI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectedReward {
    pub id: String,
    pub kid_id: String,
    pub reward_id: i64,
    /// When the reward was bought (RFC 3339)
    pub date_collected: String,
    pub is_delivered: bool,
}

/// Observable coin balance
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BalanceSnapshot {
    pub kid_id: Option<String>,
    pub balance: i64,
    pub is_loading: bool,
    pub last_error: Option<String>,
}

/// Observable list of scheduled activities
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegisterListSnapshot {
    pub registers: Vec<ScheduledActivity>,
    pub is_loading: bool,
    pub last_error: Option<String>,
}

/// Observable list of collected rewards
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RewardListSnapshot {
    pub rewards: Vec<CollectedReward>,
    pub is_loading: bool,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplyDeltaRequest {
    /// Coins to add (positive) or remove (negative)
    pub amount: i64,
    /// Short reason shown in logs, e.g. "chore"
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplyDeltaResponse {
    pub balance: i64,
    pub success_message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseRequest {
    pub reward_id: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseResponse {
    pub reward: CollectedReward,
    pub balance: i64,
    pub success_message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconcileResponse {
    pub registers: Vec<ScheduledActivity>,
    /// Non-fatal problems, one per partition that could not be read
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShareResponse {
    pub url: String,
    pub permission: SharePermission,
    pub participant_count: usize,
    pub success_message: String,
}
