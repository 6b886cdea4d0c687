//! Domain model for a purchased reward.

use chrono::{DateTime, Utc};

use super::catalog::RewardId;
use crate::backend::storage::record::RecordId;

#[derive(Debug, Clone, PartialEq)]
pub struct CollectedReward {
    pub kid_id: String,
    pub kid_reference: Option<RecordId>,
    pub reward_id: RewardId,
    pub date_collected: DateTime<Utc>,
    /// Flipped by the parent once the reward has been handed over
    pub is_delivered: bool,
}

impl CollectedReward {
    pub fn new(kid: &RecordId, reward_id: RewardId, date_collected: DateTime<Utc>) -> Self {
        Self {
            kid_id: kid.name.clone(),
            kid_reference: Some(kid.clone()),
            reward_id,
            date_collected,
            is_delivered: false,
        }
    }
}
