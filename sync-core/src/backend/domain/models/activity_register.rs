//! Domain model for a scheduled activity.

use chrono::{DateTime, Utc};
use std::time::Duration;

use super::catalog::ActivityId;
use crate::backend::storage::record::RecordId;
use shared::ActivityStatus;

/// One scheduled occurrence of a catalog activity for a kid
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledActivityRegister {
    /// Record name of the owning kid
    pub kid_id: String,
    /// Reference to the owning kid; older records may only carry `kid_id`
    pub kid_reference: Option<RecordId>,
    pub activity_id: ActivityId,
    pub date: DateTime<Utc>,
    pub duration: Duration,
    pub status: ActivityStatus,
}

impl ScheduledActivityRegister {
    pub fn new(kid: &RecordId, activity_id: ActivityId, date: DateTime<Utc>, duration: Duration) -> Self {
        Self {
            kid_id: kid.name.clone(),
            kid_reference: Some(kid.clone()),
            activity_id,
            date,
            duration,
            status: ActivityStatus::NotStarted,
        }
    }

    pub fn belongs_to(&self, kid: &RecordId) -> bool {
        self.kid_id == kid.name || self.kid_reference.as_ref() == Some(kid)
    }
}
