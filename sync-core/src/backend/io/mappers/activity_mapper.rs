use crate::backend::domain::commands::merge::MergeOutcome;
use crate::backend::domain::models::{Saved, ScheduledActivityRegister};
use crate::backend::domain::Observed;
use shared::{ReconcileResponse, RegisterListSnapshot, ScheduledActivity};

/// Mapper from scheduled activity registers to the shared DTOs.
pub struct ActivityMapper;

impl ActivityMapper {
    pub fn to_dto(domain: Saved<ScheduledActivityRegister>) -> ScheduledActivity {
        ScheduledActivity {
            id: domain.id().name.clone(),
            kid_id: domain.value.kid_id,
            activity_id: domain.value.activity_id.0,
            date: domain.value.date.to_rfc3339(),
            duration_secs: domain.value.duration.as_secs_f64(),
            status: domain.value.status,
        }
    }

    pub fn to_reconcile_response(outcome: MergeOutcome<Saved<ScheduledActivityRegister>>) -> ReconcileResponse {
        ReconcileResponse {
            registers: outcome.items.into_iter().map(Self::to_dto).collect(),
            warnings: outcome
                .warnings
                .into_iter()
                .map(|w| format!("{} database: {}", w.database, w.message))
                .collect(),
        }
    }

    pub fn to_snapshot(observed: Observed<Vec<Saved<ScheduledActivityRegister>>>) -> RegisterListSnapshot {
        RegisterListSnapshot {
            registers: observed.value.into_iter().map(Self::to_dto).collect(),
            is_loading: observed.is_loading,
            last_error: observed.last_error,
        }
    }
}
