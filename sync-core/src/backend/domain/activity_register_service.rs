//! Activity register sync.
//!
//! Keeps the list of scheduled activities for one kid and reconciles it
//! against both databases. A register may live in the owner's partition (made
//! by the parent, or by the child through the share) or in the child's own
//! partition (made before the profile was shared), so neither side alone is
//! complete.
//!
//! ## Key Responsibilities
//!
//! - **Reconcile**: union of both databases, deduplicated by identity, sorted by date
//! - **Partial results**: one unreadable database degrades to a warning
//! - **Scheduling**: catalog-validated creation of new registers
//! - **Completion awards**: the activity's coins are credited exactly once, on
//!   the transition that first completes it

use chrono::{DateTime, Utc};
use log::{error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use crate::backend::domain::coin_ledger::CoinLedger;
use crate::backend::domain::commands::activities::StatusChangeResult;
use crate::backend::domain::commands::merge::MergeOutcome;
use crate::backend::domain::context::ActorContext;
use crate::backend::domain::errors::{SyncError, SyncResult};
use crate::backend::domain::models::{ActivityId, Catalog, Saved, ScheduledActivityRegister};
use crate::backend::domain::state::{ObservableState, Observed};
use crate::backend::storage::codec::{FIELD_KID_ID, FIELD_KID_REFERENCE};
use crate::backend::storage::orchestrator::SyncOrchestrator;
use crate::backend::storage::record::{FieldValue, RecordFilter, RecordId};
use shared::ActivityStatus;

#[derive(Clone)]
pub struct ActivityRegisterService {
    kid_id: RecordId,
    orchestrator: SyncOrchestrator,
    ledger: CoinLedger,
    catalog: Arc<dyn Catalog>,
    state: ObservableState<Vec<Saved<ScheduledActivityRegister>>>,
}

fn sort_by_date(registers: &mut [Saved<ScheduledActivityRegister>]) {
    registers.sort_by(|a, b| {
        a.value
            .date
            .cmp(&b.value.date)
            .then_with(|| a.id().name.cmp(&b.id().name))
    });
}

impl ActivityRegisterService {
    pub fn new(
        kid_id: RecordId,
        orchestrator: SyncOrchestrator,
        ledger: CoinLedger,
        catalog: Arc<dyn Catalog>,
    ) -> Self {
        Self {
            kid_id,
            orchestrator,
            ledger,
            catalog,
            state: ObservableState::new(Vec::new()),
        }
    }

    pub fn registers(&self) -> Vec<Saved<ScheduledActivityRegister>> {
        self.state.value()
    }

    pub fn snapshot(&self) -> Observed<Vec<Saved<ScheduledActivityRegister>>> {
        self.state.get()
    }

    pub fn subscribe(&self) -> watch::Receiver<Observed<Vec<Saved<ScheduledActivityRegister>>>> {
        self.state.subscribe()
    }

    /// Registers referencing the kid by id string or by reference
    fn kid_filter(&self) -> RecordFilter {
        RecordFilter::AnyOf(vec![
            RecordFilter::equals(FIELD_KID_ID, FieldValue::String(self.kid_id.name.clone())),
            RecordFilter::equals(FIELD_KID_REFERENCE, FieldValue::Reference(self.kid_id.clone())),
        ])
    }

    /// Rebuild the register list from both databases
    pub async fn reconcile(&self, ctx: &ActorContext) -> SyncResult<MergeOutcome<Saved<ScheduledActivityRegister>>> {
        info!("Reconciling activity registers for kid {}", self.kid_id);
        self.state.set_loading(true);

        match self
            .orchestrator
            .fetch_across_partitions::<ScheduledActivityRegister>(ctx, &self.kid_id, &self.kid_filter())
            .await
        {
            Ok(mut outcome) => {
                sort_by_date(&mut outcome.items);
                let warning = if outcome.warnings.is_empty() {
                    None
                } else {
                    Some(
                        outcome
                            .warnings
                            .iter()
                            .map(|w| w.message.as_str())
                            .collect::<Vec<_>>()
                            .join(" "),
                    )
                };
                self.state.finish(outcome.items.clone(), warning);
                info!(
                    "Kid {} has {} scheduled activities ({} warnings)",
                    self.kid_id,
                    outcome.items.len(),
                    outcome.warnings.len()
                );
                Ok(outcome)
            }
            Err(e) => {
                error!("Reconcile failed for kid {}: {}", self.kid_id, e);
                self.state.fail(e.user_message());
                Err(e)
            }
        }
    }

    /// Schedule a catalog activity for the kid
    pub async fn schedule(
        &self,
        ctx: &ActorContext,
        activity_id: ActivityId,
        date: DateTime<Utc>,
        duration: Duration,
    ) -> SyncResult<Saved<ScheduledActivityRegister>> {
        if !ctx.is_owner() {
            return Err(SyncError::AccessDenied("only a parent can schedule activities".to_string()));
        }
        let activity = self
            .catalog
            .activity_by_id(&activity_id)
            .ok_or_else(|| SyncError::UnknownCatalogEntry {
                kind: "activity",
                id: activity_id.to_string(),
            })?;

        info!("Scheduling {} for kid {} at {}", activity.name, self.kid_id, date);
        let register = ScheduledActivityRegister::new(&self.kid_id, activity_id, date, duration);
        let saved = self.orchestrator.create_for_kid(ctx, &self.kid_id, register).await?;

        self.state.update(|state| {
            state.value.push(saved.clone());
            sort_by_date(&mut state.value);
        });
        Ok(saved)
    }

    /// Move a register to `status`, crediting the activity's coins when this
    /// transition is the one that first completes it
    pub async fn update_status(
        &self,
        ctx: &ActorContext,
        register: &RecordId,
        status: ActivityStatus,
    ) -> SyncResult<StatusChangeResult> {
        let mut previous = ActivityStatus::default();
        let saved = self
            .orchestrator
            .modify_with_retry::<ScheduledActivityRegister, _>(ctx, &self.kid_id, register, |r| {
                previous = r.status;
                r.status = status;
                Ok(())
            })
            .await?;
        info!("Register {} moved from {:?} to {:?}", register, previous, status);

        let mut result = StatusChangeResult {
            register: saved.clone(),
            coins_awarded: 0,
            balance: None,
        };

        if status.is_completed() && !previous.is_completed() {
            let coins = match self.catalog.activity_by_id(&saved.value.activity_id) {
                Some(activity) => activity.coins,
                None => {
                    warn!("Activity {} is not in the catalog, awarding nothing", saved.value.activity_id);
                    0
                }
            };

            if coins > 0 {
                match self.ledger.apply_delta(ctx, coins, "activity completed").await {
                    Ok(balance) => {
                        result.coins_awarded = coins;
                        result.balance = Some(balance);
                    }
                    Err(e) => {
                        self.revert_status(ctx, register, previous).await;
                        return Err(e);
                    }
                }
            }
        }

        self.state.update(|state| {
            if let Some(entry) = state.value.iter_mut().find(|r| r.id() == result.register.id()) {
                *entry = result.register.clone();
            }
        });
        Ok(result)
    }

    /// Undo a status change whose coin award failed
    async fn revert_status(&self, ctx: &ActorContext, register: &RecordId, previous: ActivityStatus) {
        let reverted = self
            .orchestrator
            .modify_with_retry::<ScheduledActivityRegister, _>(ctx, &self.kid_id, register, |r| {
                r.status = previous;
                Ok(())
            })
            .await;
        if let Err(e) = reverted {
            error!(
                "Register {} stays completed without its coin award: {}",
                register, e
            );
        }
    }

    pub async fn remove(&self, ctx: &ActorContext, register: &Saved<ScheduledActivityRegister>) -> SyncResult<bool> {
        info!("Removing register {} for kid {}", register.id(), self.kid_id);
        let deleted = self.orchestrator.delete_for_kid(ctx, &self.kid_id, register).await?;
        self.state.update(|state| state.value.retain(|r| r.id() != register.id()));
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::domain::models::Persisted;
    use crate::backend::storage::memory::test_utils::{TestEnvironment, BED_ACTIVITY};
    use crate::backend::storage::memory::Fault;
    use crate::backend::storage::record::{Database, RecordType};
    use chrono::TimeZone;

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, day, 17, 0, 0).unwrap()
    }

    /// Two registers in the guest's own partition and one in the owner's
    async fn seed_three_registers(env: &TestEnvironment) {
        let guest_partition = env.guest.orchestrator.ensure_partition("KidZone").await.unwrap();
        for day in [5, 1] {
            let mut legacy = ScheduledActivityRegister::new(env.kid.id(), BED_ACTIVITY, at(day), Duration::from_secs(600));
            legacy.kid_reference = None;
            env.guest_client()
                .save(&Persisted::Unsaved(legacy), Database::Private, &guest_partition)
                .await
                .unwrap();
        }

        env.owner_session()
            .activities
            .schedule(&env.owner_ctx, BED_ACTIVITY, at(3), Duration::from_secs(600))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_reconcile_merges_and_sorts_by_date() {
        let env = TestEnvironment::new().await.unwrap();
        seed_three_registers(&env).await;

        let session = env.guest_session();
        let outcome = session.activities.reconcile(&env.guest_ctx).await.unwrap();

        let days: Vec<_> = outcome.items.iter().map(|r| r.value.date).collect();
        assert_eq!(days, vec![at(1), at(3), at(5)]);
        assert!(outcome.warnings.is_empty());
        assert_eq!(session.activities.registers().len(), 3);
        assert!(session.activities.snapshot().last_error.is_none());
    }

    #[tokio::test]
    async fn test_reconcile_degrades_to_warning_when_shared_fails() {
        let env = TestEnvironment::new().await.unwrap();
        seed_three_registers(&env).await;
        env.cloud.inject(Fault::Unavailable { database: Database::Shared }).unwrap();

        let session = env.guest_session();
        let outcome = session.activities.reconcile(&env.guest_ctx).await.unwrap();

        assert_eq!(outcome.items.len(), 2);
        assert_eq!(outcome.warnings.len(), 1);
        assert_eq!(outcome.warnings[0].database, Database::Shared);
        assert!(session.activities.snapshot().last_error.is_some());
    }

    #[tokio::test]
    async fn test_reconcile_fails_when_both_databases_fail() {
        let env = TestEnvironment::new().await.unwrap();
        seed_three_registers(&env).await;
        env.cloud.inject(Fault::Unavailable { database: Database::Shared }).unwrap();
        env.cloud.inject(Fault::Unavailable { database: Database::Private }).unwrap();

        let session = env.guest_session();
        assert!(session.activities.reconcile(&env.guest_ctx).await.is_err());
        assert!(session.activities.snapshot().last_error.is_some());
    }

    #[tokio::test]
    async fn test_guest_cannot_schedule() {
        let env = TestEnvironment::new().await.unwrap();
        let err = env
            .guest_session()
            .activities
            .schedule(&env.guest_ctx, BED_ACTIVITY, at(1), Duration::ZERO)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::AccessDenied(_)));
    }

    #[tokio::test]
    async fn test_schedule_rejects_unknown_activity() {
        let env = TestEnvironment::new().await.unwrap();
        let err = env
            .owner_session()
            .activities
            .schedule(&env.owner_ctx, ActivityId(uuid::Uuid::nil()), at(1), Duration::ZERO)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::UnknownCatalogEntry { kind: "activity", .. }));
    }

    #[tokio::test]
    async fn test_completion_awards_coins_once() {
        let env = TestEnvironment::new().await.unwrap();
        let owner = env.owner_session();
        let register = owner
            .activities
            .schedule(&env.owner_ctx, BED_ACTIVITY, at(2), Duration::from_secs(900))
            .await
            .unwrap();

        let guest = env.guest_session();
        guest.ledger.load(&env.guest_ctx).await.unwrap();
        let first = guest
            .activities
            .update_status(&env.guest_ctx, register.id(), ActivityStatus::Completed)
            .await
            .unwrap();
        assert_eq!(first.coins_awarded, 5);
        assert_eq!(first.balance, Some(105));

        let second = guest
            .activities
            .update_status(&env.guest_ctx, register.id(), ActivityStatus::Completed)
            .await
            .unwrap();
        assert_eq!(second.coins_awarded, 0);
        assert_eq!(env.remote_balance().await.unwrap(), 105);
    }

    #[tokio::test]
    async fn test_failed_award_reverts_status() {
        let env = TestEnvironment::new().await.unwrap();
        let owner = env.owner_session();
        owner.ledger.load(&env.owner_ctx).await.unwrap();
        let register = owner
            .activities
            .schedule(&env.owner_ctx, BED_ACTIVITY, at(2), Duration::from_secs(900))
            .await
            .unwrap();
        env.cloud.inject_times(Fault::Conflict { record_type: RecordType::Kid }, 3).unwrap();

        let err = owner
            .activities
            .update_status(&env.owner_ctx, register.id(), ActivityStatus::Completed)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::SyncFailed { .. }));

        let stored: Saved<ScheduledActivityRegister> = owner
            .activities
            .orchestrator
            .fetch_one(&env.owner_ctx, env.kid.id(), register.id())
            .await
            .unwrap();
        assert_eq!(stored.value.status, ActivityStatus::NotStarted);
        assert_eq!(env.remote_balance().await.unwrap(), 100);
    }

    #[tokio::test]
    async fn test_remove_deletes_register() {
        let env = TestEnvironment::new().await.unwrap();
        let owner = env.owner_session();
        let register = owner
            .activities
            .schedule(&env.owner_ctx, BED_ACTIVITY, at(2), Duration::from_secs(900))
            .await
            .unwrap();

        assert!(owner.activities.remove(&env.owner_ctx, &register).await.unwrap());
        assert!(owner.activities.registers().is_empty());
        assert_eq!(env.cloud.record_count(RecordType::ScheduledActivity).unwrap(), 0);
    }
}
