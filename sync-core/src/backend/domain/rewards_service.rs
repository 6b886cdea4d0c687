//! Rewards transaction manager.
//!
//! A purchase touches two records the store cannot update atomically: a new
//! `CollectedReward` and the kid's coin balance. This service sequences the two
//! writes so that the observable outcome is all or nothing.
//!
//! ## Purchase Sequence
//!
//! 1. Check the cached balance covers the cost; otherwise fail without any remote call
//! 2. Debit the cached balance optimistically
//! 3. Save the `CollectedReward`; on failure restore the cached balance
//! 4. Commit `-cost` to the kid record, refusing to clamp
//! 5. If the commit fails, delete the reward record again, then surface the error
//!
//! A commit that times out is read back before anything is undone. A debit
//! that landed completes the purchase. When the read-back cannot tell, the
//! reward is kept and the balance reloaded, so coins are never taken without
//! a reward.
//!
//! A compensation delete that keeps failing leaves the reward queued in
//! [`RewardsService::pending_compensations`] and surfaces
//! `CompensationFailed`; [`RewardsService::retry_pending_compensations`]
//! drains the queue later.

use chrono::Utc;
use log::{error, info, warn};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

use crate::backend::config::SyncConfig;
use crate::backend::domain::coin_ledger::CoinLedger;
use crate::backend::domain::commands::ledger::DeltaPolicy;
use crate::backend::domain::commands::merge::MergeOutcome;
use crate::backend::domain::commands::rewards::PurchaseResult;
use crate::backend::domain::context::ActorContext;
use crate::backend::domain::errors::{SyncError, SyncResult};
use crate::backend::domain::models::{Catalog, CollectedReward, RewardId, Saved};
use crate::backend::domain::state::{ObservableState, Observed};
use crate::backend::storage::codec::{FIELD_KID_ID, FIELD_KID_REFERENCE};
use crate::backend::storage::orchestrator::SyncOrchestrator;
use crate::backend::storage::record::{FieldValue, RecordFilter, RecordId};

#[derive(Clone)]
pub struct RewardsService {
    kid_id: RecordId,
    orchestrator: SyncOrchestrator,
    ledger: CoinLedger,
    catalog: Arc<dyn Catalog>,
    config: Arc<SyncConfig>,
    state: ObservableState<Vec<Saved<CollectedReward>>>,
    pending: Arc<Mutex<Vec<Saved<CollectedReward>>>>,
}

impl RewardsService {
    pub fn new(
        kid_id: RecordId,
        orchestrator: SyncOrchestrator,
        ledger: CoinLedger,
        catalog: Arc<dyn Catalog>,
        config: Arc<SyncConfig>,
    ) -> Self {
        Self {
            kid_id,
            orchestrator,
            ledger,
            catalog,
            config,
            state: ObservableState::new(Vec::new()),
            pending: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn rewards(&self) -> Vec<Saved<CollectedReward>> {
        self.state.value()
    }

    pub fn snapshot(&self) -> Observed<Vec<Saved<CollectedReward>>> {
        self.state.get()
    }

    pub fn subscribe(&self) -> watch::Receiver<Observed<Vec<Saved<CollectedReward>>>> {
        self.state.subscribe()
    }

    pub fn reward_name(&self, reward_id: RewardId) -> Option<String> {
        self.catalog.reward_by_id(reward_id).map(|reward| reward.name)
    }

    /// Buy `reward_id` from the catalog with the kid's coins
    pub async fn purchase(&self, ctx: &ActorContext, reward_id: RewardId) -> SyncResult<PurchaseResult> {
        let reward = self
            .catalog
            .reward_by_id(reward_id)
            .ok_or_else(|| SyncError::UnknownCatalogEntry {
                kind: "reward",
                id: reward_id.to_string(),
            })?;

        let balance = self.ledger.balance();
        if balance < reward.cost {
            info!(
                "Kid {} cannot afford reward {} ({} < {})",
                self.kid_id, reward.name, balance, reward.cost
            );
            return Err(SyncError::InsufficientFunds {
                balance,
                cost: reward.cost,
            });
        }

        info!("Kid {} purchasing reward {} for {} coins", self.kid_id, reward.name, reward.cost);
        let previous = self.ledger.debit_local(reward.cost);

        let entry = CollectedReward::new(&self.kid_id, reward.id, Utc::now());
        let saved = match self.orchestrator.create_for_kid(ctx, &self.kid_id, entry).await {
            Ok(saved) => saved,
            Err(e) => {
                warn!("Saving collected reward failed, discarding local debit: {}", e);
                self.ledger.restore_local(previous, &e);
                return Err(e);
            }
        };

        match self
            .ledger
            .commit_delta(ctx, -reward.cost, "purchase", previous, DeltaPolicy::RequireFunds)
            .await
        {
            Ok(balance) => {
                self.state.update(|state| {
                    state.value.push(saved.clone());
                    state.value.sort_by_key(|r| r.value.date_collected);
                });
                Ok(PurchaseResult { reward: saved, balance })
            }
            Err(e @ SyncError::CommitUnknown { .. }) => Err(self.keep_unconfirmed(ctx, saved, e).await),
            Err(e) => Err(self.compensate(ctx, saved, e).await),
        }
    }

    /// The debit may have landed, so the reward stays and the cache takes
    /// whatever balance the store now holds.
    async fn keep_unconfirmed(&self, ctx: &ActorContext, reward: Saved<CollectedReward>, failure: SyncError) -> SyncError {
        error!(
            "Debit for reward {} is unconfirmed; keeping the reward: {}",
            reward.id(),
            failure
        );
        self.state.update(|state| {
            state.value.push(reward);
            state.value.sort_by_key(|r| r.value.date_collected);
        });
        if let Err(e) = self.ledger.load(ctx).await {
            warn!("Could not reload balance for kid {}: {}", self.kid_id, e);
        }
        failure
    }

    /// Delete a reward whose debit never committed. Returns the error to surface.
    async fn compensate(&self, ctx: &ActorContext, reward: Saved<CollectedReward>, failure: SyncError) -> SyncError {
        let attempts = self.config.compensation_delete_attempts;
        for attempt in 1..=attempts {
            match self.orchestrator.delete_for_kid(ctx, &self.kid_id, &reward).await {
                Ok(_) => {
                    warn!("Rolled back reward {} after failed debit: {}", reward.id(), failure);
                    return failure;
                }
                Err(e) => {
                    warn!(
                        "Rollback delete of reward {} failed (attempt {}/{}): {}",
                        reward.id(),
                        attempt,
                        attempts,
                        e
                    );
                }
            }
        }

        error!(
            "Reward {} exists without a committed debit; queued for cleanup",
            reward.id()
        );
        let reward_name = reward.id().to_string();
        if let Ok(mut pending) = self.pending.lock() {
            pending.push(reward);
        }
        SyncError::CompensationFailed {
            reward: reward_name,
            source: Box::new(failure),
        }
    }

    /// Rewards whose rollback delete has not succeeded yet
    pub fn pending_compensations(&self) -> Vec<Saved<CollectedReward>> {
        self.pending.lock().map(|p| p.clone()).unwrap_or_default()
    }

    /// Retry the queued rollback deletes. Returns how many were cleaned up; the
    /// first failure is returned after every entry has been tried.
    pub async fn retry_pending_compensations(&self, ctx: &ActorContext) -> SyncResult<usize> {
        let queued = match self.pending.lock() {
            Ok(mut pending) => std::mem::take(&mut *pending),
            Err(_) => return Err(SyncError::Store("pending compensation queue is poisoned".to_string())),
        };
        if queued.is_empty() {
            return Ok(0);
        }

        let mut cleaned = 0;
        let mut first_error = None;
        let mut still_pending = Vec::new();
        for reward in queued {
            match self.orchestrator.delete_for_kid(ctx, &self.kid_id, &reward).await {
                Ok(_) => cleaned += 1,
                Err(e) => {
                    warn!("Reward {} is still pending cleanup: {}", reward.id(), e);
                    first_error.get_or_insert(e);
                    still_pending.push(reward);
                }
            }
        }

        if let Ok(mut pending) = self.pending.lock() {
            pending.extend(still_pending);
        }
        info!("Cleaned up {} orphaned rewards for kid {}", cleaned, self.kid_id);
        match first_error {
            Some(e) => Err(e),
            None => Ok(cleaned),
        }
    }

    /// Reload the kid's collected rewards from both databases
    pub async fn refresh(&self, ctx: &ActorContext) -> SyncResult<MergeOutcome<Saved<CollectedReward>>> {
        self.state.set_loading(true);
        let filter = RecordFilter::AnyOf(vec![
            RecordFilter::equals(FIELD_KID_ID, FieldValue::String(self.kid_id.name.clone())),
            RecordFilter::equals(FIELD_KID_REFERENCE, FieldValue::Reference(self.kid_id.clone())),
        ]);

        match self
            .orchestrator
            .fetch_across_partitions::<CollectedReward>(ctx, &self.kid_id, &filter)
            .await
        {
            Ok(mut outcome) => {
                outcome.items.sort_by_key(|r| r.value.date_collected);
                let warning = outcome
                    .warnings
                    .first()
                    .map(|w| w.message.clone());
                self.state.finish(outcome.items.clone(), warning);
                Ok(outcome)
            }
            Err(e) => {
                error!("Failed to refresh rewards for kid {}: {}", self.kid_id, e);
                self.state.fail(e.user_message());
                Err(e)
            }
        }
    }

    /// Flag a collected reward as handed over
    pub async fn mark_delivered(&self, ctx: &ActorContext, reward: &RecordId) -> SyncResult<Saved<CollectedReward>> {
        info!("Marking reward {} as delivered", reward);
        let saved = self
            .orchestrator
            .modify_with_retry::<CollectedReward, _>(ctx, &self.kid_id, reward, |r| {
                r.is_delivered = true;
                Ok(())
            })
            .await?;

        self.state.update(|state| {
            if let Some(entry) = state.value.iter_mut().find(|r| r.id() == saved.id()) {
                *entry = saved.clone();
            }
        });
        Ok(saved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::storage::memory::test_utils::{
        TestEnvironment, EXPENSIVE_REWARD, SCREEN_TIME_REWARD,
    };
    use crate::backend::storage::memory::Fault;
    use crate::backend::storage::record::RecordType;

    #[tokio::test]
    async fn test_purchase_debits_and_records_reward() {
        let env = TestEnvironment::new().await.unwrap();
        let session = env.guest_session();
        session.ledger.load(&env.guest_ctx).await.unwrap();

        let result = session.rewards.purchase(&env.guest_ctx, SCREEN_TIME_REWARD).await.unwrap();
        assert_eq!(result.balance, 70);
        assert_eq!(result.reward.value.reward_id, SCREEN_TIME_REWARD);
        assert!(!result.reward.value.is_delivered);
        assert_eq!(session.ledger.balance(), 70);
        assert_eq!(session.rewards.rewards().len(), 1);

        assert_eq!(env.remote_balance().await.unwrap(), 70);
        assert_eq!(env.cloud.record_count(RecordType::CollectedReward).unwrap(), 1);
    }

    #[tokio::test]
    async fn test_insufficient_funds_makes_no_remote_call() {
        let env = TestEnvironment::new().await.unwrap();
        let session = env.owner_session();
        session.ledger.load(&env.owner_ctx).await.unwrap();
        // Would fail the save if it were attempted
        env.cloud.inject(Fault::SaveFails { record_type: RecordType::CollectedReward }).unwrap();

        let err = session.rewards.purchase(&env.owner_ctx, EXPENSIVE_REWARD).await.unwrap_err();
        assert!(matches!(err, SyncError::InsufficientFunds { balance: 100, cost: 500 }));
        assert_eq!(env.cloud.pending_faults().unwrap(), 1);
        assert_eq!(session.ledger.balance(), 100);
    }

    #[tokio::test]
    async fn test_unknown_reward_is_rejected() {
        let env = TestEnvironment::new().await.unwrap();
        let session = env.owner_session();
        let err = session.rewards.purchase(&env.owner_ctx, RewardId(999)).await.unwrap_err();
        assert!(matches!(err, SyncError::UnknownCatalogEntry { kind: "reward", .. }));
    }

    #[tokio::test]
    async fn test_failed_reward_save_restores_balance() {
        let env = TestEnvironment::new().await.unwrap();
        let session = env.owner_session();
        session.ledger.load(&env.owner_ctx).await.unwrap();
        env.cloud.inject(Fault::SaveFails { record_type: RecordType::CollectedReward }).unwrap();

        assert!(session.rewards.purchase(&env.owner_ctx, SCREEN_TIME_REWARD).await.is_err());
        assert_eq!(session.ledger.balance(), 100);
        assert_eq!(env.remote_balance().await.unwrap(), 100);
        assert_eq!(env.cloud.record_count(RecordType::CollectedReward).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_failed_debit_deletes_reward() {
        let env = TestEnvironment::new().await.unwrap();
        let session = env.owner_session();
        session.ledger.load(&env.owner_ctx).await.unwrap();
        env.cloud.inject_times(Fault::Conflict { record_type: RecordType::Kid }, 3).unwrap();

        let err = session.rewards.purchase(&env.owner_ctx, SCREEN_TIME_REWARD).await.unwrap_err();
        assert!(matches!(err, SyncError::SyncFailed { .. }));

        assert_eq!(session.ledger.balance(), 100);
        assert_eq!(env.remote_balance().await.unwrap(), 100);
        assert_eq!(env.cloud.record_count(RecordType::CollectedReward).unwrap(), 0);
        assert!(session.rewards.rewards().is_empty());
    }

    #[tokio::test]
    async fn test_stale_cache_purchase_does_not_clamp() {
        let env = TestEnvironment::new().await.unwrap();
        let session = env.owner_session();
        session.ledger.load(&env.owner_ctx).await.unwrap();

        // The other device spends most of the coins after our cache was loaded
        let guest = env.guest_session();
        guest.ledger.load(&env.guest_ctx).await.unwrap();
        guest.ledger.apply_delta(&env.guest_ctx, -90, "spent elsewhere").await.unwrap();

        let err = session.rewards.purchase(&env.owner_ctx, SCREEN_TIME_REWARD).await.unwrap_err();
        assert!(matches!(err, SyncError::InsufficientFunds { balance: 10, cost: 30 }));
        assert_eq!(env.remote_balance().await.unwrap(), 10);
        assert_eq!(env.cloud.record_count(RecordType::CollectedReward).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_failed_compensation_is_queued_and_retried() {
        let env = TestEnvironment::new().await.unwrap();
        let session = env.owner_session();
        session.ledger.load(&env.owner_ctx).await.unwrap();
        env.cloud.inject_times(Fault::Conflict { record_type: RecordType::Kid }, 3).unwrap();
        env.cloud
            .inject_times(Fault::DeleteFails { record_type: RecordType::CollectedReward }, 3)
            .unwrap();

        let err = session.rewards.purchase(&env.owner_ctx, SCREEN_TIME_REWARD).await.unwrap_err();
        match err {
            SyncError::CompensationFailed { source, .. } => {
                assert!(matches!(*source, SyncError::SyncFailed { .. }));
            }
            other => panic!("expected CompensationFailed, got {other:?}"),
        }
        assert_eq!(session.ledger.balance(), 100);
        assert_eq!(session.rewards.pending_compensations().len(), 1);

        assert_eq!(session.rewards.retry_pending_compensations(&env.owner_ctx).await.unwrap(), 1);
        assert!(session.rewards.pending_compensations().is_empty());
        assert_eq!(env.cloud.record_count(RecordType::CollectedReward).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_debit_that_lands_without_reply_completes_purchase() {
        let env = TestEnvironment::with_operation_timeout(100).await.unwrap();
        let session = env.guest_session();
        session.ledger.load(&env.guest_ctx).await.unwrap();
        env.cloud
            .inject(Fault::LateAck { record_type: RecordType::Kid, delay_ms: 300 })
            .unwrap();

        let result = session.rewards.purchase(&env.guest_ctx, SCREEN_TIME_REWARD).await.unwrap();
        assert_eq!(result.balance, 70);
        assert_eq!(session.ledger.balance(), 70);
        assert_eq!(env.remote_balance().await.unwrap(), 70);
        assert_eq!(env.cloud.record_count(RecordType::CollectedReward).unwrap(), 1);
        assert_eq!(session.rewards.rewards().len(), 1);
    }

    #[tokio::test]
    async fn test_debit_that_never_lands_rolls_back_after_timeout() {
        let env = TestEnvironment::with_operation_timeout(100).await.unwrap();
        let session = env.guest_session();
        session.ledger.load(&env.guest_ctx).await.unwrap();
        env.cloud
            .inject(Fault::StalledWrite { record_type: RecordType::Kid, delay_ms: 300 })
            .unwrap();

        let err = session.rewards.purchase(&env.guest_ctx, SCREEN_TIME_REWARD).await.unwrap_err();
        assert!(matches!(err, SyncError::Timeout { .. }));
        assert_eq!(session.ledger.balance(), 100);
        assert_eq!(env.remote_balance().await.unwrap(), 100);
        assert_eq!(env.cloud.record_count(RecordType::CollectedReward).unwrap(), 0);
        assert!(session.rewards.rewards().is_empty());
    }

    #[tokio::test]
    async fn test_unconfirmed_debit_keeps_reward_and_reloads_balance() {
        let env = TestEnvironment::with_operation_timeout(100).await.unwrap();
        let session = env.guest_session();
        session.ledger.load(&env.guest_ctx).await.unwrap();
        // The parent's +50 lands right after our debit, before we can read it back
        env.cloud
            .inject(Fault::LateAckThenWrite {
                record_type: RecordType::Kid,
                delay_ms: 300,
                field: "coins".into(),
                delta: 50,
            })
            .unwrap();

        let err = session.rewards.purchase(&env.guest_ctx, SCREEN_TIME_REWARD).await.unwrap_err();
        assert!(matches!(err, SyncError::CommitUnknown { .. }));
        assert_eq!(env.remote_balance().await.unwrap(), 120);
        assert_eq!(session.ledger.balance(), 120);
        assert_eq!(env.cloud.record_count(RecordType::CollectedReward).unwrap(), 1);
        assert_eq!(session.rewards.rewards().len(), 1);
        assert!(session.rewards.pending_compensations().is_empty());
    }

    #[tokio::test]
    async fn test_refresh_and_mark_delivered() {
        let env = TestEnvironment::new().await.unwrap();
        let guest = env.guest_session();
        guest.ledger.load(&env.guest_ctx).await.unwrap();
        let bought = guest.rewards.purchase(&env.guest_ctx, SCREEN_TIME_REWARD).await.unwrap();

        let owner = env.owner_session();
        let outcome = owner.rewards.refresh(&env.owner_ctx).await.unwrap();
        assert_eq!(outcome.items.len(), 1);
        assert!(outcome.warnings.is_empty());

        let delivered = owner
            .rewards
            .mark_delivered(&env.owner_ctx, bought.reward.id())
            .await
            .unwrap();
        assert!(delivered.value.is_delivered);
        assert!(owner.rewards.rewards()[0].value.is_delivered);
    }
}
