//! Coin ledger for one kid.
//!
//! Holds the cached balance the UI shows and keeps it in step with the kid
//! record in the remote store.
//!
//! ## Key Responsibilities
//!
//! - **Optimistic updates**: the cached balance moves immediately, before the
//!   remote write
//! - **Delta reapplication**: on a change-tag conflict the delta is reapplied
//!   to the freshly fetched remote balance, never to the stale local one, so
//!   concurrent deltas from the owner and the guest are never lost
//! - **Revert on failure**: any failed commit puts the cache back to its value
//!   before the operation
//!
//! ## Business Rules
//!
//! - Balances are clamped at zero after every delta
//! - Purchases commit with [`DeltaPolicy::RequireFunds`] and fail instead of clamping

use log::{error, info};
use tokio::sync::watch;

use crate::backend::domain::commands::ledger::DeltaPolicy;
use crate::backend::domain::context::ActorContext;
use crate::backend::domain::errors::{SyncError, SyncResult};
use crate::backend::domain::models::kid::apply_delta_to;
use crate::backend::domain::models::Kid;
use crate::backend::domain::state::{ObservableState, Observed};
use crate::backend::storage::orchestrator::SyncOrchestrator;
use crate::backend::storage::record::RecordId;

#[derive(Clone)]
pub struct CoinLedger {
    kid_id: RecordId,
    orchestrator: SyncOrchestrator,
    state: ObservableState<i64>,
}

impl CoinLedger {
    pub fn new(kid_id: RecordId, orchestrator: SyncOrchestrator) -> Self {
        Self {
            kid_id,
            orchestrator,
            state: ObservableState::new(0),
        }
    }

    pub fn kid_id(&self) -> &RecordId {
        &self.kid_id
    }

    /// Cached balance
    pub fn balance(&self) -> i64 {
        self.state.value()
    }

    pub fn snapshot(&self) -> Observed<i64> {
        self.state.get()
    }

    pub fn subscribe(&self) -> watch::Receiver<Observed<i64>> {
        self.state.subscribe()
    }

    /// Refresh the cached balance from the store
    pub async fn load(&self, ctx: &ActorContext) -> SyncResult<i64> {
        self.state.set_loading(true);
        match self.orchestrator.fetch_kid(ctx, &self.kid_id).await {
            Ok(kid) => {
                self.state.finish(kid.value.coins, None);
                Ok(kid.value.coins)
            }
            Err(e) => {
                error!("Failed to load balance for kid {}: {}", self.kid_id, e);
                self.state.fail(e.user_message());
                Err(e)
            }
        }
    }

    /// Add `amount` (negative to remove) to the balance, clamping at zero
    pub async fn apply_delta(&self, ctx: &ActorContext, amount: i64, reason: &str) -> SyncResult<i64> {
        info!("Applying {:+} coins to kid {} ({})", amount, self.kid_id, reason);

        let before = self.balance();
        self.state.update(|state| {
            state.value = apply_delta_to(state.value, amount);
            state.is_loading = true;
        });

        self.commit_delta(ctx, amount, reason, before, DeltaPolicy::Clamp).await
    }

    /// Optimistically take `cost` off the cached balance; returns the previous balance
    pub(crate) fn debit_local(&self, cost: i64) -> i64 {
        let before = self.balance();
        self.state.update(|state| {
            state.value = apply_delta_to(state.value, -cost);
            state.is_loading = true;
        });
        before
    }

    /// Put the cached balance back after an abandoned local change
    pub(crate) fn restore_local(&self, previous: i64, failure: &SyncError) {
        self.state.update(|state| {
            state.value = previous;
            state.is_loading = false;
            state.last_error = Some(failure.user_message());
        });
    }

    /// Write `amount` to the remote kid record through the bounded retry loop.
    ///
    /// On success the cache takes the store-returned balance. On failure it is
    /// reverted to `revert_to`.
    pub(crate) async fn commit_delta(
        &self,
        ctx: &ActorContext,
        amount: i64,
        reason: &str,
        revert_to: i64,
        policy: DeltaPolicy,
    ) -> SyncResult<i64> {
        let result = self
            .orchestrator
            .modify_with_retry::<Kid, _>(ctx, &self.kid_id, &self.kid_id, |kid| {
                if policy == DeltaPolicy::RequireFunds && kid.coins.saturating_add(amount) < 0 {
                    return Err(SyncError::InsufficientFunds {
                        balance: kid.coins,
                        cost: -amount,
                    });
                }
                kid.coins = apply_delta_to(kid.coins, amount);
                Ok(())
            })
            .await;

        match result {
            Ok(saved) => {
                let balance = saved.value.coins;
                self.state.finish(balance, None);
                info!("Kid {} balance is now {} after {}", self.kid_id, balance, reason);
                Ok(balance)
            }
            Err(e) => {
                error!(
                    "Failed to commit {:+} coins for kid {} ({}): {}",
                    amount, self.kid_id, reason, e
                );
                self.restore_local(revert_to, &e);
                Err(e)
            }
        }
    }
}
