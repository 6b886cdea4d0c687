/// Test utilities module for a consistent two-device test setup
///
/// Every test gets its own in-memory cloud with a parent (owner) account and a
/// child (guest) account, a small catalog, and one kid profile holding 100
/// coins that is shared with the child.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use super::connection::MemoryCloud;
use crate::backend::config::SyncConfig;
use crate::backend::domain::context::ActorContext;
use crate::backend::domain::errors::SyncResult;
use crate::backend::domain::models::{Activity, ActivityId, Kid, Reward, RewardId, Saved, StaticCatalog};
use crate::backend::storage::client::RemoteStoreClient;
use crate::backend::storage::record::AccountId;
use crate::backend::{KidSession, SyncBackend};

pub const OWNER_ACCOUNT: &str = "parent";
pub const GUEST_ACCOUNT: &str = "child";
pub const STARTING_BALANCE: i64 = 100;

/// Awards 5 coins
pub const BED_ACTIVITY: ActivityId = ActivityId(Uuid::from_u128(0x6f1c0a52_8f0e_4b8e_9a57_3d1f2c1b7e10));
/// Costs 30 coins
pub const SCREEN_TIME_REWARD: RewardId = RewardId(1);
/// Costs more than the starting balance
pub const EXPENSIVE_REWARD: RewardId = RewardId(2);

pub fn test_catalog() -> StaticCatalog {
    StaticCatalog::new(
        vec![Activity {
            id: BED_ACTIVITY,
            name: "Make the bed".to_string(),
            coins: 5,
        }],
        vec![
            Reward {
                id: SCREEN_TIME_REWARD,
                name: "Extra screen time".to_string(),
                cost: 30,
            },
            Reward {
                id: EXPENSIVE_REWARD,
                name: "Theme park trip".to_string(),
                cost: 500,
            },
        ],
    )
}

pub fn test_config() -> SyncConfig {
    SyncConfig {
        partition_retry_delay_ms: 5,
        operation_timeout_ms: 5_000,
        ..SyncConfig::default()
    }
}

pub struct TestEnvironment {
    pub cloud: MemoryCloud,
    pub owner: SyncBackend,
    pub guest: SyncBackend,
    pub owner_ctx: ActorContext,
    pub guest_ctx: ActorContext,
    /// The seeded kid as it was right after setup
    pub kid: Saved<Kid>,
}

impl TestEnvironment {
    /// Shared kid with the starting balance
    pub async fn new() -> Result<Self> {
        Self::build(MemoryCloud::new(), true, test_config()).await
    }

    /// Same as `new`, with every remote call delayed so concurrent callers interleave
    pub async fn with_latency(latency: Duration) -> Result<Self> {
        Self::build(MemoryCloud::new().with_latency(latency), true, test_config()).await
    }

    /// Kid exists with the starting balance but has never been shared
    pub async fn unshared() -> Result<Self> {
        Self::build(MemoryCloud::new(), false, test_config()).await
    }

    /// Shared kid, with remote calls abandoned after `timeout_ms`
    pub async fn with_operation_timeout(timeout_ms: u64) -> Result<Self> {
        let config = SyncConfig {
            operation_timeout_ms: timeout_ms,
            ..test_config()
        };
        Self::build(MemoryCloud::new(), true, config).await
    }

    async fn build(cloud: MemoryCloud, shared: bool, config: SyncConfig) -> Result<Self> {
        let catalog = Arc::new(test_catalog());
        let owner = SyncBackend::new(
            config.clone(),
            Arc::new(cloud.connect(AccountId::new(OWNER_ACCOUNT))),
            catalog.clone(),
        )?;
        let guest = SyncBackend::new(
            config,
            Arc::new(cloud.connect(AccountId::new(GUEST_ACCOUNT))),
            catalog,
        )?;
        let owner_ctx = ActorContext::owner(AccountId::new(OWNER_ACCOUNT));
        let guest_ctx = ActorContext::guest(AccountId::new(GUEST_ACCOUNT));

        let created = owner.kids().create_kid(&owner_ctx, "Emma").await?;
        let session = owner.kid_session(created.id().clone());
        session.ledger.apply_delta(&owner_ctx, STARTING_BALANCE, "seed").await?;

        if shared {
            let grant = session.shares.ensure_share(&owner_ctx).await?;
            guest.accept_share(&grant.url).await?;
        }
        let kid = owner.kids().load_kid(&owner_ctx, created.id()).await?;

        Ok(TestEnvironment {
            cloud,
            owner,
            guest,
            owner_ctx,
            guest_ctx,
            kid,
        })
    }

    /// Fresh owner-side services for the seeded kid
    pub fn owner_session(&self) -> KidSession {
        self.owner.kid_session(self.kid.id().clone())
    }

    /// Fresh guest-side services for the seeded kid
    pub fn guest_session(&self) -> KidSession {
        self.guest.kid_session(self.kid.id().clone())
    }

    /// Raw client acting as the guest account
    pub fn guest_client(&self) -> RemoteStoreClient {
        RemoteStoreClient::new(Arc::new(self.cloud.connect(AccountId::new(GUEST_ACCOUNT))))
    }

    /// Balance stored in the kid record, read as the owner
    pub async fn remote_balance(&self) -> SyncResult<i64> {
        let kid = self.owner.orchestrator.fetch_kid(&self.owner_ctx, self.kid.id()).await?;
        Ok(kid.value.coins)
    }
}
