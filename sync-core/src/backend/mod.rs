//! # Backend Module
//!
//! Entry point for host applications. A [`SyncBackend`] is built once per
//! signed-in account around an injected [`RecordStorage`] and catalog; there are
//! no process-wide singletons.
//!
//! Per-kid services are grouped in a [`KidSession`] so the parent app and the
//! child app can each hold the ledger, activity list, rewards and share
//! manager for the kid on screen.

use anyhow::{Context, Result};
use log::info;
use std::sync::Arc;

pub mod config;
pub mod domain;
pub mod io;
pub mod logging;
pub mod storage;

pub use config::SyncConfig;

use domain::models::{Catalog, ShareGrant};
use domain::{
    ActivityRegisterService, ActorContext, CoinLedger, KidService, RewardsService, ShareService,
    SyncResult,
};
use shared::Role;
use storage::{AccountId, RecordId, RecordStorage, RemoteStoreClient, SyncOrchestrator};

/// Services for one signed-in account
#[derive(Clone)]
pub struct SyncBackend {
    pub config: Arc<SyncConfig>,
    pub orchestrator: SyncOrchestrator,
    pub catalog: Arc<dyn Catalog>,
    kid_service: KidService,
}

/// Services bound to a single kid aggregate
#[derive(Clone)]
pub struct KidSession {
    pub kid_id: RecordId,
    pub ledger: CoinLedger,
    pub activities: ActivityRegisterService,
    pub rewards: RewardsService,
    pub shares: ShareService,
}

impl SyncBackend {
    pub fn new(config: SyncConfig, storage: Arc<dyn RecordStorage>, catalog: Arc<dyn Catalog>) -> Result<Self> {
        config.validate().context("Invalid sync configuration")?;
        let config = Arc::new(config);

        info!("Initializing sync backend for account {}", storage.account());
        let orchestrator = SyncOrchestrator::new(RemoteStoreClient::new(storage), config.clone());
        let kid_service = KidService::new(orchestrator.clone());

        Ok(Self {
            config,
            orchestrator,
            catalog,
            kid_service,
        })
    }

    pub fn account(&self) -> &AccountId {
        self.orchestrator.account()
    }

    /// Context for acting as this backend's account in `role`
    pub fn context(&self, role: Role) -> ActorContext {
        ActorContext::new(self.account().clone(), role)
    }

    pub fn kids(&self) -> &KidService {
        &self.kid_service
    }

    pub fn kid_session(&self, kid_id: RecordId) -> KidSession {
        let ledger = CoinLedger::new(kid_id.clone(), self.orchestrator.clone());
        let activities = ActivityRegisterService::new(
            kid_id.clone(),
            self.orchestrator.clone(),
            ledger.clone(),
            self.catalog.clone(),
        );
        let rewards = RewardsService::new(
            kid_id.clone(),
            self.orchestrator.clone(),
            ledger.clone(),
            self.catalog.clone(),
            self.config.clone(),
        );
        let shares = ShareService::new(kid_id.clone(), self.orchestrator.clone(), self.config.clone());

        KidSession {
            kid_id,
            ledger,
            activities,
            rewards,
            shares,
        }
    }

    /// Join a share on the guest device; the grant's root is the shared kid
    pub async fn accept_share(&self, url: &str) -> SyncResult<ShareGrant> {
        info!("Accepting share link for {}", self.account());
        self.orchestrator.accept_share(url).await
    }
}
