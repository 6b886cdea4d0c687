//! Share lifecycle manager.
//!
//! The owner shares a kid profile with the child's account through a single
//! grant rooted at the kid record. The kid record keeps a reference to its
//! active grant in `kidReference`.
//!
//! ## Business Rules
//!
//! - Only the owning account can create, refresh or revoke the grant
//! - `ensure_share` creates a grant when there is none and re-saves the
//!   existing one otherwise
//! - A reference to a grant that no longer exists is replaced by a new grant
//! - After revocation the guest gets `AccessDenied`; nothing falls back to
//!   the private database

use log::{error, info, warn};
use std::sync::Arc;

use crate::backend::config::SyncConfig;
use crate::backend::domain::context::ActorContext;
use crate::backend::domain::errors::{SyncError, SyncResult};
use crate::backend::domain::models::{Kid, Saved, ShareGrant};
use crate::backend::storage::orchestrator::SyncOrchestrator;
use crate::backend::storage::record::RecordId;

#[derive(Clone)]
pub struct ShareService {
    kid_id: RecordId,
    orchestrator: SyncOrchestrator,
    config: Arc<SyncConfig>,
}

impl ShareService {
    pub fn new(kid_id: RecordId, orchestrator: SyncOrchestrator, config: Arc<SyncConfig>) -> Self {
        Self {
            kid_id,
            orchestrator,
            config,
        }
    }

    fn require_owner(&self, ctx: &ActorContext) -> SyncResult<()> {
        if ctx.is_owner() && self.kid_id.partition.is_owned_by(&ctx.account) {
            Ok(())
        } else {
            Err(SyncError::AccessDenied(format!(
                "{} does not own kid {}",
                ctx.account, self.kid_id
            )))
        }
    }

    /// The grant the kid record points at, if it still exists
    async fn current_grant(&self, kid: &Saved<Kid>) -> SyncResult<Option<ShareGrant>> {
        let Some(share_id) = kid.value.share.as_ref() else {
            return Ok(None);
        };
        match self.orchestrator.fetch_share(share_id).await {
            Ok(grant) => Ok(Some(grant)),
            Err(SyncError::RecordNotFound(_)) => {
                warn!("Kid {} references missing share {}", self.kid_id, share_id);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Make sure the kid is shared, returning the live grant
    pub async fn ensure_share(&self, ctx: &ActorContext) -> SyncResult<ShareGrant> {
        self.require_owner(ctx)?;
        let kid = self.orchestrator.fetch_kid(ctx, &self.kid_id).await?;

        if let Some(grant) = self.current_grant(&kid).await? {
            info!("Refreshing existing share {} for kid {}", grant.id, self.kid_id);
            return self.orchestrator.refresh_share(&grant).await;
        }

        let grant = self
            .orchestrator
            .create_share(&kid, self.config.default_share_permission)
            .await?;
        let share_id = grant.id.clone();
        let linked = self
            .orchestrator
            .modify_with_retry::<Kid, _>(ctx, &self.kid_id, &self.kid_id, |k| {
                k.share = Some(share_id.clone());
                Ok(())
            })
            .await;

        if let Err(e) = linked {
            error!("Linking share {} to kid {} failed: {}", grant.id, self.kid_id, e);
            if let Err(revoke_err) = self.orchestrator.revoke_share(&grant).await {
                warn!("Could not remove unlinked share {}: {}", grant.id, revoke_err);
            }
            return Err(e);
        }

        info!("Kid {} shared ({})", self.kid_id, grant.permission);
        Ok(grant)
    }

    /// Remove the guest's access. Returns false when the kid was not shared.
    pub async fn revoke_share(&self, ctx: &ActorContext) -> SyncResult<bool> {
        self.require_owner(ctx)?;
        let kid = self.orchestrator.fetch_kid(ctx, &self.kid_id).await?;
        let Some(share_id) = kid.value.share.clone() else {
            info!("Kid {} is not shared, nothing to revoke", self.kid_id);
            return Ok(false);
        };

        let removed = match self.orchestrator.fetch_share(&share_id).await {
            Ok(grant) => self.orchestrator.revoke_share(&grant).await?,
            Err(SyncError::RecordNotFound(_)) => false,
            Err(e) => return Err(e),
        };

        self.orchestrator
            .modify_with_retry::<Kid, _>(ctx, &self.kid_id, &self.kid_id, |k| {
                k.share = None;
                Ok(())
            })
            .await?;

        info!("Revoked share {} for kid {}", share_id, self.kid_id);
        Ok(removed)
    }

    /// Current grant as seen by the caller, if any
    pub async fn share_status(&self, ctx: &ActorContext) -> SyncResult<Option<ShareGrant>> {
        let kid = self.orchestrator.fetch_kid(ctx, &self.kid_id).await?;
        self.current_grant(&kid).await
    }
}
