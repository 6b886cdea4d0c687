//! Kid profile management.
//!
//! Creating and listing kid profiles. Owners keep their kids in their own
//! partition; guests see the kids that were shared with them.
//!
//! ## Business Rules
//!
//! - Only an owner can create a kid, which starts at zero coins
//! - Names are trimmed and must be 1-100 characters

use log::info;

use crate::backend::domain::context::ActorContext;
use crate::backend::domain::errors::{SyncError, SyncResult};
use crate::backend::domain::models::kid::MAX_KID_NAME_LENGTH;
use crate::backend::domain::models::{Kid, Saved};
use crate::backend::storage::orchestrator::SyncOrchestrator;
use crate::backend::storage::partition::{PartitionRouter, Route};
use crate::backend::storage::record::{Database, RecordFilter, RecordId};
use shared::Role;

#[derive(Clone)]
pub struct KidService {
    orchestrator: SyncOrchestrator,
}

fn validate_name(name: &str) -> SyncResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(SyncError::Validation("Kid name cannot be empty".to_string()));
    }
    if name.chars().count() > MAX_KID_NAME_LENGTH {
        return Err(SyncError::Validation(format!(
            "Kid name cannot exceed {MAX_KID_NAME_LENGTH} characters"
        )));
    }
    Ok(name.to_string())
}

impl KidService {
    pub fn new(orchestrator: SyncOrchestrator) -> Self {
        Self { orchestrator }
    }

    pub async fn create_kid(&self, ctx: &ActorContext, name: &str) -> SyncResult<Saved<Kid>> {
        if !ctx.is_owner() {
            return Err(SyncError::AccessDenied("only a parent can add a kid".to_string()));
        }
        let name = validate_name(name)?;
        info!("Creating kid profile {} for {}", name, ctx.account);

        let kid = self.orchestrator.create_in_own_partition(ctx, Kid::new(name)).await?;
        info!("Created kid {}", kid.id());
        Ok(kid)
    }

    pub async fn load_kid(&self, ctx: &ActorContext, id: &RecordId) -> SyncResult<Saved<Kid>> {
        self.orchestrator.fetch_kid(ctx, id).await
    }

    /// Every kid the caller can see, ordered by name
    pub async fn list_kids(&self, ctx: &ActorContext) -> SyncResult<Vec<Saved<Kid>>> {
        let partition_name = self.orchestrator.config().partition_name.clone();
        let routes: Vec<Route> = match ctx.role {
            Role::Owner => vec![PartitionRouter::new().own_partition(ctx, &partition_name)],
            Role::Guest => self
                .orchestrator
                .list_partitions(Database::Shared)
                .await?
                .into_iter()
                .map(|partition| Route {
                    database: Database::Shared,
                    partition,
                })
                .collect(),
        };

        let mut kids = Vec::new();
        for route in routes {
            match self.orchestrator.fetch_in::<Kid>(&route, &RecordFilter::All).await {
                Ok(found) => kids.extend(found),
                Err(SyncError::RecordNotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        kids.sort_by(|a, b| a.value.name.cmp(&b.value.name));
        Ok(kids)
    }

    pub async fn rename_kid(&self, ctx: &ActorContext, id: &RecordId, name: &str) -> SyncResult<Saved<Kid>> {
        let name = validate_name(name)?;
        info!("Renaming kid {} to {}", id, name);
        self.orchestrator
            .modify_with_retry::<Kid, _>(ctx, id, id, |kid| {
                kid.name = name.clone();
                Ok(())
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::storage::memory::test_utils::TestEnvironment;

    #[tokio::test]
    async fn test_create_kid_starts_at_zero() {
        let env = TestEnvironment::new().await.unwrap();
        let kid = env.owner.kids().create_kid(&env.owner_ctx, "  Noah ").await.unwrap();
        assert_eq!(kid.value.name, "Noah");
        assert_eq!(kid.value.coins, 0);
        assert!(kid.value.share.is_none());
    }

    #[tokio::test]
    async fn test_create_kid_validates_name() {
        let env = TestEnvironment::new().await.unwrap();
        let err = env.owner.kids().create_kid(&env.owner_ctx, "   ").await.unwrap_err();
        assert!(matches!(err, SyncError::Validation(_)));

        let long = "x".repeat(MAX_KID_NAME_LENGTH + 1);
        assert!(env.owner.kids().create_kid(&env.owner_ctx, &long).await.is_err());
    }

    #[tokio::test]
    async fn test_guest_cannot_create_kid() {
        let env = TestEnvironment::new().await.unwrap();
        let err = env.guest.kids().create_kid(&env.guest_ctx, "Noah").await.unwrap_err();
        assert!(matches!(err, SyncError::AccessDenied(_)));
    }

    #[tokio::test]
    async fn test_list_kids_per_role() {
        let env = TestEnvironment::new().await.unwrap();
        env.owner.kids().create_kid(&env.owner_ctx, "Adam").await.unwrap();

        let owner_view = env.owner.kids().list_kids(&env.owner_ctx).await.unwrap();
        let names: Vec<_> = owner_view.iter().map(|k| k.value.name.as_str()).collect();
        assert_eq!(names, vec!["Adam", "Emma"]);

        // Only the shared kid is visible to the guest
        let guest_view = env.guest.kids().list_kids(&env.guest_ctx).await.unwrap();
        assert_eq!(guest_view.len(), 1);
        assert_eq!(guest_view[0].id(), env.kid.id());
    }

    #[tokio::test]
    async fn test_rename_kid_keeps_balance() {
        let env = TestEnvironment::new().await.unwrap();
        let renamed = env
            .owner
            .kids()
            .rename_kid(&env.owner_ctx, env.kid.id(), "Emmy")
            .await
            .unwrap();
        assert_eq!(renamed.value.name, "Emmy");
        assert_eq!(renamed.value.coins, 100);
    }
}
