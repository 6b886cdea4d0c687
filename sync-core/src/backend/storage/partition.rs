//! # Partition Router
//!
//! Decides which database and partition an operation on a kid aggregate goes
//! to. Guests always go through the shared database. Owners use the private
//! database for partitions they own and the shared database for anything
//! owned by someone else.
//!
//! Routing is recomputed on every call from the aggregate's own identity and
//! the caller's context; nothing here is cached, so a role change or a newly
//! accepted share takes effect on the next operation.

use crate::backend::domain::context::ActorContext;
use crate::backend::storage::record::{Database, PartitionId, RecordId};
use shared::Role;

/// Where a remote call is addressed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub database: Database,
    pub partition: PartitionId,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PartitionRouter;

impl PartitionRouter {
    pub fn new() -> Self {
        Self
    }

    pub fn database_for(&self, ctx: &ActorContext, partition: &PartitionId) -> Database {
        match ctx.role {
            Role::Guest => Database::Shared,
            Role::Owner if partition.is_owned_by(&ctx.account) => Database::Private,
            Role::Owner => Database::Shared,
        }
    }

    /// Route for a partition addressed directly
    pub fn route_for_partition(&self, ctx: &ActorContext, partition: &PartitionId) -> Route {
        Route {
            database: self.database_for(ctx, partition),
            partition: partition.clone(),
        }
    }

    /// Route for the aggregate identified by `kid` and everything hanging under it
    pub fn route_for_kid(&self, ctx: &ActorContext, kid: &RecordId) -> Route {
        self.route_for_partition(ctx, &kid.partition)
    }

    /// The caller's own partition called `name`, always in the private database
    pub fn own_partition(&self, ctx: &ActorContext, name: &str) -> Route {
        Route {
            database: Database::Private,
            partition: PartitionId::new(name, ctx.account.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::storage::record::AccountId;

    fn kid_owned_by(owner: &str) -> RecordId {
        RecordId::new("kid-1", PartitionId::new("KidZone", AccountId::new(owner)))
    }

    #[test]
    fn test_owner_of_partition_routes_private() {
        let ctx = ActorContext::owner(AccountId::new("parent"));
        let route = PartitionRouter::new().route_for_kid(&ctx, &kid_owned_by("parent"));
        assert_eq!(route.database, Database::Private);
        assert_eq!(route.partition.owner, AccountId::new("parent"));
    }

    #[test]
    fn test_owner_of_foreign_partition_routes_shared() {
        let ctx = ActorContext::owner(AccountId::new("other-parent"));
        let route = PartitionRouter::new().route_for_kid(&ctx, &kid_owned_by("parent"));
        assert_eq!(route.database, Database::Shared);
    }

    #[test]
    fn test_guest_always_routes_shared() {
        let router = PartitionRouter::new();
        let guest = ActorContext::guest(AccountId::new("child"));
        assert_eq!(router.route_for_kid(&guest, &kid_owned_by("parent")).database, Database::Shared);

        // Even a partition the guest account happens to own
        assert_eq!(router.route_for_kid(&guest, &kid_owned_by("child")).database, Database::Shared);
    }

    #[test]
    fn test_role_change_takes_effect_immediately() {
        let router = PartitionRouter::new();
        let kid = kid_owned_by("parent");
        let mut ctx = ActorContext::owner(AccountId::new("parent"));
        assert_eq!(router.route_for_kid(&ctx, &kid).database, Database::Private);

        ctx.role = Role::Guest;
        assert_eq!(router.route_for_kid(&ctx, &kid).database, Database::Shared);
    }

    #[test]
    fn test_own_partition_is_private() {
        let ctx = ActorContext::guest(AccountId::new("child"));
        let route = PartitionRouter::new().own_partition(&ctx, "KidZone");
        assert_eq!(route.database, Database::Private);
        assert!(route.partition.is_owned_by(&ctx.account));
    }
}
