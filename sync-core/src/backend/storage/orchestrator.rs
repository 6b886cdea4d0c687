//! # Sync Orchestrator
//!
//! Single entry point the domain services use to reach the remote store.
//!
//! ## Key Responsibilities
//!
//! - **Partition bootstrap**: idempotent `ensure_partition` that tolerates
//!   concurrent creators and retries an unavailable partition once
//! - **Routing**: every kid-scoped call is addressed through the
//!   [`PartitionRouter`], recomputed per call
//! - **Timeouts**: one timeout policy wrapped around every remote call
//! - **Read-modify-write**: the bounded refetch, reapply, modify loop that
//!   resolves change-tag conflicts
//! - **Cross-partition reads**: merge the private and shared databases,
//!   degrading to a warning when one side fails

use log::{debug, info, warn};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Mutex};

use crate::backend::config::SyncConfig;
use crate::backend::domain::commands::merge::{MergeOutcome, SyncWarning};
use crate::backend::domain::context::ActorContext;
use crate::backend::domain::errors::{SyncError, SyncResult};
use crate::backend::domain::models::{Kid, Persisted, Saved, ShareGrant};
use crate::backend::storage::client::RemoteStoreClient;
use crate::backend::storage::codec::RecordCodec;
use crate::backend::storage::partition::{PartitionRouter, Route};
use crate::backend::storage::record::{AccountId, Database, PartitionId, RecordFilter, RecordId};
use shared::SharePermission;

#[derive(Clone)]
pub struct SyncOrchestrator {
    client: RemoteStoreClient,
    router: PartitionRouter,
    config: Arc<SyncConfig>,
    /// Partitions known to exist; only ever grows
    ensured: Arc<Mutex<HashMap<String, PartitionId>>>,
}

impl SyncOrchestrator {
    pub fn new(client: RemoteStoreClient, config: Arc<SyncConfig>) -> Self {
        Self {
            client,
            router: PartitionRouter::new(),
            config,
            ensured: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn account(&self) -> &AccountId {
        self.client.account()
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn route(&self, ctx: &ActorContext, kid: &RecordId) -> Route {
        self.router.route_for_kid(ctx, kid)
    }

    /// Run one remote call under the configured timeout
    pub async fn timed<T, F>(&self, operation: &str, call: F) -> SyncResult<T>
    where
        F: Future<Output = SyncResult<T>>,
    {
        let limit = self.config.operation_timeout();
        match tokio::time::timeout(limit, call).await {
            Ok(result) => result,
            Err(_) => {
                warn!("Remote call {} timed out after {:?}", operation, limit);
                Err(SyncError::Timeout {
                    operation: operation.to_string(),
                    millis: self.config.operation_timeout_ms,
                })
            }
        }
    }

    fn cached_partition(&self, name: &str) -> Option<PartitionId> {
        self.ensured.lock().ok().and_then(|cache| cache.get(name).cloned())
    }

    fn remember_partition(&self, name: &str, partition: &PartitionId) {
        if let Ok(mut cache) = self.ensured.lock() {
            cache.insert(name.to_string(), partition.clone());
        }
    }

    /// Make sure the caller's partition `name` exists, creating it if needed.
    ///
    /// Concurrent callers may all try to create it; losing that race is not an
    /// error. An unavailable partition is retried once after a short delay.
    pub async fn ensure_partition(&self, name: &str) -> SyncResult<PartitionId> {
        if let Some(partition) = self.cached_partition(name) {
            return Ok(partition);
        }

        let mut retried = false;
        loop {
            if let Some(partition) = self.timed("fetch_partition", self.client.fetch_partition(name)).await? {
                self.remember_partition(name, &partition);
                return Ok(partition);
            }

            match self.timed("create_partition", self.client.create_partition(name)).await {
                Ok(partition) => {
                    info!("Created partition {}", partition);
                    self.remember_partition(name, &partition);
                    return Ok(partition);
                }
                Err(SyncError::PartitionExists(_)) => {
                    debug!("Partition {} was created concurrently", name);
                    let partition = self
                        .timed("fetch_partition", self.client.fetch_partition(name))
                        .await?
                        .ok_or_else(|| SyncError::RecordNotFound(format!("partition {name}")))?;
                    self.remember_partition(name, &partition);
                    return Ok(partition);
                }
                Err(SyncError::PartitionUnavailable(reason)) if !retried => {
                    warn!("Partition {} unavailable ({}), retrying once", name, reason);
                    retried = true;
                    tokio::time::sleep(self.config.partition_retry_delay()).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// The kid record itself
    pub async fn fetch_kid(&self, ctx: &ActorContext, kid: &RecordId) -> SyncResult<Saved<Kid>> {
        let route = self.route(ctx, kid);
        self.timed("fetch_kid", self.client.fetch_one(route.database, kid)).await
    }

    /// Records of `T` in the kid's partition, routed for the caller
    pub async fn fetch_for_kid<T: RecordCodec>(
        &self,
        ctx: &ActorContext,
        kid: &RecordId,
        filter: &RecordFilter,
    ) -> SyncResult<Vec<Saved<T>>> {
        let route = self.route(ctx, kid);
        self.fetch_in(&route, filter).await
    }

    pub async fn fetch_in<T: RecordCodec>(&self, route: &Route, filter: &RecordFilter) -> SyncResult<Vec<Saved<T>>> {
        self.timed("fetch", self.client.fetch(route.database, &route.partition, filter))
            .await
    }

    pub async fn fetch_one<T: RecordCodec>(
        &self,
        ctx: &ActorContext,
        kid: &RecordId,
        id: &RecordId,
    ) -> SyncResult<Saved<T>> {
        let route = self.route(ctx, kid);
        self.timed("fetch_one", self.client.fetch_one(route.database, id)).await
    }

    /// Create a record in the kid's partition
    pub async fn create_for_kid<T: RecordCodec>(
        &self,
        ctx: &ActorContext,
        kid: &RecordId,
        entity: T,
    ) -> SyncResult<Saved<T>> {
        let route = self.route(ctx, kid);
        self.timed(
            "save",
            self.client.save(&Persisted::Unsaved(entity), route.database, &route.partition),
        )
        .await
    }

    /// Create a record in the caller's own partition, creating the partition first if needed
    pub async fn create_in_own_partition<T: RecordCodec>(
        &self,
        ctx: &ActorContext,
        entity: T,
    ) -> SyncResult<Saved<T>> {
        let partition = self.ensure_partition(&self.config.partition_name).await?;
        self.timed(
            "save",
            self.client.save(&Persisted::Unsaved(entity), Database::Private, &partition),
        )
        .await
        .map_err(|e| {
            warn!("Save into own partition {} failed for {}: {}", partition, ctx.account, e);
            e
        })
    }

    pub async fn modify_for_kid<T: RecordCodec>(
        &self,
        ctx: &ActorContext,
        kid: &RecordId,
        saved: &Saved<T>,
    ) -> SyncResult<Saved<T>> {
        let route = self.route(ctx, kid);
        self.timed("modify", self.client.modify(saved, route.database)).await
    }

    pub async fn delete_for_kid<T: RecordCodec>(
        &self,
        ctx: &ActorContext,
        kid: &RecordId,
        saved: &Saved<T>,
    ) -> SyncResult<bool> {
        let route = self.route(ctx, kid);
        self.timed("delete", self.client.delete(saved, route.database)).await
    }

    /// Bounded read-modify-write of record `id` in the kid's partition.
    ///
    /// Each attempt refetches the record, applies `mutate` to the fresh value
    /// and sends it back with the fresh change tag. A change-tag conflict
    /// starts the next attempt; any other failure, including one returned by
    /// `mutate`, ends the loop immediately. A modify that times out is settled
    /// by [`Self::settle_unacknowledged`] instead of being reported as failed.
    pub async fn modify_with_retry<T, F>(
        &self,
        ctx: &ActorContext,
        kid: &RecordId,
        id: &RecordId,
        mut mutate: F,
    ) -> SyncResult<Saved<T>>
    where
        T: RecordCodec + PartialEq,
        F: FnMut(&mut T) -> SyncResult<()>,
    {
        let route = self.route(ctx, kid);
        let max_attempts = self.config.max_modify_attempts;

        for attempt in 1..=max_attempts {
            let mut current: Saved<T> = self
                .timed("fetch_one", self.client.fetch_one(route.database, id))
                .await?;
            mutate(&mut current.value)?;

            match self.timed("modify", self.client.modify(&current, route.database)).await {
                Ok(saved) => {
                    if attempt > 1 {
                        info!("Modified {} {} on attempt {}", T::RECORD_TYPE, id, attempt);
                    }
                    return Ok(saved);
                }
                Err(e) if e.is_conflict() => {
                    warn!(
                        "Change-tag conflict on {} {} (attempt {}/{}), refetching",
                        T::RECORD_TYPE,
                        id,
                        attempt,
                        max_attempts
                    );
                }
                Err(e) if e.is_ambiguous() => return self.settle_unacknowledged(&route, &current, e).await,
                Err(e) => return Err(e),
            }
        }

        Err(SyncError::SyncFailed {
            record: id.to_string(),
            attempts: max_attempts,
        })
    }

    /// Decide the outcome of a modify whose reply never arrived.
    ///
    /// The record is read back once. An unchanged change tag means the write
    /// did not land and `failure` is returned. A new change tag with exactly
    /// the value that was sent means it did, and the stored record is
    /// returned. Anything else is `CommitUnknown`.
    pub async fn settle_unacknowledged<T>(
        &self,
        route: &Route,
        sent: &Saved<T>,
        failure: SyncError,
    ) -> SyncResult<Saved<T>>
    where
        T: RecordCodec + PartialEq,
    {
        warn!("No reply for modify of {} {}, reading it back", T::RECORD_TYPE, sent.id());
        let stored: Saved<T> = match self.timed("fetch_one", self.client.fetch_one(route.database, sent.id())).await {
            Ok(stored) => stored,
            Err(e) => {
                warn!("Read-back of {} failed: {}", sent.id(), e);
                return Err(SyncError::CommitUnknown {
                    record: sent.id().to_string(),
                    source: Box::new(failure),
                });
            }
        };

        if stored.change_tag() == sent.change_tag() {
            info!("Modify of {} {} did not land", T::RECORD_TYPE, sent.id());
            Err(failure)
        } else if stored.value == sent.value {
            info!("Modify of {} {} landed without a reply", T::RECORD_TYPE, sent.id());
            Ok(stored)
        } else {
            warn!("{} {} changed again before it could be read back", T::RECORD_TYPE, sent.id());
            Err(SyncError::CommitUnknown {
                record: sent.id().to_string(),
                source: Box::new(failure),
            })
        }
    }

    /// Read `T` records for a kid from both databases and merge them.
    ///
    /// The private side is the kid's partition when the caller owns it, else
    /// the caller's own partition (which may not exist yet and then counts as
    /// empty). The shared side is the kid's partition when someone else owns
    /// it, else every partition shared with the caller. Each shared partition
    /// is read on its own, so one that fails only costs its own records. Failed
    /// reads become warnings; when nothing could be read the private error is
    /// returned.
    pub async fn fetch_across_partitions<T: RecordCodec>(
        &self,
        ctx: &ActorContext,
        kid: &RecordId,
        filter: &RecordFilter,
    ) -> SyncResult<MergeOutcome<Saved<T>>> {
        let owns_kid = kid.partition.is_owned_by(&ctx.account);
        let private_route = if owns_kid {
            Route {
                database: Database::Private,
                partition: kid.partition.clone(),
            }
        } else {
            self.router.own_partition(ctx, &self.config.partition_name)
        };

        let private_side = async {
            match self.fetch_in::<T>(&private_route, filter).await {
                Err(SyncError::RecordNotFound(_)) => Ok(Vec::new()),
                other => other,
            }
        };
        let shared_side = async {
            let partitions = if owns_kid {
                match self.timed("list_partitions", self.client.list_partitions(Database::Shared)).await {
                    Ok(partitions) => partitions,
                    Err(e) => return vec![Err(e)],
                }
            } else {
                vec![kid.partition.clone()]
            };
            if partitions.is_empty() {
                return vec![Ok(Vec::new())];
            }

            let mut reads: Vec<SyncResult<Vec<Saved<T>>>> = Vec::with_capacity(partitions.len());
            for partition in partitions {
                let route = Route {
                    database: Database::Shared,
                    partition,
                };
                reads.push(self.fetch_in::<T>(&route, filter).await);
            }
            reads
        };

        let (private_result, shared_reads) = tokio::join!(private_side, shared_side);

        let mut reads = vec![(Database::Private, private_result)];
        reads.extend(shared_reads.into_iter().map(|read| (Database::Shared, read)));
        let outcome = merge_reads(reads).map_err(|e| {
            warn!("No database could be read for {} {}: {}", T::RECORD_TYPE, kid, e);
            e
        })?;
        debug!("Merged {} {} records for {}", outcome.items.len(), T::RECORD_TYPE, kid);
        Ok(outcome)
    }

    pub async fn list_partitions(&self, database: Database) -> SyncResult<Vec<PartitionId>> {
        self.timed("list_partitions", self.client.list_partitions(database)).await
    }

    pub async fn create_share(&self, kid: &Saved<Kid>, permission: SharePermission) -> SyncResult<ShareGrant> {
        self.timed("create_share", self.client.create_share(kid, permission)).await
    }

    pub async fn fetch_share(&self, id: &RecordId) -> SyncResult<ShareGrant> {
        self.timed("fetch_share", self.client.fetch_share(id)).await
    }

    pub async fn refresh_share(&self, share: &ShareGrant) -> SyncResult<ShareGrant> {
        self.timed("refresh_share", self.client.refresh_share(share)).await
    }

    pub async fn revoke_share(&self, share: &ShareGrant) -> SyncResult<bool> {
        self.timed("revoke_share", self.client.revoke_share(share)).await
    }

    pub async fn accept_share(&self, url: &str) -> SyncResult<ShareGrant> {
        self.timed("accept_share", self.client.accept_share(url)).await
    }
}

/// Merge reads of one record type from several partitions.
///
/// A record returned by more than one read is kept once, in the position of
/// its first appearance. Each failed read becomes a warning. When no read
/// succeeded, the first failure is returned instead.
pub(crate) fn merge_reads<T>(reads: Vec<(Database, SyncResult<Vec<Saved<T>>>)>) -> SyncResult<MergeOutcome<Saved<T>>> {
    let mut items = Vec::new();
    let mut warnings = Vec::new();
    let mut first_error = None;
    let mut any_succeeded = false;

    for (database, read) in reads {
        match read {
            Ok(found) => {
                any_succeeded = true;
                items.extend(found);
            }
            Err(e) => {
                warn!("Could not read from the {} database: {}", database, e);
                warnings.push(SyncWarning {
                    database,
                    message: e.user_message(),
                });
                first_error.get_or_insert(e);
            }
        }
    }

    if !any_succeeded {
        if let Some(e) = first_error {
            return Err(e);
        }
    }

    let mut seen = HashSet::new();
    items.retain(|saved: &Saved<T>| seen.insert(saved.id().clone()));
    Ok(MergeOutcome { items, warnings })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::domain::models::ScheduledActivityRegister;
    use crate::backend::storage::memory::{Fault, MemoryCloud};
    use crate::backend::storage::record::{ChangeTag, RecordMeta, RecordType};
    use std::time::Duration;

    fn orchestrator_for(cloud: &MemoryCloud, account: &str) -> SyncOrchestrator {
        let config = SyncConfig {
            partition_retry_delay_ms: 5,
            ..SyncConfig::default()
        };
        let storage = Arc::new(cloud.connect(AccountId::new(account)));
        SyncOrchestrator::new(RemoteStoreClient::new(storage), Arc::new(config))
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_ensure_partition_creates_exactly_one() {
        let cloud = MemoryCloud::new().with_latency(Duration::from_millis(2));

        let mut handles = Vec::new();
        for _ in 0..8 {
            // Separate orchestrators so no cache is shared between callers
            let orchestrator = orchestrator_for(&cloud, "parent");
            handles.push(tokio::spawn(async move { orchestrator.ensure_partition("KidZone").await }));
        }

        let mut partitions = Vec::new();
        for handle in handles {
            partitions.push(handle.await.unwrap().unwrap());
        }

        assert!(partitions.windows(2).all(|pair| pair[0] == pair[1]));
        assert_eq!(cloud.partition_count("KidZone").unwrap(), 1);
    }

    #[tokio::test]
    async fn test_ensure_partition_retries_unavailable_once() {
        let cloud = MemoryCloud::new();
        cloud.inject(Fault::PartitionCreateFails).unwrap();
        let orchestrator = orchestrator_for(&cloud, "parent");

        let partition = orchestrator.ensure_partition("KidZone").await.unwrap();
        assert_eq!(partition.name, "KidZone");
    }

    #[tokio::test]
    async fn test_ensure_partition_gives_up_after_second_failure() {
        let cloud = MemoryCloud::new();
        cloud.inject_times(Fault::PartitionCreateFails, 2).unwrap();
        let orchestrator = orchestrator_for(&cloud, "parent");

        let err = orchestrator.ensure_partition("KidZone").await.unwrap_err();
        assert!(matches!(err, SyncError::PartitionUnavailable(_)));
        assert_eq!(cloud.partition_count("KidZone").unwrap(), 0);
    }

    #[tokio::test]
    async fn test_modify_with_retry_reapplies_on_fresh_value() {
        let cloud = MemoryCloud::new();
        let orchestrator = orchestrator_for(&cloud, "parent");
        let ctx = ActorContext::owner(AccountId::new("parent"));
        let kid = orchestrator
            .create_in_own_partition(&ctx, Kid::new("Emma").with_coins(100))
            .await
            .unwrap();

        cloud
            .inject(Fault::ConcurrentWrite {
                record_type: RecordType::Kid,
                field: "coins".into(),
                delta: 50,
            })
            .unwrap();

        let saved = orchestrator
            .modify_with_retry::<Kid, _>(&ctx, kid.id(), kid.id(), |k| {
                k.coins -= 30;
                Ok(())
            })
            .await
            .unwrap();
        assert_eq!(saved.value.coins, 120);
    }

    #[tokio::test]
    async fn test_modify_with_retry_is_bounded() {
        let cloud = MemoryCloud::new();
        let orchestrator = orchestrator_for(&cloud, "parent");
        let ctx = ActorContext::owner(AccountId::new("parent"));
        let kid = orchestrator
            .create_in_own_partition(&ctx, Kid::new("Emma"))
            .await
            .unwrap();
        cloud.inject_times(Fault::Conflict { record_type: RecordType::Kid }, 3).unwrap();

        let mut calls = 0;
        let err = orchestrator
            .modify_with_retry::<Kid, _>(&ctx, kid.id(), kid.id(), |k| {
                calls += 1;
                k.coins += 1;
                Ok(())
            })
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::SyncFailed { attempts: 3, .. }));
        assert_eq!(calls, 3);
    }

    #[tokio::test]
    async fn test_fetch_across_partitions_treats_missing_private_partition_as_empty() {
        let cloud = MemoryCloud::new();
        let owner = orchestrator_for(&cloud, "parent");
        let guest = orchestrator_for(&cloud, "child");
        let owner_ctx = ActorContext::owner(AccountId::new("parent"));
        let guest_ctx = ActorContext::guest(AccountId::new("child"));

        let kid = owner.create_in_own_partition(&owner_ctx, Kid::new("Emma")).await.unwrap();
        let grant = owner.create_share(&kid, SharePermission::ReadWrite).await.unwrap();
        guest.accept_share(&grant.url).await.unwrap();

        let outcome = guest
            .fetch_across_partitions::<ScheduledActivityRegister>(&guest_ctx, kid.id(), &RecordFilter::All)
            .await
            .unwrap();
        assert!(outcome.items.is_empty());
        assert!(!outcome.is_partial());
    }

    #[tokio::test]
    async fn test_one_failing_shared_partition_keeps_the_others() {
        let cloud = MemoryCloud::new();
        let parent = orchestrator_for(&cloud, "parent");
        let parent_ctx = ActorContext::owner(AccountId::new("parent"));
        let kid = parent.create_in_own_partition(&parent_ctx, Kid::new("Emma")).await.unwrap();

        for relative in ["grandma", "nanny"] {
            let other = orchestrator_for(&cloud, relative);
            let ctx = ActorContext::owner(AccountId::new(relative));
            let cousin = other.create_in_own_partition(&ctx, Kid::new(relative)).await.unwrap();
            let grant = other.create_share(&cousin, SharePermission::ReadOnly).await.unwrap();
            parent.accept_share(&grant.url).await.unwrap();
        }

        let everything = parent
            .fetch_across_partitions::<Kid>(&parent_ctx, kid.id(), &RecordFilter::All)
            .await
            .unwrap();
        assert_eq!(everything.items.len(), 3);
        assert!(!everything.is_partial());

        cloud.inject(Fault::Unavailable { database: Database::Shared }).unwrap();
        let outcome = parent
            .fetch_across_partitions::<Kid>(&parent_ctx, kid.id(), &RecordFilter::All)
            .await
            .unwrap();
        assert_eq!(outcome.items.len(), 2);
        assert_eq!(outcome.warnings.len(), 1);
        assert_eq!(outcome.warnings[0].database, Database::Shared);
    }

    fn saved_kid(partition: &PartitionId, name: &str) -> Saved<Kid> {
        Saved::new(
            RecordMeta {
                id: RecordId::new(name, partition.clone()),
                change_tag: ChangeTag(1),
            },
            Kid::new(name),
        )
    }

    #[test]
    fn test_merge_reads_keeps_one_copy_of_each_record() {
        let partition = PartitionId::new("KidZone", AccountId::new("parent"));
        let outcome = merge_reads(vec![
            (Database::Private, Ok(vec![saved_kid(&partition, "emma"), saved_kid(&partition, "liam")])),
            (Database::Shared, Ok(vec![saved_kid(&partition, "emma"), saved_kid(&partition, "noah")])),
        ])
        .unwrap();

        let names: Vec<&str> = outcome.items.iter().map(|k| k.id().name.as_str()).collect();
        assert_eq!(names, vec!["emma", "liam", "noah"]);
        assert!(!outcome.is_partial());
    }

    #[test]
    fn test_merge_reads_returns_first_error_when_nothing_was_read() {
        let partition = PartitionId::new("KidZone", AccountId::new("parent"));
        let err = merge_reads::<Kid>(vec![
            (Database::Private, Err(SyncError::Store("private down".into()))),
            (Database::Shared, Err(SyncError::AccessDenied("revoked".into()))),
        ])
        .unwrap_err();
        assert!(matches!(err, SyncError::Store(_)));

        let outcome = merge_reads(vec![
            (Database::Private, Err(SyncError::Store("private down".into()))),
            (Database::Shared, Ok(vec![saved_kid(&partition, "emma")])),
        ])
        .unwrap();
        assert_eq!(outcome.items.len(), 1);
        assert_eq!(outcome.warnings[0].database, Database::Private);
    }

    #[tokio::test]
    async fn test_timeout_is_reported() {
        let cloud = MemoryCloud::new().with_latency(Duration::from_millis(200));
        let config = SyncConfig {
            operation_timeout_ms: 10,
            ..SyncConfig::default()
        };
        let storage = Arc::new(cloud.connect(AccountId::new("parent")));
        let orchestrator = SyncOrchestrator::new(RemoteStoreClient::new(storage), Arc::new(config));

        let err = orchestrator.ensure_partition("KidZone").await.unwrap_err();
        assert!(matches!(err, SyncError::Timeout { millis: 10, .. }));
    }
}
