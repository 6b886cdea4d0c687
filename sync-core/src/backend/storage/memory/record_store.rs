//! One account's view of the in-memory cloud.
//!
//! ## Access Rules
//!
//! - Private database: only partitions the caller owns
//! - Shared database: only records covered by a grant the caller participates
//!   in, where a grant covers its root record and the root's direct children
//! - Writes through the shared database need a read-write grant
//! - Share grants can only be created, re-saved or deleted by the partition owner

use async_trait::async_trait;
use log::{debug, info};
use std::collections::BTreeSet;
use std::time::Duration;
use uuid::Uuid;

use super::connection::MemoryCloud;
use super::faults::Fault;
use crate::backend::domain::errors::{SyncError, SyncResult};
use crate::backend::domain::models::ShareGrant;
use crate::backend::storage::record::{
    AccountId, Database, PartitionId, RecordFilter, RecordId, RecordMeta, RecordType,
    RemoteRecord,
};
use crate::backend::storage::traits::RecordStorage;
use shared::SharePermission;

const SHARE_URL_PREFIX: &str = "https://share.chorecoins.app/";

#[derive(Clone)]
pub struct MemoryRecordStore {
    cloud: MemoryCloud,
    account: AccountId,
}

impl MemoryRecordStore {
    pub(super) fn new(cloud: MemoryCloud, account: AccountId) -> Self {
        Self { cloud, account }
    }

    fn unavailable(database: Database) -> SyncError {
        SyncError::Store(format!("{database} database is unavailable"))
    }

    /// Check access and change tag, then store `record`. Also returns how long
    /// the reply should be held back.
    fn apply_modify(&self, database: Database, mut record: RemoteRecord) -> SyncResult<(RemoteRecord, Option<Duration>)> {
        let meta = record
            .meta
            .clone()
            .ok_or_else(|| SyncError::NotPersisted(record.record_type.to_string()))?;
        let record_type = record.record_type;

        let mut state = self.cloud.lock()?;
        state.check_partition(&self.account, database, &meta.id.partition)?;
        let stored_parent = state
            .records
            .get(&meta.id)
            .map(|stored| stored.parent.clone())
            .ok_or_else(|| SyncError::RecordNotFound(meta.id.to_string()))?;
        state.check_record(&self.account, database, Some(&meta.id), stored_parent.as_ref(), true)?;

        if state.faults.take_exact(&Fault::ModifyFails { record_type }) {
            return Err(SyncError::Store(format!("modify of {record_type} rejected")));
        }
        if state.faults.take_exact(&Fault::Conflict { record_type }) {
            return Err(SyncError::ConcurrencyConflict { record: meta.id.to_string() });
        }
        let concurrent = state.faults.take(|fault| {
            matches!(fault, Fault::ConcurrentWrite { record_type: t, .. } if *t == record_type)
        });
        if let Some(Fault::ConcurrentWrite { field, delta, .. }) = concurrent {
            state.add_to_field(&meta.id, &field, delta);
            debug!("Simulated concurrent write of {delta} to {field} on {}", meta.id);
        }

        let current_tag = state
            .records
            .get(&meta.id)
            .and_then(|stored| stored.meta.as_ref())
            .map(|m| m.change_tag);
        if current_tag != Some(meta.change_tag) {
            return Err(SyncError::ConcurrencyConflict { record: meta.id.to_string() });
        }

        let change_tag = state.next_change_tag();
        record.meta = Some(RecordMeta { id: meta.id.clone(), change_tag });
        record.parent = stored_parent;
        state.records.insert(meta.id.clone(), record.clone());

        let late = state.faults.take(|fault| {
            matches!(
                fault,
                Fault::LateAck { record_type: t, .. } | Fault::LateAckThenWrite { record_type: t, .. }
                    if *t == record_type
            )
        });
        let reply_delay = match late {
            Some(Fault::LateAck { delay_ms, .. }) => Some(Duration::from_millis(delay_ms)),
            Some(Fault::LateAckThenWrite { delay_ms, field, delta, .. }) => {
                state.add_to_field(&meta.id, &field, delta);
                debug!("Simulated write of {delta} to {field} on {} after an unacknowledged modify", meta.id);
                Some(Duration::from_millis(delay_ms))
            }
            _ => None,
        };
        Ok((record, reply_delay))
    }
}

#[async_trait]
impl RecordStorage for MemoryRecordStore {
    fn account(&self) -> &AccountId {
        &self.account
    }

    async fn query_records(
        &self,
        database: Database,
        partition: &PartitionId,
        record_type: RecordType,
        filter: &RecordFilter,
    ) -> SyncResult<Vec<RemoteRecord>> {
        self.cloud.simulate_latency().await;
        let mut state = self.cloud.lock()?;
        if state.faults.take_exact(&Fault::Unavailable { database }) {
            return Err(Self::unavailable(database));
        }
        state.check_partition(&self.account, database, partition)?;

        let mut records: Vec<RemoteRecord> = state
            .records
            .values()
            .filter(|r| r.record_type == record_type && filter.matches(r))
            .filter(|r| r.id().map(|id| &id.partition) == Some(partition))
            .filter(|r| {
                state
                    .check_record(&self.account, database, r.id(), r.parent.as_ref(), false)
                    .is_ok()
            })
            .cloned()
            .collect();
        records.sort_by(|a, b| a.id().cmp(&b.id()));
        Ok(records)
    }

    async fn fetch_record(&self, database: Database, id: &RecordId) -> SyncResult<RemoteRecord> {
        self.cloud.simulate_latency().await;
        let mut state = self.cloud.lock()?;
        if state.faults.take_exact(&Fault::Unavailable { database }) {
            return Err(Self::unavailable(database));
        }
        state.check_partition(&self.account, database, &id.partition)?;

        let record = state
            .records
            .get(id)
            .ok_or_else(|| SyncError::RecordNotFound(id.to_string()))?;
        state.check_record(&self.account, database, Some(id), record.parent.as_ref(), false)?;
        Ok(record.clone())
    }

    async fn save_record(
        &self,
        database: Database,
        partition: &PartitionId,
        mut record: RemoteRecord,
    ) -> SyncResult<RemoteRecord> {
        self.cloud.simulate_latency().await;
        if let Some(id) = record.id() {
            return Err(SyncError::AlreadyPersisted(format!("{} {}", record.record_type, id)));
        }

        let mut state = self.cloud.lock()?;
        state.check_partition(&self.account, database, partition)?;
        state.check_record(&self.account, database, None, record.parent.as_ref(), true)?;
        if state.faults.take_exact(&Fault::SaveFails { record_type: record.record_type }) {
            return Err(SyncError::Store(format!("save of {} rejected", record.record_type)));
        }

        let id = RecordId::generate(partition.clone());
        let change_tag = state.next_change_tag();
        record.meta = Some(RecordMeta { id: id.clone(), change_tag });
        state.records.insert(id.clone(), record.clone());
        debug!("{} saved {} {} in {}", self.account, record.record_type, id, partition);
        Ok(record)
    }

    async fn modify_record(&self, database: Database, record: RemoteRecord) -> SyncResult<RemoteRecord> {
        self.cloud.simulate_latency().await;
        let record_type = record.record_type;

        let stall = self.cloud.lock()?.faults.take(|fault| {
            matches!(fault, Fault::StalledWrite { record_type: t, .. } if *t == record_type)
        });
        if let Some(Fault::StalledWrite { delay_ms, .. }) = stall {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }

        let (stored, reply_delay) = self.apply_modify(database, record)?;
        if let Some(delay) = reply_delay {
            tokio::time::sleep(delay).await;
        }
        Ok(stored)
    }

    async fn delete_record(&self, database: Database, id: &RecordId) -> SyncResult<bool> {
        self.cloud.simulate_latency().await;
        let mut state = self.cloud.lock()?;
        state.check_partition(&self.account, database, &id.partition)?;

        let (record_type, parent) = match state.records.get(id) {
            Some(stored) => (stored.record_type, stored.parent.clone()),
            None => return Ok(false),
        };
        state.check_record(&self.account, database, Some(id), parent.as_ref(), true)?;
        if state.faults.take_exact(&Fault::DeleteFails { record_type }) {
            return Err(SyncError::Store(format!("delete of {record_type} rejected")));
        }

        state.records.remove(id);
        state.shares.retain(|_, grant| &grant.root != id);
        Ok(true)
    }

    async fn fetch_partition(&self, name: &str) -> SyncResult<Option<PartitionId>> {
        self.cloud.simulate_latency().await;
        let state = self.cloud.lock()?;
        let partition = PartitionId::new(name, self.account.clone());
        Ok(state.partitions.contains(&partition).then_some(partition))
    }

    async fn create_partition(&self, name: &str) -> SyncResult<PartitionId> {
        self.cloud.simulate_latency().await;
        let mut state = self.cloud.lock()?;
        if state.faults.take_exact(&Fault::PartitionCreateFails) {
            return Err(SyncError::PartitionUnavailable(name.to_string()));
        }

        let partition = PartitionId::new(name, self.account.clone());
        if !state.partitions.insert(partition.clone()) {
            return Err(SyncError::PartitionExists(partition.to_string()));
        }
        info!("Created partition {}", partition);
        Ok(partition)
    }

    async fn list_partitions(&self, database: Database) -> SyncResult<Vec<PartitionId>> {
        self.cloud.simulate_latency().await;
        let state = self.cloud.lock()?;
        let partitions: BTreeSet<PartitionId> = match database {
            Database::Private => state
                .partitions
                .iter()
                .filter(|p| p.is_owned_by(&self.account))
                .cloned()
                .collect(),
            Database::Shared => state
                .shares
                .values()
                .filter(|g| g.has_participant(&self.account) && !g.root.partition.is_owned_by(&self.account))
                .map(|g| g.root.partition.clone())
                .collect(),
        };
        Ok(partitions.into_iter().collect())
    }

    async fn save_share(&self, root: &RecordId, permission: SharePermission) -> SyncResult<ShareGrant> {
        self.cloud.simulate_latency().await;
        let mut state = self.cloud.lock()?;
        if !root.partition.is_owned_by(&self.account) {
            return Err(SyncError::AccessDenied(format!("{} cannot share {}", self.account, root)));
        }
        if !state.records.contains_key(root) {
            return Err(SyncError::RecordNotFound(root.to_string()));
        }
        if let Some(existing) = state.shares.values().find(|g| &g.root == root) {
            return Ok(existing.clone());
        }

        let token = Uuid::new_v4();
        let change_tag = state.next_change_tag();
        let grant = ShareGrant {
            id: RecordId::new(format!("share-{token}"), root.partition.clone()),
            root: root.clone(),
            url: format!("{SHARE_URL_PREFIX}{token}"),
            permission,
            participants: vec![self.account.clone()],
            change_tag,
        };
        state.shares.insert(grant.id.clone(), grant.clone());
        info!("{} shared {} ({})", self.account, root, permission);
        Ok(grant)
    }

    async fn fetch_share(&self, id: &RecordId) -> SyncResult<ShareGrant> {
        self.cloud.simulate_latency().await;
        let state = self.cloud.lock()?;
        let grant = state
            .shares
            .get(id)
            .ok_or_else(|| SyncError::RecordNotFound(id.to_string()))?;
        if !id.partition.is_owned_by(&self.account) && !grant.has_participant(&self.account) {
            return Err(SyncError::AccessDenied(format!("share {id} is not visible to {}", self.account)));
        }
        Ok(grant.clone())
    }

    async fn modify_share(&self, share: &ShareGrant) -> SyncResult<ShareGrant> {
        self.cloud.simulate_latency().await;
        let mut state = self.cloud.lock()?;
        if !share.id.partition.is_owned_by(&self.account) {
            return Err(SyncError::AccessDenied(format!("{} cannot modify share {}", self.account, share.id)));
        }
        let stored_tag = state
            .shares
            .get(&share.id)
            .map(|g| g.change_tag)
            .ok_or_else(|| SyncError::RecordNotFound(share.id.to_string()))?;
        if stored_tag != share.change_tag {
            return Err(SyncError::ConcurrencyConflict { record: share.id.to_string() });
        }

        let change_tag = state.next_change_tag();
        let grant = state
            .shares
            .get_mut(&share.id)
            .ok_or_else(|| SyncError::RecordNotFound(share.id.to_string()))?;
        grant.permission = share.permission;
        grant.change_tag = change_tag;
        Ok(grant.clone())
    }

    async fn delete_share(&self, id: &RecordId) -> SyncResult<bool> {
        self.cloud.simulate_latency().await;
        let mut state = self.cloud.lock()?;
        if !id.partition.is_owned_by(&self.account) {
            return Err(SyncError::AccessDenied(format!("{} cannot revoke share {id}", self.account)));
        }
        Ok(state.shares.remove(id).is_some())
    }

    async fn accept_share(&self, url: &str) -> SyncResult<ShareGrant> {
        self.cloud.simulate_latency().await;
        let mut state = self.cloud.lock()?;
        let id = state
            .shares
            .values()
            .find(|g| g.url == url)
            .map(|g| g.id.clone())
            .ok_or_else(|| SyncError::RecordNotFound(format!("share link {url}")))?;

        let change_tag = state.next_change_tag();
        let grant = state
            .shares
            .get_mut(&id)
            .ok_or_else(|| SyncError::RecordNotFound(id.to_string()))?;
        if !grant.has_participant(&self.account) {
            grant.participants.push(self.account.clone());
            grant.change_tag = change_tag;
            info!("{} joined share {}", self.account, id);
        }
        Ok(grant.clone())
    }
}
