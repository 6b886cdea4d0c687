//! Shared state of the in-memory cloud.
//!
//! One [`MemoryCloud`] stands in for the remote service. Every account gets its
//! own [`MemoryRecordStore`] view via [`MemoryCloud::connect`], so an owner and
//! a guest in the same test really contend on the same records and change tags.

use log::debug;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use super::faults::{Fault, FaultPlan};
use super::record_store::MemoryRecordStore;
use crate::backend::domain::errors::{SyncError, SyncResult};
use crate::backend::domain::models::ShareGrant;
use crate::backend::storage::record::{
    AccountId, ChangeTag, Database, FieldValue, PartitionId, RecordId, RecordMeta, RecordType, RemoteRecord,
};

#[derive(Debug, Default)]
pub(super) struct CloudState {
    pub(super) partitions: BTreeSet<PartitionId>,
    pub(super) records: HashMap<RecordId, RemoteRecord>,
    pub(super) shares: HashMap<RecordId, ShareGrant>,
    pub(super) faults: FaultPlan,
    last_tag: u64,
}

impl CloudState {
    pub(super) fn next_change_tag(&mut self) -> ChangeTag {
        self.last_tag += 1;
        ChangeTag(self.last_tag)
    }

    /// Write from another device: add `delta` to the integer `field` of `id`,
    /// clamped at zero, and bump its change tag
    pub(super) fn add_to_field(&mut self, id: &RecordId, field: &str, delta: i64) {
        let change_tag = self.next_change_tag();
        if let Some(stored) = self.records.get_mut(id) {
            if let Some(FieldValue::Int(current)) = stored.get(field).cloned() {
                stored.set(field, FieldValue::Int(current.saturating_add(delta).max(0)));
            }
            stored.meta = Some(RecordMeta {
                id: id.clone(),
                change_tag,
            });
        }
    }

    /// Grant held by `caller` whose root is either the record itself or its parent
    pub(super) fn covering_grant(
        &self,
        caller: &AccountId,
        id: Option<&RecordId>,
        parent: Option<&RecordId>,
    ) -> Option<&ShareGrant> {
        self.shares.values().find(|grant| {
            grant.has_participant(caller) && (Some(&grant.root) == id || Some(&grant.root) == parent)
        })
    }

    /// Whether `caller` may reach `partition` through `database` at all
    pub(super) fn check_partition(
        &self,
        caller: &AccountId,
        database: Database,
        partition: &PartitionId,
    ) -> SyncResult<()> {
        match database {
            Database::Private if !partition.is_owned_by(caller) => {
                return Err(SyncError::AccessDenied(format!(
                    "{caller} does not own partition {partition}"
                )));
            }
            Database::Shared if partition.is_owned_by(caller) => {
                return Err(SyncError::AccessDenied(format!(
                    "{partition} is not in the shared database of its owner"
                )));
            }
            _ => {}
        }

        if !self.partitions.contains(partition) {
            return Err(SyncError::RecordNotFound(format!("partition {partition}")));
        }

        if database == Database::Shared {
            let has_grant = self
                .shares
                .values()
                .any(|grant| &grant.root.partition == partition && grant.has_participant(caller));
            if !has_grant {
                return Err(SyncError::AccessDenied(format!(
                    "no share grant for {partition} held by {caller}"
                )));
            }
        }
        Ok(())
    }

    /// Whether `caller` may read (or write) a single record in `database`
    pub(super) fn check_record(
        &self,
        caller: &AccountId,
        database: Database,
        id: Option<&RecordId>,
        parent: Option<&RecordId>,
        write: bool,
    ) -> SyncResult<()> {
        if database == Database::Private {
            return Ok(());
        }
        match self.covering_grant(caller, id, parent) {
            None => Err(SyncError::AccessDenied(format!(
                "record {} is not shared with {caller}",
                id.or(parent).map(|r| r.to_string()).unwrap_or_else(|| "(new)".to_string())
            ))),
            Some(grant) if write && !grant.allows_write() => Err(SyncError::AccessDenied(format!(
                "share {} is read-only",
                grant.id
            ))),
            Some(_) => Ok(()),
        }
    }
}

/// The simulated remote service shared by every connected account
#[derive(Clone, Default)]
pub struct MemoryCloud {
    state: Arc<Mutex<CloudState>>,
    latency: Option<Duration>,
}

impl MemoryCloud {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every remote call by `latency` so concurrent callers interleave
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// A store view acting as `account`
    pub fn connect(&self, account: AccountId) -> MemoryRecordStore {
        debug!("Connecting {} to the in-memory cloud", account);
        MemoryRecordStore::new(self.clone(), account)
    }

    pub fn inject(&self, fault: Fault) -> SyncResult<()> {
        self.lock()?.faults.push(fault);
        Ok(())
    }

    pub fn inject_times(&self, fault: Fault, times: usize) -> SyncResult<()> {
        let mut state = self.lock()?;
        for _ in 0..times {
            state.faults.push(fault.clone());
        }
        Ok(())
    }

    pub fn pending_faults(&self) -> SyncResult<usize> {
        Ok(self.lock()?.faults.pending())
    }

    /// Store a record as-is, skipping access checks and schema validation
    pub fn insert_raw(&self, partition: &PartitionId, mut record: RemoteRecord) -> SyncResult<RecordId> {
        let mut state = self.lock()?;
        if !state.partitions.contains(partition) {
            return Err(SyncError::RecordNotFound(format!("partition {partition}")));
        }
        let id = RecordId::generate(partition.clone());
        let change_tag = state.next_change_tag();
        record.meta = Some(RecordMeta { id: id.clone(), change_tag });
        state.records.insert(id.clone(), record);
        Ok(id)
    }

    /// Partitions with this name across every account
    pub fn partition_count(&self, name: &str) -> SyncResult<usize> {
        Ok(self.lock()?.partitions.iter().filter(|p| p.name == name).count())
    }

    pub fn record_count(&self, record_type: RecordType) -> SyncResult<usize> {
        Ok(self
            .lock()?
            .records
            .values()
            .filter(|r| r.record_type == record_type)
            .count())
    }

    pub fn share_count(&self) -> SyncResult<usize> {
        Ok(self.lock()?.shares.len())
    }

    pub(super) fn lock(&self) -> SyncResult<MutexGuard<'_, CloudState>> {
        self.state
            .lock()
            .map_err(|_| SyncError::Store("in-memory cloud state is poisoned".to_string()))
    }

    pub(super) async fn simulate_latency(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}
