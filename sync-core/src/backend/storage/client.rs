//! # Remote Store Client
//!
//! Typed capability surface over a [`RecordStorage`] backend. Every call takes
//! domain entities in and hands domain entities back, running the codec at the
//! boundary:
//!
//! - `save` accepts only [`Persisted::Unsaved`] entities
//! - `modify` sends the full record including its change tag
//! - a fetch with a single undecodable record fails as a whole

use log::debug;
use std::sync::Arc;

use crate::backend::domain::errors::{SyncError, SyncResult};
use crate::backend::domain::models::{Kid, Persisted, Saved, ShareGrant};
use crate::backend::storage::codec::RecordCodec;
use crate::backend::storage::record::{AccountId, Database, PartitionId, RecordFilter, RecordId};
use crate::backend::storage::traits::RecordStorage;
use shared::SharePermission;

#[derive(Clone)]
pub struct RemoteStoreClient {
    storage: Arc<dyn RecordStorage>,
}

impl RemoteStoreClient {
    pub fn new(storage: Arc<dyn RecordStorage>) -> Self {
        Self { storage }
    }

    pub fn account(&self) -> &AccountId {
        self.storage.account()
    }

    pub async fn fetch<T: RecordCodec>(
        &self,
        database: Database,
        partition: &PartitionId,
        filter: &RecordFilter,
    ) -> SyncResult<Vec<Saved<T>>> {
        let records = self
            .storage
            .query_records(database, partition, T::RECORD_TYPE, filter)
            .await?;
        debug!("Fetched {} {} records from {} {}", records.len(), T::RECORD_TYPE, database, partition);

        records
            .into_iter()
            .map(|record| T::from_record(record).map_err(SyncError::from))
            .collect()
    }

    pub async fn fetch_one<T: RecordCodec>(&self, database: Database, id: &RecordId) -> SyncResult<Saved<T>> {
        let record = self.storage.fetch_record(database, id).await?;
        Ok(T::from_record(record)?)
    }

    pub async fn save<T: RecordCodec>(
        &self,
        entity: &Persisted<T>,
        database: Database,
        partition: &PartitionId,
    ) -> SyncResult<Saved<T>> {
        let record = T::to_record(entity)?;
        let stored = self.storage.save_record(database, partition, record).await?;
        Ok(T::from_record(stored)?)
    }

    pub async fn modify<T: RecordCodec>(&self, saved: &Saved<T>, database: Database) -> SyncResult<Saved<T>> {
        let record = T::to_saved_record(saved);
        let stored = self.storage.modify_record(database, record).await?;
        Ok(T::from_record(stored)?)
    }

    pub async fn delete<T: RecordCodec>(&self, saved: &Saved<T>, database: Database) -> SyncResult<bool> {
        self.storage.delete_record(database, saved.id()).await
    }

    pub async fn create_partition(&self, name: &str) -> SyncResult<PartitionId> {
        self.storage.create_partition(name).await
    }

    pub async fn fetch_partition(&self, name: &str) -> SyncResult<Option<PartitionId>> {
        self.storage.fetch_partition(name).await
    }

    pub async fn list_partitions(&self, database: Database) -> SyncResult<Vec<PartitionId>> {
        self.storage.list_partitions(database).await
    }

    /// Grant rooted at the kid record
    pub async fn create_share(&self, kid: &Saved<Kid>, permission: SharePermission) -> SyncResult<ShareGrant> {
        self.storage.save_share(kid.id(), permission).await
    }

    pub async fn fetch_share(&self, id: &RecordId) -> SyncResult<ShareGrant> {
        self.storage.fetch_share(id).await
    }

    pub async fn refresh_share(&self, share: &ShareGrant) -> SyncResult<ShareGrant> {
        self.storage.modify_share(share).await
    }

    pub async fn revoke_share(&self, share: &ShareGrant) -> SyncResult<bool> {
        self.storage.delete_share(&share.id).await
    }

    pub async fn accept_share(&self, url: &str) -> SyncResult<ShareGrant> {
        self.storage.accept_share(url).await
    }
}
