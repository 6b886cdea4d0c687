//! # Storage Traits
//!
//! The raw record backend the synchronization core talks to. Implementations
//! see one account's view of the remote store: a private database holding the
//! partitions the account owns and a shared database holding partitions other
//! accounts have granted it access to.
//!
//! The trait deals in untyped [`RemoteRecord`]s only. Entity mapping lives in
//! the codec and the typed client on top of it.

use async_trait::async_trait;

use crate::backend::domain::errors::SyncResult;
use crate::backend::domain::models::ShareGrant;
use crate::backend::storage::record::{
    AccountId, Database, PartitionId, RecordFilter, RecordId, RecordType, RemoteRecord,
};
use shared::SharePermission;

/// One account's connection to the remote record store
#[async_trait]
pub trait RecordStorage: Send + Sync {
    /// Account every call is made as
    fn account(&self) -> &AccountId;

    /// Records of `record_type` in `partition` matching `filter`.
    /// Fails with `RecordNotFound` when the partition does not exist.
    async fn query_records(
        &self,
        database: Database,
        partition: &PartitionId,
        record_type: RecordType,
        filter: &RecordFilter,
    ) -> SyncResult<Vec<RemoteRecord>>;

    /// A single record by identity
    async fn fetch_record(&self, database: Database, id: &RecordId) -> SyncResult<RemoteRecord>;

    /// Store a record without identity; returns it with the assigned identity and change tag
    async fn save_record(
        &self,
        database: Database,
        partition: &PartitionId,
        record: RemoteRecord,
    ) -> SyncResult<RemoteRecord>;

    /// Overwrite a record. Fails with `ConcurrencyConflict` when the change tag is stale.
    async fn modify_record(&self, database: Database, record: RemoteRecord) -> SyncResult<RemoteRecord>;

    /// Returns false when the record was already gone
    async fn delete_record(&self, database: Database, id: &RecordId) -> SyncResult<bool>;

    /// The caller's own partition with this name, if it exists
    async fn fetch_partition(&self, name: &str) -> SyncResult<Option<PartitionId>>;

    /// Create a partition owned by the caller. Fails with `PartitionExists` on a duplicate.
    async fn create_partition(&self, name: &str) -> SyncResult<PartitionId>;

    /// Partitions visible in `database`
    async fn list_partitions(&self, database: Database) -> SyncResult<Vec<PartitionId>>;

    /// Create the grant rooted at `root`, or return the one that already exists
    async fn save_share(&self, root: &RecordId, permission: SharePermission) -> SyncResult<ShareGrant>;

    async fn fetch_share(&self, id: &RecordId) -> SyncResult<ShareGrant>;

    /// Re-save a grant, bumping its change tag
    async fn modify_share(&self, share: &ShareGrant) -> SyncResult<ShareGrant>;

    /// Returns false when the grant was already gone
    async fn delete_share(&self, id: &RecordId) -> SyncResult<bool>;

    /// Join a grant as a participant using the link the owner handed out
    async fn accept_share(&self, url: &str) -> SyncResult<ShareGrant>;
}
