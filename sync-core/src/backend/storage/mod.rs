//! # Storage Module
//!
//! Everything between the domain services and the remote record store.
//!
//! ## Layers
//!
//! - **record**: untyped records, identities, partitions and filters
//! - **codec**: entity to record mapping and back
//! - **traits**: the raw [`RecordStorage`] backend interface
//! - **client**: typed fetch/save/modify/delete/share calls over a backend
//! - **partition**: private vs shared routing for the acting account
//! - **orchestrator**: partition bootstrap, timeouts, retry loop, cross-partition reads
//! - **memory**: in-memory backend used by tests and local development
//!
//! ## Design Principles
//!
//! - **Optimistic concurrency only**: the store's per-record change tag is the
//!   only coordination; there are no locks spanning remote calls
//! - **Dependency inversion**: services depend on [`RecordStorage`], never on a
//!   concrete backend

pub mod client;
pub mod codec;
pub mod memory;
pub mod orchestrator;
pub mod partition;
pub mod record;
pub mod traits;

pub use client::RemoteStoreClient;
pub use codec::RecordCodec;
pub use orchestrator::SyncOrchestrator;
pub use partition::{PartitionRouter, Route};
pub use record::{AccountId, ChangeTag, Database, PartitionId, RecordFilter, RecordId, RecordType, RemoteRecord};
pub use traits::RecordStorage;
