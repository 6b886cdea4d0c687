//! # In-Memory Storage Module
//!
//! A self-contained simulation of the remote record store. It backs the test
//! suite and local development builds that have no cloud account.
//!
//! ## Features
//!
//! - Several accounts connected to one cloud, each with a private and a shared database
//! - Store-assigned record identities and per-record change tags
//! - Share grants covering a root record and its direct children
//! - One-shot fault injection and optional per-call latency

pub mod connection;
pub mod faults;
pub mod record_store;

#[cfg(test)]
pub mod test_utils;

pub use connection::MemoryCloud;
pub use faults::Fault;
pub use record_store::MemoryRecordStore;
