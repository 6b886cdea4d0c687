//! Synchronization core for the Chore Coins parent and child apps.

pub mod backend;

pub use backend::{KidSession, SyncBackend, SyncConfig};
