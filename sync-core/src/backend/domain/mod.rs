//! # Domain Module
//!
//! Business logic of the Chore Coins sync core, independent of any particular
//! remote store implementation.
//!
//! ## Module Organization
//!
//! - **coin_ledger**: cached balance and conflict-safe delta commits
//! - **rewards_service**: purchases as an all-or-nothing debit plus reward record
//! - **activity_register_service**: scheduled activities across both databases
//! - **share_service**: granting and revoking the guest's access
//! - **kid_service**: creating, listing and renaming kid profiles
//!
//! ## Core Concepts
//!
//! - **Kid aggregate**: the kid record owns the balance; activities and
//!   rewards hang under it
//! - **Actor context**: the acting account and its role, passed to every call
//! - **Observable state**: each service publishes a snapshot with a loading
//!   flag and the last error for the UI
//!
//! ## Business Rules
//!
//! - Balances never go negative
//! - A collected reward never exists without its committed debit
//! - A failed operation always reverts the optimistic local state it changed

pub mod activity_register_service;
pub mod coin_ledger;
pub mod commands;
pub mod context;
pub mod errors;
pub mod kid_service;
pub mod models;
pub mod rewards_service;
pub mod share_service;
pub mod state;

pub use activity_register_service::ActivityRegisterService;
pub use coin_ledger::CoinLedger;
pub use context::ActorContext;
pub use errors::{DecodeError, SyncError, SyncResult};
pub use kid_service::KidService;
pub use rewards_service::RewardsService;
pub use share_service::ShareService;
pub use state::{ObservableState, Observed};
