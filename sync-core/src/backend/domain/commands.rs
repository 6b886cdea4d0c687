//! Domain-level result and policy types.
//! These are used by services inside the domain layer. The io layer maps them
//! to the DTOs in the `shared` crate.

pub mod ledger {
    /// How a committed delta treats a remote balance that cannot cover it
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum DeltaPolicy {
        /// Clamp the result at zero
        Clamp,
        /// Fail with `InsufficientFunds` instead of clamping
        RequireFunds,
    }
}

pub mod merge {
    use crate::backend::storage::record::Database;

    /// A partition that could not be read during a cross-partition fetch
    #[derive(Debug, Clone, PartialEq)]
    pub struct SyncWarning {
        pub database: Database,
        pub message: String,
    }

    /// Union of everything that could be read, plus what could not
    #[derive(Debug, Clone)]
    pub struct MergeOutcome<T> {
        pub items: Vec<T>,
        pub warnings: Vec<SyncWarning>,
    }

    impl<T> MergeOutcome<T> {
        pub fn is_partial(&self) -> bool {
            !self.warnings.is_empty()
        }
    }
}

pub mod rewards {
    use crate::backend::domain::models::{CollectedReward, Saved};

    /// Result of a committed purchase
    #[derive(Debug, Clone)]
    pub struct PurchaseResult {
        pub reward: Saved<CollectedReward>,
        pub balance: i64,
    }
}

pub mod activities {
    use crate::backend::domain::models::{Saved, ScheduledActivityRegister};

    /// Result of a status transition
    #[derive(Debug, Clone)]
    pub struct StatusChangeResult {
        pub register: Saved<ScheduledActivityRegister>,
        /// Coins credited because this transition first completed the activity
        pub coins_awarded: i64,
        /// Balance after the award, when one happened
        pub balance: Option<i64>,
    }
}
