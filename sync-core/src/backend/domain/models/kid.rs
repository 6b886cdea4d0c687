//! Domain model for a kid profile, the aggregate that owns the coin balance.

use crate::backend::storage::record::RecordId;

/// Longest display name accepted for a kid profile
pub const MAX_KID_NAME_LENGTH: usize = 100;

#[derive(Debug, Clone, PartialEq)]
pub struct Kid {
    pub name: String,
    /// Coin balance, never negative
    pub coins: i64,
    /// Share grant currently attached to the profile
    pub share: Option<RecordId>,
}

impl Kid {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            coins: 0,
            share: None,
        }
    }

    pub fn with_coins(mut self, coins: i64) -> Self {
        self.coins = clamp_balance(coins);
        self
    }
}

/// Balances are clamped at zero; there is no upper bound
pub fn clamp_balance(value: i64) -> i64 {
    value.max(0)
}

/// `clamp(current + delta, 0, ∞)` without overflow
pub fn apply_delta_to(current: i64, delta: i64) -> i64 {
    clamp_balance(current.saturating_add(delta))
}
