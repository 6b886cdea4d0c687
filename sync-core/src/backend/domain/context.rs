//! The acting account and its role, passed explicitly to every operation.

use crate::backend::storage::record::AccountId;
use shared::Role;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActorContext {
    pub account: AccountId,
    pub role: Role,
}

impl ActorContext {
    pub fn new(account: AccountId, role: Role) -> Self {
        Self { account, role }
    }

    pub fn owner(account: AccountId) -> Self {
        Self::new(account, Role::Owner)
    }

    pub fn guest(account: AccountId) -> Self {
        Self::new(account, Role::Guest)
    }

    pub fn is_owner(&self) -> bool {
        self.role == Role::Owner
    }
}
