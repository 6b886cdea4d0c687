//! Share grants: the authorization object that lets a guest account reach an
//! owner's kid profile.

use crate::backend::storage::record::{AccountId, ChangeTag, RecordId};
use shared::SharePermission;

/// Handle to a persisted share grant
#[derive(Debug, Clone, PartialEq)]
pub struct ShareGrant {
    pub id: RecordId,
    /// Record the grant is rooted at; children whose parent is the root are covered
    pub root: RecordId,
    /// Link the owner hands to the guest device
    pub url: String,
    pub permission: SharePermission,
    pub participants: Vec<AccountId>,
    pub change_tag: ChangeTag,
}

impl ShareGrant {
    pub fn allows_write(&self) -> bool {
        self.permission == SharePermission::ReadWrite
    }

    pub fn has_participant(&self, account: &AccountId) -> bool {
        self.participants.iter().any(|p| p == account)
    }
}
