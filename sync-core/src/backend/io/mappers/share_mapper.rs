use crate::backend::domain::models::ShareGrant;
use shared::ShareResponse;

/// Mapper from share grants to the shared DTOs.
pub struct ShareMapper;

impl ShareMapper {
    pub fn to_share_response(grant: ShareGrant, message: &str) -> ShareResponse {
        ShareResponse {
            url: grant.url,
            permission: grant.permission,
            participant_count: grant.participants.len(),
            success_message: message.to_string(),
        }
    }
}
