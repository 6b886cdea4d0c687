use crate::backend::domain::commands::rewards::PurchaseResult;
use crate::backend::domain::models::{CollectedReward as DomainReward, Saved};
use crate::backend::domain::Observed;
use shared::{CollectedReward as SharedReward, PurchaseResponse, RewardListSnapshot};

/// Mapper from collected rewards and purchase results to the shared DTOs.
pub struct RewardMapper;

impl RewardMapper {
    pub fn to_dto(domain: Saved<DomainReward>) -> SharedReward {
        SharedReward {
            id: domain.id().name.clone(),
            kid_id: domain.value.kid_id,
            reward_id: domain.value.reward_id.0,
            date_collected: domain.value.date_collected.to_rfc3339(),
            is_delivered: domain.value.is_delivered,
        }
    }

    pub fn to_purchase_response(result: PurchaseResult, reward_name: &str) -> PurchaseResponse {
        PurchaseResponse {
            reward: Self::to_dto(result.reward),
            balance: result.balance,
            success_message: format!("Enjoy your {}!", reward_name),
        }
    }

    pub fn to_snapshot(observed: Observed<Vec<Saved<DomainReward>>>) -> RewardListSnapshot {
        RewardListSnapshot {
            rewards: observed.value.into_iter().map(Self::to_dto).collect(),
            is_loading: observed.is_loading,
            last_error: observed.last_error,
        }
    }
}
