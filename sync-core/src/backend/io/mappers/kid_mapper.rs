use crate::backend::domain::models::{Kid as DomainKid, Saved};
use crate::backend::domain::Observed;
use crate::backend::storage::record::RecordId;
use shared::{BalanceSnapshot, Kid as SharedKid};

/// Mapper from kid records and ledger state to the shared DTOs.
pub struct KidMapper;

impl KidMapper {
    pub fn to_dto(domain: Saved<DomainKid>) -> SharedKid {
        SharedKid {
            id: domain.id().name.clone(),
            name: domain.value.name,
            coins: domain.value.coins,
            is_shared: domain.value.share.is_some(),
        }
    }

    pub fn to_kid_list_dto(domain_kids: Vec<Saved<DomainKid>>) -> Vec<SharedKid> {
        domain_kids.into_iter().map(Self::to_dto).collect()
    }

    pub fn to_balance_snapshot(kid_id: &RecordId, observed: Observed<i64>) -> BalanceSnapshot {
        BalanceSnapshot {
            kid_id: Some(kid_id.name.clone()),
            balance: observed.value,
            is_loading: observed.is_loading,
            last_error: observed.last_error,
        }
    }
}
