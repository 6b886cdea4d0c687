pub mod activity_mapper;
pub mod kid_mapper;
pub mod reward_mapper;
pub mod share_mapper;

pub use activity_mapper::ActivityMapper;
pub use kid_mapper::KidMapper;
pub use reward_mapper::RewardMapper;
pub use share_mapper::ShareMapper;
