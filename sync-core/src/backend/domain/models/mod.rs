//! Domain models for kids, scheduled activities, collected rewards, share
//! grants and the static catalogs they reference.

pub mod activity_register;
pub mod catalog;
pub mod collected_reward;
pub mod kid;
pub mod persisted;
pub mod share;

pub use activity_register::ScheduledActivityRegister;
pub use catalog::{Activity, ActivityId, Catalog, Reward, RewardId, StaticCatalog};
pub use collected_reward::CollectedReward;
pub use kid::Kid;
pub use persisted::{Persisted, Saved};
pub use share::ShareGrant;
