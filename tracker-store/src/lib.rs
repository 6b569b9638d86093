pub mod error;
pub mod memory;
pub mod models;
pub mod snapshot;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use models::{
    BounceStats, CommandConfirmation, DEFAULT_KEYWORD, Keyword, PackageKind, Subscription, Team,
    TeamMembership,
};
pub use store::SubscriberStore;
