pub mod error;
pub mod progression;
pub mod quest;
pub mod record;
pub mod store;

pub use error::{BotError, Result};
pub use quest::{QuestError, QuestProgress};
pub use record::{Ending, Mood, UserRecord};
pub use store::RecordStore;
