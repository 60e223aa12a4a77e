pub mod intake_log;
pub mod schedule;
pub mod user;
pub mod user_state;

pub use intake_log::IntakeLog;
pub use schedule::{Schedule, TimeOfDay};
pub use user::User;
pub use user_state::{ConversationState, ScheduleDraft};
