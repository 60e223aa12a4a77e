pub mod callbacks;
pub mod commands;
pub mod messages;
pub mod notifier;
pub mod utils;

pub use callbacks::callback_handler;
pub use commands::command_handler;
pub use messages::message_handler;
pub use notifier::TelegramNotifier;

use std::error::Error;

use teloxide::types::Message;

use crate::bot_state::BotState;
use crate::models::User;

pub type HandlerResult = Result<(), Box<dyn Error + Send + Sync>>;

/// Registers the sender on first contact. Chats are private, so the chat ID
/// doubles as the user's Telegram ID.
pub async fn current_user(state: &BotState, msg: &Message) -> crate::error::BotResult<User> {
    let name = msg
        .from
        .as_ref()
        .map(|u| u.full_name())
        .unwrap_or_default();
    state.ensure_user(msg.chat.id.0, &name).await
}
