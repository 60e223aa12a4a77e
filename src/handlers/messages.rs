use teloxide::prelude::*;
use teloxide::types::ParseMode;

use crate::bot_state::BotState;
use crate::conversation::{InputEvent, CANCEL_TEXT};
use crate::handlers::utils::{
    help_text, is_menu_text, main_menu_keyboard, send_prompt, show_day_log, show_schedule_list,
    show_status, start_form, MENU_ADD, MENU_HELP, MENU_LIST, MENU_LOG, MENU_STATUS,
};
use crate::handlers::{current_user, HandlerResult};

pub async fn message_handler(bot: Bot, msg: Message, state: BotState) -> HandlerResult {
    let Some(text) = msg.text() else {
        return Ok(());
    };
    let chat_id = msg.chat.id;

    // Menu buttons act like commands: they leave the form.
    if !is_menu_text(text) && state.form.is_active(chat_id.0).await {
        match state.form.advance(chat_id.0, InputEvent::Text(text.to_string())).await {
            Some(prompt) => send_prompt(&bot, chat_id, None, &prompt).await?,
            None => {
                bot.send_message(chat_id, "Добавление прервано.")
                    .reply_markup(main_menu_keyboard())
                    .await?;
            }
        }
        return Ok(());
    }
    state.form.cancel(chat_id.0).await;

    match text {
        MENU_ADD => start_form(&bot, &msg, &state).await?,
        MENU_LIST => {
            let user = current_user(&state, &msg).await?;
            show_schedule_list(&bot, chat_id, &state, &user).await?;
        }
        MENU_LOG => {
            let user = current_user(&state, &msg).await?;
            show_day_log(&bot, chat_id, &state, &user).await?;
        }
        MENU_STATUS => {
            let user = current_user(&state, &msg).await?;
            show_status(&bot, chat_id, &state, &user).await?;
        }
        MENU_HELP => {
            bot.send_message(chat_id, help_text())
                .parse_mode(ParseMode::MarkdownV2)
                .reply_markup(main_menu_keyboard())
                .await?;
        }
        CANCEL_TEXT => {
            bot.send_message(chat_id, "Сейчас нечего отменять.")
                .reply_markup(main_menu_keyboard())
                .await?;
        }
        _ => {
            bot.send_message(chat_id, "🤔 Не понимаю. Воспользуйся меню или /help.")
                .reply_markup(main_menu_keyboard())
                .await?;
        }
    }

    Ok(())
}
