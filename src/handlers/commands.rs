use teloxide::prelude::*;
use teloxide::types::ParseMode;

use crate::bot_state::BotState;
use crate::handlers::utils::{
    escape_markdown_v2, help_text, main_menu_keyboard, show_day_log, show_schedule_list, show_stats,
    show_status, start_form,
};
use crate::handlers::{current_user, HandlerResult};
use crate::Command;

pub async fn command_handler(bot: Bot, msg: Message, cmd: Command, state: BotState) -> HandlerResult {
    // Any command abandons a form in progress.
    let had_form = state.form.cancel(msg.chat.id.0).await;

    match cmd {
        Command::Start => handle_start(bot, msg, state).await?,
        Command::Help => handle_help(bot, msg).await?,
        Command::Add => start_form(&bot, &msg, &state).await?,
        Command::List => {
            let user = current_user(&state, &msg).await?;
            show_schedule_list(&bot, msg.chat.id, &state, &user).await?
        }
        Command::Log => {
            let user = current_user(&state, &msg).await?;
            show_day_log(&bot, msg.chat.id, &state, &user).await?
        }
        Command::Status => {
            let user = current_user(&state, &msg).await?;
            show_status(&bot, msg.chat.id, &state, &user).await?
        }
        Command::Stats => {
            let user = current_user(&state, &msg).await?;
            show_stats(&bot, msg.chat.id, &state, &user).await?
        }
        Command::Cancel => handle_cancel(bot, msg, had_form).await?,
    }
    Ok(())
}

async fn handle_start(bot: Bot, msg: Message, state: BotState) -> HandlerResult {
    let user = match current_user(&state, &msg).await {
        Ok(user) => user,
        Err(e) => {
            log::error!("❌ Error registering user {}: {}", msg.chat.id, e);
            bot.send_message(msg.chat.id, "⚠️ Не удалось зарегистрироваться. Попробуй ещё раз позже.")
                .await?;
            return Ok(());
        }
    };

    let greeting = if user.name.is_empty() {
        "👋 *Привет\\!*".to_string()
    } else {
        format!("👋 *Привет, {}\\!*", escape_markdown_v2(&user.name))
    };

    bot.send_message(msg.chat.id, format!("{}\n\n{}", greeting, help_text()))
        .parse_mode(ParseMode::MarkdownV2)
        .reply_markup(main_menu_keyboard())
        .await?;

    Ok(())
}

async fn handle_help(bot: Bot, msg: Message) -> HandlerResult {
    bot.send_message(msg.chat.id, help_text())
        .parse_mode(ParseMode::MarkdownV2)
        .reply_markup(main_menu_keyboard())
        .await?;

    Ok(())
}

async fn handle_cancel(bot: Bot, msg: Message, had_form: bool) -> HandlerResult {
    let text = if had_form {
        "❌ Добавление отменено."
    } else {
        "Сейчас нечего отменять."
    };
    bot.send_message(msg.chat.id, text)
        .reply_markup(main_menu_keyboard())
        .await?;

    Ok(())
}
