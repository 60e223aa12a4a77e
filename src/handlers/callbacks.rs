use teloxide::prelude::*;
use teloxide::types::MessageId;
use uuid::Uuid;

use crate::bot_state::BotState;
use crate::conversation::InputEvent;
use crate::error::BotError;
use crate::handlers::utils::{
    day_log_view, delete_confirm_keyboard, main_menu_keyboard, schedule_detail_keyboard, schedule_list_view,
    send_prompt, ACK_PREFIX, FORM_PREFIX, LIST_BACK, LIST_DELETE_CONFIRM_PREFIX, LIST_DELETE_PREFIX,
    LIST_DETAIL_PREFIX, LOG_ACK_PREFIX,
};
use crate::handlers::HandlerResult;
use crate::models::{Schedule, User};
use crate::scheduler::AckAction;

pub async fn callback_handler(bot: Bot, q: CallbackQuery, state: BotState) -> HandlerResult {
    bot.answer_callback_query(q.id.clone()).await?;

    let (Some(data), Some(message)) = (q.data.as_deref(), q.message.as_ref()) else {
        return Ok(());
    };
    let chat_id = message.chat().id;
    let message_id = message.id();

    if let Some(payload) = data.strip_prefix(FORM_PREFIX) {
        handle_form_button(&bot, &state, chat_id, message_id, payload).await?;
    } else if let Some(raw) = data.strip_prefix(ACK_PREFIX) {
        handle_reminder_ack(&bot, &state, chat_id, message_id, raw).await?;
    } else if let Some(raw) = data.strip_prefix(LOG_ACK_PREFIX) {
        handle_log_ack(&bot, &state, chat_id, message_id, raw).await?;
    } else if let Some(id) = data.strip_prefix(LIST_DETAIL_PREFIX) {
        if let Some((_, schedule)) = owned_schedule(&state, chat_id, id).await? {
            bot.edit_message_text(chat_id, message_id, schedule.info_text())
                .reply_markup(schedule_detail_keyboard(&schedule))
                .await?;
        } else {
            show_list_in_place(&bot, &state, chat_id, message_id).await?;
        }
    } else if let Some(id) = data.strip_prefix(LIST_DELETE_CONFIRM_PREFIX) {
        handle_delete(&bot, &state, chat_id, message_id, id).await?;
    } else if let Some(id) = data.strip_prefix(LIST_DELETE_PREFIX) {
        if let Some((_, schedule)) = owned_schedule(&state, chat_id, id).await? {
            bot.edit_message_text(
                chat_id,
                message_id,
                format!("🗑 Удалить добавку «{}» вместе с историей приёмов?", schedule.name),
            )
            .reply_markup(delete_confirm_keyboard(&schedule))
            .await?;
        } else {
            show_list_in_place(&bot, &state, chat_id, message_id).await?;
        }
    } else if data == LIST_BACK {
        show_list_in_place(&bot, &state, chat_id, message_id).await?;
    } else {
        log::warn!("⚠️ Unknown callback data from {}: {}", chat_id, data);
    }

    Ok(())
}

async fn handle_form_button(
    bot: &Bot,
    state: &BotState,
    chat_id: ChatId,
    message_id: MessageId,
    payload: &str,
) -> HandlerResult {
    let Some(prompt) = state
        .form
        .advance(chat_id.0, InputEvent::Button(payload.to_string()))
        .await
    else {
        bot.edit_message_reply_markup(chat_id, message_id).await?;
        bot.send_message(chat_id, "Эта форма уже неактивна.")
            .reply_markup(main_menu_keyboard())
            .await?;
        return Ok(());
    };

    if !prompt.edit {
        // Old buttons must not be pressed twice.
        if let Err(e) = bot.edit_message_reply_markup(chat_id, message_id).await {
            log::debug!("Could not clear buttons in chat {}: {}", chat_id, e);
        }
    }
    send_prompt(bot, chat_id, Some(message_id), &prompt).await
}

async fn handle_reminder_ack(
    bot: &Bot,
    state: &BotState,
    chat_id: ChatId,
    message_id: MessageId,
    raw: &str,
) -> HandlerResult {
    let Some(ack) = AckAction::decode(raw) else {
        log::warn!("⚠️ Malformed acknowledgement from {}: {}", chat_id, raw);
        return Ok(());
    };

    match state.scheduler.acknowledge(chat_id.0, &ack).await {
        Ok(_) => {
            bot.edit_message_reply_markup(chat_id, message_id).await?;
            bot.send_message(chat_id, format!("✅ Приём в {} отмечен. Так держать!", ack.slot))
                .await?;
        }
        Err(BotError::ScheduleNotFound) => {
            bot.edit_message_reply_markup(chat_id, message_id).await?;
            bot.send_message(chat_id, "Эта добавка уже удалена.").await?;
        }
        Err(e) => {
            log::error!("❌ Error acknowledging intake for {}: {}", chat_id, e);
            bot.send_message(chat_id, "⚠️ Не удалось отметить приём. Попробуй ещё раз.")
                .await?;
        }
    }
    Ok(())
}

async fn handle_log_ack(
    bot: &Bot,
    state: &BotState,
    chat_id: ChatId,
    message_id: MessageId,
    raw: &str,
) -> HandlerResult {
    let Some(ack) = AckAction::decode(raw) else {
        log::warn!("⚠️ Malformed acknowledgement from {}: {}", chat_id, raw);
        return Ok(());
    };

    if let Err(e) = state.scheduler.acknowledge(chat_id.0, &ack).await {
        log::error!("❌ Error acknowledging intake for {}: {}", chat_id, e);
        bot.send_message(chat_id, "⚠️ Не удалось отметить приём.").await?;
        return Ok(());
    }

    let Some(user) = state.find_user(chat_id.0).await? else {
        return Ok(());
    };
    let day_log = state.aggregator.day_log(&user, ack.date).await?;
    let (text, keyboard) = day_log_view(&day_log);
    bot.edit_message_text(chat_id, message_id, text)
        .reply_markup(keyboard)
        .await?;
    Ok(())
}

async fn handle_delete(bot: &Bot, state: &BotState, chat_id: ChatId, message_id: MessageId, id: &str) -> HandlerResult {
    let Some((user, schedule)) = owned_schedule(state, chat_id, id).await? else {
        return show_list_in_place(bot, state, chat_id, message_id).await;
    };

    let removed = state.storage.delete_schedule(user.id, &schedule.name).await?;
    log::info!("🗑 User {} deleted '{}' ({} row(s))", chat_id, schedule.name, removed);

    bot.edit_message_text(chat_id, message_id, format!("🗑 Добавка «{}» удалена.", schedule.name))
        .await?;
    Ok(())
}

/// The schedule behind a callback, if it exists and belongs to the chat's user.
async fn owned_schedule(state: &BotState, chat_id: ChatId, id: &str) -> Result<Option<(User, Schedule)>, BotError> {
    let Ok(id) = Uuid::parse_str(id) else {
        return Ok(None);
    };
    let Some(user) = state.find_user(chat_id.0).await? else {
        return Ok(None);
    };
    let schedule = state
        .storage
        .find_schedule(id)
        .await?
        .filter(|s| s.user_id == user.id);
    Ok(schedule.map(|s| (user, s)))
}

async fn show_list_in_place(bot: &Bot, state: &BotState, chat_id: ChatId, message_id: MessageId) -> HandlerResult {
    let Some(user) = state.find_user(chat_id.0).await? else {
        return Ok(());
    };
    let (text, keyboard) = schedule_list_view(state, &user).await?;
    bot.edit_message_text(chat_id, message_id, text)
        .reply_markup(keyboard)
        .await?;
    Ok(())
}
