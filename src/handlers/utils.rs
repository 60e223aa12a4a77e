use teloxide::prelude::*;
use teloxide::types::{
    InlineKeyboardButton, InlineKeyboardMarkup, KeyboardButton, KeyboardMarkup, MessageId, ReplyMarkup,
};

use crate::bot_state::BotState;
use crate::conversation::{Control, Prompt, CANCEL_TEXT};
use crate::models::{Schedule, User};
use crate::scheduler::AckAction;
use crate::stats::{DayLog, Window};

use super::HandlerResult;

pub const MENU_ADD: &str = "➕ Добавить";
pub const MENU_LIST: &str = "📃 Список";
pub const MENU_LOG: &str = "📊 Лог";
pub const MENU_STATUS: &str = "📈 Статус";
pub const MENU_HELP: &str = "❓ Помощь";

pub const FORM_PREFIX: &str = "form:";
pub const ACK_PREFIX: &str = "ack:";
pub const LOG_ACK_PREFIX: &str = "logack:";
pub const LIST_DETAIL_PREFIX: &str = "list_detail:";
pub const LIST_DELETE_PREFIX: &str = "list_delete:";
pub const LIST_DELETE_CONFIRM_PREFIX: &str = "list_delete_confirm:";
pub const LIST_BACK: &str = "list_back";

/// Экранирование MarkdownV2
pub fn escape_markdown_v2(text: &str) -> String {
    let specials = ['_', '*', '[', ']', '(', ')', '~', '`', '>', '#', '+', '-', '=', '|', '{', '}', '.', '!'];
    let mut out = String::with_capacity(text.len() * 2);

    for ch in text.chars() {
        if specials.contains(&ch) {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

/// Главное меню
pub fn main_menu_keyboard() -> ReplyMarkup {
    ReplyMarkup::Keyboard(
        KeyboardMarkup::new(vec![
            vec![KeyboardButton::new(MENU_ADD), KeyboardButton::new(MENU_LIST)],
            vec![KeyboardButton::new(MENU_LOG), KeyboardButton::new(MENU_STATUS)],
            vec![KeyboardButton::new(MENU_HELP)],
        ])
        .resize_keyboard(),
    )
}

/// Shown while the add-schedule form is open.
pub fn cancel_keyboard() -> ReplyMarkup {
    ReplyMarkup::Keyboard(KeyboardMarkup::new(vec![vec![KeyboardButton::new(CANCEL_TEXT)]]).resize_keyboard())
}

pub fn is_menu_text(text: &str) -> bool {
    [MENU_ADD, MENU_LIST, MENU_LOG, MENU_STATUS, MENU_HELP].contains(&text)
}

fn form_keyboard(controls: &[Vec<Control>]) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(controls.iter().map(|row| {
        row.iter()
            .map(|c| InlineKeyboardButton::callback(c.label.clone(), format!("{}{}", FORM_PREFIX, c.payload)))
            .collect::<Vec<_>>()
    }))
}

/// Sends a form prompt, or edits `pressed_on` in place when the prompt asks
/// for it. A finished prompt brings the main menu back.
pub async fn send_prompt(bot: &Bot, chat_id: ChatId, pressed_on: Option<MessageId>, prompt: &Prompt) -> HandlerResult {
    let keyboard = (!prompt.controls.is_empty()).then(|| form_keyboard(&prompt.controls));

    if let (true, Some(message_id)) = (prompt.edit, pressed_on) {
        let mut request = bot.edit_message_text(chat_id, message_id, prompt.text.clone());
        if let Some(keyboard) = keyboard {
            request = request.reply_markup(keyboard);
        }
        request.await?;
        return Ok(());
    }

    let request = bot.send_message(chat_id, prompt.text.clone());
    match keyboard {
        _ if prompt.finished => request.reply_markup(main_menu_keyboard()).await?,
        Some(keyboard) => request.reply_markup(keyboard).await?,
        None => request.await?,
    };
    Ok(())
}

pub fn ack_keyboard(ack: &AckAction) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![InlineKeyboardButton::callback(
        "✅ Принял",
        format!("{}{}", ACK_PREFIX, ack.encode()),
    )]])
}

fn schedule_list_keyboard(schedules: &[Schedule]) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(schedules.iter().map(|s| {
        vec![InlineKeyboardButton::callback(
            format!("💊 {}", s.name),
            format!("{}{}", LIST_DETAIL_PREFIX, s.id),
        )]
    }))
}

pub fn schedule_detail_keyboard(schedule: &Schedule) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![
        InlineKeyboardButton::callback("🗑 Удалить", format!("{}{}", LIST_DELETE_PREFIX, schedule.id)),
        InlineKeyboardButton::callback("◀️ Назад", LIST_BACK),
    ]])
}

pub fn delete_confirm_keyboard(schedule: &Schedule) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![
        InlineKeyboardButton::callback("✅ Да, удалить", format!("{}{}", LIST_DELETE_CONFIRM_PREFIX, schedule.id)),
        InlineKeyboardButton::callback("❌ Нет", LIST_BACK),
    ]])
}

async fn send_with_inline(bot: &Bot, chat_id: ChatId, text: String, keyboard: InlineKeyboardMarkup) -> HandlerResult {
    if keyboard.inline_keyboard.is_empty() {
        bot.send_message(chat_id, text).await?;
    } else {
        bot.send_message(chat_id, text).reply_markup(keyboard).await?;
    }
    Ok(())
}

/// Text and buttons of the schedule list.
pub async fn schedule_list_view(state: &BotState, user: &User) -> crate::error::BotResult<(String, InlineKeyboardMarkup)> {
    let schedules = state.storage.find_schedules_by_user(user.id).await?;
    let text = if schedules.is_empty() {
        format!("📃 У тебя пока нет добавок.\n\nНажми «{}», чтобы создать первую.", MENU_ADD)
    } else {
        "📃 Твои добавки:\n\nВыбери добавку, чтобы посмотреть подробности:".to_string()
    };
    Ok((text, schedule_list_keyboard(&schedules)))
}

pub async fn show_schedule_list(bot: &Bot, chat_id: ChatId, state: &BotState, user: &User) -> HandlerResult {
    let (text, keyboard) = schedule_list_view(state, user).await?;
    send_with_inline(bot, chat_id, text, keyboard).await
}

/// Text and buttons of today's intake log.
pub fn day_log_view(day_log: &DayLog) -> (String, InlineKeyboardMarkup) {
    if day_log.slots.is_empty() {
        return (
            "📊 На сегодня приёмов не запланировано.".to_string(),
            InlineKeyboardMarkup::new(Vec::<Vec<InlineKeyboardButton>>::new()),
        );
    }

    let mut text = format!("📊 Приёмы на {}:\n\n", day_log.date.format("%d.%m.%Y"));
    let mut keyboard = Vec::new();
    for slot in &day_log.slots {
        let mark = if slot.taken { "✅" } else { "⬜" };
        text.push_str(&format!("{} {} ({}) · {}\n", mark, slot.schedule_name, slot.dosage, slot.slot));
        if !slot.taken {
            let ack = AckAction {
                schedule_id: slot.schedule_id,
                date: day_log.date,
                slot: slot.slot,
            };
            keyboard.push(vec![InlineKeyboardButton::callback(
                format!("Принял: {} · {}", slot.schedule_name, slot.slot),
                format!("{}{}", LOG_ACK_PREFIX, ack.encode()),
            )]);
        }
    }
    text.push_str(&format!("\nПринято: {} из {}", day_log.taken(), day_log.slots.len()));
    (text, InlineKeyboardMarkup::new(keyboard))
}

pub async fn show_day_log(bot: &Bot, chat_id: ChatId, state: &BotState, user: &User) -> HandlerResult {
    let day_log = state.aggregator.day_log(user, state.clock.today()).await?;
    let (text, keyboard) = day_log_view(&day_log);
    send_with_inline(bot, chat_id, text, keyboard).await
}

pub async fn show_status(bot: &Bot, chat_id: ChatId, state: &BotState, user: &User) -> HandlerResult {
    let day_log = state.aggregator.day_log(user, state.clock.today()).await?;
    bot.send_message(chat_id, day_log.render()).await?;
    Ok(())
}

pub async fn show_stats(bot: &Bot, chat_id: ChatId, state: &BotState, user: &User) -> HandlerResult {
    let report = state
        .aggregator
        .report(user, Window::Rolling, state.clock.today())
        .await?;
    let text = if report.has_eligible_slots() {
        report.render()
    } else {
        "📈 За последние 7 дней приёмов не было запланировано.".to_string()
    };
    bot.send_message(chat_id, text).await?;
    Ok(())
}

/// Opens the add-schedule form in the chat.
pub async fn start_form(bot: &Bot, msg: &Message, state: &BotState) -> HandlerResult {
    let chat_id = msg.chat.id;
    let name = msg.from.as_ref().map(|u| u.full_name()).unwrap_or_default();
    let prompt = state.start_form(chat_id.0, &name).await?;
    bot.send_message(chat_id, "Добавляем новую добавку. В любой момент можно нажать «❌ Отмена».")
        .reply_markup(cancel_keyboard())
        .await?;
    send_prompt(bot, chat_id, None, &prompt).await
}

pub fn help_text() -> String {
    format!(
        "💊 *DailyDose* помогает не забывать о добавках\\.\n\n\
        📋 *Команды:*\n\
        /add – добавить добавку\n\
        /list – список добавок\n\
        /log – отметить приёмы за сегодня\n\
        /status – статус на сегодня\n\
        /stats – статистика за 7 дней\n\
        /cancel – отменить добавление\n\n\
        Напоминания приходят в выбранное время\\. Нажми «✅ Принял», когда примешь добавку\\.\n\
        По понедельникам я присылаю отчёт за прошлую неделю\\.\n\n\
        {}",
        escape_markdown_v2("🟩 всё принято, 🟨 частично, 🟥 пропущено, ⬜ ничего не запланировано.")
    )
}
