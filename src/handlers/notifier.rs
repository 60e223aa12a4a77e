use async_trait::async_trait;
use teloxide::prelude::*;

use crate::error::BotResult;
use crate::handlers::utils::ack_keyboard;
use crate::scheduler::{Delivery, Notifier};

/// Sends scheduler output to Telegram chats.
pub struct TelegramNotifier {
    bot: Bot,
}

impl TelegramNotifier {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send_reminder(&self, delivery: &Delivery) -> BotResult<()> {
        self.bot
            .send_message(ChatId(delivery.telegram_id), delivery.text.clone())
            .reply_markup(ack_keyboard(&delivery.ack))
            .await?;
        log::debug!("Reminder for '{}' sent to {}", delivery.schedule_name, delivery.telegram_id);
        Ok(())
    }

    async fn send_report(&self, telegram_id: i64, text: &str) -> BotResult<()> {
        self.bot.send_message(ChatId(telegram_id), text.to_string()).await?;
        Ok(())
    }
}
