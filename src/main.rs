use std::sync::Arc;
use std::time::Duration;

use teloxide::{prelude::*, utils::command::BotCommands};
use tokio::time;

mod bot_state;
mod clock;
mod config;
mod conversation;
mod database;
mod encoding;
mod error;
mod handlers;
mod models;
mod scheduler;
mod stats;

use crate::bot_state::BotState;
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::database::{Database, Storage};
use crate::handlers::{callback_handler, command_handler, message_handler, TelegramNotifier};
use crate::scheduler::{spawn_reminder_loop, spawn_weekly_report_loop, Notifier};

#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase", description = "Доступные команды:")]
pub enum Command {
    #[command(description = "начать работу с ботом")]
    Start,
    #[command(description = "показать помощь")]
    Help,
    #[command(description = "добавить добавку")]
    Add,
    #[command(description = "список добавок")]
    List,
    #[command(description = "отметить приёмы за сегодня")]
    Log,
    #[command(description = "статус на сегодня")]
    Status,
    #[command(description = "статистика за 7 дней")]
    Stats,
    #[command(description = "отменить добавление")]
    Cancel,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    dotenvy::dotenv().ok();
    env_logger::init();
    log::info!("Starting DailyDose bot...");

    let config = Config::from_env()?;

    let db = Database::new(&config.database_url, config.db_max_connections).await?;
    db.init().await?;
    log::info!("✅ Database initialized");

    let storage: Arc<dyn Storage> = Arc::new(db);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let state = BotState::new(
        storage,
        clock.clone(),
        Duration::from_secs(config.conversation_ttl_minutes * 60),
    );

    let bot = Bot::new(&config.telegram_token);
    let notifier: Arc<dyn Notifier> = Arc::new(TelegramNotifier::new(bot.clone()));

    spawn_reminder_loop(
        state.scheduler.clone(),
        notifier.clone(),
        clock.clone(),
        config.reminder_interval_minutes,
    );
    spawn_weekly_report_loop(
        state.aggregator.clone(),
        notifier,
        clock,
        config.weekly_report_day,
        config.weekly_report_time,
    );

    // Фоновая задача для очистки незавершённых форм
    let conversations = state.conversations.clone();
    tokio::spawn(async move {
        let mut interval = time::interval(Duration::from_secs(600));
        loop {
            interval.tick().await;
            let removed = conversations.cleanup_expired().await;
            if removed > 0 {
                log::info!("🧹 Dropped {} idle forms, {} still open", removed, conversations.len().await);
            }
        }
    });

    if let Err(e) = bot.set_my_commands(Command::bot_commands()).await {
        log::warn!("⚠️ Could not register bot commands: {}", e);
    }

    let handler = dptree::entry()
        .branch(
            Update::filter_message()
                .filter_command::<Command>()
                .endpoint(command_handler),
        )
        .branch(Update::filter_callback_query().endpoint(callback_handler))
        .branch(Update::filter_message().endpoint(message_handler));

    log::info!("🚀 Starting dispatcher...");

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}
