use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::clock::Clock;
use crate::conversation::{IntakeForm, Prompt};
use crate::database::Storage;
use crate::error::BotResult;
use crate::models::{ConversationState, User};
use crate::scheduler::ReminderScheduler;
use crate::stats::ProgressAggregator;

struct Entry {
    state: ConversationState,
    touched: Instant,
}

type EntryRef = Arc<RwLock<Entry>>;

/// Per-user form state keyed by Telegram user ID.
///
/// The outer map is write-locked only to insert or remove an entry; reads and
/// updates of one user's state lock that entry alone.
pub struct ConversationStore {
    entries: RwLock<HashMap<i64, EntryRef>>,
    ttl: Duration,
}

impl ConversationStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Replaces any existing state for the user.
    pub async fn start(&self, user_id: i64, state: ConversationState) {
        let entry = Arc::new(RwLock::new(Entry {
            state,
            touched: Instant::now(),
        }));
        self.entries.write().await.insert(user_id, entry);
        log::debug!("📝 Conversation started for user {}", user_id);
    }

    pub async fn remove(&self, user_id: i64) -> bool {
        self.take(user_id).await.is_some()
    }

    /// Removes and returns the state. Only one concurrent caller gets `Some`.
    pub async fn take(&self, user_id: i64) -> Option<ConversationState> {
        let entry = self.entries.write().await.remove(&user_id)?;
        let guard = entry.read().await;
        Some(guard.state.clone())
    }

    pub async fn contains(&self, user_id: i64) -> bool {
        self.entries.read().await.contains_key(&user_id)
    }

    #[cfg(test)]
    pub async fn snapshot(&self, user_id: i64) -> Option<ConversationState> {
        let entry = self.entry(user_id).await?;
        let guard = entry.read().await;
        Some(guard.state.clone())
    }

    /// Runs `f` under the user's exclusive entry lock.
    pub async fn update<F, R>(&self, user_id: i64, f: F) -> Option<R>
    where
        F: FnOnce(&mut ConversationState) -> R,
    {
        let entry = self.entry(user_id).await?;
        let mut guard = entry.write().await;
        guard.touched = Instant::now();
        Some(f(&mut guard.state))
    }

    async fn entry(&self, user_id: i64) -> Option<EntryRef> {
        self.entries.read().await.get(&user_id).cloned()
    }

    /// Drops entries idle for longer than the TTL. Entries locked right now
    /// are in use and kept.
    pub async fn cleanup_expired(&self) -> usize {
        let mut entries = self.entries.write().await;
        let previous_count = entries.len();
        let ttl = self.ttl;

        entries.retain(|_, entry| match entry.try_read() {
            Ok(guard) => guard.touched.elapsed() < ttl,
            Err(_) => true,
        });

        let removed = previous_count - entries.len();
        if removed > 0 {
            log::debug!("🧹 Conversations cleaned: {} -> {} entries", previous_count, entries.len());
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

/// Collaborators shared by every handler.
#[derive(Clone)]
pub struct BotState {
    pub storage: Arc<dyn Storage>,
    pub clock: Arc<dyn Clock>,
    pub conversations: Arc<ConversationStore>,
    pub form: Arc<IntakeForm>,
    pub scheduler: Arc<ReminderScheduler>,
    pub aggregator: Arc<ProgressAggregator>,
}

impl BotState {
    pub fn new(storage: Arc<dyn Storage>, clock: Arc<dyn Clock>, conversation_ttl: Duration) -> Self {
        let conversations = Arc::new(ConversationStore::new(conversation_ttl));
        let form = Arc::new(IntakeForm::new(
            conversations.clone(),
            storage.clone(),
            clock.clone(),
        ));
        let scheduler = Arc::new(ReminderScheduler::new(storage.clone()));
        let aggregator = Arc::new(ProgressAggregator::new(storage.clone()));

        Self {
            storage,
            clock,
            conversations,
            form,
            scheduler,
            aggregator,
        }
    }

    /// Finds the user by Telegram ID, creating it on first contact and
    /// refreshing the display name when it changed.
    pub async fn ensure_user(&self, telegram_id: i64, name: &str) -> BotResult<User> {
        if let Some(mut user) = self.storage.find_user_by_telegram_id(telegram_id).await? {
            if !name.is_empty() && user.name != name {
                self.storage.update_user_name(user.id, name).await?;
                user.name = name.to_string();
            }
            return Ok(user);
        }

        let user = self.storage.create_user(User::new(telegram_id, name)).await?;
        log::info!("👤 New user registered: {}", telegram_id);
        Ok(user)
    }

    pub async fn find_user(&self, telegram_id: i64) -> BotResult<Option<User>> {
        self.storage.find_user_by_telegram_id(telegram_id).await
    }

    /// Opens a fresh add form. The user is registered first, since saving
    /// the form looks the owner up by Telegram ID.
    pub async fn start_form(&self, telegram_id: i64, name: &str) -> BotResult<Prompt> {
        self.ensure_user(telegram_id, name).await?;
        Ok(self.form.start(telegram_id).await)
    }
}
