//! The add-schedule form: a fixed sequence of steps that turns chat input into
//! a persisted [`Schedule`](crate::models::Schedule).

pub mod step;

pub use step::{Step, Transition};

use std::sync::Arc;

use crate::bot_state::ConversationStore;
use crate::clock::Clock;
use crate::database::Storage;
use crate::models::{ConversationState, ScheduleDraft};

pub const CANCEL_TEXT: &str = "❌ Отмена";

/// One incoming chat event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputEvent {
    Text(String),
    /// Button press with its opaque payload.
    Button(String),
}

/// A transport-neutral button.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Control {
    pub label: String,
    pub payload: String,
}

impl Control {
    pub fn new(label: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            payload: payload.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub text: String,
    /// Rows of buttons.
    pub controls: Vec<Vec<Control>>,
    /// Replace the message the button was pressed on instead of sending a new one.
    pub edit: bool,
    /// The form is over; the transport should restore the main menu.
    pub finished: bool,
}

impl Prompt {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            controls: Vec::new(),
            edit: false,
            finished: false,
        }
    }

    pub fn with_controls(mut self, controls: Vec<Vec<Control>>) -> Self {
        self.controls = controls;
        self
    }

    fn finished(mut self) -> Self {
        self.finished = true;
        self
    }
}

/// Drives [`ConversationState`] for every user.
pub struct IntakeForm {
    conversations: Arc<ConversationStore>,
    storage: Arc<dyn Storage>,
    clock: Arc<dyn Clock>,
}

impl IntakeForm {
    pub fn new(conversations: Arc<ConversationStore>, storage: Arc<dyn Storage>, clock: Arc<dyn Clock>) -> Self {
        Self {
            conversations,
            storage,
            clock,
        }
    }

    /// Starts (or restarts) the form and returns the first prompt.
    pub async fn start(&self, user_id: i64) -> Prompt {
        let state = ConversationState::new();
        let prompt = state.step.prompt(&state);
        self.conversations.start(user_id, state).await;
        prompt
    }

    pub async fn is_active(&self, user_id: i64) -> bool {
        self.conversations.contains(user_id).await
    }

    pub async fn cancel(&self, user_id: i64) -> bool {
        let removed = self.conversations.remove(user_id).await;
        if removed {
            log::info!("❌ Form cancelled by user {}", user_id);
        }
        removed
    }

    /// Feeds one event to the user's form. `None` means there is no form in
    /// progress, or a command interrupted it.
    pub async fn advance(&self, user_id: i64, event: InputEvent) -> Option<Prompt> {
        if let InputEvent::Text(text) = &event {
            if text.starts_with('/') {
                if self.conversations.remove(user_id).await {
                    log::debug!("Form for user {} abandoned by command {}", user_id, text);
                }
                return None;
            }
        }

        if is_cancel(&event) {
            return if self.cancel(user_id).await {
                Some(Prompt::text("❌ Добавление отменено.").finished())
            } else {
                None
            };
        }

        let today = self.clock.today();
        let transition = self
            .conversations
            .update(user_id, |state| {
                let transition = step::transition(state, &event, today);
                if let Transition::Advance(next, _) = &transition {
                    log::debug!("Step {} -> {} for user {}", state.step.number(), next.number(), user_id);
                    state.step = *next;
                }
                transition
            })
            .await?;

        match transition {
            Transition::Stay(prompt) | Transition::Advance(_, prompt) => Some(prompt),
            Transition::Save => {
                // Whoever takes the state saves it; a double press finds nothing.
                let state = self.conversations.take(user_id).await?;
                Some(self.persist(user_id, state.draft).await.finished())
            }
        }
    }

    async fn persist(&self, user_id: i64, draft: ScheduleDraft) -> Prompt {
        let user = match self.storage.find_user_by_telegram_id(user_id).await {
            Ok(Some(user)) => user,
            Ok(None) => {
                log::warn!("⚠️ User {} not found while saving schedule", user_id);
                return Prompt::text("Произошла ошибка, пользователь не найден.");
            }
            Err(e) => {
                log::error!("❌ Error loading user {}: {}", user_id, e);
                return Prompt::text("Ошибка при сохранении добавки.");
            }
        };

        let schedule = draft.into_schedule(user.id, self.clock.today());
        match self.storage.create_schedule(schedule).await {
            Ok(saved) => {
                log::info!("💊 Schedule '{}' saved for user {}", saved.name, user_id);
                Prompt::text("✅ Добавка успешно сохранена!")
            }
            Err(e) => {
                log::error!("❌ Error saving schedule for user {}: {}", user_id, e);
                Prompt::text("Ошибка при сохранении добавки.")
            }
        }
    }
}

fn is_cancel(event: &InputEvent) -> bool {
    match event {
        InputEvent::Text(text) => text.trim() == CANCEL_TEXT,
        InputEvent::Button(payload) => payload == step::PAYLOAD_CANCEL,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::time::Duration;

    use crate::clock::FixedClock;
    use crate::database::memory::MemoryStorage;
    use crate::encoding::ReminderTime;
    use crate::models::{TimeOfDay, User};

    const USER: i64 = 1001;

    struct Harness {
        form: IntakeForm,
        storage: Arc<MemoryStorage>,
        conversations: Arc<ConversationStore>,
    }

    async fn harness() -> Harness {
        let storage = Arc::new(MemoryStorage::new());
        storage.create_user(User::new(USER, "Тест")).await.unwrap();
        let conversations = Arc::new(ConversationStore::new(Duration::from_secs(3600)));
        let clock = Arc::new(FixedClock::at("2025-07-07", "10:00"));
        let form = IntakeForm::new(conversations.clone(), storage.clone(), clock);
        Harness {
            form,
            storage,
            conversations,
        }
    }

    fn text(t: &str) -> InputEvent {
        InputEvent::Text(t.to_string())
    }

    fn button(p: &str) -> InputEvent {
        InputEvent::Button(p.to_string())
    }

    async fn step_of(h: &Harness) -> Option<Step> {
        h.conversations.snapshot(USER).await.map(|s| s.step)
    }

    /// Inputs that move the form one step further, starting from Name.
    fn happy_path() -> Vec<InputEvent> {
        vec![
            text("Vitamin D"),
            text("2000 IU"),
            button("morning"),
            button(step::PAYLOAD_FOOD_YES),
            button(step::PAYLOAD_TODAY),
            text("4"),
            button("day_0"),
            button("day_2"),
            button(step::PAYLOAD_DAYS_DONE),
            text("08:00, 13:30"),
            button(step::PAYLOAD_SAVE),
        ]
    }

    #[tokio::test]
    async fn test_scenario_add_vitamin_d() {
        let h = harness().await;
        let first = h.form.start(USER).await;
        assert!(first.text.contains("название"));

        let mut last = None;
        for event in happy_path() {
            last = h.form.advance(USER, event).await;
        }

        let last = last.unwrap();
        assert!(last.finished);
        assert_eq!(last.text, "✅ Добавка успешно сохранена!");
        assert!(!h.form.is_active(USER).await);

        let user = h.storage.find_user_by_telegram_id(USER).await.unwrap().unwrap();
        let schedules = h.storage.find_schedules_by_user(user.id).await.unwrap();
        assert_eq!(schedules.len(), 1);

        let today = NaiveDate::from_ymd_opt(2025, 7, 7).unwrap();
        let s = &schedules[0];
        assert_eq!(s.name, "Vitamin D");
        assert_eq!(s.dosage, "2000 IU");
        assert_eq!(s.time_of_day, TimeOfDay::Morning);
        assert!(s.with_food);
        assert_eq!(s.start_date, today);
        assert_eq!(s.end_date, Some(today + chrono::Duration::days(28)));
        assert_eq!(s.days.indices(), vec![0, 2]);
        assert_eq!(
            s.reminder_times,
            vec![ReminderTime::parse("08:00").unwrap(), ReminderTime::parse("13:30").unwrap()]
        );
        assert!(s.reminder_enabled);
    }

    #[tokio::test]
    async fn test_command_interrupts_every_step() {
        let path = happy_path();
        for steps_taken in 0..path.len() {
            let h = harness().await;
            h.form.start(USER).await;
            for event in path.iter().take(steps_taken) {
                h.form.advance(USER, event.clone()).await;
            }
            // The last event saves; nothing left to interrupt after it.
            if !h.form.is_active(USER).await {
                continue;
            }

            assert_eq!(h.form.advance(USER, text("/list")).await, None);
            assert!(!h.form.is_active(USER).await, "step {} kept state", steps_taken);
            assert_eq!(h.storage.schedule_count().await, 0);
        }
    }

    #[tokio::test]
    async fn test_cancel_button_and_text() {
        let h = harness().await;
        h.form.start(USER).await;
        h.form.advance(USER, text("Магний")).await;

        let prompt = h.form.advance(USER, text(CANCEL_TEXT)).await.unwrap();
        assert!(prompt.finished);
        assert!(!h.form.is_active(USER).await);

        h.form.start(USER).await;
        assert!(h.form.advance(USER, button(step::PAYLOAD_CANCEL)).await.unwrap().finished);
        assert_eq!(h.form.advance(USER, button(step::PAYLOAD_CANCEL)).await, None);
        assert_eq!(h.storage.schedule_count().await, 0);
    }

    #[tokio::test]
    async fn test_validation_failures_keep_step() {
        let h = harness().await;
        h.form.start(USER).await;

        h.form.advance(USER, text("   ")).await.unwrap();
        assert_eq!(step_of(&h).await, Some(Step::Name));

        for event in happy_path().into_iter().take(5) {
            h.form.advance(USER, event).await;
        }
        assert_eq!(step_of(&h).await, Some(Step::Duration));

        let prompt = h.form.advance(USER, text("навсегда")).await.unwrap();
        assert!(prompt.text.starts_with("Неверный формат"));
        assert_eq!(step_of(&h).await, Some(Step::Duration));

        h.form.advance(USER, text("-")).await;
        h.form.advance(USER, button(step::PAYLOAD_DAYS_DONE)).await;
        assert_eq!(step_of(&h).await, Some(Step::ReminderTimes));

        h.form.advance(USER, text("08:00, 25:00")).await;
        h.form.advance(USER, text("08:10")).await;
        assert_eq!(step_of(&h).await, Some(Step::ReminderTimes));

        let state = h.conversations.snapshot(USER).await.unwrap();
        assert!(state.draft.reminder_times.is_empty());
        assert_eq!(state.draft.end_date, None);
    }

    #[tokio::test]
    async fn test_empty_day_selection_means_every_day() {
        let h = harness().await;
        h.form.start(USER).await;
        for event in happy_path().into_iter().take(6) {
            h.form.advance(USER, event).await;
        }
        // toggle Friday on and off again
        h.form.advance(USER, button("day_4")).await;
        h.form.advance(USER, button("day_4")).await;
        let prompt = h.form.advance(USER, button(step::PAYLOAD_DAYS_DONE)).await.unwrap();
        assert!(prompt.text.contains("каждый день"));

        let state = h.conversations.snapshot(USER).await.unwrap();
        assert!(state.draft.days.is_empty());
        assert!(state.draft.days.includes_weekday(NaiveDate::from_ymd_opt(2025, 7, 11).unwrap()));
    }

    #[tokio::test]
    async fn test_step_number_never_decreases() {
        let h = harness().await;
        h.form.start(USER).await;
        let noise = [text(""), button("bogus")];
        let mut last = 0;
        for event in happy_path().into_iter().take(10) {
            for bad in noise.iter() {
                h.form.advance(USER, bad.clone()).await;
                let current = step_of(&h).await.unwrap().number();
                assert!(current >= last);
                last = current;
            }
            h.form.advance(USER, event).await;
            let current = step_of(&h).await.unwrap().number();
            assert!(current >= last);
            last = current;
        }
        assert_eq!(last, Step::Confirm.number());
    }

    #[tokio::test]
    async fn test_missing_user_discards_state() {
        let storage = Arc::new(MemoryStorage::new());
        let conversations = Arc::new(ConversationStore::new(Duration::from_secs(3600)));
        let clock = Arc::new(FixedClock::at("2025-07-07", "10:00"));
        let form = IntakeForm::new(conversations.clone(), storage.clone(), clock);

        form.start(USER).await;
        let mut last = None;
        for event in happy_path() {
            last = form.advance(USER, event).await;
        }

        let last = last.unwrap();
        assert!(last.text.contains("пользователь не найден"));
        assert!(!conversations.contains(USER).await);
        assert_eq!(storage.schedule_count().await, 0);
    }

    #[tokio::test]
    async fn test_no_active_form() {
        let h = harness().await;
        assert_eq!(h.form.advance(USER, text("Витамин C")).await, None);
        assert_eq!(h.form.advance(USER, button("morning")).await, None);
    }
}
