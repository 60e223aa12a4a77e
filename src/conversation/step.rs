use std::sync::OnceLock;

use chrono::{Months, NaiveDate};
use regex::Regex;

use super::{Control, InputEvent, Prompt};
use crate::encoding::{parse_date, parse_reminder_times, DaySet, ParseError, DAY_NAMES};
use crate::models::{ConversationState, TimeOfDay};

pub const PAYLOAD_FOOD_YES: &str = "food_yes";
pub const PAYLOAD_FOOD_NO: &str = "food_no";
pub const PAYLOAD_TODAY: &str = "today";
pub const PAYLOAD_OTHER_DAY: &str = "other";
pub const PAYLOAD_DAY_PREFIX: &str = "day_";
pub const PAYLOAD_DAYS_DONE: &str = "days_done";
pub const PAYLOAD_SAVE: &str = "save";
pub const PAYLOAD_CANCEL: &str = "cancel";

/// Position in the add-schedule form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Name,
    Dosage,
    TimeOfDay,
    WithFood,
    StartDate,
    /// "Другой день" was pressed; waiting for a typed date.
    CustomStartDate,
    Duration,
    Weekdays,
    ReminderTimes,
    Confirm,
}

impl Step {
    /// Step number shown in logs. Never decreases along the form.
    pub fn number(&self) -> u8 {
        match self {
            Step::Name => 1,
            Step::Dosage => 2,
            Step::TimeOfDay => 3,
            Step::WithFood => 4,
            Step::StartDate | Step::CustomStartDate => 5,
            Step::Duration => 6,
            Step::Weekdays => 8,
            Step::ReminderTimes => 9,
            Step::Confirm => 10,
        }
    }

    /// Prompt for this step without any preceding feedback line.
    pub fn prompt(&self, state: &ConversationState) -> Prompt {
        match self {
            Step::Name => Prompt::text("🩺 Введи название добавки, которую хочешь добавить:"),
            Step::Dosage => {
                Prompt::text("💊 Укажи дозировку в свободной форме (например, '10 000 МЕ/день'):")
            }
            Step::TimeOfDay => Prompt::text("🕒 Когда обычно принимаешь эту добавку?").with_controls(vec![
                vec![
                    time_of_day_control(TimeOfDay::Morning),
                    time_of_day_control(TimeOfDay::Afternoon),
                ],
                vec![
                    time_of_day_control(TimeOfDay::Evening),
                    time_of_day_control(TimeOfDay::Any),
                ],
            ]),
            Step::WithFood => Prompt::text("😋 Принимается с едой?").with_controls(vec![vec![
                Control::new("✅", PAYLOAD_FOOD_YES),
                Control::new("❌", PAYLOAD_FOOD_NO),
            ]]),
            Step::StartDate => Prompt::text("📅 Когда начинаешь принимать добавку?").with_controls(vec![vec![
                Control::new("Сегодня", PAYLOAD_TODAY),
                Control::new("Другой день", PAYLOAD_OTHER_DAY),
            ]]),
            Step::CustomStartDate => Prompt::text("Укажите дату (пример формата: 2025-07-06)"),
            Step::Duration => Prompt::text(
                "На какой срок нужно принимать добавку?\n\n\
                Введите:\n\
                • \"3\" → для недель\n\
                • \"2м\" → для месяцев\n\
                • \"-\" → если бессрочно.",
            ),
            Step::Weekdays => Prompt::text(
                "Выберите дни недели приёма добавки.\n\
                Нажмите 'Готово', когда закончите выбор.\n\
                Если ничего не выберете, будет 'каждый день'.",
            )
            .with_controls(weekday_controls(&state.selected_days)),
            Step::ReminderTimes => Prompt::text(
                "⏰ В какое время напоминать о приёме?\n\
                Ты можешь указать несколько значений, например: 08:00, 13:30.\n\
                Или отправь нет, если напоминания не нужны",
            ),
            Step::Confirm => Prompt::text(state.draft.summary()).with_controls(vec![vec![
                Control::new("💾 Сохранить", PAYLOAD_SAVE),
                Control::new("❌ Отмена", PAYLOAD_CANCEL),
            ]]),
        }
    }
}

fn time_of_day_control(time: TimeOfDay) -> Control {
    Control::new(time.button_label(), time.as_str())
}

fn weekday_controls(selected: &DaySet) -> Vec<Vec<Control>> {
    let days: Vec<Control> = DAY_NAMES
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let mark = if selected.contains(i as u8) { "✅" } else { "✖️" };
            Control::new(format!("{} {}", mark, name), format!("{}{}", PAYLOAD_DAY_PREFIX, i))
        })
        .collect();

    vec![
        days[0..3].to_vec(),
        days[3..6].to_vec(),
        vec![days[6].clone(), Control::new("Готово", PAYLOAD_DAYS_DONE)],
    ]
}

/// Result of feeding one event to the current step.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// Re-prompt on the same step.
    Stay(Prompt),
    Advance(Step, Prompt),
    /// Confirmation received; persist the draft.
    Save,
}

/// The transition table: (step, event) -> (next step, prompt).
pub fn transition(state: &mut ConversationState, event: &InputEvent, today: NaiveDate) -> Transition {
    match (state.step, event) {
        (Step::Name, InputEvent::Text(text)) => {
            let name = text.trim();
            if name.is_empty() {
                return stay_with(state, "Название не может быть пустым.");
            }
            state.draft.name = name.to_string();
            advance(state, Step::Dosage, None)
        }

        (Step::Dosage, InputEvent::Text(text)) => {
            let dosage = text.trim();
            if dosage.is_empty() {
                return stay_with(state, "Дозировка не может быть пустой.");
            }
            state.draft.dosage = dosage.to_string();
            advance(state, Step::TimeOfDay, None)
        }

        (Step::TimeOfDay, InputEvent::Button(payload)) => match TimeOfDay::parse(payload) {
            Some(time) => {
                state.draft.time_of_day = Some(time);
                let note = format!("🕒 Время приёма выбрано: {}", time.label());
                advance(state, Step::WithFood, Some(note))
            }
            None => stay_with(state, "Выбери вариант на кнопках."),
        },

        (Step::WithFood, InputEvent::Button(payload)) => {
            let with_food = match payload.as_str() {
                PAYLOAD_FOOD_YES => true,
                PAYLOAD_FOOD_NO => false,
                _ => return stay_with(state, "Выбери вариант на кнопках."),
            };
            state.draft.with_food = with_food;
            let note = format!("😋 Принимается с едой: {}", if with_food { "✅" } else { "❌" });
            advance(state, Step::StartDate, Some(note))
        }

        (Step::StartDate, InputEvent::Button(payload)) if payload == PAYLOAD_TODAY => {
            set_start_date(state, today)
        }

        (Step::StartDate, InputEvent::Button(payload)) if payload == PAYLOAD_OTHER_DAY => {
            advance(state, Step::CustomStartDate, None)
        }

        (Step::StartDate | Step::CustomStartDate, InputEvent::Text(text)) => match parse_date(text) {
            Ok(date) => set_start_date(state, date),
            Err(_) => stay_with(state, "Некорректный формат даты. Пример: 2025-07-06"),
        },

        (Step::Duration, InputEvent::Text(text)) => {
            let start = state.draft.start_date.unwrap_or(today);
            match parse_duration(text, start) {
                Ok(Some(end)) => {
                    state.draft.end_date = Some(end);
                    let note = format!("✅ Приём добавки до {}", end.format("%Y-%m-%d"));
                    advance(state, Step::Weekdays, Some(note))
                }
                Ok(None) => {
                    state.draft.end_date = None;
                    advance(state, Step::Weekdays, Some("✅ Приём добавки будет бессрочным.".to_string()))
                }
                Err(_) => stay_with(
                    state,
                    "Неверный формат. Введите количество недель, например '3', либо количество месяцев, \
                    например '2м', или '-' для бессрочного приема.",
                ),
            }
        }

        (Step::Weekdays, InputEvent::Button(payload)) if payload == PAYLOAD_DAYS_DONE => {
            state.draft.days = state.selected_days.clone();
            let note = format!("Выбраны дни: {}", state.draft.days.describe());
            advance(state, Step::ReminderTimes, Some(note))
        }

        (Step::Weekdays, InputEvent::Button(payload)) if payload.starts_with(PAYLOAD_DAY_PREFIX) => {
            let day = payload
                .strip_prefix(PAYLOAD_DAY_PREFIX)
                .and_then(|d| d.parse::<u8>().ok());
            match day.map(|d| state.selected_days.toggle(d)) {
                Some(Ok(_)) => {
                    let mut prompt = Step::Weekdays.prompt(state);
                    prompt.edit = true;
                    Transition::Stay(prompt)
                }
                _ => stay_with(state, "Некорректный день."),
            }
        }

        (Step::ReminderTimes, InputEvent::Text(text)) => {
            let input = text.trim();
            if input.to_lowercase() == "нет" {
                state.draft.reminder_enabled = false;
                state.draft.reminder_times.clear();
                return advance(state, Step::Confirm, Some("🔕 Напоминания отключены.".to_string()));
            }

            match parse_reminder_times(input) {
                Ok(times) => {
                    let note = format!(
                        "⏰ Напоминания установлены на: {}",
                        times.iter().map(|t| t.to_string()).collect::<Vec<_>>().join(", ")
                    );
                    state.draft.reminder_times = times;
                    state.draft.reminder_enabled = true;
                    advance(state, Step::Confirm, Some(note))
                }
                Err(ParseError::InvalidMinutes(_)) => stay_with(
                    state,
                    "❌ Время должно быть кратно 30 минутам (допустимы только минуты '00' или '30'). \
                    Например: 08:00, 13:30.\nИли отправьте 'нет' для отказа от напоминаний.",
                ),
                Err(_) => stay_with(
                    state,
                    "❌ Неверный формат времени. Используйте формат HH:MM, например: 08:00, 13:30.\n\
                    Или отправьте 'нет' для отказа от напоминаний.",
                ),
            }
        }

        (Step::Confirm, InputEvent::Button(payload)) if payload == PAYLOAD_SAVE => Transition::Save,

        (step, _) => Transition::Stay(step.prompt(state)),
    }
}

fn set_start_date(state: &mut ConversationState, date: NaiveDate) -> Transition {
    state.draft.start_date = Some(date);
    let note = format!("Выбрана дата: {}", date.format("%Y-%m-%d"));
    advance(state, Step::Duration, Some(note))
}

fn advance(state: &ConversationState, next: Step, note: Option<String>) -> Transition {
    let mut prompt = next.prompt(state);
    if let Some(note) = note {
        prompt.text = format!("{}\n\n{}", note, prompt.text);
    }
    Transition::Advance(next, prompt)
}

fn stay_with(state: &ConversationState, error: &str) -> Transition {
    let mut prompt = state.step.prompt(state);
    prompt.text = format!("{}\n\n{}", error, prompt.text);
    Transition::Stay(prompt)
}

fn duration_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^(\d+)([мМmM])?$").expect("valid duration regex"))
}

/// `-` is open-ended, `N` is N weeks, `Nм` is N months. The end date must be
/// strictly after `start`.
pub fn parse_duration(input: &str, start: NaiveDate) -> Result<Option<NaiveDate>, ParseError> {
    let input = input.trim();
    if input == "-" {
        return Ok(None);
    }

    let invalid = || ParseError::InvalidDuration(input.to_string());
    let captures = duration_pattern().captures(input).ok_or_else(invalid)?;
    let count: u32 = captures[1].parse().map_err(|_| invalid())?;

    let end = if captures.get(2).is_some() {
        start.checked_add_months(Months::new(count))
    } else {
        start.checked_add_signed(chrono::Duration::weeks(i64::from(count)))
    }
    .ok_or_else(invalid)?;

    if end <= start {
        return Err(invalid());
    }
    Ok(Some(end))
}
