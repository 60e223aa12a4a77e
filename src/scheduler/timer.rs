use std::future::Future;
use std::sync::Arc;

use chrono::{Datelike, Duration, NaiveDateTime, NaiveTime, Weekday};
use tokio::task::JoinHandle;

use super::{Notifier, ReminderScheduler};
use crate::clock::Clock;
use crate::stats::ProgressAggregator;

/// When a background job fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recurrence {
    /// Every N minutes, aligned to midnight (N = 30 fires at :00 and :30).
    EveryMinutes(u32),
    Weekly { weekday: Weekday, at: NaiveTime },
}

impl Recurrence {
    /// First firing instant strictly after `now`.
    pub fn next_after(&self, now: NaiveDateTime) -> NaiveDateTime {
        match *self {
            Recurrence::EveryMinutes(minutes) => {
                let period = i64::from(minutes.max(1)) * 60;
                let midnight = now.date().and_time(NaiveTime::MIN);
                let elapsed = (now - midnight).num_seconds();
                midnight + Duration::seconds((elapsed / period + 1) * period)
            }
            Recurrence::Weekly { weekday, at } => {
                let days_ahead = (7 + weekday.num_days_from_monday() as i64
                    - now.weekday().num_days_from_monday() as i64)
                    % 7;
                let candidate = (now.date() + Duration::days(days_ahead)).and_time(at);
                if candidate > now {
                    candidate
                } else {
                    candidate + Duration::days(7)
                }
            }
        }
    }
}

/// Sleeps until each firing instant and runs `job` with that instant, so a
/// late wake-up still reports the boundary it was meant for.
///
/// Each boundary fires at most once and boundaries only move forward, even
/// when the wall clock reads behind the last fired instant (a tokio timer
/// that wakes early, or the host clock stepping back).
pub async fn run_recurring<F, Fut>(clock: Arc<dyn Clock>, recurrence: Recurrence, mut job: F)
where
    F: FnMut(NaiveDateTime) -> Fut,
    Fut: Future<Output = ()>,
{
    let mut last_fired: Option<NaiveDateTime> = None;
    loop {
        let now = clock.now();
        let base = last_fired.map_or(now, |last| last.max(now));
        let next = recurrence.next_after(base);
        let wait = (next - now).to_std().unwrap_or_default();
        tokio::time::sleep(wait).await;
        job(next).await;
        last_fired = Some(next);
    }
}

pub fn spawn_reminder_loop(
    scheduler: Arc<ReminderScheduler>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    interval_minutes: u32,
) -> JoinHandle<()> {
    log::info!("⏰ Reminder loop started, every {} min", interval_minutes);
    tokio::spawn(run_recurring(
        clock,
        Recurrence::EveryMinutes(interval_minutes),
        move |now| {
            let scheduler = scheduler.clone();
            let notifier = notifier.clone();
            async move {
                let sent = scheduler.run_tick(now, notifier.as_ref()).await;
                log::debug!("Reminder tick {} sent {}", now.format("%H:%M"), sent);
            }
        },
    ))
}

pub fn spawn_weekly_report_loop(
    aggregator: Arc<ProgressAggregator>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    weekday: Weekday,
    at: NaiveTime,
) -> JoinHandle<()> {
    log::info!("📈 Weekly report loop started, {} at {}", weekday, at.format("%H:%M"));
    tokio::spawn(run_recurring(
        clock,
        Recurrence::Weekly { weekday, at },
        move |now| {
            let aggregator = aggregator.clone();
            let notifier = notifier.clone();
            async move {
                aggregator.send_weekly_reports(now.date(), notifier.as_ref()).await;
            }
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::clock::FixedClock;

    fn at(raw: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    #[test]
    fn test_every_half_hour_aligns_to_grid() {
        let every = Recurrence::EveryMinutes(30);
        assert_eq!(every.next_after(at("2025-07-07 08:00:00")), at("2025-07-07 08:30:00"));
        assert_eq!(every.next_after(at("2025-07-07 08:12:45")), at("2025-07-07 08:30:00"));
        assert_eq!(every.next_after(at("2025-07-07 08:29:59")), at("2025-07-07 08:30:00"));
        assert_eq!(every.next_after(at("2025-07-07 23:45:00")), at("2025-07-08 00:00:00"));
    }

    #[test]
    fn test_weekly_next_after() {
        let weekly = Recurrence::Weekly {
            weekday: Weekday::Mon,
            at: NaiveTime::from_hms_opt(7, 0, 0).unwrap(),
        };
        // 2025-07-07 is a Monday.
        assert_eq!(weekly.next_after(at("2025-07-07 06:59:00")), at("2025-07-07 07:00:00"));
        assert_eq!(weekly.next_after(at("2025-07-07 07:00:00")), at("2025-07-14 07:00:00"));
        assert_eq!(weekly.next_after(at("2025-07-09 12:00:00")), at("2025-07-14 07:00:00"));
        assert_eq!(weekly.next_after(at("2025-07-13 23:59:00")), at("2025-07-14 07:00:00"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_recurring_passes_boundary_instants() {
        let clock = Arc::new(FixedClock::new(at("2025-07-07 08:10:00")));
        let fired = Arc::new(AtomicUsize::new(0));
        let seen = Arc::new(tokio::sync::Mutex::new(Vec::new()));

        let job_clock = clock.clone();
        let job_fired = fired.clone();
        let job_seen = seen.clone();
        let handle = tokio::spawn(run_recurring(
            clock.clone(),
            Recurrence::EveryMinutes(30),
            move |now| {
                job_clock.set(now);
                job_fired.fetch_add(1, Ordering::SeqCst);
                let seen = job_seen.clone();
                async move {
                    seen.lock().await.push(now);
                }
            },
        ));

        tokio::time::sleep(std::time::Duration::from_secs(60 * 60)).await;
        handle.abort();

        let seen = seen.lock().await;
        assert_eq!(fired.load(Ordering::SeqCst), 2);
        assert_eq!(*seen, vec![at("2025-07-07 08:30:00"), at("2025-07-07 09:00:00")]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lagging_clock_fires_each_boundary_once() {
        let clock = Arc::new(FixedClock::new(at("2025-07-07 08:10:00")));
        let seen = Arc::new(tokio::sync::Mutex::new(Vec::new()));

        // The wall clock wakes a millisecond short of every boundary.
        let job_clock = clock.clone();
        let job_seen = seen.clone();
        let handle = tokio::spawn(run_recurring(
            clock.clone(),
            Recurrence::EveryMinutes(30),
            move |now| {
                job_clock.set(now - Duration::milliseconds(1));
                let seen = job_seen.clone();
                async move {
                    seen.lock().await.push(now);
                }
            },
        ));

        tokio::time::sleep(std::time::Duration::from_secs(25 * 60)).await;
        handle.abort();

        assert_eq!(*seen.lock().await, vec![at("2025-07-07 08:30:00")]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clock_stepping_back_does_not_repeat_boundaries() {
        let clock = Arc::new(FixedClock::new(at("2025-07-07 08:10:00")));
        let seen = Arc::new(tokio::sync::Mutex::new(Vec::new()));

        // After the first fire the host clock falls back an hour, as on a
        // DST change, then runs normally.
        let job_clock = clock.clone();
        let job_seen = seen.clone();
        let stepped = Arc::new(AtomicUsize::new(0));
        let handle = tokio::spawn(run_recurring(
            clock.clone(),
            Recurrence::EveryMinutes(30),
            move |now| {
                if stepped.fetch_add(1, Ordering::SeqCst) == 0 {
                    job_clock.set(now - Duration::hours(1));
                } else {
                    job_clock.set(now);
                }
                let seen = job_seen.clone();
                async move {
                    seen.lock().await.push(now);
                }
            },
        ));

        tokio::time::sleep(std::time::Duration::from_secs(2 * 60 * 60)).await;
        handle.abort();

        let seen = seen.lock().await;
        assert_eq!(*seen, vec![at("2025-07-07 08:30:00"), at("2025-07-07 09:00:00")]);
        assert!(seen.windows(2).all(|w| w[0] < w[1]));
    }
}
