//! Daily scheduler - fires order generation once per day in a fixed timezone.
//!
//! "Now" comes from an injectable [`Clock`], so runs are deterministic in
//! tests. Scheduled and manual runs share one lock and never overlap.

use crate::{
    config::Settings,
    core::{
        generator::{
            GenerationReport, format_generation_summary, generate_daily_orders,
            get_last_generation_date, is_daily_generation_needed, missed_days,
        },
        subscription::expire_finished_subscriptions,
    },
    errors::{Error, Result},
};
use chrono::{DateTime, Days, FixedOffset, NaiveDate, TimeZone, Utc};
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, watch};
use tracing::{error, info, instrument, warn};

/// Source of the current time in the scheduler's timezone.
pub trait Clock: Send + Sync {
    /// Current instant in the clock's offset.
    fn now(&self) -> DateTime<FixedOffset>;

    /// Current calendar date in the clock's offset.
    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

/// Wall clock shifted into a fixed UTC offset.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    offset: FixedOffset,
}

impl SystemClock {
    /// Creates a clock reporting time in `offset`.
    #[must_use]
    pub const fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<FixedOffset> {
        Utc::now().with_timezone(&self.offset)
    }
}

/// A clock stopped at one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<FixedOffset>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<FixedOffset> {
        self.0
    }
}

/// First instant strictly after `now` at `hour:minute` in `now`'s offset.
pub fn next_run_after(
    now: DateTime<FixedOffset>,
    hour: u32,
    minute: u32,
) -> Result<DateTime<FixedOffset>> {
    let invalid = || Error::Config {
        message: format!("Invalid run time {hour:02}:{minute:02}"),
    };

    let offset = *now.offset();
    let at = |day: NaiveDate| {
        day.and_hms_opt(hour, minute, 0)
            .and_then(|local| offset.from_local_datetime(&local).single())
    };

    let today_run = at(now.date_naive()).ok_or_else(invalid)?;
    if today_run > now {
        return Ok(today_run);
    }

    now.date_naive()
        .checked_add_days(Days::new(1))
        .and_then(at)
        .ok_or_else(invalid)
}

/// Everything one daily run did.
#[derive(Debug, Clone)]
pub struct DailyRunReport {
    /// Order generation outcome
    pub generation: GenerationReport,
    /// Subscriptions marked Inactive by the expiry sweep
    pub expired: u64,
}

/// Runs generation (and the expiry sweep) daily at the configured time.
pub struct DailyScheduler {
    db: DatabaseConnection,
    settings: Arc<Settings>,
    clock: Arc<dyn Clock>,
    run_lock: Mutex<()>,
}

impl DailyScheduler {
    /// Creates a scheduler over the given database, settings and clock.
    #[must_use]
    pub fn new(db: DatabaseConnection, settings: Arc<Settings>, clock: Arc<dyn Clock>) -> Self {
        Self {
            db,
            settings,
            clock,
            run_lock: Mutex::new(()),
        }
    }

    /// The database the scheduler runs against.
    #[must_use]
    pub const fn db(&self) -> &DatabaseConnection {
        &self.db
    }

    /// Runs today's generation if its scheduled time has passed and no run was
    /// recorded for today, e.g. after the process was down at run time.
    ///
    /// Days missed entirely are logged; no orders are generated for them.
    #[instrument(skip(self))]
    pub async fn catch_up(&self) -> Result<Option<DailyRunReport>> {
        let now = self.clock.now();
        let today = now.date_naive();
        let next = next_run_after(
            now,
            self.settings.scheduler.run_hour,
            self.settings.scheduler.run_minute,
        )?;
        if next.date_naive() == today || !is_daily_generation_needed(&self.db, today).await? {
            return Ok(None);
        }

        let missed = missed_days(get_last_generation_date(&self.db).await?, today);
        if let (Some(first), Some(last)) = (missed.first(), missed.last()) {
            warn!(
                count = missed.len(),
                %first,
                %last,
                "Daily runs were missed; no orders exist for those days"
            );
        }

        info!(%today, "Running missed daily generation");
        self.run_now().await.map(Some)
    }

    /// Runs generation for the clock's current date right away.
    ///
    /// Used by the scheduled loop and for admin-triggered manual runs. Waits
    /// for any run already in progress to finish first.
    #[instrument(skip(self))]
    pub async fn run_now(&self) -> Result<DailyRunReport> {
        let _guard = self.run_lock.lock().await;
        let today = self.clock.today();

        let generation = generate_daily_orders(&self.db, &self.settings, today).await?;
        info!("{}", format_generation_summary(&generation));

        let expired = if self.settings.scheduler.expire_finished_subscriptions {
            expire_finished_subscriptions(&self.db, today).await?
        } else {
            0
        };

        Ok(DailyRunReport {
            generation,
            expired,
        })
    }

    /// Time left until the next scheduled run.
    pub fn delay_until_next_run(&self) -> Result<Duration> {
        let now = self.clock.now();
        let next = next_run_after(
            now,
            self.settings.scheduler.run_hour,
            self.settings.scheduler.run_minute,
        )?;
        Ok((next - now).to_std().unwrap_or(Duration::ZERO))
    }

    /// Catches up on a missed run for today, then sleeps until each scheduled
    /// time and runs, until `shutdown` turns true or closes.
    ///
    /// A failed run is logged and the loop carries on with the next day.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        info!(
            run_hour = self.settings.scheduler.run_hour,
            run_minute = self.settings.scheduler.run_minute,
            utc_offset_minutes = self.settings.scheduler.utc_offset_minutes,
            "Starting daily order scheduler"
        );

        if let Err(e) = self.catch_up().await {
            error!(error = %e, "Catch-up run failed");
        }

        loop {
            let delay = self.delay_until_next_run()?;
            info!(seconds = delay.as_secs(), "Next daily run scheduled");

            tokio::select! {
                () = tokio::time::sleep(delay) => {
                    if let Err(e) = self.run_now().await {
                        error!(error = %e, "Daily run failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Daily order scheduler stopping");
                        return Ok(());
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::entities::subscription::SubscriptionStatus;
    use crate::test_utils::*;

    fn ist() -> FixedOffset {
        FixedOffset::east_opt(330 * 60).unwrap()
    }

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<FixedOffset> {
        ist().with_ymd_and_hms(y, m, d, h, min, 0).single().unwrap()
    }

    #[test]
    fn test_next_run_is_next_midnight() {
        assert_eq!(
            next_run_after(at(2024, 1, 5, 13, 45), 0, 0).unwrap(),
            at(2024, 1, 6, 0, 0)
        );
        // Exactly at the run time: the next one is tomorrow
        assert_eq!(
            next_run_after(at(2024, 1, 5, 0, 0), 0, 0).unwrap(),
            at(2024, 1, 6, 0, 0)
        );
        assert_eq!(
            next_run_after(at(2024, 1, 31, 23, 59), 0, 0).unwrap(),
            at(2024, 2, 1, 0, 0)
        );
    }

    #[test]
    fn test_next_run_later_today() {
        assert_eq!(
            next_run_after(at(2024, 1, 5, 5, 0), 6, 30).unwrap(),
            at(2024, 1, 5, 6, 30)
        );
        assert!(next_run_after(at(2024, 1, 5, 5, 0), 25, 0).is_err());
    }

    #[test]
    fn test_system_clock_uses_offset() {
        let clock = SystemClock::new(ist());
        assert_eq!(clock.now().offset().local_minus_utc(), 330 * 60);
    }

    #[test]
    fn test_fixed_clock_today_is_local_date() {
        // 2024-01-04 20:00 UTC is already 2024-01-05 in IST
        let utc_evening = Utc.with_ymd_and_hms(2024, 1, 4, 20, 0, 0).single().unwrap();
        let clock = FixedClock(utc_evening.with_timezone(&ist()));
        assert_eq!(clock.today(), date(2024, 1, 5));
    }

    #[tokio::test]
    async fn test_delay_until_next_run() -> Result<()> {
        let db = setup_test_db().await?;
        let scheduler = DailyScheduler::new(
            db,
            Arc::new(Settings::default()),
            Arc::new(FixedClock(at(2024, 1, 5, 23, 0))),
        );
        assert_eq!(scheduler.delay_until_next_run()?, Duration::from_secs(3600));
        Ok(())
    }

    #[tokio::test]
    async fn test_run_now_generates_and_expires() -> Result<()> {
        let db = setup_test_db().await?;
        fund_wallet(&db, 1, 1500.0).await?;
        create_test_subscription(&db, 1, 9, date(2024, 1, 1), date(2024, 1, 31), 1500.0).await?;
        let finished =
            create_test_subscription(&db, 2, 9, date(2023, 12, 1), date(2024, 1, 4), 1000.0)
                .await?;

        let scheduler = DailyScheduler::new(
            db,
            Arc::new(Settings::default()),
            Arc::new(FixedClock(at(2024, 1, 5, 0, 0))),
        );
        let report = scheduler.run_now().await?;

        assert_eq!(report.generation.date, date(2024, 1, 5));
        assert_eq!(report.generation.created.len(), 1);
        assert_eq!(report.expired, 1);
        let finished = crate::core::subscription::get_subscription(scheduler.db(), finished.id)
            .await?
            .unwrap();
        assert_eq!(finished.status, SubscriptionStatus::Inactive);

        Ok(())
    }

    #[tokio::test]
    async fn test_catch_up_runs_when_today_was_missed() -> Result<()> {
        let db = setup_test_db().await?;
        fund_wallet(&db, 1, 1500.0).await?;
        create_test_subscription(&db, 1, 9, date(2024, 1, 1), date(2024, 1, 31), 1500.0).await?;
        // Last ran on the 2nd, process restarted on the 5th at 09:00
        generate_daily_orders(&db, &Settings::default(), date(2024, 1, 2)).await?;

        let scheduler = DailyScheduler::new(
            db,
            Arc::new(Settings::default()),
            Arc::new(FixedClock(at(2024, 1, 5, 9, 0))),
        );
        let report = scheduler.catch_up().await?.unwrap();
        assert_eq!(report.generation.date, date(2024, 1, 5));
        assert_eq!(report.generation.created.len(), 1);
        assert_eq!(
            get_last_generation_date(scheduler.db()).await?,
            Some(date(2024, 1, 5))
        );

        // Already ran today: nothing more to do
        assert!(scheduler.catch_up().await?.is_none());

        Ok(())
    }

    #[tokio::test]
    async fn test_catch_up_waits_for_todays_run_time() -> Result<()> {
        let db = setup_test_db().await?;
        create_test_subscription(&db, 1, 9, date(2024, 1, 1), date(2024, 1, 31), 1500.0).await?;
        generate_daily_orders(&db, &Settings::default(), date(2024, 1, 4)).await?;

        let mut settings = Settings::default();
        settings.scheduler.run_hour = 6;
        let scheduler = DailyScheduler::new(
            db,
            Arc::new(settings),
            Arc::new(FixedClock(at(2024, 1, 5, 5, 0))),
        );

        assert!(scheduler.catch_up().await?.is_none());
        assert_eq!(
            get_last_generation_date(scheduler.db()).await?,
            Some(date(2024, 1, 4))
        );

        Ok(())
    }

    #[tokio::test]
    async fn test_concurrent_manual_runs_do_not_duplicate() -> Result<()> {
        let db = setup_test_db().await?;
        create_test_subscription(&db, 1, 9, date(2024, 1, 1), date(2024, 1, 31), 1500.0).await?;

        let scheduler = DailyScheduler::new(
            db,
            Arc::new(Settings::default()),
            Arc::new(FixedClock(at(2024, 1, 5, 9, 0))),
        );
        let (first, second) = tokio::join!(scheduler.run_now(), scheduler.run_now());
        let (first, second) = (first?, second?);

        assert_eq!(
            first.generation.created.len() + second.generation.created.len(),
            1
        );
        assert_eq!(
            first.generation.already_generated.len() + second.generation.already_generated.len(),
            1
        );

        Ok(())
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() -> Result<()> {
        let db = setup_test_db().await?;
        let scheduler = DailyScheduler::new(
            db,
            Arc::new(Settings::default()),
            Arc::new(FixedClock(at(2024, 1, 5, 9, 0))),
        );
        let (tx, rx) = watch::channel(false);

        let stopper = async {
            tx.send(true).unwrap();
        };
        let (result, ()) = tokio::join!(scheduler.run(rx), stopper);
        result?;

        Ok(())
    }
}
