//! BatchScheduler - ユーザー単位・日付範囲での一括生成
//!
//! - 個々のエンティティの失敗でバッチを止めない（ErrorKind で集計先を決める）
//! - ユーザーも日付も順番に処理する
//! - 次回の自動実行時刻の計算と RunTrigger への委譲

use std::sync::Arc;

use chrono::{DateTime, Days, Duration, FixedOffset, NaiveDate, NaiveTime, Offset, Utc};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::app::generator::InstanceGenerator;
use crate::domain::{
    BatchStats, DayStats, ErrorKind, GenerationOutcome, RangeStats, StoreError, UpcomingStats,
    UserId,
};
use crate::ports::{CatalogStore, Clock, RunTrigger, TriggerError};

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("start date {start} is after end date {end}")]
    InvalidRange { start: NaiveDate, end: NaiveDate },

    #[error("store failure: {0}")]
    Store(#[from] StoreError),

    #[error("failed to arm next run: {0}")]
    Trigger(#[from] TriggerError),
}

/// When the daily run fires and how far the manual run looks ahead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleSettings {
    /// Wall-clock time of the daily run, in `offset`.
    pub trigger_time: NaiveTime,
    pub offset: FixedOffset,
    pub lookahead_days: u32,
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        Self {
            trigger_time: NaiveTime::from_hms_opt(18, 0, 0).unwrap_or_default(),
            offset: Utc.fix(),
            lookahead_days: 6,
        }
    }
}

pub struct BatchScheduler {
    catalog: Arc<dyn CatalogStore>,
    generator: Arc<InstanceGenerator>,
    clock: Arc<dyn Clock>,
    settings: ScheduleSettings,
}

impl BatchScheduler {
    pub fn new(
        catalog: Arc<dyn CatalogStore>,
        generator: Arc<InstanceGenerator>,
        clock: Arc<dyn Clock>,
        settings: ScheduleSettings,
    ) -> Self {
        Self {
            catalog,
            generator,
            clock,
            settings,
        }
    }

    pub fn settings(&self) -> &ScheduleSettings {
        &self.settings
    }

    /// Generate `date` for every recurring entity owned by `user_id`.
    pub async fn run_for_user(
        &self,
        user_id: UserId,
        date: NaiveDate,
    ) -> Result<DayStats, ScheduleError> {
        let entities = self.catalog.list_recurring_entities_for_user(user_id).await?;
        let mut stats = DayStats::new(date);

        for entity in &entities {
            match self.generator.generate(entity, date).await {
                Ok(outcome) => stats.record(outcome),
                Err(err) => match err.kind() {
                    ErrorKind::Benign => {
                        debug!(entity_id = %entity.id, date = %date, error = %err, "counted as skipped");
                        stats.record(GenerationOutcome::Skipped);
                    }
                    ErrorKind::Permanent => {
                        warn!(entity_id = %entity.id, date = %date, error = %err, "entity cannot be generated");
                        stats.record_failure(entity.id, &err);
                    }
                    ErrorKind::Infrastructure => {
                        error!(entity_id = %entity.id, date = %date, error = %err, "generation failed");
                        stats.record_failure(entity.id, &err);
                    }
                },
            }
        }

        info!(
            user_id = %user_id,
            date = %date,
            entities = entities.len(),
            created = stats.created,
            skipped = stats.skipped,
            failed = stats.failed,
            "generation finished"
        );
        Ok(stats)
    }

    /// Generate every date in `start..=end`, one day after another.
    pub async fn generate_range(
        &self,
        user_id: UserId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<RangeStats, ScheduleError> {
        if start > end {
            return Err(ScheduleError::InvalidRange { start, end });
        }
        let mut range = RangeStats::new(start, end);
        for date in start.iter_days().take_while(|date| *date <= end) {
            range.absorb(self.run_for_user(user_id, date).await?);
        }
        Ok(range)
    }

    /// Today plus the configured look-ahead window.
    pub async fn generate_upcoming(
        &self,
        user_id: UserId,
        today: NaiveDate,
    ) -> Result<UpcomingStats, ScheduleError> {
        let today_stats = self.run_for_user(user_id, today).await?;

        let window = match self.settings.lookahead_days {
            0 => None,
            days => today
                .checked_add_days(Days::new(1))
                .zip(today.checked_add_days(Days::new(u64::from(days)))),
        };
        let week = match window {
            Some((start, end)) => Some(self.generate_range(user_id, start, end).await?),
            None => None,
        };

        Ok(UpcomingStats {
            today: today_stats,
            week,
        })
    }

    /// Run `date` for every known user. A user whose entities cannot be
    /// listed is reported and skipped.
    pub async fn run_for_all_users(&self, date: NaiveDate) -> Result<BatchStats, ScheduleError> {
        let users = self.catalog.list_users().await?;
        let mut batch = BatchStats::new(date);

        for user_id in users {
            match self.run_for_user(user_id, date).await {
                Ok(stats) => batch.absorb(user_id, stats),
                Err(err) => {
                    error!(user_id = %user_id, date = %date, error = %err, "user batch failed");
                    batch.record_user_failure(user_id, &err);
                }
            }
        }

        info!(
            date = %date,
            users = batch.users.len(),
            created = batch.created,
            skipped = batch.skipped,
            failed = batch.failed,
            "daily batch finished"
        );
        Ok(batch)
    }

    /// Next instant of the daily trigger, strictly after `now` once today's
    /// trigger time has been reached.
    pub fn next_run_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let local = now.with_timezone(&self.settings.offset).naive_local();
        let today_run = local.date().and_time(self.settings.trigger_time);
        let next_local = if local >= today_run {
            today_run + Duration::days(1)
        } else {
            today_run
        };
        (next_local - self.settings.offset).and_utc()
    }

    /// Calendar date of `at` in the trigger's timezone.
    pub fn local_date(&self, at: DateTime<Utc>) -> NaiveDate {
        at.with_timezone(&self.settings.offset).date_naive()
    }

    /// Compute the next trigger instant from the clock and hand it to `trigger`.
    pub async fn schedule_next_run(
        &self,
        trigger: &dyn RunTrigger,
    ) -> Result<DateTime<Utc>, ScheduleError> {
        let at = self.next_run_after(self.clock.now());
        trigger.arm(at).await?;
        info!(next_run = %at, "next generation run scheduled");
        Ok(at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        Area, AreaId, EntityId, EvaluationMethod, Frequency, Iteration, Parent, Queue, QueueItem,
        RecurringEntity, TaskItem,
    };
    use crate::impls::InMemoryStore;
    use crate::ports::{FixedClock, OccurrenceStore, UlidGenerator};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use rstest::rstest;
    use std::sync::Mutex;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn scheduler_with(
        store: &InMemoryStore,
        clock: FixedClock,
        settings: ScheduleSettings,
    ) -> BatchScheduler {
        let generator = Arc::new(InstanceGenerator::new(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            Arc::new(UlidGenerator::new(clock.clone())),
            Arc::new(clock.clone()),
        ));
        BatchScheduler::new(Arc::new(store.clone()), generator, Arc::new(clock), settings)
    }

    fn scheduler(store: &InMemoryStore) -> BatchScheduler {
        scheduler_with(store, FixedClock::new(start()), ScheduleSettings::default())
    }

    fn task(name: &str, method: EvaluationMethod, target_value: Option<f64>) -> QueueItem {
        QueueItem::Task(TaskItem {
            id: name.to_lowercase(),
            name: name.to_string(),
            evaluation_method: method,
            target_value,
            execution_time: None,
            duration: None,
        })
    }

    fn routine(user_id: UserId, items: Vec<QueueItem>) -> RecurringEntity {
        RecurringEntity::routine(EntityId::random(), user_id, "routine", start())
            .with_bounds(Some(start()), None)
            .with_queue(Queue::new(vec![Iteration {
                position: 0,
                is_cooldown: false,
                items,
            }]))
    }

    async fn seed_mixed_user(store: &InMemoryStore, user_id: UserId) {
        let healthy = routine(user_id, vec![task("Stretch", EvaluationMethod::YesNo, None)]);
        let empty = routine(user_id, Vec::new()).with_queue(Queue::default());
        let malformed = routine(user_id, vec![task("Squats", EvaluationMethod::Numeric, None)]);
        // created on a Monday, so only Mondays apply
        let weekly = routine(user_id, vec![task("Review", EvaluationMethod::YesNo, None)])
            .with_frequency(Frequency::Weekly);
        for entity in [healthy, empty, malformed, weekly] {
            store.save_entity(entity).await.unwrap();
        }
    }

    #[tokio::test]
    async fn per_entity_errors_are_counted_not_raised() {
        let store = InMemoryStore::new();
        let user_id = UserId::random();
        seed_mixed_user(&store, user_id).await;

        // 2024-01-02 is a Tuesday
        let stats = scheduler(&store).run_for_user(user_id, day(2)).await.unwrap();

        assert_eq!(stats.created, 1);
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.failures.len(), 1);
        assert!(stats.failures[0].error.contains("target_value"));
    }

    #[tokio::test]
    async fn rerun_only_skips() {
        let store = InMemoryStore::new();
        let user_id = UserId::random();
        store
            .save_entity(routine(user_id, vec![task("Stretch", EvaluationMethod::YesNo, None)]))
            .await
            .unwrap();
        let scheduler = scheduler(&store);

        scheduler.run_for_user(user_id, day(2)).await.unwrap();
        let again = scheduler.run_for_user(user_id, day(2)).await.unwrap();

        assert_eq!((again.created, again.skipped, again.failed), (0, 1, 0));
    }

    #[tokio::test]
    async fn persistence_failures_are_counted_and_batch_continues() {
        let store = InMemoryStore::new();
        let user_id = UserId::random();
        for _ in 0..2 {
            store
                .save_entity(routine(user_id, vec![task("Stretch", EvaluationMethod::YesNo, None)]))
                .await
                .unwrap();
        }
        store.fail_next_commits(1).await;

        let stats = scheduler(&store).run_for_user(user_id, day(2)).await.unwrap();

        assert_eq!((stats.created, stats.failed), (1, 1));
    }

    #[tokio::test]
    async fn other_users_entities_are_untouched() {
        let store = InMemoryStore::new();
        let alice = UserId::random();
        let bob = UserId::random();
        store
            .save_entity(routine(bob, vec![task("Stretch", EvaluationMethod::YesNo, None)]))
            .await
            .unwrap();

        let stats = scheduler(&store).run_for_user(alice, day(2)).await.unwrap();

        assert_eq!((stats.created, stats.skipped, stats.failed), (0, 0, 0));
        assert_eq!(store.occurrence_count().await, 0);
    }

    #[tokio::test]
    async fn range_is_inclusive_and_rejects_inverted_bounds() {
        let store = InMemoryStore::new();
        let user_id = UserId::random();
        store
            .save_entity(routine(user_id, vec![task("Stretch", EvaluationMethod::YesNo, None)]))
            .await
            .unwrap();
        let scheduler = scheduler(&store);

        let range = scheduler.generate_range(user_id, day(1), day(3)).await.unwrap();
        assert_eq!(range.created, 3);
        assert_eq!(range.days.len(), 3);
        assert_eq!(range.days.last().unwrap().date, day(3));

        let single = scheduler.generate_range(user_id, day(5), day(5)).await.unwrap();
        assert_eq!(single.days.len(), 1);

        let err = scheduler.generate_range(user_id, day(3), day(1)).await.unwrap_err();
        assert!(matches!(err, ScheduleError::InvalidRange { .. }));
    }

    #[rstest]
    #[case::week(6, Some((2, 7)))]
    #[case::short(2, Some((2, 3)))]
    #[case::today_only(0, None)]
    #[tokio::test]
    async fn upcoming_covers_today_and_lookahead(
        #[case] lookahead_days: u32,
        #[case] window: Option<(u32, u32)>,
    ) {
        let store = InMemoryStore::new();
        let user_id = UserId::random();
        store
            .save_entity(routine(user_id, vec![task("Stretch", EvaluationMethod::YesNo, None)]))
            .await
            .unwrap();
        let settings = ScheduleSettings {
            lookahead_days,
            ..ScheduleSettings::default()
        };
        let scheduler = scheduler_with(&store, FixedClock::new(start()), settings);

        let upcoming = scheduler.generate_upcoming(user_id, day(1)).await.unwrap();

        assert_eq!(upcoming.today.created, 1);
        let got = upcoming.week.as_ref().map(|w| (w.start_date, w.end_date));
        assert_eq!(got, window.map(|(s, e)| (day(s), day(e))));
        assert_eq!(store.occurrence_count().await, 1 + lookahead_days as usize);
    }

    #[tokio::test]
    async fn all_users_batch_aggregates() {
        let store = InMemoryStore::new();
        let alice = UserId::random();
        let bob = UserId::random();
        seed_mixed_user(&store, alice).await;
        store
            .save_entity(routine(bob, vec![task("Stretch", EvaluationMethod::YesNo, None)]))
            .await
            .unwrap();

        let batch = scheduler(&store).run_for_all_users(day(2)).await.unwrap();

        assert_eq!(batch.users.len(), 2);
        assert_eq!((batch.created, batch.skipped, batch.failed), (2, 1, 1));
        assert!(batch.user_failures.is_empty());
    }

    #[tokio::test]
    async fn standalone_tasks_generate_alongside_routines() {
        let store = InMemoryStore::new();
        let user_id = UserId::random();
        let area = store
            .save_area(Area::new(AreaId::random(), user_id, "Health"))
            .await
            .unwrap();
        store
            .save_entity(routine(user_id, vec![task("Stretch", EvaluationMethod::YesNo, None)]))
            .await
            .unwrap();
        let water = TaskItem {
            id: "water".to_string(),
            name: "Drink water".to_string(),
            evaluation_method: EvaluationMethod::Numeric,
            target_value: Some(8.0),
            execution_time: None,
            duration: None,
        };
        let standalone =
            RecurringEntity::standalone(EntityId::random(), Parent::Area(area.id), water, start())
                .with_bounds(Some(start()), None);
        store.save_entity(standalone.clone()).await.unwrap();
        let scheduler = scheduler(&store);

        let range = scheduler.generate_range(user_id, day(1), day(3)).await.unwrap();
        assert_eq!((range.created, range.skipped, range.failed), (6, 0, 0));

        let again = scheduler.run_for_user(user_id, day(2)).await.unwrap();
        assert_eq!((again.created, again.skipped, again.failed), (0, 2, 0));

        let occurrence = store.find_occurrence(standalone.id, day(3)).await.unwrap().unwrap();
        assert_eq!(occurrence.iteration_position, 0);
        let items = store.list_items(occurrence.id).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].target_value, Some(8.0));
    }

    fn settings_at(hour: u32, offset_minutes: i32) -> ScheduleSettings {
        ScheduleSettings {
            trigger_time: NaiveTime::from_hms_opt(hour, 0, 0).unwrap(),
            offset: FixedOffset::east_opt(offset_minutes * 60).unwrap(),
            lookahead_days: 6,
        }
    }

    #[rstest]
    #[case::before_trigger(0, (1, 17, 59), (1, 18))]
    #[case::at_trigger(0, (1, 18, 0), (2, 18))]
    #[case::after_trigger(0, (1, 23, 0), (2, 18))]
    // 18:00 JST is 09:00 UTC
    #[case::east_offset_before(540, (1, 8, 0), (1, 9))]
    #[case::east_offset_after(540, (1, 9, 30), (2, 9))]
    // 18:00 at UTC-5 is 23:00 UTC; 23:30Z is 18:30 local on the 1st
    #[case::west_offset_after(-300, (1, 23, 30), (2, 23))]
    // 02:00Z on the 2nd is still 21:00 local on the 1st
    #[case::west_offset_previous_local_day(-300, (2, 2, 0), (2, 23))]
    fn next_run_is_the_next_local_trigger(
        #[case] offset_minutes: i32,
        #[case] now: (u32, u32, u32),
        #[case] expected: (u32, u32),
    ) {
        let store = InMemoryStore::new();
        let scheduler =
            scheduler_with(&store, FixedClock::new(start()), settings_at(18, offset_minutes));
        let now = Utc.with_ymd_and_hms(2024, 1, now.0, now.1, now.2, 0).unwrap();

        let next = scheduler.next_run_after(now);

        assert_eq!(next, Utc.with_ymd_and_hms(2024, 1, expected.0, expected.1, 0, 0).unwrap());
        assert!(next > now);
    }

    #[test]
    fn local_date_follows_offset() {
        let store = InMemoryStore::new();
        let scheduler = scheduler_with(&store, FixedClock::new(start()), settings_at(18, 540));

        let late_utc = Utc.with_ymd_and_hms(2024, 1, 1, 20, 0, 0).unwrap();
        assert_eq!(scheduler.local_date(late_utc), day(2));
    }

    #[derive(Default)]
    struct RecordingTrigger {
        armed: Mutex<Vec<DateTime<Utc>>>,
    }

    #[async_trait]
    impl RunTrigger for RecordingTrigger {
        async fn arm(&self, at: DateTime<Utc>) -> Result<(), TriggerError> {
            self.armed.lock().unwrap().push(at);
            Ok(())
        }
    }

    struct ClosedTrigger;

    #[async_trait]
    impl RunTrigger for ClosedTrigger {
        async fn arm(&self, _at: DateTime<Utc>) -> Result<(), TriggerError> {
            Err(TriggerError::Closed)
        }
    }

    #[tokio::test]
    async fn schedule_next_run_arms_the_trigger() {
        let store = InMemoryStore::new();
        let clock = FixedClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap());
        let scheduler = scheduler_with(&store, clock, ScheduleSettings::default());
        let trigger = RecordingTrigger::default();

        let at = scheduler.schedule_next_run(&trigger).await.unwrap();

        assert_eq!(at, Utc.with_ymd_and_hms(2024, 1, 1, 18, 0, 0).unwrap());
        assert_eq!(*trigger.armed.lock().unwrap(), vec![at]);

        let err = scheduler.schedule_next_run(&ClosedTrigger).await.unwrap_err();
        assert!(matches!(err, ScheduleError::Trigger(TriggerError::Closed)));
    }
}
