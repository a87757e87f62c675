//! AppBuilder - アプリケーションの構築とワイヤリング
//!
//! # 方針
//! - Builder パターンで ports の実装を差し込む
//! - 起動時検証（Fail-fast 設計）: 設定値の不正は build() で弾く
//! - clock / id 生成はデフォルト（SystemClock / UlidGenerator）を持つ

use std::sync::Arc;

use crate::app::daily_loop::DailyGenerationLoop;
use crate::app::generator::InstanceGenerator;
use crate::app::scheduler::{BatchScheduler, ScheduleSettings};
use crate::app::tracking::OccurrenceTracker;
use crate::config::QuestifyConfig;
use crate::ports::{CatalogStore, Clock, IdGenerator, OccurrenceStore, SystemClock, UlidGenerator};

/// AppBuilder はアプリケーションを構築
///
/// # 使用例
/// ```ignore
/// let app = AppBuilder::new()
///     .config(config)
///     .store(InMemoryStore::new())
///     .build()?;
/// ```
///
/// # Fail-fast 設計
/// - ストア未設定は BuildError::MissingStore
/// - trigger 時刻・UTC オフセットが範囲外なら BuildError を返す
pub struct AppBuilder {
    config: QuestifyConfig,
    catalog: Option<Arc<dyn CatalogStore>>,
    occurrences: Option<Arc<dyn OccurrenceStore>>,
    clock: Option<Arc<dyn Clock>>,
    ids: Option<Arc<dyn IdGenerator>>,
}

/// BuildError はアプリケーション構築時のエラー
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum BuildError {
    #[error("no {0} store configured")]
    MissingStore(&'static str),

    #[error("trigger time {hour:02}:{minute:02} is not a valid time of day")]
    InvalidTriggerTime { hour: u32, minute: u32 },

    #[error("UTC offset of {0} minutes is out of range")]
    InvalidUtcOffset(i32),
}

impl AppBuilder {
    pub fn new() -> Self {
        Self {
            config: QuestifyConfig::default(),
            catalog: None,
            occurrences: None,
            clock: None,
            ids: None,
        }
    }

    pub fn config(mut self, config: QuestifyConfig) -> Self {
        self.config = config;
        self
    }

    /// One backend serving both store ports.
    pub fn store<S>(mut self, store: S) -> Self
    where
        S: CatalogStore + OccurrenceStore + 'static,
    {
        let store = Arc::new(store);
        self.catalog = Some(store.clone());
        self.occurrences = Some(store);
        self
    }

    pub fn catalog(mut self, catalog: Arc<dyn CatalogStore>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn occurrences(mut self, occurrences: Arc<dyn OccurrenceStore>) -> Self {
        self.occurrences = Some(occurrences);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    /// 検証してから App を組み立てる
    pub fn build(self) -> Result<App, BuildError> {
        let scheduler_config = &self.config.scheduler;
        let trigger_time =
            scheduler_config
                .trigger_time()
                .ok_or(BuildError::InvalidTriggerTime {
                    hour: scheduler_config.trigger_hour,
                    minute: scheduler_config.trigger_minute,
                })?;
        let offset = scheduler_config
            .utc_offset()
            .ok_or(BuildError::InvalidUtcOffset(scheduler_config.utc_offset_minutes))?;
        let settings = ScheduleSettings {
            trigger_time,
            offset,
            lookahead_days: scheduler_config.lookahead_days,
        };

        let catalog = self.catalog.ok_or(BuildError::MissingStore("catalog"))?;
        let occurrences = self
            .occurrences
            .ok_or(BuildError::MissingStore("occurrence"))?;
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let ids = self
            .ids
            .unwrap_or_else(|| Arc::new(UlidGenerator::new(Arc::clone(&clock))));

        let generator = Arc::new(InstanceGenerator::new(
            Arc::clone(&catalog),
            Arc::clone(&occurrences),
            ids,
            Arc::clone(&clock),
        ));
        let scheduler = Arc::new(BatchScheduler::new(
            Arc::clone(&catalog),
            Arc::clone(&generator),
            Arc::clone(&clock),
            settings,
        ));
        let tracker = Arc::new(OccurrenceTracker::new(
            catalog,
            occurrences,
            Arc::clone(&clock),
        ));

        Ok(App {
            config: self.config,
            clock,
            generator,
            scheduler,
            tracker,
        })
    }
}

impl Default for AppBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// App は組み立て済みのコンポーネント一式
pub struct App {
    pub config: QuestifyConfig,
    pub clock: Arc<dyn Clock>,
    pub generator: Arc<InstanceGenerator>,
    pub scheduler: Arc<BatchScheduler>,
    pub tracker: Arc<OccurrenceTracker>,
}

impl App {
    /// Start the process-owned daily run.
    pub fn spawn_daily_loop(&self) -> DailyGenerationLoop {
        DailyGenerationLoop::spawn(Arc::clone(&self.scheduler), Arc::clone(&self.clock))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SchedulerConfig;
    use crate::impls::InMemoryStore;
    use crate::ports::FixedClock;
    use chrono::{FixedOffset, NaiveTime, TimeZone, Utc};
    use rstest::rstest;

    fn config_with(scheduler: SchedulerConfig) -> QuestifyConfig {
        QuestifyConfig {
            scheduler,
            ..QuestifyConfig::default()
        }
    }

    #[test]
    fn test_build_with_defaults() {
        let app = AppBuilder::new().store(InMemoryStore::new()).build().unwrap();

        let settings = app.scheduler.settings();
        assert_eq!(settings.trigger_time, NaiveTime::from_hms_opt(18, 0, 0).unwrap());
        assert_eq!(settings.offset, FixedOffset::east_opt(0).unwrap());
        assert_eq!(settings.lookahead_days, 6);
    }

    #[test]
    fn test_build_applies_config() {
        let app = AppBuilder::new()
            .config(config_with(SchedulerConfig {
                trigger_hour: 6,
                trigger_minute: 30,
                utc_offset_minutes: -300,
                lookahead_days: 2,
            }))
            .store(InMemoryStore::new())
            .build()
            .unwrap();

        let settings = app.scheduler.settings();
        assert_eq!(settings.trigger_time, NaiveTime::from_hms_opt(6, 30, 0).unwrap());
        assert_eq!(settings.offset, FixedOffset::west_opt(5 * 3600).unwrap());
        assert_eq!(settings.lookahead_days, 2);
    }

    #[test]
    fn test_build_missing_store() {
        let result = AppBuilder::new().build();
        assert!(matches!(result, Err(BuildError::MissingStore("catalog"))));

        let result = AppBuilder::new()
            .catalog(Arc::new(InMemoryStore::new()))
            .build();
        assert!(matches!(result, Err(BuildError::MissingStore("occurrence"))));
    }

    #[rstest]
    #[case::hour(24, 0, 0, BuildError::InvalidTriggerTime { hour: 24, minute: 0 })]
    #[case::minute(18, 60, 0, BuildError::InvalidTriggerTime { hour: 18, minute: 60 })]
    #[case::offset(18, 0, 24 * 60, BuildError::InvalidUtcOffset(24 * 60))]
    fn test_build_rejects_invalid_schedule(
        #[case] trigger_hour: u32,
        #[case] trigger_minute: u32,
        #[case] utc_offset_minutes: i32,
        #[case] expected: BuildError,
    ) {
        let result = AppBuilder::new()
            .config(config_with(SchedulerConfig {
                trigger_hour,
                trigger_minute,
                utc_offset_minutes,
                lookahead_days: 6,
            }))
            .store(InMemoryStore::new())
            .build();

        assert_eq!(result.err(), Some(expected));
    }

    #[tokio::test]
    async fn test_built_app_uses_injected_clock() {
        let clock = FixedClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap());
        let app = AppBuilder::new()
            .store(InMemoryStore::new())
            .clock(Arc::new(clock.clone()))
            .build()
            .unwrap();

        assert_eq!(
            app.scheduler.next_run_after(app.clock.now()),
            Utc.with_ymd_and_hms(2024, 1, 1, 18, 0, 0).unwrap()
        );

        let daily = app.spawn_daily_loop();
        let trigger = daily.trigger();
        let at = app.scheduler.schedule_next_run(&trigger).await.unwrap();
        assert_eq!(at, Utc.with_ymd_and_hms(2024, 1, 1, 18, 0, 0).unwrap());
        daily.shutdown_and_join().await;
    }
}
