//! OccurrenceTracker - 生成済み occurrence / item の参照と更新
//!
//! 生成器が作った item に対する進捗・状態の更新、期間指定の一覧、
//! 未来分の削除（繰り返し設定を変えたときのやり直し用）を扱います。

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::domain::occurrence::ProgressOutOfRange;
use crate::domain::{
    EntityId, ItemId, ItemStatus, Occurrence, OccurrenceItem, Progress, StoreError, UserId,
};
use crate::ports::{CatalogStore, Clock, OccurrenceStore};

#[derive(Debug, Error)]
pub enum TrackingError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    InvalidProgress(#[from] ProgressOutOfRange),

    #[error("store failure: {0}")]
    Store(#[from] StoreError),
}

/// An occurrence with its items and the name of the entity it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OccurrenceView {
    pub occurrence: Occurrence,
    pub entity_name: String,
    pub items: Vec<OccurrenceItem>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupStats {
    /// Occurrences due after today that were removed.
    pub future_occurrences: usize,
    /// Items that went away together with those occurrences.
    pub future_items: usize,
    /// Pending items due today that were removed.
    pub pending_items: usize,
}

pub struct OccurrenceTracker {
    catalog: Arc<dyn CatalogStore>,
    occurrences: Arc<dyn OccurrenceStore>,
    clock: Arc<dyn Clock>,
}

impl OccurrenceTracker {
    pub fn new(
        catalog: Arc<dyn CatalogStore>,
        occurrences: Arc<dyn OccurrenceStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            catalog,
            occurrences,
            clock,
        }
    }

    async fn load_item(&self, item_id: ItemId) -> Result<OccurrenceItem, TrackingError> {
        self.occurrences
            .find_item(item_id)
            .await?
            .ok_or_else(|| TrackingError::NotFound(item_id.to_string()))
    }

    /// Record progress. Reaching 100 completes the item.
    pub async fn update_progress(
        &self,
        item_id: ItemId,
        progress: i64,
    ) -> Result<OccurrenceItem, TrackingError> {
        let progress = Progress::new(progress)?;
        let mut item = self.load_item(item_id).await?;
        item.record_progress(progress, self.clock.now());
        Ok(self.occurrences.update_item(item).await?)
    }

    /// Explicit status change, optionally overwriting progress.
    pub async fn set_status(
        &self,
        item_id: ItemId,
        status: ItemStatus,
        progress: Option<i64>,
    ) -> Result<OccurrenceItem, TrackingError> {
        let progress = progress.map(Progress::new).transpose()?;
        let mut item = self.load_item(item_id).await?;
        match status {
            ItemStatus::Completed => item.mark_completed(self.clock.now()),
            ItemStatus::Pending => item.reopen(),
        }
        if let Some(progress) = progress {
            item.progress = progress;
        }
        Ok(self.occurrences.update_item(item).await?)
    }

    pub async fn occurrences_on(
        &self,
        user_id: UserId,
        date: NaiveDate,
    ) -> Result<Vec<OccurrenceView>, TrackingError> {
        self.occurrences_between(user_id, date, date).await
    }

    /// Occurrences of the user's entities in `start..=end`, by due date.
    pub async fn occurrences_between(
        &self,
        user_id: UserId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<OccurrenceView>, TrackingError> {
        let names: HashMap<EntityId, String> = self
            .catalog
            .list_entities_for_user(user_id)
            .await?
            .into_iter()
            .map(|entity| (entity.id, entity.name))
            .collect();
        let ids: Vec<EntityId> = names.keys().copied().collect();

        let mut views = Vec::new();
        for occurrence in self.occurrences.list_occurrences(&ids, start, end).await? {
            let items = self.occurrences.list_items(occurrence.id).await?;
            let entity_name = names
                .get(&occurrence.entity_id)
                .cloned()
                .unwrap_or_default();
            views.push(OccurrenceView {
                occurrence,
                entity_name,
                items,
            });
        }
        Ok(views)
    }

    /// Pending items due today or earlier.
    pub async fn due_items(
        &self,
        user_id: UserId,
        today: NaiveDate,
    ) -> Result<Vec<OccurrenceItem>, TrackingError> {
        let mut items: Vec<OccurrenceItem> = self
            .occurrences_between(user_id, NaiveDate::MIN, today)
            .await?
            .into_iter()
            .flat_map(|view| view.items)
            .filter(OccurrenceItem::is_pending)
            .collect();
        items.sort_by_key(|item| (item.due_date, item.execution_time));
        Ok(items)
    }

    /// Remove the user's occurrences after `today` and today's pending items.
    pub async fn delete_future(
        &self,
        user_id: UserId,
        today: NaiveDate,
    ) -> Result<CleanupStats, TrackingError> {
        let ids: Vec<EntityId> = self
            .catalog
            .list_entities_for_user(user_id)
            .await?
            .into_iter()
            .map(|entity| entity.id)
            .collect();
        let mut stats = CleanupStats::default();

        if let Some(tomorrow) = today.checked_add_days(Days::new(1)) {
            for occurrence in self
                .occurrences
                .list_occurrences(&ids, tomorrow, NaiveDate::MAX)
                .await?
            {
                stats.future_items += self.occurrences.delete_occurrence(occurrence.id).await?;
                stats.future_occurrences += 1;
            }
        }
        for occurrence in self.occurrences.list_occurrences(&ids, today, today).await? {
            stats.pending_items += self.occurrences.delete_pending_items(occurrence.id).await?;
        }

        info!(
            user_id = %user_id,
            today = %today,
            future_occurrences = stats.future_occurrences,
            pending_items = stats.pending_items,
            "future occurrences deleted"
        );
        Ok(stats)
    }
}
