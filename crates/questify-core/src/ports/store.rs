//! Store ports - 永続化の抽象化
//!
//! - CatalogStore: エンティティ・area・project・サブタスク定義（CRUD 層が書き込む）
//! - OccurrenceStore: 生成された occurrence / item（生成器と進捗更新が書き込む）
//!
//! # 設計原則
//! - (entity_id, due_date) の一意制約はストアが保証する（`StoreError::UniqueViolation`）
//! - 生成器の書き込みは `OccurrenceTx` 1 本にまとめ、commit されるまで見えない
//! - キャッシュしない。位置計算のたびに直前の occurrence を問い合わせる

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::domain::{
    Area, EntityId, ItemId, Occurrence, OccurrenceId, OccurrenceItem, Project, RecurringEntity,
    StoreError, TaskDefId, TaskDefinition, UserId,
};

#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn find_entity(&self, id: EntityId) -> Result<Option<RecurringEntity>, StoreError>;

    /// Recurring entities whose owner resolves to `user_id`, directly or
    /// through their area / project.
    async fn list_recurring_entities_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<RecurringEntity>, StoreError>;

    /// Every entity owned by `user_id`, recurring or not.
    async fn list_entities_for_user(&self, user_id: UserId)
    -> Result<Vec<RecurringEntity>, StoreError>;

    async fn find_task_definition(&self, id: TaskDefId)
    -> Result<Option<TaskDefinition>, StoreError>;

    /// Users that own at least one area or entity.
    async fn list_users(&self) -> Result<Vec<UserId>, StoreError>;

    async fn save_area(&self, area: Area) -> Result<Area, StoreError>;

    async fn save_project(&self, project: Project) -> Result<Project, StoreError>;

    /// Upsert. Rejects entities that violate their invariants.
    async fn save_entity(&self, entity: RecurringEntity) -> Result<RecurringEntity, StoreError>;

    async fn save_task_definition(
        &self,
        definition: TaskDefinition,
    ) -> Result<TaskDefinition, StoreError>;

    /// Deletes the entity and, by cascade, its occurrences and items.
    async fn delete_entity(&self, id: EntityId) -> Result<(), StoreError>;
}

#[async_trait]
pub trait OccurrenceStore: Send + Sync {
    async fn find_occurrence(
        &self,
        entity_id: EntityId,
        due_date: NaiveDate,
    ) -> Result<Option<Occurrence>, StoreError>;

    /// Most recent occurrence with `due_date` strictly before `before`.
    async fn find_latest_occurrence_before(
        &self,
        entity_id: EntityId,
        before: NaiveDate,
    ) -> Result<Option<Occurrence>, StoreError>;

    async fn count_items(&self, occurrence_id: OccurrenceId) -> Result<usize, StoreError>;

    async fn list_items(&self, occurrence_id: OccurrenceId)
    -> Result<Vec<OccurrenceItem>, StoreError>;

    /// Occurrences of the given entities with `start <= due_date <= end`,
    /// ordered by due date.
    async fn list_occurrences(
        &self,
        entity_ids: &[EntityId],
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Occurrence>, StoreError>;

    async fn find_item(&self, id: ItemId) -> Result<Option<OccurrenceItem>, StoreError>;

    /// Overwrites an existing item (progress / status changes).
    async fn update_item(&self, item: OccurrenceItem) -> Result<OccurrenceItem, StoreError>;

    /// Deletes an occurrence and its items. Returns the number of items removed.
    async fn delete_occurrence(&self, id: OccurrenceId) -> Result<usize, StoreError>;

    /// Deletes the pending items of one occurrence. Returns how many were removed.
    async fn delete_pending_items(&self, occurrence_id: OccurrenceId) -> Result<usize, StoreError>;

    async fn begin(&self) -> Result<Box<dyn OccurrenceTx>, StoreError>;
}

/// Unit of work for one generation call.
///
/// Writes become visible only on `commit`. Dropping the transaction without
/// committing discards every buffered write.
#[async_trait]
pub trait OccurrenceTx: Send {
    /// Insert or update an occurrence. Inserting a second occurrence for the
    /// same `(entity_id, due_date)` fails with `StoreError::UniqueViolation`.
    async fn save_occurrence(&mut self, occurrence: Occurrence) -> Result<Occurrence, StoreError>;

    /// Delete the items keyed by `(occurrence_id, due_date)`.
    async fn delete_items(
        &mut self,
        occurrence_id: OccurrenceId,
        due_date: NaiveDate,
    ) -> Result<(), StoreError>;

    async fn save_items(&mut self, items: Vec<OccurrenceItem>) -> Result<(), StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>);
}
