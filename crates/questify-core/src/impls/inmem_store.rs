//! InMemoryStore - 開発用・テスト用のストア
//!
//! CatalogStore と OccurrenceStore の両方を 1 つの状態で実装します。
//!
//! # 実装詳細
//! - 状態全体を `tokio::sync::Mutex` で保護（ロックを跨いで await しない）
//! - `by_entity_date` が (entity_id, due_date) の一意インデックス
//! - トランザクションは書き込みをバッファし、commit 時にロックを取って
//!   一意制約を再検査してからまとめて適用する

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::Mutex;

use crate::domain::{
    Area, AreaId, EntityId, ItemId, Occurrence, OccurrenceId, OccurrenceItem, Parent, Project,
    ProjectId, RecurringEntity, StoreError, TaskDefId, TaskDefinition, UserId,
};
use crate::ports::{CatalogStore, OccurrenceStore, OccurrenceTx};

#[derive(Debug, Clone)]
struct StoredItem {
    /// Insertion order; listing returns items in the order they were saved.
    seq: u64,
    item: OccurrenceItem,
}

#[derive(Default)]
struct InMemoryStoreState {
    areas: HashMap<AreaId, Area>,
    projects: HashMap<ProjectId, Project>,
    entities: HashMap<EntityId, RecurringEntity>,
    definitions: HashMap<TaskDefId, TaskDefinition>,

    occurrences: HashMap<OccurrenceId, Occurrence>,
    /// Unique index on (entity_id, due_date).
    by_entity_date: BTreeMap<(EntityId, NaiveDate), OccurrenceId>,
    items: HashMap<ItemId, StoredItem>,
    next_item_seq: u64,

    /// Number of upcoming commits that fail with a backend error.
    fail_commits: usize,
}

impl InMemoryStoreState {
    /// Owner of an entity: the direct user, else whoever owns its area.
    fn resolve_owner(&self, entity: &RecurringEntity) -> Option<UserId> {
        entity.user_id.or_else(|| self.resolve_parent(entity.parent))
    }

    fn resolve_parent(&self, parent: Parent) -> Option<UserId> {
        let area_id = match parent {
            Parent::Area(area_id) => area_id,
            Parent::Project(project_id) => self.projects.get(&project_id)?.area_id,
            Parent::None => return None,
        };
        self.areas.get(&area_id).map(|area| area.user_id)
    }

    fn entities_for_user(&self, user_id: UserId) -> Vec<RecurringEntity> {
        let mut entities: Vec<RecurringEntity> = self
            .entities
            .values()
            .filter(|entity| self.resolve_owner(entity) == Some(user_id))
            .cloned()
            .collect();
        entities.sort_by_key(|entity| (entity.created_at, entity.id));
        entities
    }

    /// Would inserting `occurrence` break the unique index?
    fn conflicts(&self, occurrence: &Occurrence) -> bool {
        self.by_entity_date
            .get(&(occurrence.entity_id, occurrence.due_date))
            .is_some_and(|existing| *existing != occurrence.id)
    }

    fn put_occurrence(&mut self, occurrence: Occurrence) {
        if let Some(previous) = self.occurrences.get(&occurrence.id) {
            // due_date / entity may have moved
            self.by_entity_date
                .remove(&(previous.entity_id, previous.due_date));
        }
        self.by_entity_date
            .insert((occurrence.entity_id, occurrence.due_date), occurrence.id);
        self.occurrences.insert(occurrence.id, occurrence);
    }

    fn put_item(&mut self, item: OccurrenceItem) {
        let seq = match self.items.get(&item.id) {
            Some(stored) => stored.seq,
            None => {
                self.next_item_seq += 1;
                self.next_item_seq
            }
        };
        self.items.insert(item.id, StoredItem { seq, item });
    }

    fn items_of(&self, occurrence_id: OccurrenceId) -> Vec<OccurrenceItem> {
        let mut stored: Vec<&StoredItem> = self
            .items
            .values()
            .filter(|s| s.item.occurrence_id == occurrence_id)
            .collect();
        stored.sort_by_key(|s| s.seq);
        stored.into_iter().map(|s| s.item.clone()).collect()
    }

    fn remove_items_where(&mut self, predicate: impl Fn(&OccurrenceItem) -> bool) -> usize {
        let before = self.items.len();
        self.items.retain(|_, stored| !predicate(&stored.item));
        before - self.items.len()
    }

    fn remove_occurrence(&mut self, id: OccurrenceId) -> Option<usize> {
        let occurrence = self.occurrences.remove(&id)?;
        self.by_entity_date
            .remove(&(occurrence.entity_id, occurrence.due_date));
        Some(self.remove_items_where(|item| item.occurrence_id == id))
    }
}

/// In-memory implementation of every store port.
///
/// Clones share the same state.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<InMemoryStoreState>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` commits fail with `StoreError::Backend`.
    #[cfg(test)]
    pub(crate) async fn fail_next_commits(&self, n: usize) {
        self.state.lock().await.fail_commits = n;
    }

    /// Number of stored occurrences (for testing)
    #[cfg(test)]
    pub(crate) async fn occurrence_count(&self) -> usize {
        self.state.lock().await.occurrences.len()
    }

    /// Number of stored items (for testing)
    #[cfg(test)]
    pub(crate) async fn item_count(&self) -> usize {
        self.state.lock().await.items.len()
    }
}

#[async_trait]
impl CatalogStore for InMemoryStore {
    async fn find_entity(&self, id: EntityId) -> Result<Option<RecurringEntity>, StoreError> {
        Ok(self.state.lock().await.entities.get(&id).cloned())
    }

    async fn list_recurring_entities_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<RecurringEntity>, StoreError> {
        let state = self.state.lock().await;
        let mut entities = state.entities_for_user(user_id);
        entities.retain(|entity| entity.is_recurring);
        Ok(entities)
    }

    async fn list_entities_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<RecurringEntity>, StoreError> {
        Ok(self.state.lock().await.entities_for_user(user_id))
    }

    async fn find_task_definition(
        &self,
        id: TaskDefId,
    ) -> Result<Option<TaskDefinition>, StoreError> {
        Ok(self.state.lock().await.definitions.get(&id).cloned())
    }

    async fn list_users(&self) -> Result<Vec<UserId>, StoreError> {
        let state = self.state.lock().await;
        let users: BTreeSet<UserId> = state
            .areas
            .values()
            .map(|area| area.user_id)
            .chain(state.entities.values().filter_map(|entity| entity.user_id))
            .collect();
        Ok(users.into_iter().collect())
    }

    async fn save_area(&self, area: Area) -> Result<Area, StoreError> {
        self.state.lock().await.areas.insert(area.id, area.clone());
        Ok(area)
    }

    async fn save_project(&self, project: Project) -> Result<Project, StoreError> {
        let mut state = self.state.lock().await;
        if !state.areas.contains_key(&project.area_id) {
            return Err(StoreError::NotFound(project.area_id.to_string()));
        }
        state.projects.insert(project.id, project.clone());
        Ok(project)
    }

    async fn save_entity(&self, entity: RecurringEntity) -> Result<RecurringEntity, StoreError> {
        entity
            .validate()
            .map_err(|e| StoreError::Invalid(e.to_string()))?;
        self.state
            .lock()
            .await
            .entities
            .insert(entity.id, entity.clone());
        Ok(entity)
    }

    async fn save_task_definition(
        &self,
        definition: TaskDefinition,
    ) -> Result<TaskDefinition, StoreError> {
        self.state
            .lock()
            .await
            .definitions
            .insert(definition.id, definition.clone());
        Ok(definition)
    }

    async fn delete_entity(&self, id: EntityId) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        if state.entities.remove(&id).is_none() {
            return Err(StoreError::NotFound(id.to_string()));
        }
        let owned: Vec<OccurrenceId> = state
            .by_entity_date
            .range((id, NaiveDate::MIN)..=(id, NaiveDate::MAX))
            .map(|(_, occurrence_id)| *occurrence_id)
            .collect();
        for occurrence_id in owned {
            state.remove_occurrence(occurrence_id);
        }
        Ok(())
    }
}

#[async_trait]
impl OccurrenceStore for InMemoryStore {
    async fn find_occurrence(
        &self,
        entity_id: EntityId,
        due_date: NaiveDate,
    ) -> Result<Option<Occurrence>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .by_entity_date
            .get(&(entity_id, due_date))
            .and_then(|id| state.occurrences.get(id))
            .cloned())
    }

    async fn find_latest_occurrence_before(
        &self,
        entity_id: EntityId,
        before: NaiveDate,
    ) -> Result<Option<Occurrence>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .by_entity_date
            .range((entity_id, NaiveDate::MIN)..(entity_id, before))
            .next_back()
            .and_then(|(_, id)| state.occurrences.get(id))
            .cloned())
    }

    async fn count_items(&self, occurrence_id: OccurrenceId) -> Result<usize, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .items
            .values()
            .filter(|s| s.item.occurrence_id == occurrence_id)
            .count())
    }

    async fn list_items(
        &self,
        occurrence_id: OccurrenceId,
    ) -> Result<Vec<OccurrenceItem>, StoreError> {
        Ok(self.state.lock().await.items_of(occurrence_id))
    }

    async fn list_occurrences(
        &self,
        entity_ids: &[EntityId],
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Occurrence>, StoreError> {
        if start > end {
            return Ok(Vec::new());
        }
        let state = self.state.lock().await;
        let wanted: HashSet<EntityId> = entity_ids.iter().copied().collect();
        let mut occurrences: Vec<Occurrence> = wanted
            .iter()
            .flat_map(|entity_id| {
                state
                    .by_entity_date
                    .range((*entity_id, start)..=(*entity_id, end))
            })
            .filter_map(|(_, id)| state.occurrences.get(id).cloned())
            .collect();
        occurrences.sort_by_key(|o| (o.due_date, o.created_at, o.id));
        Ok(occurrences)
    }

    async fn find_item(&self, id: ItemId) -> Result<Option<OccurrenceItem>, StoreError> {
        Ok(self
            .state
            .lock()
            .await
            .items
            .get(&id)
            .map(|s| s.item.clone()))
    }

    async fn update_item(&self, item: OccurrenceItem) -> Result<OccurrenceItem, StoreError> {
        let mut state = self.state.lock().await;
        if !state.items.contains_key(&item.id) {
            return Err(StoreError::NotFound(item.id.to_string()));
        }
        state.put_item(item.clone());
        Ok(item)
    }

    async fn delete_occurrence(&self, id: OccurrenceId) -> Result<usize, StoreError> {
        self.state
            .lock()
            .await
            .remove_occurrence(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn delete_pending_items(&self, occurrence_id: OccurrenceId) -> Result<usize, StoreError> {
        Ok(self
            .state
            .lock()
            .await
            .remove_items_where(|item| item.occurrence_id == occurrence_id && item.is_pending()))
    }

    async fn begin(&self) -> Result<Box<dyn OccurrenceTx>, StoreError> {
        Ok(Box::new(InMemoryTx {
            state: Arc::clone(&self.state),
            ops: Vec::new(),
            staged: HashMap::new(),
        }))
    }
}

enum TxOp {
    SaveOccurrence(Occurrence),
    DeleteItems {
        occurrence_id: OccurrenceId,
        due_date: NaiveDate,
    },
    SaveItems(Vec<OccurrenceItem>),
}

/// Transaction implementation for InMemoryStore.
struct InMemoryTx {
    state: Arc<Mutex<InMemoryStoreState>>,
    ops: Vec<TxOp>,
    /// Occurrences saved in this transaction, keyed like the unique index.
    staged: HashMap<(EntityId, NaiveDate), OccurrenceId>,
}

fn unique_violation(occurrence: &Occurrence) -> StoreError {
    StoreError::UniqueViolation {
        entity_id: occurrence.entity_id,
        due_date: occurrence.due_date,
    }
}

#[async_trait]
impl OccurrenceTx for InMemoryTx {
    async fn save_occurrence(&mut self, occurrence: Occurrence) -> Result<Occurrence, StoreError> {
        let key = (occurrence.entity_id, occurrence.due_date);
        if self.staged.get(&key).is_some_and(|id| *id != occurrence.id) {
            return Err(unique_violation(&occurrence));
        }
        if self.state.lock().await.conflicts(&occurrence) {
            return Err(unique_violation(&occurrence));
        }
        self.staged.insert(key, occurrence.id);
        self.ops.push(TxOp::SaveOccurrence(occurrence.clone()));
        Ok(occurrence)
    }

    async fn delete_items(
        &mut self,
        occurrence_id: OccurrenceId,
        due_date: NaiveDate,
    ) -> Result<(), StoreError> {
        self.ops.push(TxOp::DeleteItems {
            occurrence_id,
            due_date,
        });
        Ok(())
    }

    async fn save_items(&mut self, items: Vec<OccurrenceItem>) -> Result<(), StoreError> {
        {
            let state = self.state.lock().await;
            let staged: HashSet<OccurrenceId> = self.staged.values().copied().collect();
            if let Some(orphan) = items.iter().find(|item| {
                !staged.contains(&item.occurrence_id)
                    && !state.occurrences.contains_key(&item.occurrence_id)
            }) {
                return Err(StoreError::NotFound(orphan.occurrence_id.to_string()));
            }
        }
        self.ops.push(TxOp::SaveItems(items));
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let InMemoryTx { state, ops, staged } = *self;
        let mut state = state.lock().await;

        if state.fail_commits > 0 {
            state.fail_commits -= 1;
            return Err(StoreError::Backend("injected commit failure".to_string()));
        }

        // other writers may have committed the same key, or deleted an
        // item's occurrence, since the op was staged
        let staged: HashSet<OccurrenceId> = staged.into_values().collect();
        for op in &ops {
            match op {
                TxOp::SaveOccurrence(occurrence) if state.conflicts(occurrence) => {
                    return Err(unique_violation(occurrence));
                }
                TxOp::SaveItems(items) => {
                    if let Some(orphan) = items.iter().find(|item| {
                        !staged.contains(&item.occurrence_id)
                            && !state.occurrences.contains_key(&item.occurrence_id)
                    }) {
                        return Err(StoreError::NotFound(orphan.occurrence_id.to_string()));
                    }
                }
                _ => {}
            }
        }

        for op in ops {
            match op {
                TxOp::SaveOccurrence(occurrence) => state.put_occurrence(occurrence),
                TxOp::DeleteItems {
                    occurrence_id,
                    due_date,
                } => {
                    state.remove_items_where(|item| {
                        item.occurrence_id == occurrence_id && item.due_date == due_date
                    });
                }
                TxOp::SaveItems(items) => {
                    for item in items {
                        state.put_item(item);
                    }
                }
            }
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) {
        tracing::debug!(ops = self.ops.len(), "rolling back in-memory transaction");
    }
}
