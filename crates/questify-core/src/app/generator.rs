//! InstanceGenerator - 1 エンティティ × 1 日付の occurrence を生成する
//!
//! # 処理フロー
//! 1. 繰り返しルールで対象日か判定（外れたら NotApplicable）
//! 2. standalone はキューを持たない: position 0 の occurrence に自分の task を 1 件
//! 3. 空キューは EmptyQueue（何も書かない）
//! 4. (entity, date) の既存 occurrence を探す
//!    - あり・item あり: routine は Skipped、placeholder はキューと突き合わせて差し替え
//!    - あり・item なし: 途中で止まった生成の回復として再利用
//!    - なし: 直前の occurrence から位置を決めて新規作成
//! 5. 書き込みは 1 トランザクションにまとめる
//!
//! # 並行実行
//! ロックは取らず、ストアの一意制約に任せます。競合で負けた側は
//! 読み直して Skipped を返します。

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, info, warn};

use crate::domain::{
    EntityKind, EvaluationMethod, GenerationError, GenerationOutcome, Iteration, Occurrence,
    OccurrenceId, OccurrenceItem, QueueItem, RecurringEntity, StoreError, TaskItem, next_position,
    should_generate,
};
use crate::ports::{CatalogStore, Clock, IdGenerator, OccurrenceStore, OccurrenceTx};

/// What a single generation call writes.
enum Write {
    /// Fresh occurrence plus its items.
    Insert {
        occurrence: Occurrence,
        items: Vec<OccurrenceItem>,
    },
    /// Items for an occurrence that already exists.
    Fill { items: Vec<OccurrenceItem> },
    /// Drop the occurrence's items for the date and insert these instead.
    Replace {
        occurrence_id: OccurrenceId,
        due_date: NaiveDate,
        items: Vec<OccurrenceItem>,
    },
}

pub struct InstanceGenerator {
    catalog: Arc<dyn CatalogStore>,
    occurrences: Arc<dyn OccurrenceStore>,
    ids: Arc<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
}

impl InstanceGenerator {
    pub fn new(
        catalog: Arc<dyn CatalogStore>,
        occurrences: Arc<dyn OccurrenceStore>,
        ids: Arc<dyn IdGenerator>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            catalog,
            occurrences,
            ids,
            clock,
        }
    }

    /// Materialize `entity` for `date`.
    ///
    /// Safe to call any number of times for the same pair: once the
    /// occurrence and its items exist, later calls return `Skipped`.
    pub async fn generate(
        &self,
        entity: &RecurringEntity,
        date: NaiveDate,
    ) -> Result<GenerationOutcome, GenerationError> {
        if !should_generate(entity, date) {
            return Ok(GenerationOutcome::NotApplicable);
        }
        let result = if entity.kind == EntityKind::Standalone {
            self.generate_standalone(entity, date).await
        } else if entity.queue.is_empty() {
            return Err(GenerationError::EmptyQueue(entity.id));
        } else {
            self.generate_inner(entity, date).await
        };

        match result {
            Err(GenerationError::UniqueConstraintViolation {
                entity_id,
                due_date,
            }) => {
                // lost the insert race; the winner's occurrence should be visible now
                if self
                    .occurrences
                    .find_occurrence(entity_id, due_date)
                    .await?
                    .is_some()
                {
                    debug!(entity_id = %entity_id, date = %due_date, "occurrence created concurrently, skipping");
                    Ok(GenerationOutcome::Skipped)
                } else {
                    Err(GenerationError::UniqueConstraintViolation {
                        entity_id,
                        due_date,
                    })
                }
            }
            other => other,
        }
    }

    async fn generate_inner(
        &self,
        entity: &RecurringEntity,
        date: NaiveDate,
    ) -> Result<GenerationOutcome, GenerationError> {
        let now = self.clock.now();

        let write = match self.occurrences.find_occurrence(entity.id, date).await? {
            Some(occurrence) => {
                let existing = self.occurrences.list_items(occurrence.id).await?;
                let iteration = self.iteration_for(entity, occurrence.iteration_position)?;

                if existing.is_empty() {
                    let items = self.materialize(entity, iteration, &occurrence, now).await?;
                    if items.is_empty() {
                        debug!(entity_id = %entity.id, date = %date, "cooldown iteration already recorded");
                        return Ok(GenerationOutcome::Skipped);
                    }
                    debug!(entity_id = %entity.id, date = %date, "reusing occurrence without items");
                    Write::Fill { items }
                } else if entity.kind == EntityKind::Routine {
                    return Ok(GenerationOutcome::Skipped);
                } else {
                    let items = self.materialize(entity, iteration, &occurrence, now).await?;
                    if same_sources(&existing, &items) {
                        return Ok(GenerationOutcome::Skipped);
                    }
                    info!(
                        entity_id = %entity.id,
                        date = %date,
                        replaced = existing.len(),
                        items = items.len(),
                        "queue changed, replacing items"
                    );
                    Write::Replace {
                        occurrence_id: occurrence.id,
                        due_date: date,
                        items,
                    }
                }
            }
            None => {
                let previous = self
                    .occurrences
                    .find_latest_occurrence_before(entity.id, date)
                    .await?;
                let position = next_position(previous.as_ref(), entity.queue.len())
                    .map_err(|_| GenerationError::EmptyQueue(entity.id))?;
                let iteration = self.iteration_for(entity, position)?;
                let occurrence = Occurrence::new(
                    self.ids.generate_occurrence_id(),
                    entity.id,
                    position,
                    date,
                    now,
                );
                let items = self.materialize(entity, iteration, &occurrence, now).await?;
                Write::Insert { occurrence, items }
            }
        };

        self.persist(write).await?;
        info!(entity_id = %entity.id, date = %date, "occurrence generated");
        Ok(GenerationOutcome::Created)
    }

    /// One occurrence at position 0 holding the entity's own task.
    async fn generate_standalone(
        &self,
        entity: &RecurringEntity,
        date: NaiveDate,
    ) -> Result<GenerationOutcome, GenerationError> {
        let task = entity
            .task
            .as_ref()
            .ok_or_else(|| GenerationError::MalformedQueueItem {
                entity_id: entity.id,
                reason: "standalone entity has no task".to_string(),
            })?;
        let now = self.clock.now();

        let write = match self.occurrences.find_occurrence(entity.id, date).await? {
            Some(occurrence) => {
                if self.occurrences.count_items(occurrence.id).await? > 0 {
                    return Ok(GenerationOutcome::Skipped);
                }
                debug!(entity_id = %entity.id, date = %date, "reusing occurrence without items");
                Write::Fill {
                    items: vec![self.task_item(entity, task, &occurrence, now)?],
                }
            }
            None => {
                let occurrence = Occurrence::new(
                    self.ids.generate_occurrence_id(),
                    entity.id,
                    0,
                    date,
                    now,
                );
                let items = vec![self.task_item(entity, task, &occurrence, now)?];
                Write::Insert { occurrence, items }
            }
        };

        self.persist(write).await?;
        info!(entity_id = %entity.id, date = %date, "standalone occurrence generated");
        Ok(GenerationOutcome::Created)
    }

    fn iteration_for<'a>(
        &self,
        entity: &'a RecurringEntity,
        position: u32,
    ) -> Result<&'a Iteration, GenerationError> {
        entity
            .queue
            .iteration_at(position)
            .ok_or(GenerationError::EmptyQueue(entity.id))
    }

    /// Build pending items for the iteration. Cooldowns produce nothing.
    async fn materialize(
        &self,
        entity: &RecurringEntity,
        iteration: &Iteration,
        occurrence: &Occurrence,
        now: DateTime<Utc>,
    ) -> Result<Vec<OccurrenceItem>, GenerationError> {
        let mut items = Vec::new();
        for queue_item in iteration.actionable_items() {
            let item = match queue_item {
                QueueItem::Task(task) => self.task_item(entity, task, occurrence, now)?,
                QueueItem::SubTask(reference) => {
                    let definition = self
                        .catalog
                        .find_task_definition(reference.sub_task_id)
                        .await?
                        .ok_or_else(|| GenerationError::MalformedQueueItem {
                            entity_id: entity.id,
                            reason: format!("sub-task {} does not exist", reference.sub_task_id),
                        })?;
                    OccurrenceItem::from_definition(
                        self.ids.generate_item_id(),
                        occurrence,
                        reference,
                        &definition,
                        now,
                    )
                }
                QueueItem::Cooldown(_) => continue,
            };
            items.push(item);
        }
        Ok(items)
    }

    fn task_item(
        &self,
        entity: &RecurringEntity,
        task: &TaskItem,
        occurrence: &Occurrence,
        now: DateTime<Utc>,
    ) -> Result<OccurrenceItem, GenerationError> {
        if task.evaluation_method == EvaluationMethod::Numeric && task.target_value.is_none() {
            return Err(GenerationError::MalformedQueueItem {
                entity_id: entity.id,
                reason: format!("NUMERIC task `{}` has no target_value", task.name),
            });
        }
        Ok(OccurrenceItem::from_task(
            self.ids.generate_item_id(),
            occurrence,
            task,
            now,
        ))
    }

    async fn persist(&self, write: Write) -> Result<(), GenerationError> {
        let mut tx = self.occurrences.begin().await?;
        if let Err(err) = stage(tx.as_mut(), write).await {
            warn!(error = %err, "rolling back generation");
            tx.rollback().await;
            return Err(err.into());
        }
        tx.commit().await?;
        Ok(())
    }
}

async fn stage(tx: &mut dyn OccurrenceTx, write: Write) -> Result<(), StoreError> {
    match write {
        Write::Insert { occurrence, items } => {
            tx.save_occurrence(occurrence).await?;
            if !items.is_empty() {
                tx.save_items(items).await?;
            }
        }
        Write::Fill { items } => tx.save_items(items).await?,
        Write::Replace {
            occurrence_id,
            due_date,
            items,
        } => {
            tx.delete_items(occurrence_id, due_date).await?;
            if !items.is_empty() {
                tx.save_items(items).await?;
            }
        }
    }
    Ok(())
}

fn same_sources(existing: &[OccurrenceItem], wanted: &[OccurrenceItem]) -> bool {
    existing.len() == wanted.len()
        && existing
            .iter()
            .zip(wanted)
            .all(|(a, b)| a.source == b.source)
}
