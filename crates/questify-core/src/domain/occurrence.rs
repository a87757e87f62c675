//! Occurrence records: one dated materialization of an entity, plus the
//! items generated for the iteration it exposes.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::catalog::TaskDefinition;
use super::ids::{EntityId, ItemId, OccurrenceId, TaskDefId};
use super::queue::{EvaluationMethod, SubTaskRef, TaskItem, hhmm};

/// One dated occurrence. Unique per `(entity_id, due_date)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Occurrence {
    pub id: OccurrenceId,
    pub entity_id: EntityId,
    /// Position of the queue iteration this occurrence exposes.
    pub iteration_position: u32,
    pub due_date: NaiveDate,
    pub created_at: DateTime<Utc>,
}

impl Occurrence {
    pub fn new(
        id: OccurrenceId,
        entity_id: EntityId,
        iteration_position: u32,
        due_date: NaiveDate,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            entity_id,
            iteration_position,
            due_date,
            created_at,
        }
    }
}

/// Item state.
///
/// State transitions:
/// - Pending -> Completed (progress reaches 100 or explicit completion)
/// - Completed -> Pending (explicit reopen)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    #[default]
    Pending,
    Completed,
}

/// Percentage in `0..=100`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u8")]
pub struct Progress(u8);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("progress must be within 0..=100, got {0}")]
pub struct ProgressOutOfRange(pub i64);

impl Progress {
    pub const ZERO: Progress = Progress(0);
    pub const DONE: Progress = Progress(100);

    pub fn new(value: i64) -> Result<Self, ProgressOutOfRange> {
        Self::try_from(value)
    }

    pub fn value(self) -> u8 {
        self.0
    }

    pub fn is_done(self) -> bool {
        self.0 >= 100
    }
}

impl TryFrom<i64> for Progress {
    type Error = ProgressOutOfRange;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        u8::try_from(value)
            .ok()
            .filter(|v| *v <= 100)
            .map(Progress)
            .ok_or(ProgressOutOfRange(value))
    }
}

impl From<Progress> for u8 {
    fn from(p: Progress) -> Self {
        p.0
    }
}

/// Where an item's task data came from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum ItemSource {
    /// A `TASK` entry embedded in a routine queue (client-assigned id).
    Embedded(String),
    /// A stored `TaskDefinition` referenced by a `SUB_TASK` entry.
    Definition(TaskDefId),
}

/// A generated, trackable task for one occurrence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OccurrenceItem {
    pub id: ItemId,
    pub occurrence_id: OccurrenceId,
    pub source: ItemSource,
    pub name: String,
    pub evaluation_method: EvaluationMethod,
    pub target_value: Option<f64>,
    #[serde(with = "hhmm")]
    pub execution_time: Option<NaiveTime>,
    /// Minutes.
    pub duration: Option<u32>,
    pub status: ItemStatus,
    pub progress: Progress,
    pub due_date: NaiveDate,
    pub completion_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl OccurrenceItem {
    /// Pending item copied from an embedded `TASK` entry.
    pub fn from_task(
        id: ItemId,
        occurrence: &Occurrence,
        task: &TaskItem,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            occurrence_id: occurrence.id,
            source: ItemSource::Embedded(task.id.clone()),
            name: task.name.clone(),
            evaluation_method: task.evaluation_method,
            target_value: task.target_value,
            execution_time: task.execution_time,
            duration: task.duration,
            status: ItemStatus::Pending,
            progress: Progress::ZERO,
            due_date: occurrence.due_date,
            completion_date: None,
            created_at,
        }
    }

    /// Pending item copied from a stored definition. The queue entry's
    /// execution time overrides the definition's.
    pub fn from_definition(
        id: ItemId,
        occurrence: &Occurrence,
        reference: &SubTaskRef,
        definition: &TaskDefinition,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            occurrence_id: occurrence.id,
            source: ItemSource::Definition(definition.id),
            name: definition.name.clone(),
            evaluation_method: definition.evaluation_method,
            target_value: definition.target_value,
            execution_time: reference.execution_time.or(definition.execution_time),
            duration: definition.duration,
            status: ItemStatus::Pending,
            progress: Progress::ZERO,
            due_date: occurrence.due_date,
            completion_date: None,
            created_at,
        }
    }

    /// Record progress; reaching 100 completes the item.
    pub fn record_progress(&mut self, progress: Progress, now: DateTime<Utc>) {
        self.progress = progress;
        if progress.is_done() {
            self.mark_completed(now);
        }
    }

    pub fn mark_completed(&mut self, now: DateTime<Utc>) {
        self.status = ItemStatus::Completed;
        if self.completion_date.is_none() {
            self.completion_date = Some(now);
        }
    }

    pub fn reopen(&mut self) {
        self.status = ItemStatus::Pending;
        self.completion_date = None;
    }

    pub fn is_pending(&self) -> bool {
        self.status == ItemStatus::Pending
    }
}
