//! Recurring entities (routines, standalone tasks and placeholder tasks) and
//! their ownership.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::ids::{AreaId, EntityId, ProjectId, UserId};
use super::queue::{Queue, QueueItem, TaskItem};

/// Recurrence frequency.
///
/// Unknown strings decode to `Unrecognized` instead of failing, and the
/// recurrence rule treats them like a missing frequency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
    #[serde(other)]
    Unrecognized,
}

/// What the queue items of an entity look like.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// Queue items embed full task data (`TASK`).
    Routine,
    /// Queue items reference stored task definitions (`SUB_TASK`).
    Placeholder,
    /// No queue. The entity's own `task` recurs unchanged at position 0.
    Standalone,
}

/// Ownership reference through the area/project hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Parent {
    Project(ProjectId),
    Area(AreaId),
    #[default]
    None,
}

/// Anything that recurs: a rotating queue, or a single standalone task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecurringEntity {
    pub id: EntityId,
    pub kind: EntityKind,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,

    /// Direct owner (routines). Takes precedence over `parent`.
    #[serde(default)]
    pub user_id: Option<UserId>,
    #[serde(default)]
    pub parent: Parent,

    pub is_recurring: bool,
    #[serde(default)]
    pub frequency: Option<Frequency>,
    #[serde(default)]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,

    #[serde(default)]
    pub queue: Queue,
    /// Task data of a standalone entity.
    #[serde(default)]
    pub task: Option<TaskItem>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EntityError {
    #[error("{0} is recurring but has no frequency")]
    MissingFrequency(EntityId),

    #[error("{0} ends before it starts")]
    InvertedBounds(EntityId),

    #[error("standalone {0} has no task")]
    MissingTask(EntityId),

    #[error("{entity} is a {kind:?} but its queue contains a {found} item")]
    ItemKindMismatch {
        entity: EntityId,
        kind: EntityKind,
        found: &'static str,
    },
}

impl RecurringEntity {
    /// Daily routine owned directly by `user_id`, empty queue.
    pub fn routine(
        id: EntityId,
        user_id: UserId,
        name: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            kind: EntityKind::Routine,
            name: name.into(),
            description: None,
            user_id: Some(user_id),
            parent: Parent::None,
            is_recurring: true,
            frequency: Some(Frequency::Daily),
            start_date: None,
            end_date: None,
            queue: Queue::default(),
            task: None,
            created_at,
        }
    }

    /// Daily placeholder task hanging under `parent`, empty queue.
    pub fn placeholder(
        id: EntityId,
        parent: Parent,
        name: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            kind: EntityKind::Placeholder,
            name: name.into(),
            description: None,
            user_id: None,
            parent,
            is_recurring: true,
            frequency: Some(Frequency::Daily),
            start_date: None,
            end_date: None,
            queue: Queue::default(),
            task: None,
            created_at,
        }
    }

    /// Daily standalone task under `parent`. Named after the task.
    pub fn standalone(
        id: EntityId,
        parent: Parent,
        task: TaskItem,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            kind: EntityKind::Standalone,
            name: task.name.clone(),
            description: None,
            user_id: None,
            parent,
            is_recurring: true,
            frequency: Some(Frequency::Daily),
            start_date: None,
            end_date: None,
            queue: Queue::default(),
            task: Some(task),
            created_at,
        }
    }

    pub fn with_frequency(mut self, frequency: Frequency) -> Self {
        self.frequency = Some(frequency);
        self
    }

    pub fn with_bounds(
        mut self,
        start_date: Option<DateTime<Utc>>,
        end_date: Option<DateTime<Utc>>,
    ) -> Self {
        self.start_date = start_date;
        self.end_date = end_date;
        self
    }

    pub fn with_queue(mut self, queue: Queue) -> Self {
        self.queue = queue;
        self
    }

    /// Invariants checked before an entity is persisted.
    pub fn validate(&self) -> Result<(), EntityError> {
        let has_frequency = !matches!(self.frequency, None | Some(Frequency::Unrecognized));
        if self.is_recurring && !has_frequency {
            return Err(EntityError::MissingFrequency(self.id));
        }
        if let (Some(start), Some(end)) = (self.start_date, self.end_date)
            && end.date_naive() < start.date_naive()
        {
            return Err(EntityError::InvertedBounds(self.id));
        }
        if self.kind == EntityKind::Standalone && self.task.is_none() {
            return Err(EntityError::MissingTask(self.id));
        }

        for iteration in &self.queue.iterations {
            for item in &iteration.items {
                let found = match (self.kind, item) {
                    (_, QueueItem::Cooldown(_)) => continue,
                    (EntityKind::Routine, QueueItem::Task(_)) => continue,
                    (EntityKind::Placeholder, QueueItem::SubTask(_)) => continue,
                    (_, QueueItem::Task(_)) => "TASK",
                    (_, QueueItem::SubTask(_)) => "SUB_TASK",
                };
                return Err(EntityError::ItemKindMismatch {
                    entity: self.id,
                    kind: self.kind,
                    found,
                });
            }
        }
        Ok(())
    }
}
