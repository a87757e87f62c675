//! Domain model: entities, queues, occurrences, and the pure rules that
//! decide when and what to generate.

pub mod catalog;
pub mod entity;
pub mod errors;
pub mod ids;
pub mod occurrence;
pub mod outcome;
pub mod position;
pub mod queue;
pub mod recurrence;

pub use self::catalog::{Area, Project, TaskDefinition};
pub use self::entity::{EntityError, EntityKind, Frequency, Parent, RecurringEntity};
pub use self::errors::{ErrorKind, GenerationError, StoreError};
pub use self::ids::{AreaId, EntityId, ItemId, OccurrenceId, ProjectId, TaskDefId, UserId};
pub use self::occurrence::{ItemSource, ItemStatus, Occurrence, OccurrenceItem, Progress};
pub use self::outcome::{
    BatchStats, DayStats, EntityFailure, GenerationOutcome, RangeStats, UpcomingStats,
    UserDayStats, UserFailure,
};
pub use self::position::{EmptyQueue, next_position};
pub use self::queue::{
    Cooldown, EvaluationMethod, Iteration, Queue, QueueError, QueueItem, RotationType, SubTaskRef,
    TaskItem,
};
pub use self::recurrence::should_generate;
