//! Generation outcomes and the aggregated statistics batches report.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::ids::{EntityId, UserId};

/// Result of generating one entity for one date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationOutcome {
    /// At least one write happened (new occurrence and/or items).
    Created,
    /// Already fully materialized; nothing written.
    Skipped,
    /// The recurrence rule excludes this date.
    NotApplicable,
}

/// A single entity whose generation failed during a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityFailure {
    pub entity_id: EntityId,
    pub date: NaiveDate,
    pub error: String,
}

/// Counts for one user and one date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayStats {
    pub date: NaiveDate,
    pub created: usize,
    pub skipped: usize,
    pub failed: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<EntityFailure>,
}

impl DayStats {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            created: 0,
            skipped: 0,
            failed: 0,
            failures: Vec::new(),
        }
    }

    pub fn record(&mut self, outcome: GenerationOutcome) {
        match outcome {
            GenerationOutcome::Created => self.created += 1,
            GenerationOutcome::Skipped => self.skipped += 1,
            GenerationOutcome::NotApplicable => {}
        }
    }

    pub fn record_failure(&mut self, entity_id: EntityId, error: impl ToString) {
        self.failed += 1;
        self.failures.push(EntityFailure {
            entity_id,
            date: self.date,
            error: error.to_string(),
        });
    }
}

/// Counts for one user over an inclusive date range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeStats {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub created: usize,
    pub skipped: usize,
    pub failed: usize,
    pub days: Vec<DayStats>,
}

impl RangeStats {
    pub fn new(start_date: NaiveDate, end_date: NaiveDate) -> Self {
        Self {
            start_date,
            end_date,
            created: 0,
            skipped: 0,
            failed: 0,
            days: Vec::new(),
        }
    }

    pub fn absorb(&mut self, day: DayStats) {
        self.created += day.created;
        self.skipped += day.skipped;
        self.failed += day.failed;
        self.days.push(day);
    }

    pub fn failures(&self) -> impl Iterator<Item = &EntityFailure> {
        self.days.iter().flat_map(|d| d.failures.iter())
    }
}

/// Today's counts plus the look-ahead window, as the manual trigger reports them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpcomingStats {
    pub today: DayStats,
    /// `None` when the look-ahead window is zero days.
    pub week: Option<RangeStats>,
}

/// One user's result inside an all-users batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserDayStats {
    pub user_id: UserId,
    pub stats: DayStats,
}

/// A user whose entities could not be listed; the batch moved on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserFailure {
    pub user_id: UserId,
    pub error: String,
}

/// Result of the daily run across every known user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchStats {
    pub date: NaiveDate,
    pub created: usize,
    pub skipped: usize,
    pub failed: usize,
    pub users: Vec<UserDayStats>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub user_failures: Vec<UserFailure>,
}

impl BatchStats {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            created: 0,
            skipped: 0,
            failed: 0,
            users: Vec::new(),
            user_failures: Vec::new(),
        }
    }

    pub fn absorb(&mut self, user_id: UserId, stats: DayStats) {
        self.created += stats.created;
        self.skipped += stats.skipped;
        self.failed += stats.failed;
        self.users.push(UserDayStats { user_id, stats });
    }

    pub fn record_user_failure(&mut self, user_id: UserId, error: impl ToString) {
        self.user_failures.push(UserFailure {
            user_id,
            error: error.to_string(),
        });
    }
}
