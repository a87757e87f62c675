//! Recurrence rule: does an entity recur on a given calendar date?
//!
//! Pure predicate, no side effects. Fails closed on anything it does not
//! understand.

use chrono::{Datelike, NaiveDate};

use super::entity::{Frequency, RecurringEntity};

/// Returns `true` when `entity` should have an occurrence on `target`.
///
/// - weekly: same weekday as the reference date
/// - monthly: same day-of-month as the reference date; months that are
///   shorter than the reference day never match (no rollover to the last day)
///
/// The reference date is `start_date` when set, `created_at` otherwise.
pub fn should_generate(entity: &RecurringEntity, target: NaiveDate) -> bool {
    if !entity.is_recurring {
        return false;
    }
    let Some(frequency) = entity.frequency else {
        return false;
    };

    let start = entity.start_date.map(|d| d.date_naive());
    let end = entity.end_date.map(|d| d.date_naive());

    if start.is_some_and(|start| target < start) {
        return false;
    }
    if end.is_some_and(|end| target > end) {
        return false;
    }

    let reference = start.unwrap_or_else(|| entity.created_at.date_naive());
    match frequency {
        Frequency::Daily => true,
        Frequency::Weekly => target.weekday() == reference.weekday(),
        Frequency::Monthly => target.day() == reference.day(),
        Frequency::Unrecognized => false,
    }
}
