//! Position tracking for rotating queues.

use thiserror::Error;

use super::occurrence::Occurrence;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("queue has no iterations")]
pub struct EmptyQueue;

/// Next queue position for a new occurrence.
///
/// `previous` must be the latest occurrence strictly before the target date.
/// The position advances one step per created occurrence, never per elapsed
/// day, so gaps between generation dates do not skip iterations.
pub fn next_position(previous: Option<&Occurrence>, iteration_count: usize) -> Result<u32, EmptyQueue> {
    if iteration_count == 0 {
        return Err(EmptyQueue);
    }
    let Some(previous) = previous else {
        return Ok(0);
    };
    let next = (u64::from(previous.iteration_position) + 1) % iteration_count as u64;
    // next < iteration_count, and positions are stored as u32
    Ok(next as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ids::{EntityId, OccurrenceId};
    use chrono::{NaiveDate, Utc};
    use rstest::rstest;

    fn at_position(position: u32) -> Occurrence {
        Occurrence::new(
            OccurrenceId::random(),
            EntityId::random(),
            position,
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            Utc::now(),
        )
    }

    #[test]
    fn empty_queue_is_an_error() {
        assert_eq!(next_position(None, 0), Err(EmptyQueue));
        assert_eq!(next_position(Some(&at_position(2)), 0), Err(EmptyQueue));
    }

    #[test]
    fn first_occurrence_starts_at_zero() {
        assert_eq!(next_position(None, 3), Ok(0));
    }

    #[rstest]
    #[case(0, 3, 1)]
    #[case(1, 3, 2)]
    #[case(2, 3, 0)]
    #[case(0, 1, 0)]
    // queue shrank since the previous occurrence was generated
    #[case(4, 2, 1)]
    #[case(u32::MAX, 7, ((u32::MAX as u64 + 1) % 7) as u32)]
    fn advances_one_step_and_wraps(#[case] previous: u32, #[case] count: usize, #[case] expected: u32) {
        assert_eq!(next_position(Some(&at_position(previous)), count), Ok(expected));
    }
}
