//! Errors - エラー型と分類
//!
//! 生成処理のエラーは `ErrorKind` で運用上の扱いを決めます。
//! バッチはこの分類を見て skipped / failed のどちらに数えるかを判断します。

use chrono::NaiveDate;
use thiserror::Error;

use super::ids::EntityId;

/// ErrorKind はエラーの運用分類
///
/// - Benign: 想定内（空キュー、並行実行の一意制約競合）。skipped として数える
/// - Permanent: データ不正（壊れたキュー項目）。直すまで同じ結果になる
/// - Infrastructure: 永続化層の障害。リトライで回復しうる
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Benign,
    Permanent,
    Infrastructure,
}

/// Errors surfaced by the persistence ports.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("occurrence for {entity_id} on {due_date} already exists")]
    UniqueViolation {
        entity_id: EntityId,
        due_date: NaiveDate,
    },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("rejected by store: {0}")]
    Invalid(String),

    #[error("store backend failure: {0}")]
    Backend(String),
}

/// Errors from generating one entity's occurrence for one date.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GenerationError {
    #[error("{0} has an empty queue")]
    EmptyQueue(EntityId),

    #[error("occurrence for {entity_id} on {due_date} was created concurrently")]
    UniqueConstraintViolation {
        entity_id: EntityId,
        due_date: NaiveDate,
    },

    #[error("{entity_id} has a malformed queue item: {reason}")]
    MalformedQueueItem { entity_id: EntityId, reason: String },

    #[error("persistence failure: {0}")]
    PersistenceFailure(#[source] StoreError),
}

impl GenerationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GenerationError::EmptyQueue(_) | GenerationError::UniqueConstraintViolation { .. } => {
                ErrorKind::Benign
            }
            GenerationError::MalformedQueueItem { .. } => ErrorKind::Permanent,
            GenerationError::PersistenceFailure(_) => ErrorKind::Infrastructure,
        }
    }
}

impl From<StoreError> for GenerationError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UniqueViolation {
                entity_id,
                due_date,
            } => GenerationError::UniqueConstraintViolation {
                entity_id,
                due_date,
            },
            other => GenerationError::PersistenceFailure(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_violation_maps_to_benign_race() {
        let entity_id = EntityId::random();
        let due_date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let err: GenerationError = StoreError::UniqueViolation {
            entity_id,
            due_date,
        }
        .into();

        assert_eq!(
            err,
            GenerationError::UniqueConstraintViolation {
                entity_id,
                due_date
            }
        );
        assert_eq!(err.kind(), ErrorKind::Benign);
    }

    #[test]
    fn backend_failure_is_infrastructure() {
        let err: GenerationError = StoreError::Backend("disk full".into()).into();
        assert_eq!(err.kind(), ErrorKind::Infrastructure);
        assert!(err.to_string().contains("disk full"));
    }
}
