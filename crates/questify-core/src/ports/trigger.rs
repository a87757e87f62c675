//! RunTrigger port - 次回の自動生成をいつ起動するか
//!
//! スケジューラは「次の起動時刻」を計算するだけで、実際に起こす仕組み
//! （タイマー、cron、ジョブキュー）はこの trait の実装に任せます。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TriggerError {
    #[error("trigger is shut down")]
    Closed,
}

#[async_trait]
pub trait RunTrigger: Send + Sync {
    /// Arrange for the next generation run at `at`.
    async fn arm(&self, at: DateTime<Utc>) -> Result<(), TriggerError>;
}
