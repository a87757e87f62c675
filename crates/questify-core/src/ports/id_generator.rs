//! IdGenerator port - ID 生成の抽象化
//!
//! 生成器が作るのは occurrence と item の ID だけです。カタログ側の ID
//! （area / project / entity など）は CRUD 層が決めます。

use crate::domain::ids::{ItemId, OccurrenceId};
use crate::ports::Clock;
use ulid::Ulid;

/// IdGenerator は ULID ベースの ID を生成
///
/// # Thread Safety
/// - `Send + Sync` を要求（複数タスクから使える）
pub trait IdGenerator: Send + Sync {
    fn generate_occurrence_id(&self) -> OccurrenceId;

    fn generate_item_id(&self) -> ItemId;
}

/// UlidGenerator は Clock の時刻を ULID の timestamp 部分に使います。
/// テストで FixedClock を渡すと timestamp 部分が固定されます（乱数部分は毎回異なる）。
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }

    fn next_ulid(&self) -> Ulid {
        let timestamp_ms = self.clock.now().timestamp_millis().max(0) as u64;
        Ulid::from_parts(timestamp_ms, rand::random())
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_occurrence_id(&self) -> OccurrenceId {
        OccurrenceId::from(self.next_ulid())
    }

    fn generate_item_id(&self) -> ItemId {
        ItemId::from(self.next_ulid())
    }
}
