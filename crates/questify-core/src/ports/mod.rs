//! Ports - 抽象化レイヤー
//!
//! Hexagonal Architecture の「ポート」です。生成ロジックは永続化や時刻、
//! 起動タイマーの実装を知らず、ここにある trait だけに依存します。

pub mod clock;
pub mod id_generator;
pub mod store;
pub mod trigger;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::store::{CatalogStore, OccurrenceStore, OccurrenceTx};
pub use self::trigger::{RunTrigger, TriggerError};
