//! App - アプリケーション層
//!
//! このモジュールは、ports を組み合わせてアプリケーションロジックを実装します。
//!
//! # 主要コンポーネント
//! - **AppBuilder**: アプリケーションの構築とワイヤリング
//! - **InstanceGenerator**: 1 エンティティ × 1 日付の occurrence 生成
//! - **BatchScheduler**: ユーザー単位・日付範囲の一括生成と次回実行時刻
//! - **OccurrenceTracker**: 進捗・状態更新と一覧、未来分の削除
//! - **DailyGenerationLoop**: 毎日の自動生成タスク

pub mod builder;
pub mod daily_loop;
pub mod generator;
pub mod scheduler;
pub mod tracking;

// 主要な型を再エクスポート
pub use self::builder::{App, AppBuilder, BuildError};
pub use self::daily_loop::{DailyGenerationLoop, LoopTrigger};
pub use self::generator::InstanceGenerator;
pub use self::scheduler::{BatchScheduler, ScheduleError, ScheduleSettings};
pub use self::tracking::{CleanupStats, OccurrenceTracker, OccurrenceView, TrackingError};
