//! Impls - 実装（開発用・テスト用）
//!
//! このモジュールには ports の実装を含めます。
//!
//! # 含まれる実装
//! - **InMemoryStore**: CatalogStore + OccurrenceStore の開発用実装
//!
//! 本番用のストア（RDB など）は別クレートに置き、同じ port を実装します。

pub mod inmem_store;

pub use self::inmem_store::InMemoryStore;
