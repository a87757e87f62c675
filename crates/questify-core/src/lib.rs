//! questify-core
//!
//! Recurring routine / placeholder-task instance generation.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, queue, entity, occurrence, 繰り返しルール, 位置計算, errors）
//! - **ports**: 抽象化レイヤー（CatalogStore, OccurrenceStore, Clock, IdGenerator, RunTrigger）
//! - **app**: アプリケーションロジック（builder, generator, scheduler, tracking, daily_loop）
//! - **impls**: 実装（InMemoryStore など開発用）
//! - **config**: TOML 設定

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod ports;
