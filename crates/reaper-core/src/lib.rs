//! reaper-core
//!
//! Replica deletion engine: picks storage endpoints, claims tombstoned
//! replicas from the catalog, deletes them through per-scheme drivers and
//! keeps failing endpoints out of the way for a while.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, rse, replica, pfn, expression, outcome, decision, errors）
//! - **ports**: 抽象化レイヤー（Catalog, DeletionDriver, Clock, IdGenerator）
//! - **app**: アプリケーションロジック（builder, selector, exclusion, fetcher, executor, scheduler, cycle）
//! - **impls**: 実装（InMemoryCatalog, InMemoryDriver, PosixDriver）
//! - **config**: 設定（TOML + CLI のレイヤー）

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod ports;

pub use crate::app::{CycleController, ReaperBuilder, RunSummary, Shutdown, ShutdownHandle};
pub use crate::config::{ConfigError, ReaperConfig, ReaperConfigLayer};
pub use crate::domain::{ErrorKind, ReaperError};
