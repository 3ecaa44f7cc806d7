//! Impls - ports の実装
//!
//! # 含まれる実装
//! - **InMemoryCatalog**: JSON スナップショットから読み込む catalog
//! - **InMemoryDriver**: テスト用のスクリプト可能なドライバ
//! - **PosixDriver**: `file://` 用のドライバ

pub mod inmem_catalog;
pub mod inmem_driver;
pub mod posix_driver;

// 主要な型を再エクスポート
pub use self::inmem_catalog::{CatalogSnapshot, InMemoryCatalog, ReplicaCounts};
pub use self::inmem_driver::InMemoryDriver;
pub use self::posix_driver::PosixDriver;
