//! App - アプリケーション層
//!
//! このモジュールは、ports を組み合わせて削除エンジンを実装します。
//!
//! # 主要コンポーネント
//! - **ReaperBuilder**: 設定の検証とワイヤリング
//! - **RseSelector**: 対象 RSE の解決
//! - **ExclusionTracker**: 失敗が続く RSE の自動除外
//! - **CandidateFetcher**: RSE ごとの削除候補の取得
//! - **BulkDeletionExecutor**: ドライバ呼び出しと catalog への反映
//! - **WorkerPool**: RSE の分配と並行実行
//! - **CycleController**: サイクルの繰り返しとペース配分
//! - **Shutdown**: 協調的な停止

pub mod builder;
pub mod cycle;
pub mod exclusion;
pub mod executor;
pub mod fetcher;
pub mod registry;
pub mod scheduler;
pub mod selector;
pub mod shutdown;
pub mod status;

// 主要な型を再エクスポート
pub use self::builder::ReaperBuilder;
pub use self::cycle::CycleController;
pub use self::exclusion::{EndpointHealth, ExclusionTracker};
pub use self::executor::BulkDeletionExecutor;
pub use self::fetcher::CandidateFetcher;
pub use self::registry::DriverRegistry;
pub use self::scheduler::{RseGuard, RseLocks, WorkerPool, partition};
pub use self::selector::RseSelector;
pub use self::shutdown::{Shutdown, ShutdownHandle};
pub use self::status::{CycleReport, RunSummary, Tally};
