//! IdGenerator port - ID 生成の抽象化
//!
//! # 実装
//! - **UlidGenerator**: ULID ベース（本番用）

use std::sync::Arc;

use ulid::Ulid;

use crate::domain::ids::{BatchId, ReplicaId};
use crate::ports::Clock;

/// IdGenerator produces sortable ids without coordination between workers.
///
/// # Thread Safety
/// - `Send + Sync` を要求（複数ワーカーから使える）
pub trait IdGenerator: Send + Sync {
    fn generate_replica_id(&self) -> ReplicaId;

    fn generate_batch_id(&self) -> BatchId;
}

/// ULID generator whose timestamp part comes from the injected clock, so a
/// `FixedClock` gives ids with a deterministic time prefix.
pub struct UlidGenerator {
    clock: Arc<dyn Clock>,
}

impl UlidGenerator {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    fn next(&self) -> Ulid {
        let timestamp_ms = self.clock.now().timestamp_millis().max(0) as u64;
        Ulid::from_parts(timestamp_ms, rand::random())
    }
}

impl IdGenerator for UlidGenerator {
    fn generate_replica_id(&self) -> ReplicaId {
        ReplicaId::from(self.next())
    }

    fn generate_batch_id(&self) -> BatchId {
        BatchId::from(self.next())
    }
}
