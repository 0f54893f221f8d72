//! IdGenerator port - ID 生成の抽象化
//!
//! # 実装
//! - **UlidGenerator**: Clock の時刻 + 乱数部分で ULID を作る

use crate::domain::ids::EntryId;
use crate::ports::Clock;
use ulid::Ulid;

pub trait IdGenerator: Send + Sync {
    fn generate_entry_id(&self) -> EntryId;
}

/// ULID generator driven by a [`Clock`], so tests with a `FixedClock` get
/// a deterministic timestamp component.
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_entry_id(&self) -> EntryId {
        let timestamp_ms = self.clock.now().timestamp_millis().max(0) as u64;
        EntryId::from(Ulid::from_parts(timestamp_ms, rand::random()))
    }
}
