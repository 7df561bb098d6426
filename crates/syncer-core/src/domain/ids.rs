//! Run identifiers.
//!
//! 各 run に ULID を振り、ログの span で相関させる。
//! ULID は時刻でソート可能なので、同じ task の run を生成順に並べられる。

use serde::{Deserialize, Serialize};
use std::fmt;
use ulid::Ulid;

use crate::ports::Clock;

/// Identifier of one orchestrator run.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RunId(Ulid);

impl RunId {
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Run id whose timestamp part comes from `clock`.
    pub fn at<C: Clock + ?Sized>(clock: &C) -> Self {
        let ms = clock.now().and_utc().timestamp_millis().max(0) as u64;
        Self(Ulid::from_parts(ms, rand::random()))
    }

    pub fn as_ulid(&self) -> Ulid {
        self.0
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Ulid> for RunId {
    fn from(ulid: Ulid) -> Self {
        Self(ulid)
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "run-{}", self.0)
    }
}
