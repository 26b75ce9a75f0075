//! 状态读数
//!
//! 读数总带有新鲜度：设备短暂未更新（`Cached`/`Stale`）与从未接入（`NeverReceived`）
//! 是两种不同的状态，调用方自行决定如何处理。

use robocan_driver::RxOutcome;
use std::time::Duration;

/// 读数新鲜度
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    Fresh,
    Cached,
    Stale,
    NeverReceived,
}

/// 带新鲜度的读数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample<T> {
    pub value: T,
    pub freshness: Freshness,
    /// 距收到的时间（新帧为 0，从未收到为 None）
    pub age: Option<Duration>,
}

impl<T> Sample<T> {
    /// 从接收结果解码；从未收到时按全 0 负载解码
    pub fn from_outcome(outcome: &RxOutcome, decode: impl FnOnce(&[u8; 8]) -> T) -> Self {
        let payload = outcome.payload();
        let (freshness, age) = match outcome {
            RxOutcome::Fresh(_) => (Freshness::Fresh, Some(Duration::ZERO)),
            RxOutcome::Cached { age, .. } => (Freshness::Cached, Some(*age)),
            RxOutcome::Stale { age, .. } => (Freshness::Stale, Some(*age)),
            RxOutcome::NeverReceived => (Freshness::NeverReceived, None),
        };
        Self {
            value: decode(&payload),
            freshness,
            age,
        }
    }

    /// 读数在超时内
    pub fn is_ok(&self) -> bool {
        matches!(self.freshness, Freshness::Fresh | Freshness::Cached)
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Sample<U> {
        Sample {
            value: f(self.value),
            freshness: self.freshness,
            age: self.age,
        }
    }

    /// 仅在超时内返回值
    pub fn ok(self) -> Option<T> {
        if self.is_ok() { Some(self.value) } else { None }
    }
}
