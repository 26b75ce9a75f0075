//! 单调时钟抽象
//!
//! 接收缓存的时间戳与看门狗的喂食时间都取自 `Clock`，测试中用 `ManualClock` 控制时间。

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// 单调时间源（微秒）
pub trait Clock: Send + Sync {
    fn now_us(&self) -> u64;

    fn now(&self) -> Duration {
        Duration::from_micros(self.now_us())
    }
}

impl<T: Clock + ?Sized> Clock for Arc<T> {
    fn now_us(&self) -> u64 {
        (**self).now_us()
    }
}

/// 基于 `Instant` 的单调时钟，从创建时刻起计时
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_us(&self) -> u64 {
        self.origin.elapsed().as_micros() as u64
    }
}

/// 手动推进的时钟（测试用）
#[derive(Debug, Default)]
pub struct ManualClock {
    now_us: AtomicU64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starting_at(now: Duration) -> Self {
        Self {
            now_us: AtomicU64::new(now.as_micros() as u64),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.now_us.fetch_add(by.as_micros() as u64, Ordering::AcqRel);
    }

    pub fn advance_ms(&self, ms: u64) {
        self.advance(Duration::from_millis(ms));
    }

    pub fn set(&self, now: Duration) {
        self.now_us.store(now.as_micros() as u64, Ordering::Release);
    }
}

impl Clock for ManualClock {
    fn now_us(&self) -> u64 {
        self.now_us.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_advances() {
        let clock = ManualClock::new();
        assert_eq!(clock.now_us(), 0);
        clock.advance_ms(15);
        assert_eq!(clock.now_us(), 15_000);
        clock.set(Duration::from_secs(1));
        assert_eq!(clock.now(), Duration::from_secs(1));
    }

    #[test]
    fn test_monotonic_clock_never_goes_back() {
        let clock = MonotonicClock::new();
        let a = clock.now_us();
        let b = clock.now_us();
        assert!(b >= a);
    }

    #[test]
    fn test_shared_clock_through_arc() {
        let clock = Arc::new(ManualClock::starting_at(Duration::from_millis(5)));
        let shared: Arc<dyn Clock> = clock.clone();
        clock.advance_ms(1);
        assert_eq!(shared.now_us(), 6_000);
    }
}
