//! 电机安全看门狗
//!
//! 每个执行器持有一个 [`MotorSafety`] 记录，控制循环每次下发指令时 `feed()`。
//! 超过 `expiration` 未喂食时，巡检（[`SafetyRegistry::check_motors`]）调用
//! [`StopMotor::stop_motor`] 使电机停转，每次超时只调用一次。
//!
//! 注册表是显式对象，由调用方创建并传给执行器构造函数；记录以 `Weak`
//! 保存，执行器析构后自动失效。[`SafetySweeper`] 在后台线程按固定周期巡检。

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};
use parking_lot::Mutex;
use robocan_can::Clock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, warn};

/// 默认超时
pub const DEFAULT_SAFETY_EXPIRATION: Duration = Duration::from_millis(100);

/// 可被看门狗停止的执行器
pub trait StopMotor: Send + Sync {
    fn stop_motor(&self);

    /// 日志中的执行器描述
    fn description(&self) -> String;
}

#[derive(Debug)]
struct SafetyState {
    expiration: Duration,
    last_feed_us: u64,
    enabled: bool,
    tripped: bool,
}

/// 单个执行器的看门狗记录
pub struct MotorSafety {
    clock: Arc<dyn Clock>,
    target: Weak<dyn StopMotor>,
    state: Mutex<SafetyState>,
}

impl MotorSafety {
    pub fn new(clock: Arc<dyn Clock>, target: Weak<dyn StopMotor>, enabled: bool) -> Self {
        let now = clock.now_us();
        Self {
            clock,
            target,
            state: Mutex::new(SafetyState {
                expiration: DEFAULT_SAFETY_EXPIRATION,
                last_feed_us: now,
                enabled,
                tripped: false,
            }),
        }
    }

    /// 刷新喂食时间，并解除本次超时
    pub fn feed(&self) {
        let now = self.clock.now_us();
        let mut state = self.state.lock();
        state.last_feed_us = now;
        state.tripped = false;
    }

    pub fn set_expiration(&self, expiration: Duration) {
        self.state.lock().expiration = expiration;
    }

    pub fn expiration(&self) -> Duration {
        self.state.lock().expiration
    }

    /// 未启用，或距上次喂食未超过超时
    pub fn is_alive(&self) -> bool {
        let now = self.clock.now_us();
        let state = self.state.lock();
        Self::alive(&state, now)
    }

    fn alive(state: &SafetyState, now_us: u64) -> bool {
        !state.enabled
            || Duration::from_micros(now_us.saturating_sub(state.last_feed_us)) < state.expiration
    }

    /// 超时则停止电机；返回本次是否触发
    pub fn check(&self) -> bool {
        let now = self.clock.now_us();
        {
            let mut state = self.state.lock();
            if Self::alive(&state, now) || state.tripped {
                return false;
            }
            state.tripped = true;
        }

        match self.target.upgrade() {
            Some(target) => {
                warn!(
                    "{}... Output not updated often enough, stopping motor",
                    target.description()
                );
                target.stop_motor();
                true
            },
            None => false,
        }
    }

    /// 重新启用时同时重置喂食时间
    pub fn set_safety_enabled(&self, enabled: bool) {
        let now = self.clock.now_us();
        let mut state = self.state.lock();
        if enabled && !state.enabled {
            state.last_feed_us = now;
        }
        state.enabled = enabled;
        state.tripped = false;
    }

    pub fn is_safety_enabled(&self) -> bool {
        self.state.lock().enabled
    }

    pub fn is_tripped(&self) -> bool {
        self.state.lock().tripped
    }
}

/// 看门狗注册表
#[derive(Default)]
pub struct SafetyRegistry {
    next_id: AtomicU64,
    records: Mutex<Vec<(u64, Weak<MotorSafety>)>>,
}

impl SafetyRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// 登记记录；句柄析构时注销
    pub fn register(self: &Arc<Self>, record: &Arc<MotorSafety>) -> SafetyHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.records.lock().push((id, Arc::downgrade(record)));
        debug!("Motor safety record {} registered", id);
        SafetyHandle {
            registry: Arc::downgrade(self),
            id,
        }
    }

    fn unregister(&self, id: u64) {
        self.records.lock().retain(|(rid, _)| *rid != id);
    }

    /// 检查所有存活记录；返回本轮触发数
    pub fn check_motors(&self) -> usize {
        // 在锁外调用 stop_motor
        let live: Vec<Arc<MotorSafety>> = {
            let mut records = self.records.lock();
            records.retain(|(_, weak)| weak.strong_count() > 0);
            records.iter().filter_map(|(_, weak)| weak.upgrade()).collect()
        };
        live.iter().filter(|record| record.check()).count()
    }

    pub fn len(&self) -> usize {
        self.records
            .lock()
            .iter()
            .filter(|(_, weak)| weak.strong_count() > 0)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// 注册句柄，析构时从注册表移除
pub struct SafetyHandle {
    registry: Weak<SafetyRegistry>,
    id: u64,
}

impl Drop for SafetyHandle {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.unregister(self.id);
        }
    }
}

/// 后台巡检线程
pub struct SafetySweeper {
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl SafetySweeper {
    pub fn spawn(registry: Arc<SafetyRegistry>, period: Duration) -> std::io::Result<Self> {
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let handle = thread::Builder::new()
            .name("robocan-safety".into())
            .spawn(move || sweep_loop(registry, period, stop_rx))?;
        Ok(Self {
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        })
    }
}

fn sweep_loop(registry: Arc<SafetyRegistry>, period: Duration, stop_rx: Receiver<()>) {
    debug!("Safety sweeper started ({:?})", period);
    loop {
        match stop_rx.recv_timeout(period) {
            Err(RecvTimeoutError::Timeout) => {
                registry.check_motors();
            },
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    debug!("Safety sweeper stopped");
}

impl Drop for SafetySweeper {
    fn drop(&mut self) {
        // 断开通道即通知线程退出
        self.stop_tx.take();
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            error!("Safety sweeper thread panicked");
        }
    }
}
