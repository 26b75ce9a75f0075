//! 参数校验（写入 → 回读 → 比较 → 重发）
//!
//! 设备的配置参数写入后不保证生效（丢帧、设备重启），`ParameterReconciler`
//! 缓存期望值并在每次 `poll()` 中与设备回读比较：
//!
//! ```text
//! set() ──► Unverified ──poll: 无回读──► 请求回读
//!               │
//!               ├──poll: 回读匹配──► Verified
//!               │
//!               └──poll: 回读不匹配──► 重发（指数退避）
//!                                    │
//!                                    └── 连续 max_resends 次 ──► Stuck
//! ```
//!
//! `Stuck` 参数不再重发，但继续比较回读，之后匹配仍会进入 `Verified`。
//! 用户 `set` 或设备掉电重启会重新激活它。
//!
//! 设备差异（帧格式、掉电信号、比较方式）由 [`ParameterChannel`] 提供。

use crate::config::ReconcileConfig;
use crate::error::DriverError;
use parking_lot::Mutex;
use robocan_protocol::{Fxp16Scale, Fxp32Scale};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, trace, warn};

/// 期望值与回读值的比较方式
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Comparison {
    /// 四舍五入到整数后比较
    Exact,
    /// 比较两侧 8.8 定点量化结果
    Fixed16(Fxp16Scale),
    /// 比较两侧 16.16 定点量化结果
    Fixed32(Fxp32Scale),
    /// |a - b| < eps
    Tolerance(f64),
}

impl Comparison {
    pub fn matches(self, cached: f64, readback: f64) -> bool {
        match self {
            Comparison::Exact => cached.round() == readback.round(),
            Comparison::Fixed16(scale) => scale.quantize(cached) == scale.quantize(readback),
            Comparison::Fixed32(scale) => scale.quantize(cached) == scale.quantize(readback),
            Comparison::Tolerance(eps) => (cached - readback).abs() < eps,
        }
    }
}

/// 参数状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamState {
    Unverified,
    Verified,
    /// 重发次数耗尽，等待回读自行匹配或重新激活
    Stuck,
}

/// 单个参数的快照
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamReport<K> {
    pub key: K,
    pub value: f64,
    pub state: ParamState,
    pub resends: u32,
}

/// 设备参数通道
///
/// 所有回读只返回本次新收到的数据（`None` 表示暂无），避免与过期回读比较。
pub trait ParameterChannel: Send + Sync {
    type Key: Copy + Ord + fmt::Debug + Send;

    /// 发送配置帧
    fn write(&self, key: Self::Key, value: f64) -> Result<(), DriverError>;

    /// 请求回读（幂等）
    fn request(&self, key: Self::Key) -> Result<(), DriverError>;

    /// 取新回读值
    fn readback(&self, key: Self::Key) -> Result<Option<f64>, DriverError>;

    /// 掉电信号：`None` 表示尚未收到信号帧
    fn power_cycled(&self) -> Result<Option<bool>, DriverError>;

    /// 写回以清除掉电信号
    fn clear_power_cycle(&self) -> Result<(), DriverError>;

    /// 请求掉电信号帧
    fn request_power_status(&self) -> Result<(), DriverError>;

    /// 丢弃掉电前的回读
    fn discard_readbacks(&self) -> Result<(), DriverError> {
        Ok(())
    }

    fn comparison(&self, key: Self::Key) -> Comparison;

    fn matches(&self, key: Self::Key, cached: f64, readback: f64) -> bool {
        self.comparison(key).matches(cached, readback)
    }
}

#[derive(Debug, Clone, Copy)]
struct VerifiedParameter {
    value: f64,
    state: ParamState,
    resends: u32,
    /// 下一次比较/重发的 tick
    next_tick: u64,
}

impl VerifiedParameter {
    fn armed(value: f64, tick: u64) -> Self {
        Self {
            value,
            state: ParamState::Unverified,
            resends: 0,
            next_tick: tick,
        }
    }
}

struct ReconcileState<K> {
    params: BTreeMap<K, VerifiedParameter>,
    status_seen: BTreeMap<u32, bool>,
    tick: u64,
}

/// 参数校验器
pub struct ParameterReconciler<C: ParameterChannel> {
    channel: C,
    config: ReconcileConfig,
    state: Mutex<ReconcileState<C::Key>>,
}

impl<C: ParameterChannel> ParameterReconciler<C> {
    pub fn new(channel: C, config: ReconcileConfig) -> Self {
        Self {
            channel,
            config,
            state: Mutex::new(ReconcileState {
                params: BTreeMap::new(),
                status_seen: BTreeMap::new(),
                tick: 0,
            }),
        }
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    /// 缓存期望值并写入设备
    pub fn set(&self, key: C::Key, value: f64) -> Result<(), DriverError> {
        let mut state = self.state.lock();
        let tick = state.tick;
        state.params.insert(key, VerifiedParameter::armed(value, tick));
        debug!("Parameter {:?} set to {}", key, value);
        self.channel.write(key, value)
    }

    /// 停止校验该参数（例如切换控制模式后不再适用）
    pub fn remove(&self, key: C::Key) -> Option<f64> {
        self.state.lock().params.remove(&key).map(|p| p.value)
    }

    /// 推进一次校验
    pub fn poll(&self) -> Result<(), DriverError> {
        let mut state = self.state.lock();
        state.tick += 1;
        let tick = state.tick;

        match self.channel.power_cycled()? {
            Some(true) => {
                warn!("Device power cycled, re-sending {} parameters", state.params.len());
                // 先全部重新激活，再做 I/O
                for param in state.params.values_mut() {
                    *param = VerifiedParameter::armed(param.value, tick + 1);
                }
                for flag in state.status_seen.values_mut() {
                    *flag = false;
                }
                self.channel.clear_power_cycle()?;
                self.channel.discard_readbacks()?;
                for (key, param) in state.params.iter() {
                    // 写入失败的参数由之后的回读比较重发
                    if let Err(e) = self.channel.write(*key, param.value) {
                        warn!("Re-send of parameter {:?} after power cycle failed: {}", key, e);
                    }
                }
                return Ok(());
            },
            Some(false) => {},
            None => self.channel.request_power_status()?,
        }

        let max_resends = self.config.max_resends;
        let max_backoff = self.config.max_backoff_ticks.max(1);
        for (key, param) in state.params.iter_mut() {
            if param.state == ParamState::Verified || tick < param.next_tick {
                continue;
            }

            let Some(readback) = self.channel.readback(*key)? else {
                self.channel.request(*key)?;
                continue;
            };

            if self.channel.matches(*key, param.value, readback) {
                debug!("Parameter {:?} verified ({})", key, param.value);
                param.state = ParamState::Verified;
                param.resends = 0;
                continue;
            }

            trace!("Parameter {:?} mismatch: want {}, got {}", key, param.value, readback);
            match param.state {
                ParamState::Stuck => self.channel.request(*key)?,
                _ if param.resends >= max_resends => {
                    warn!(
                        "Parameter {:?} stuck after {} resends (want {}, device reports {})",
                        key, param.resends, param.value, readback
                    );
                    param.state = ParamState::Stuck;
                    self.channel.request(*key)?;
                },
                _ => {
                    self.channel.write(*key, param.value)?;
                    param.resends += 1;
                    param.next_tick = tick + backoff_ticks(param.resends, max_backoff);
                },
            }
        }
        Ok(())
    }

    pub fn is_verified(&self, key: C::Key) -> bool {
        self.state(key) == Some(ParamState::Verified)
    }

    /// 没有参数时为 true
    pub fn all_verified(&self) -> bool {
        self.state
            .lock()
            .params
            .values()
            .all(|p| p.state == ParamState::Verified)
    }

    pub fn cached(&self, key: C::Key) -> Option<f64> {
        self.state.lock().params.get(&key).map(|p| p.value)
    }

    pub fn state(&self, key: C::Key) -> Option<ParamState> {
        self.state.lock().params.get(&key).map(|p| p.state)
    }

    pub fn stuck(&self) -> Vec<C::Key> {
        self.state
            .lock()
            .params
            .iter()
            .filter(|(_, p)| p.state == ParamState::Stuck)
            .map(|(k, _)| *k)
            .collect()
    }

    pub fn report(&self) -> Vec<ParamReport<C::Key>> {
        self.state
            .lock()
            .params
            .iter()
            .map(|(key, p)| ParamReport {
                key: *key,
                value: p.value,
                state: p.state,
                resends: p.resends,
            })
            .collect()
    }

    /// 登记需要"至少收到一次"的状态帧
    pub fn watch_status(&self, id: u32) {
        self.state.lock().status_seen.entry(id).or_insert(false);
    }

    pub fn mark_status_seen(&self, id: u32) {
        if let Some(flag) = self.state.lock().status_seen.get_mut(&id) {
            *flag = true;
        }
    }

    pub fn all_status_seen(&self) -> bool {
        self.state.lock().status_seen.values().all(|seen| *seen)
    }
}

/// 第 k 次重发后的等待 tick：min(2^(k-1), max)
fn backoff_ticks(resends: u32, max: u32) -> u64 {
    let exp = resends.saturating_sub(1).min(31);
    u64::from((1u32 << exp).min(max))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    /// 内存设备：写入立即生效（可设置为拒绝写入），请求后下一 tick 可回读
    #[derive(Default)]
    struct FakeDevice {
        stored: HashMap<u8, f64>,
        pending: HashMap<u8, f64>,
        reject_writes: bool,
        /// 接下来 n 次写入返回总线错误
        fail_writes: usize,
        power_flag: Option<bool>,
        writes: Vec<(u8, f64)>,
        requests: Vec<u8>,
        power_requests: usize,
    }

    #[derive(Default)]
    struct FakeChannel {
        device: Mutex<FakeDevice>,
    }

    impl ParameterChannel for FakeChannel {
        type Key = u8;

        fn write(&self, key: u8, value: f64) -> Result<(), DriverError> {
            let mut dev = self.device.lock();
            if dev.fail_writes > 0 {
                dev.fail_writes -= 1;
                return Err(DriverError::Can(robocan_can::CanError::BusOff));
            }
            dev.writes.push((key, value));
            if !dev.reject_writes {
                dev.stored.insert(key, value);
            }
            Ok(())
        }

        fn request(&self, key: u8) -> Result<(), DriverError> {
            let mut dev = self.device.lock();
            dev.requests.push(key);
            let value = dev.stored.get(&key).copied().unwrap_or(0.0);
            dev.pending.insert(key, value);
            Ok(())
        }

        fn readback(&self, key: u8) -> Result<Option<f64>, DriverError> {
            Ok(self.device.lock().pending.remove(&key))
        }

        fn power_cycled(&self) -> Result<Option<bool>, DriverError> {
            Ok(self.device.lock().power_flag)
        }

        fn clear_power_cycle(&self) -> Result<(), DriverError> {
            self.device.lock().power_flag = Some(false);
            Ok(())
        }

        fn request_power_status(&self) -> Result<(), DriverError> {
            let mut dev = self.device.lock();
            dev.power_requests += 1;
            if dev.power_flag.is_none() {
                dev.power_flag = Some(false);
            }
            Ok(())
        }

        fn discard_readbacks(&self) -> Result<(), DriverError> {
            self.device.lock().pending.clear();
            Ok(())
        }

        fn comparison(&self, key: u8) -> Comparison {
            match key {
                1 => Comparison::Fixed16(Fxp16Scale::Q8_8_256),
                2 => Comparison::Tolerance(0.1),
                _ => Comparison::Exact,
            }
        }
    }

    fn reconciler(max_resends: u32) -> ParameterReconciler<FakeChannel> {
        ParameterReconciler::new(
            FakeChannel::default(),
            ReconcileConfig {
                max_resends,
                max_backoff_ticks: 4,
            },
        )
    }

    #[test]
    fn test_comparison_modes() {
        assert!(Comparison::Exact.matches(42.0, 42.0));
        assert!(Comparison::Exact.matches(-3.0, -3.0));
        assert!(!Comparison::Exact.matches(42.0, 42.9));
        assert!(!Comparison::Exact.matches(42.0, 43.0));
        // 0.5 与 0.5 + 1/512 在 Q8.8 截断后相同
        assert!(Comparison::Fixed16(Fxp16Scale::Q8_8_256).matches(0.5, 0.5 + 1.0 / 512.0));
        assert!(!Comparison::Fixed16(Fxp16Scale::Q8_8_256).matches(0.5, 0.51));
        assert!(Comparison::Tolerance(0.1).matches(12.0, 12.05));
        assert!(!Comparison::Tolerance(0.1).matches(12.0, 12.2));
    }

    #[test]
    fn test_converges_within_three_polls() {
        let r = reconciler(8);
        r.set(0, 300.0).unwrap();
        r.set(1, 0.25).unwrap();
        r.set(2, 12.0).unwrap();
        assert!(!r.all_verified());

        for _ in 0..3 {
            r.poll().unwrap();
        }
        assert!(r.all_verified());
        assert!(r.is_verified(1));
        assert_eq!(r.cached(0), Some(300.0));
    }

    #[test]
    fn test_lost_write_is_resent() {
        let r = reconciler(8);
        r.channel().device.lock().reject_writes = true;
        r.set(0, 7.0).unwrap();
        r.poll().unwrap(); // 请求回读
        r.channel().device.lock().reject_writes = false;
        r.poll().unwrap(); // 回读 0，不匹配 → 重发
        assert_eq!(r.state(0), Some(ParamState::Unverified));
        r.poll().unwrap(); // 请求回读
        r.poll().unwrap(); // 匹配
        assert!(r.is_verified(0));
        let writes = r.channel().device.lock().writes.clone();
        assert_eq!(writes, vec![(0, 7.0), (0, 7.0)]);
    }

    #[test]
    fn test_bounded_retry_reaches_stuck() {
        let r = reconciler(3);
        r.channel().device.lock().reject_writes = true;
        r.set(0, 5.0).unwrap();

        for _ in 0..64 {
            r.poll().unwrap();
        }
        assert_eq!(r.state(0), Some(ParamState::Stuck));
        assert_eq!(r.stuck(), vec![0]);
        // 初次写入 + 3 次重发，之后不再发送
        assert_eq!(r.channel().device.lock().writes.len(), 4);
        let report = r.report();
        assert_eq!(report[0].resends, 3);
        assert_eq!(report[0].state, ParamState::Stuck);

        // 设备之后自行接受该值：继续比较即可验证
        r.channel().device.lock().stored.insert(0, 5.0);
        r.poll().unwrap();
        r.poll().unwrap();
        assert!(r.is_verified(0));
    }

    #[test]
    fn test_set_rearms_stuck_parameter() {
        let r = reconciler(0);
        r.channel().device.lock().reject_writes = true;
        r.set(3, 1.0).unwrap();
        r.poll().unwrap();
        r.poll().unwrap();
        assert_eq!(r.state(3), Some(ParamState::Stuck));

        r.channel().device.lock().reject_writes = false;
        r.set(3, 2.0).unwrap();
        assert_eq!(r.state(3), Some(ParamState::Unverified));
        // 先消费 set 之前请求的旧回读，再请求并比较新值
        for _ in 0..3 {
            r.poll().unwrap();
        }
        assert!(r.is_verified(3));
        assert_eq!(r.cached(3), Some(2.0));
    }

    #[test]
    fn test_backoff_spacing() {
        assert_eq!(backoff_ticks(1, 16), 1);
        assert_eq!(backoff_ticks(2, 16), 2);
        assert_eq!(backoff_ticks(4, 16), 8);
        assert_eq!(backoff_ticks(9, 16), 16);
        assert_eq!(backoff_ticks(40, 4), 4);
    }

    #[test]
    fn test_power_cycle_resends_each_value_once() {
        let r = reconciler(8);
        r.set(0, 10.0).unwrap();
        r.set(2, 3.0).unwrap();
        r.watch_status(0x100);
        for _ in 0..3 {
            r.poll().unwrap();
        }
        r.mark_status_seen(0x100);
        assert!(r.all_verified());
        assert!(r.all_status_seen());

        {
            let mut dev = r.channel().device.lock();
            dev.stored.clear();
            dev.writes.clear();
            dev.power_flag = Some(true);
        }
        r.poll().unwrap();

        let dev = r.channel().device.lock();
        assert_eq!(dev.writes, vec![(0, 10.0), (2, 3.0)]);
        assert_eq!(dev.power_flag, Some(false));
        drop(dev);
        assert_eq!(r.state(0), Some(ParamState::Unverified));
        assert!(!r.all_status_seen());

        r.poll().unwrap();
        r.poll().unwrap();
        assert!(r.all_verified());
        assert_eq!(r.channel().device.lock().writes.len(), 2);
    }

    #[test]
    fn test_failed_write_during_power_cycle_rearms_all() {
        let r = reconciler(8);
        r.set(0, 10.0).unwrap();
        r.set(2, 3.0).unwrap();
        for _ in 0..3 {
            r.poll().unwrap();
        }
        assert!(r.all_verified());

        {
            let mut dev = r.channel().device.lock();
            dev.stored.clear();
            dev.writes.clear();
            dev.power_flag = Some(true);
            dev.fail_writes = 1;
        }
        r.poll().unwrap();

        // 键 0 写入失败，键 2 照常写入，两者都回到 Unverified
        assert_eq!(r.state(0), Some(ParamState::Unverified));
        assert_eq!(r.state(2), Some(ParamState::Unverified));
        assert_eq!(r.channel().device.lock().writes, vec![(2, 3.0)]);
        assert_eq!(r.channel().device.lock().power_flag, Some(false));

        for _ in 0..8 {
            r.poll().unwrap();
        }
        assert!(r.all_verified());
        let dev = r.channel().device.lock();
        assert_eq!(dev.stored.get(&0), Some(&10.0));
        assert_eq!(dev.stored.get(&2), Some(&3.0));
    }

    #[test]
    fn test_removed_parameter_is_not_polled() {
        let r = reconciler(8);
        r.set(4, 1.0).unwrap();
        assert_eq!(r.remove(4), Some(1.0));
        r.poll().unwrap();
        assert!(r.channel().device.lock().requests.is_empty());
        assert!(r.all_verified());
        assert_eq!(r.state(4), None);
    }

    #[test]
    fn test_missing_power_signal_is_requested() {
        let r = reconciler(8);
        r.poll().unwrap();
        r.poll().unwrap();
        assert_eq!(r.channel().device.lock().power_requests, 1);
        assert!(r.all_verified());
    }
}
