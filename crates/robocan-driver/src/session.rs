//! 设备会话：发送任务调度与接收缓存
//!
//! 每个设备一个 `DeviceSession`，持有该设备的发送任务表（TxJob）与接收缓存（RxEntry）。
//! 两张表由同一把锁保护，所有读取都是复制出去，调用方永远拿不到表内引用。
//!
//! # 接收的三种结果
//!
//! `get_rx` 先尝试一次传输层接收：
//!
//! - 收到新帧：刷新缓存，返回 `RxOutcome::Fresh`
//! - 未找到但有缓存：缓存年龄 ≤ 超时返回 `RxOutcome::Cached`，否则 `RxOutcome::Stale`
//! - 从未收到：`RxOutcome::NeverReceived`，数据为全 0
//!
//! 以此区分"设备暂时忙"和"设备从未接入"。

use crate::error::DriverError;
use parking_lot::Mutex;
use robocan_can::{CanFrame, CanTransport, Clock, FULL_ID_MASK, SendPeriod};
use robocan_protocol::{ArbitrationId, DeviceNumber};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, trace};

/// `get_rx` 超时上限
pub const MAX_RX_TIMEOUT: Duration = Duration::from_millis(999);

/// 周期发送任务
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxJob {
    pub id: u32,
    pub payload: [u8; 8],
    pub dlc: u8,
    pub period: SendPeriod,
}

impl TxJob {
    pub fn frame(&self) -> CanFrame {
        CanFrame::from_payload(self.id, self.payload, self.dlc)
    }
}

/// 接收缓存条目
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RxEntry {
    pub frame: CanFrame,
    /// 收到时的会话时钟（微秒）
    pub received_at_us: u64,
}

/// `get_rx` 的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RxOutcome {
    /// 本次收到的新帧
    Fresh(CanFrame),
    /// 缓存帧，年龄未超过超时
    Cached { frame: CanFrame, age: Duration },
    /// 缓存帧，年龄已超过超时（仍携带最后已知数据）
    Stale { frame: CanFrame, age: Duration },
    /// 从未收到过该 ID
    NeverReceived,
}

impl RxOutcome {
    /// 数据是否在超时内（Fresh 或 Cached）
    pub fn is_ok(&self) -> bool {
        matches!(self, RxOutcome::Fresh(_) | RxOutcome::Cached { .. })
    }

    pub fn is_stale(&self) -> bool {
        matches!(self, RxOutcome::Stale { .. })
    }

    pub fn is_never_received(&self) -> bool {
        matches!(self, RxOutcome::NeverReceived)
    }

    /// 最后已知的帧（从未收到时为 None）
    pub fn frame(&self) -> Option<&CanFrame> {
        match self {
            RxOutcome::Fresh(frame)
            | RxOutcome::Cached { frame, .. }
            | RxOutcome::Stale { frame, .. } => Some(frame),
            RxOutcome::NeverReceived => None,
        }
    }

    /// 负载；从未收到时为全 0
    pub fn payload(&self) -> [u8; 8] {
        self.frame().map(|f| f.data).unwrap_or([0u8; 8])
    }

    /// 仅在超时内时返回帧
    pub fn ok_frame(&self) -> Option<&CanFrame> {
        if self.is_ok() { self.frame() } else { None }
    }
}

#[derive(Default)]
struct SessionState {
    tx: HashMap<u32, TxJob>,
    rx: HashMap<u32, RxEntry>,
}

/// 单个设备的 CAN 会话
pub struct DeviceSession {
    device: DeviceNumber,
    transport: Arc<dyn CanTransport>,
    clock: Arc<dyn Clock>,
    state: Mutex<SessionState>,
}

impl DeviceSession {
    pub fn new(
        device: DeviceNumber,
        transport: Arc<dyn CanTransport>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            device,
            transport,
            clock,
            state: Mutex::new(SessionState::default()),
        }
    }

    pub fn device(&self) -> DeviceNumber {
        self.device
    }

    /// 本设备的仲裁 ID：`base | 设备号`
    pub fn id(&self, base: u32) -> u32 {
        ArbitrationId::for_device(base, self.device).raw()
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn transport(&self) -> &Arc<dyn CanTransport> {
        &self.transport
    }

    // ------------------------------------------------------------------
    // TX
    // ------------------------------------------------------------------

    /// 创建（或覆盖）发送任务，并立即以给定周期发送一次
    pub fn register_tx(
        &self,
        id: u32,
        period: SendPeriod,
        dlc: usize,
        initial: Option<&[u8]>,
    ) -> Result<(), DriverError> {
        if dlc > 8 {
            return Err(DriverError::InvalidDlc { dlc });
        }
        let mut payload = [0u8; 8];
        if let Some(initial) = initial {
            if initial.len() > 8 {
                return Err(DriverError::InvalidDlc { dlc: initial.len() });
            }
            payload[..initial.len()].copy_from_slice(initial);
        }
        let job = TxJob {
            id,
            payload,
            dlc: dlc as u8,
            period,
        };

        let mut state = self.state.lock();
        if state.tx.insert(id, job).is_some() {
            debug!("TX job 0x{:08X} overwritten", id);
        }
        self.send_locked(&job)
    }

    /// 以停止哨兵发送并删除任务
    ///
    /// 停止帧发送失败时任务保留，可再次调用重试。
    pub fn unregister_tx(&self, id: u32) -> Result<(), DriverError> {
        let mut state = self.state.lock();
        let job = state.tx.get(&id).copied().ok_or(DriverError::NoSuchJob { id })?;
        self.transport.send(&job.frame(), SendPeriod::Stop).map_err(|e| {
            error!("Stop of 0x{:08X} failed: {}", id, e);
            DriverError::from(e)
        })?;
        state.tx.remove(&id);
        trace!("TX job 0x{:08X} unregistered", id);
        Ok(())
    }

    pub fn has_tx(&self, id: u32) -> bool {
        self.state.lock().tx.contains_key(&id)
    }

    pub fn tx_job(&self, id: u32) -> Option<TxJob> {
        self.state.lock().tx.get(&id).copied()
    }

    /// 复制出任务当前负载
    pub fn tx_payload(&self, id: u32) -> Option<[u8; 8]> {
        self.state.lock().tx.get(&id).map(|job| job.payload)
    }

    /// 在锁内修改任务负载（不发送）
    pub fn modify_tx<R>(
        &self,
        id: u32,
        f: impl FnOnce(&mut [u8; 8]) -> R,
    ) -> Result<R, DriverError> {
        let mut state = self.state.lock();
        let job = state.tx.get_mut(&id).ok_or(DriverError::NoSuchJob { id })?;
        Ok(f(&mut job.payload))
    }

    /// 原样重新提交任务当前负载；发送失败不自动重试
    pub fn flush_tx(&self, id: u32) -> Result<(), DriverError> {
        let state = self.state.lock();
        let job = state.tx.get(&id).ok_or(DriverError::NoSuchJob { id })?;
        self.send_locked(job)
    }

    /// 修改并立即提交（设置类调用的路径）
    pub fn update_tx<R>(
        &self,
        id: u32,
        f: impl FnOnce(&mut [u8; 8]) -> R,
    ) -> Result<R, DriverError> {
        let mut state = self.state.lock();
        let job = state.tx.get_mut(&id).ok_or(DriverError::NoSuchJob { id })?;
        let result = f(&mut job.payload);
        let job = *job;
        self.send_locked(&job)?;
        Ok(result)
    }

    /// 只修改周期并重新提交；没有该任务时返回 `Ok(false)`
    pub fn change_tx_period(&self, id: u32, period: SendPeriod) -> Result<bool, DriverError> {
        let mut state = self.state.lock();
        let Some(job) = state.tx.get_mut(&id) else {
            return Ok(false);
        };
        job.period = period;
        let job = *job;
        self.send_locked(&job)?;
        Ok(true)
    }

    /// 一次性发送（不建立任务）
    pub fn send_once(&self, frame: &CanFrame) -> Result<(), DriverError> {
        self.transport.send(frame, SendPeriod::Once)?;
        trace!("One-shot 0x{:08X} len={}", frame.id, frame.len);
        Ok(())
    }

    fn send_locked(&self, job: &TxJob) -> Result<(), DriverError> {
        self.transport.send(&job.frame(), job.period).map_err(|e| {
            error!("Send of 0x{:08X} failed: {}", job.id, e);
            DriverError::from(e)
        })?;
        trace!("Sent 0x{:08X} {:?} {:02X?}", job.id, job.period, &job.payload[..job.dlc as usize]);
        Ok(())
    }

    // ------------------------------------------------------------------
    // RX
    // ------------------------------------------------------------------

    /// 取最新数据，超时上限 999 ms
    pub fn get_rx(&self, id: u32, timeout: Duration) -> Result<RxOutcome, DriverError> {
        let timeout = timeout.min(MAX_RX_TIMEOUT);
        if let Some(frame) = self.poll_fresh(id)? {
            return Ok(RxOutcome::Fresh(frame));
        }

        let now = self.clock.now_us();
        let state = self.state.lock();
        Ok(match state.rx.get(&id) {
            None => RxOutcome::NeverReceived,
            Some(entry) => {
                let age = Duration::from_micros(now.saturating_sub(entry.received_at_us));
                if age <= timeout {
                    RxOutcome::Cached {
                        frame: entry.frame,
                        age,
                    }
                } else {
                    RxOutcome::Stale {
                        frame: entry.frame,
                        age,
                    }
                }
            },
        })
    }

    /// 只接收新帧（刷新缓存），没有新帧返回 `None`
    ///
    /// 回读比较只使用新帧，避免与过期回读比较。
    pub fn poll_fresh(&self, id: u32) -> Result<Option<CanFrame>, DriverError> {
        match self.transport.receive(id, FULL_ID_MASK) {
            Ok(frame) => {
                let entry = RxEntry {
                    frame,
                    received_at_us: self.clock.now_us(),
                };
                self.state.lock().rx.insert(id, entry);
                trace!("Received 0x{:08X} {:02X?}", id, frame.data_slice());
                Ok(Some(frame))
            },
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => {
                error!("Receive of 0x{:08X} failed: {}", id, e);
                Err(e.into())
            },
        }
    }

    /// 复制出缓存条目
    pub fn cached_rx(&self, id: u32) -> Option<RxEntry> {
        self.state.lock().rx.get(&id).copied()
    }

    /// 丢弃缓冲中的新帧与缓存条目
    pub fn discard_rx(&self, id: u32) -> Result<(), DriverError> {
        match self.transport.receive(id, FULL_ID_MASK) {
            Ok(_) => {},
            Err(e) if e.is_not_found() => {},
            Err(e) => return Err(e.into()),
        }
        self.state.lock().rx.remove(&id);
        Ok(())
    }
}

impl Drop for DeviceSession {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        for job in state.tx.values().filter(|job| job.period.is_periodic()) {
            if let Err(e) = self.transport.send(&job.frame(), SendPeriod::Stop) {
                error!("Failed to stop periodic 0x{:08X} on drop: {}", job.id, e);
            }
        }
        state.tx.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use robocan_can::{ManualClock, MockBus};

    fn session(device: u8) -> (DeviceSession, Arc<MockBus>, Arc<ManualClock>) {
        let bus = Arc::new(MockBus::new());
        let clock = Arc::new(ManualClock::new());
        let session = DeviceSession::new(
            DeviceNumber::new(device).unwrap(),
            bus.clone(),
            clock.clone(),
        );
        (session, bus, clock)
    }

    #[test]
    fn test_register_sends_immediately() {
        let (session, bus, _) = session(5);
        let id = session.id(0x0204_0000);
        session
            .register_tx(id, SendPeriod::Every(10), 8, None)
            .unwrap();
        let sent = bus.sent_to(0x0204_0005);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].period, SendPeriod::Every(10));
        assert_eq!(sent[0].frame.len, 8);
    }

    #[test]
    fn test_at_most_one_job_per_id() {
        let (session, _, _) = session(1);
        session.register_tx(0x100, SendPeriod::Every(10), 2, Some(&[1, 2])).unwrap();
        session.register_tx(0x100, SendPeriod::Every(20), 3, Some(&[3])).unwrap();
        let job = session.tx_job(0x100).unwrap();
        assert_eq!(job.period, SendPeriod::Every(20));
        assert_eq!(job.dlc, 3);
        assert_eq!(job.payload[..3], [3, 0, 0]);
        assert_eq!(session.state.lock().tx.len(), 1);
    }

    #[test]
    fn test_invalid_dlc() {
        let (session, bus, _) = session(1);
        assert!(matches!(
            session.register_tx(0x100, SendPeriod::Once, 9, None),
            Err(DriverError::InvalidDlc { dlc: 9 })
        ));
        assert!(bus.sent().is_empty());
    }

    #[test]
    fn test_unknown_job_is_error() {
        let (session, bus, _) = session(1);
        assert!(matches!(
            session.flush_tx(0x200),
            Err(DriverError::NoSuchJob { id: 0x200 })
        ));
        assert!(matches!(
            session.update_tx(0x200, |p| p[0] = 1),
            Err(DriverError::NoSuchJob { .. })
        ));
        assert!(session.unregister_tx(0x200).is_err());
        assert!(bus.sent().is_empty());
        assert!(!session.has_tx(0x200));
    }

    #[test]
    fn test_change_period_without_job_returns_false() {
        let (session, bus, _) = session(1);
        assert!(!session.change_tx_period(0x300, SendPeriod::Every(5)).unwrap());

        session.register_tx(0x300, SendPeriod::Every(10), 1, Some(&[0xAA])).unwrap();
        assert!(session.change_tx_period(0x300, SendPeriod::Every(5)).unwrap());
        let last = bus.last_sent(0x300).unwrap();
        assert_eq!(last.period, SendPeriod::Every(5));
        assert_eq!(last.frame.data[0], 0xAA);
    }

    #[test]
    fn test_unregister_sends_stop() {
        let (session, bus, _) = session(1);
        session.register_tx(0x400, SendPeriod::Every(10), 1, None).unwrap();
        session.unregister_tx(0x400).unwrap();
        assert_eq!(bus.last_sent(0x400).unwrap().period, SendPeriod::Stop);
        assert_eq!(bus.periodic(0x400), None);
        assert!(!session.has_tx(0x400));
    }

    #[test]
    fn test_failed_unregister_keeps_job_for_retry() {
        let (session, bus, _) = session(1);
        session.register_tx(0x400, SendPeriod::Every(10), 1, None).unwrap();
        bus.fail_next_sends(1);
        assert!(matches!(
            session.unregister_tx(0x400),
            Err(DriverError::Can(robocan_can::CanError::BusOff))
        ));
        assert!(session.has_tx(0x400));
        assert!(bus.periodic(0x400).is_some());

        session.unregister_tx(0x400).unwrap();
        assert!(!session.has_tx(0x400));
        assert_eq!(bus.periodic(0x400), None);
        assert_eq!(bus.last_sent(0x400).unwrap().period, SendPeriod::Stop);
    }

    #[test]
    fn test_flush_failure_propagates_without_retry() {
        let (session, bus, _) = session(1);
        session.register_tx(0x500, SendPeriod::Every(10), 1, None).unwrap();
        bus.clear_sent();
        bus.fail_next_sends(1);
        assert!(matches!(
            session.flush_tx(0x500),
            Err(DriverError::Can(robocan_can::CanError::BusOff))
        ));
        assert!(bus.sent().is_empty());
    }

    #[test]
    fn test_modify_does_not_send() {
        let (session, bus, _) = session(1);
        session.register_tx(0x600, SendPeriod::Every(10), 2, None).unwrap();
        bus.clear_sent();
        session.modify_tx(0x600, |p| p[1] = 7).unwrap();
        assert!(bus.sent().is_empty());
        assert_eq!(session.tx_payload(0x600).unwrap()[1], 7);
        session.flush_tx(0x600).unwrap();
        assert_eq!(bus.last_sent(0x600).unwrap().frame.data[1], 7);
    }

    #[test]
    fn test_never_received_is_zero_filled() {
        let (session, _, _) = session(1);
        let outcome = session.get_rx(0x700, Duration::from_millis(50)).unwrap();
        assert!(outcome.is_never_received());
        assert_eq!(outcome.payload(), [0u8; 8]);
    }

    #[test]
    fn test_staleness_boundary() {
        let (session, bus, clock) = session(1);
        bus.inject(CanFrame::new(0x800, &[1, 2, 3]));
        let timeout = Duration::from_millis(50);

        let fresh = session.get_rx(0x800, timeout).unwrap();
        assert!(matches!(fresh, RxOutcome::Fresh(_)));

        clock.advance_ms(50);
        let cached = session.get_rx(0x800, timeout).unwrap();
        assert!(matches!(cached, RxOutcome::Cached { .. }));
        assert_eq!(cached.payload()[..3], [1, 2, 3]);

        clock.advance(Duration::from_micros(1));
        let stale = session.get_rx(0x800, timeout).unwrap();
        assert!(stale.is_stale());
        assert!(!stale.is_ok());
        assert_eq!(stale.payload()[..3], [1, 2, 3]);
    }

    #[test]
    fn test_timeout_clamped_to_999ms() {
        let (session, bus, clock) = session(1);
        bus.inject(CanFrame::new(0x900, &[1]));
        session.get_rx(0x900, Duration::from_secs(5)).unwrap();
        clock.advance_ms(1000);
        assert!(session.get_rx(0x900, Duration::from_secs(5)).unwrap().is_stale());
    }

    #[test]
    fn test_poll_fresh_only_returns_new_frames() {
        let (session, bus, _) = session(1);
        assert_eq!(session.poll_fresh(0xA00).unwrap(), None);
        bus.inject(CanFrame::new(0xA00, &[4]));
        assert_eq!(session.poll_fresh(0xA00).unwrap().map(|f| f.data[0]), Some(4));
        assert_eq!(session.poll_fresh(0xA00).unwrap(), None);
        assert!(session.cached_rx(0xA00).is_some());
        session.discard_rx(0xA00).unwrap();
        assert!(session.cached_rx(0xA00).is_none());
    }

    #[test]
    fn test_drop_stops_periodic_jobs() {
        let (session, bus, _) = session(2);
        session.register_tx(0xB02, SendPeriod::Every(20), 1, None).unwrap();
        session.register_tx(0xC02, SendPeriod::Once, 1, None).unwrap();
        drop(session);
        assert_eq!(bus.last_sent(0xB02).unwrap().period, SendPeriod::Stop);
        assert_eq!(bus.last_sent(0xC02).unwrap().period, SendPeriod::Once);
    }
}
