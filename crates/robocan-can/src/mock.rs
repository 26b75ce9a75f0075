//! 内存模拟总线（feature `mock`）
//!
//! 记录每次 `send` 调用（帧 + 周期），维护周期发送表与"最新帧"接收缓冲。
//! 可注入帧、安装设备应答器（收到帧后回送帧），也可注入发送失败。

use crate::{CanError, CanFrame, CanTransport, SendPeriod, id_matches};
use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::trace;

/// 一次 `send` 调用的记录
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SentFrame {
    pub frame: CanFrame,
    pub period: SendPeriod,
}

type Responder = Box<dyn FnMut(&CanFrame, SendPeriod) -> Vec<CanFrame> + Send>;

#[derive(Default)]
struct MockState {
    sent: Vec<SentFrame>,
    periodic: HashMap<u32, (CanFrame, u32)>,
    // id -> (序号, 帧)，序号用于挑选最新帧
    inbox: HashMap<u32, (u64, CanFrame)>,
    seq: u64,
    fail_sends: usize,
    responder: Option<Responder>,
}

impl MockState {
    fn deliver(&mut self, frame: CanFrame) {
        self.seq += 1;
        self.inbox.insert(frame.id, (self.seq, frame));
    }
}

/// 内存模拟总线
#[derive(Default)]
pub struct MockBus {
    state: Mutex<MockState>,
}

impl MockBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注入一帧到接收缓冲（同 ID 的旧帧被覆盖）
    pub fn inject(&self, frame: CanFrame) {
        self.state.lock().deliver(frame);
    }

    /// 安装设备应答器：每次非 Stop 的发送后调用，返回的帧进入接收缓冲
    pub fn set_responder<F>(&self, responder: F)
    where
        F: FnMut(&CanFrame, SendPeriod) -> Vec<CanFrame> + Send + 'static,
    {
        self.state.lock().responder = Some(Box::new(responder));
    }

    pub fn clear_responder(&self) {
        self.state.lock().responder = None;
    }

    /// 接下来 `count` 次发送返回 `CanError::BusOff`
    pub fn fail_next_sends(&self, count: usize) {
        self.state.lock().fail_sends = count;
    }

    /// 全部发送记录
    pub fn sent(&self) -> Vec<SentFrame> {
        self.state.lock().sent.clone()
    }

    /// 指定 ID 的发送记录
    pub fn sent_to(&self, id: u32) -> Vec<SentFrame> {
        self.state
            .lock()
            .sent
            .iter()
            .filter(|s| s.frame.id == id)
            .copied()
            .collect()
    }

    pub fn last_sent(&self, id: u32) -> Option<SentFrame> {
        self.state
            .lock()
            .sent
            .iter()
            .rev()
            .find(|s| s.frame.id == id)
            .copied()
    }

    pub fn clear_sent(&self) {
        self.state.lock().sent.clear();
    }

    /// 当前周期发送表中的帧与周期
    pub fn periodic(&self, id: u32) -> Option<(CanFrame, u32)> {
        self.state.lock().periodic.get(&id).copied()
    }

    /// 接收缓冲中是否有该 ID 的未消费帧
    pub fn has_pending(&self, id: u32) -> bool {
        self.state.lock().inbox.contains_key(&id)
    }
}

impl CanTransport for MockBus {
    fn send(&self, frame: &CanFrame, period: SendPeriod) -> Result<(), CanError> {
        let mut state = self.state.lock();
        if state.fail_sends > 0 {
            state.fail_sends -= 1;
            return Err(CanError::BusOff);
        }

        state.sent.push(SentFrame {
            frame: *frame,
            period,
        });
        match period {
            SendPeriod::Every(ms) if ms > 0 => {
                state.periodic.insert(frame.id, (*frame, ms));
            },
            SendPeriod::Stop => {
                state.periodic.remove(&frame.id);
                trace!("mock: stop periodic 0x{:08X}", frame.id);
                return Ok(());
            },
            _ => {},
        }
        trace!("mock: sent 0x{:08X} {:?}", frame.id, period);

        if let Some(mut responder) = state.responder.take() {
            for reply in responder(frame, period) {
                state.deliver(reply);
            }
            // 应答器内部没有再次安装新的应答器时放回
            if state.responder.is_none() {
                state.responder = Some(responder);
            }
        }
        Ok(())
    }

    fn receive(&self, id: u32, mask: u32) -> Result<CanFrame, CanError> {
        let mut state = self.state.lock();
        let latest = state
            .inbox
            .iter()
            .filter(|(frame_id, _)| id_matches(**frame_id, id, mask))
            .max_by_key(|(_, (seq, _))| *seq)
            .map(|(frame_id, _)| *frame_id);
        match latest.and_then(|frame_id| state.inbox.remove(&frame_id)) {
            Some((_, frame)) => Ok(frame),
            None => Err(CanError::MessageNotFound { id }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FULL_ID_MASK;

    #[test]
    fn test_records_sends_with_period() {
        let bus = MockBus::new();
        let frame = CanFrame::new(0x0204_0005, &[0, 0, 0]);
        bus.send(&frame, SendPeriod::Every(10)).unwrap();
        bus.send(&frame, SendPeriod::Once).unwrap();

        let sent = bus.sent_to(0x0204_0005);
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].period, SendPeriod::Every(10));
        assert_eq!(bus.periodic(0x0204_0005), Some((frame, 10)));
    }

    #[test]
    fn test_stop_cancels_periodic() {
        let bus = MockBus::new();
        let frame = CanFrame::new(0x10, &[1]);
        bus.send(&frame, SendPeriod::Every(20)).unwrap();
        bus.send(&frame, SendPeriod::Stop).unwrap();
        assert_eq!(bus.periodic(0x10), None);
    }

    #[test]
    fn test_receive_is_consume_once() {
        let bus = MockBus::new();
        bus.inject(CanFrame::new(0x20, &[7]));
        assert_eq!(bus.receive(0x20, FULL_ID_MASK).unwrap().data[0], 7);
        assert!(bus.receive(0x20, FULL_ID_MASK).unwrap_err().is_not_found());
    }

    #[test]
    fn test_receive_returns_latest_matching() {
        let bus = MockBus::new();
        bus.inject(CanFrame::new(0x21, &[1]));
        bus.inject(CanFrame::new(0x22, &[2]));
        bus.inject(CanFrame::new(0x21, &[3]));
        let frame = bus.receive(0x20, !0x0F).unwrap();
        assert_eq!(frame.id, 0x21);
        assert_eq!(frame.data[0], 3);
    }

    #[test]
    fn test_responder_echoes() {
        let bus = MockBus::new();
        bus.set_responder(|frame, _| vec![CanFrame::new(frame.id | 0x40, frame.data_slice())]);
        bus.send(&CanFrame::new(0x100, &[9]), SendPeriod::Once).unwrap();
        assert!(bus.has_pending(0x140));
        bus.send(&CanFrame::new(0x100, &[9]), SendPeriod::Stop).unwrap();
    }

    #[test]
    fn test_injected_send_failures() {
        let bus = MockBus::new();
        bus.fail_next_sends(1);
        let frame = CanFrame::new(0x1, &[]);
        assert!(matches!(bus.send(&frame, SendPeriod::Once), Err(CanError::BusOff)));
        assert!(bus.send(&frame, SendPeriod::Once).is_ok());
        assert_eq!(bus.sent().len(), 1);
    }
}
