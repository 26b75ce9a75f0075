//! SocketCAN 传输（Linux）
//!
//! 在 SocketCAN 上模拟控制器平台的 CAN 接口：
//!
//! - **TX 线程**：维护周期发送表，按各 ID 的周期重发最新负载
//! - **RX 线程**：持续读取总线，按 ID 只保留最新一帧，`receive` 时取出
//!
//! 两个线程各持有一个 socket，互不竞争锁。

use crate::{
    CanDeviceError, CanDeviceErrorKind, CanError, CanFrame, CanTransport, Clock, MonotonicClock,
    SendPeriod, id_matches,
};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};
use parking_lot::Mutex;
use socketcan::{
    BlockingCan, CanError as SocketCanError, CanErrorFrame, CanFrame as SocketCanFrame,
    CanSocket, EmbeddedFrame, ExtendedId, Frame, Socket,
};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, trace, warn};

mod interface_check;

use interface_check::check_interface_status;

/// RX 线程读取超时（用于检查退出标志）
const RX_POLL_TIMEOUT: Duration = Duration::from_millis(10);
/// 无周期任务时 TX 线程的空闲等待
const TX_IDLE_WAIT: Duration = Duration::from_millis(50);

struct PeriodicJob {
    frame: CanFrame,
    period: Duration,
    next_due: Instant,
}

struct Shared {
    tx_socket: Mutex<CanSocket>,
    periodic: Mutex<HashMap<u32, PeriodicJob>>,
    // id -> (序号, 帧)
    latest: Mutex<HashMap<u32, (u64, CanFrame)>>,
    seq: Mutex<u64>,
    bus_off: AtomicBool,
    running: AtomicBool,
    clock: MonotonicClock,
}

/// SocketCAN 传输
///
/// # 示例
///
/// ```no_run
/// use robocan_can::{CanTransport, SendPeriod, SocketCanTransport};
/// use robocan_protocol::CanFrame;
///
/// let bus = SocketCanTransport::new("can0").unwrap();
/// let frame = CanFrame::new(0x0204_0005, &[0, 0, 0, 0, 0, 0, 0, 0]);
/// bus.send(&frame, SendPeriod::Every(10)).unwrap();
/// ```
pub struct SocketCanTransport {
    interface: String,
    shared: Arc<Shared>,
    wake_tx: Sender<()>,
    tx_thread: Option<JoinHandle<()>>,
    rx_thread: Option<JoinHandle<()>>,
}

impl SocketCanTransport {
    /// 打开接口并启动 TX / RX 线程
    ///
    /// # 错误
    /// - `CanError::Device`：接口不存在、未启动或无法打开
    /// - `CanError::Io`：设置 socket 选项失败
    pub fn new(interface: impl Into<String>) -> Result<Self, CanError> {
        let interface = interface.into();

        if !check_interface_status(&interface)? {
            return Err(CanError::Device(CanDeviceError::new(
                CanDeviceErrorKind::NotUp,
                format!(
                    "CAN interface '{}' exists but is not UP. Please start it first:\n  sudo ip link set up {}",
                    interface, interface
                ),
            )));
        }

        let open = |role: &str| {
            CanSocket::open(&interface).map_err(|e| {
                CanError::Device(CanDeviceError::new(
                    CanDeviceErrorKind::Backend,
                    format!("Failed to open CAN interface '{}' ({}): {}", interface, role, e),
                ))
            })
        };
        let tx_socket = open("tx")?;
        let rx_socket = open("rx")?;
        rx_socket.set_read_timeout(RX_POLL_TIMEOUT).map_err(CanError::Io)?;

        let shared = Arc::new(Shared {
            tx_socket: Mutex::new(tx_socket),
            periodic: Mutex::new(HashMap::new()),
            latest: Mutex::new(HashMap::new()),
            seq: Mutex::new(0),
            bus_off: AtomicBool::new(false),
            running: AtomicBool::new(true),
            clock: MonotonicClock::new(),
        });

        let (wake_tx, wake_rx) = bounded(1);

        let tx_shared = shared.clone();
        let tx_thread = thread::Builder::new()
            .name(format!("robocan-tx-{}", interface))
            .spawn(move || tx_loop(tx_shared, wake_rx))
            .map_err(CanError::Io)?;

        let rx_shared = shared.clone();
        let rx_thread = thread::Builder::new()
            .name(format!("robocan-rx-{}", interface))
            .spawn(move || rx_loop(rx_shared, rx_socket))
            .map_err(CanError::Io)?;

        debug!("SocketCAN transport started on '{}'", interface);
        Ok(Self {
            interface,
            shared,
            wake_tx,
            tx_thread: Some(tx_thread),
            rx_thread: Some(rx_thread),
        })
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }

    /// 当前周期发送的 ID 数量
    pub fn periodic_count(&self) -> usize {
        self.shared.periodic.lock().len()
    }
}

impl CanTransport for SocketCanTransport {
    fn send(&self, frame: &CanFrame, period: SendPeriod) -> Result<(), CanError> {
        match period {
            SendPeriod::Stop => {
                self.shared.periodic.lock().remove(&frame.id);
                trace!("Stopped periodic frame 0x{:08X}", frame.id);
                return Ok(());
            },
            SendPeriod::Every(ms) if ms > 0 => {
                let period = Duration::from_millis(ms as u64);
                self.shared.periodic.lock().insert(
                    frame.id,
                    PeriodicJob {
                        frame: *frame,
                        period,
                        next_due: Instant::now() + period,
                    },
                );
                // 唤醒 TX 线程重新计算下一次到期时间；通道满说明已有待处理的唤醒
                let _ = self.wake_tx.try_send(());
            },
            _ => {},
        }
        self.shared.transmit(frame)
    }

    fn receive(&self, id: u32, mask: u32) -> Result<CanFrame, CanError> {
        let mut latest = self.shared.latest.lock();
        let found = latest
            .iter()
            .filter(|(frame_id, _)| id_matches(**frame_id, id, mask))
            .max_by_key(|(_, (seq, _))| *seq)
            .map(|(frame_id, _)| *frame_id);
        match found.and_then(|frame_id| latest.remove(&frame_id)) {
            Some((_, frame)) => Ok(frame),
            None => Err(CanError::MessageNotFound { id }),
        }
    }
}

impl Shared {
    fn transmit(&self, frame: &CanFrame) -> Result<(), CanError> {
        if self.bus_off.load(Ordering::Acquire) {
            return Err(CanError::BusOff);
        }
        let can_frame = ExtendedId::new(frame.id)
            .and_then(|id| SocketCanFrame::new(id, frame.data_slice()))
            .ok_or_else(|| {
                CanError::InvalidBuffer(format!(
                    "Failed to create extended frame with ID 0x{:X}, len {}",
                    frame.id, frame.len
                ))
            })?;

        self.tx_socket.lock().transmit(&can_frame).map_err(|e| {
            CanError::Io(std::io::Error::other(format!(
                "SocketCAN transmit error: {}",
                e
            )))
        })?;
        trace!("Sent CAN frame: ID=0x{:08X}, len={}", frame.id, frame.len);
        Ok(())
    }

    fn store(&self, frame: CanFrame) {
        let seq = {
            let mut seq = self.seq.lock();
            *seq += 1;
            *seq
        };
        self.latest.lock().insert(frame.id, (seq, frame));
    }
}

fn tx_loop(shared: Arc<Shared>, wake_rx: Receiver<()>) {
    while shared.running.load(Ordering::Acquire) {
        let now = Instant::now();
        let mut due = Vec::new();
        let mut next_wake = now + TX_IDLE_WAIT;
        {
            let mut periodic = shared.periodic.lock();
            for job in periodic.values_mut() {
                if job.next_due <= now {
                    due.push(job.frame);
                    // 落后多个周期时不补发，从当前时刻重新计时
                    job.next_due = (job.next_due + job.period).max(now);
                }
                next_wake = next_wake.min(job.next_due);
            }
        }

        for frame in &due {
            if let Err(e) = shared.transmit(frame) {
                warn!("Periodic send of 0x{:08X} failed: {}", frame.id, e);
            }
        }

        let wait = next_wake.saturating_duration_since(Instant::now());
        match wake_rx.recv_timeout(wait) {
            Ok(()) | Err(RecvTimeoutError::Timeout) => {},
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    trace!("TX thread exiting");
}

fn rx_loop(shared: Arc<Shared>, socket: CanSocket) {
    while shared.running.load(Ordering::Acquire) {
        let can_frame = match socket.read_frame() {
            Ok(frame) => frame,
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => continue,
            Err(e) => {
                error!("RX thread: CAN receive error: {}", e);
                continue;
            },
        };

        if can_frame.is_error_frame() {
            handle_error_frame(&shared, can_frame);
            continue;
        }
        if !can_frame.is_extended() {
            trace!("Ignoring standard frame 0x{:X}", can_frame.raw_id());
            continue;
        }

        // 收到有效数据帧说明总线已恢复
        shared.bus_off.store(false, Ordering::Release);

        let frame = CanFrame::new(can_frame.raw_id(), can_frame.data())
            .with_timestamp(shared.clock.now_us());
        trace!(
            "Received CAN frame: ID=0x{:08X}, len={}, timestamp_us={}",
            frame.id, frame.len, frame.timestamp_us
        );
        shared.store(frame);
    }
    trace!("RX thread exiting");
}

fn handle_error_frame(shared: &Shared, can_frame: SocketCanFrame) {
    let Ok(error_frame) = CanErrorFrame::try_from(can_frame) else {
        warn!("Received CAN error frame but failed to parse, ignoring");
        return;
    };
    match SocketCanError::from(error_frame) {
        SocketCanError::BusOff => {
            error!("CAN Bus Off error detected");
            shared.bus_off.store(true, Ordering::Release);
        },
        other => warn!("CAN Error Frame received: {}, ignoring", other),
    }
}

impl Drop for SocketCanTransport {
    fn drop(&mut self) {
        self.shared.running.store(false, Ordering::Release);
        let _ = self.wake_tx.try_send(());
        for handle in [self.tx_thread.take(), self.rx_thread.take()]
            .into_iter()
            .flatten()
        {
            if handle.join().is_err() {
                error!("SocketCAN worker thread panicked");
            }
        }
        trace!("SocketCAN transport on '{}' closed", self.interface);
    }
}
