//! # Robocan CAN Transport Layer
//!
//! CAN 总线传输抽象：平台负责周期发送与"最新帧"接收缓冲，上层只做调度与判定。
//!
//! - `send(frame, period)`：一次性发送、周期发送或停止周期发送
//! - `receive(id, mask)`：取出匹配 `id & mask` 的最新未消费帧，非阻塞
//!
//! 接收"未找到"是可恢复状态（`CanError::MessageNotFound`），与其他致命错误区分。

use thiserror::Error;

// 重新导出 robocan-protocol 中的 CanFrame
pub use robocan_protocol::CanFrame;

pub mod clock;
pub use clock::{Clock, ManualClock, MonotonicClock};

#[cfg(any(test, feature = "mock"))]
pub mod mock;
#[cfg(any(test, feature = "mock"))]
pub use mock::{MockBus, SentFrame};

#[cfg(target_os = "linux")]
pub mod socketcan;
#[cfg(target_os = "linux")]
pub use socketcan::SocketCanTransport;

/// 全 29 位匹配掩码
pub const FULL_ID_MASK: u32 = 0x1fff_ffff;

/// 发送周期
///
/// 对应平台接口的整数周期：`Once` = 0，`Stop` = -1，`Every(ms)` = ms。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SendPeriod {
    /// 只发送一次，不重复
    Once,
    /// 以给定毫秒周期重复发送，替换该 ID 之前的负载与周期
    Every(u32),
    /// 取消该 ID 的周期发送
    Stop,
}

impl SendPeriod {
    /// 平台整数周期编码
    pub const STOP_SENTINEL: i32 = -1;

    pub fn from_millis(period_ms: i32) -> Self {
        match period_ms {
            0 => SendPeriod::Once,
            p if p < 0 => SendPeriod::Stop,
            p => SendPeriod::Every(p as u32),
        }
    }

    pub fn as_millis(self) -> i32 {
        match self {
            SendPeriod::Once => 0,
            SendPeriod::Stop => Self::STOP_SENTINEL,
            SendPeriod::Every(ms) => ms.min(i32::MAX as u32) as i32,
        }
    }

    pub fn is_periodic(self) -> bool {
        matches!(self, SendPeriod::Every(ms) if ms > 0)
    }
}

/// CAN 传输层统一错误类型
#[derive(Error, Debug)]
pub enum CanError {
    /// 当前没有匹配的帧（可恢复，下个周期重试）
    #[error("No matching frame buffered for 0x{id:08X}")]
    MessageNotFound { id: u32 },
    #[error("Invalid buffer: {0}")]
    InvalidBuffer(String),
    #[error("Bus off")]
    BusOff,
    #[error("Operation not allowed: {0}")]
    NotAllowed(String),
    #[error("Buffer overflow")]
    BufferOverflow,
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Device Error: {0}")]
    Device(#[from] CanDeviceError),
}

impl CanError {
    /// 是否为可恢复的"未找到"状态
    pub fn is_not_found(&self) -> bool {
        matches!(self, CanError::MessageNotFound { .. })
    }
}

/// 设备/后端错误的结构化分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CanDeviceErrorKind {
    Unknown,
    NotFound,
    NotUp,
    AccessDenied,
    InvalidFrame,
    Backend,
}

/// 结构化设备错误
#[derive(Error, Debug, Clone)]
#[error("{kind:?}: {message}")]
pub struct CanDeviceError {
    pub kind: CanDeviceErrorKind,
    pub message: String,
}

impl CanDeviceError {
    pub fn new(kind: CanDeviceErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(
            self.kind,
            CanDeviceErrorKind::NotFound | CanDeviceErrorKind::AccessDenied
        )
    }
}

impl From<String> for CanDeviceError {
    fn from(message: String) -> Self {
        Self::new(CanDeviceErrorKind::Unknown, message)
    }
}

impl From<&str> for CanDeviceError {
    fn from(message: &str) -> Self {
        Self::new(CanDeviceErrorKind::Unknown, message)
    }
}

/// CAN 总线传输接口
///
/// 实现方在内部完成同步，可在多个设备会话之间共享（`Arc<dyn CanTransport>`）。
pub trait CanTransport: Send + Sync {
    /// 发送帧
    ///
    /// - `SendPeriod::Once`：一次性发送
    /// - `SendPeriod::Every(ms)`：(重新)安排周期发送，替换之前的负载与周期
    /// - `SendPeriod::Stop`：取消该 ID 的周期发送
    fn send(&self, frame: &CanFrame, period: SendPeriod) -> Result<(), CanError>;

    /// 取出匹配 `id & mask` 的最新未消费帧
    ///
    /// 不等待；没有缓冲帧时返回 `CanError::MessageNotFound`。
    fn receive(&self, id: u32, mask: u32) -> Result<CanFrame, CanError>;
}

impl<T: CanTransport + ?Sized> CanTransport for std::sync::Arc<T> {
    fn send(&self, frame: &CanFrame, period: SendPeriod) -> Result<(), CanError> {
        (**self).send(frame, period)
    }

    fn receive(&self, id: u32, mask: u32) -> Result<CanFrame, CanError> {
        (**self).receive(id, mask)
    }
}

/// `frame_id` 是否匹配 `id & mask`
pub fn id_matches(frame_id: u32, id: u32, mask: u32) -> bool {
    frame_id & mask == id & mask
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_period_encoding() {
        assert_eq!(SendPeriod::from_millis(0), SendPeriod::Once);
        assert_eq!(SendPeriod::from_millis(-1), SendPeriod::Stop);
        assert_eq!(SendPeriod::from_millis(10), SendPeriod::Every(10));
        assert_eq!(SendPeriod::Stop.as_millis(), -1);
        assert_eq!(SendPeriod::Every(20).as_millis(), 20);
        assert!(SendPeriod::Every(20).is_periodic());
        assert!(!SendPeriod::Once.is_periodic());
        assert!(!SendPeriod::Every(0).is_periodic());
    }

    #[test]
    fn test_not_found_is_distinct() {
        let err = CanError::MessageNotFound { id: 0x0204_1405 };
        assert!(err.is_not_found());
        assert!(!CanError::BusOff.is_not_found());
        assert_eq!(err.to_string(), "No matching frame buffered for 0x02041405");
    }

    #[test]
    fn test_id_matches_with_mask() {
        assert!(id_matches(0x0204_1405, 0x0204_1405, FULL_ID_MASK));
        assert!(!id_matches(0x0204_1406, 0x0204_1405, FULL_ID_MASK));
        // 忽略设备号
        assert!(id_matches(0x0204_1406, 0x0204_1400, !0x3F));
    }

    #[test]
    fn test_device_error_fatal() {
        let err = CanDeviceError::new(CanDeviceErrorKind::NotFound, "can9");
        assert!(err.is_fatal());
        let err: CanDeviceError = "oops".into();
        assert_eq!(err.kind, CanDeviceErrorKind::Unknown);
        assert!(!err.is_fatal());
    }
}
