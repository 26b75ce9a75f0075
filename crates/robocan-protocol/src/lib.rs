//! # Robocan Protocol
//!
//! 机器人控制器 CAN 总线设备协议定义（无硬件依赖）
//!
//! ## 模块
//!
//! - `ids`: 29 位仲裁 ID 与设备号
//! - `codec`: 定宽整数与定点数字段的打包/解包
//! - `talon`: Talon SRX 电机控制器帧布局
//! - `jaguar`: Jaguar 电机控制器帧布局
//! - `pcm`: 气动控制模块帧布局
//! - `pdp`: 配电板帧布局
//!
//! ## 字节序
//!
//! Talon SRX / PCM / PDP 字段为大端（字段内高位在前）；
//! Jaguar 字段为小端，使用 `codec` 中的 `*_le` 函数。

pub mod codec;
pub mod ids;
pub mod jaguar;
pub mod pcm;
pub mod pdp;
pub mod talon;

pub use codec::{Fxp16Scale, Fxp32Scale};
pub use ids::{ArbitrationId, DeviceNumber};

use thiserror::Error;

/// CAN 2.0B 扩展帧（29 位 ID）的统一抽象
///
/// 协议层与传输层之间的中间类型：
///
/// ```text
/// Protocol Layer (robocan-protocol)
///     ↓ TryFrom<CanFrame> 解析 / to_frame() 构建
/// CanFrame (此类型)
///     ↓
/// Transport Layer (robocan-can)
/// ```
///
/// - **Copy**：固定 8 字节，无堆分配，复制给调用方而不共享
/// - `timestamp_us`：接收时间戳（微秒），0 表示不可用
///
/// ```rust
/// use robocan_protocol::CanFrame;
///
/// let frame = CanFrame::new(0x0204_0005, &[0x00, 0x03, 0xFF]);
/// assert_eq!(frame.id(), 0x0204_0005);
/// assert_eq!(frame.data_slice(), &[0x00, 0x03, 0xFF]);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CanFrame {
    /// 29 位仲裁 ID
    pub id: u32,

    /// 帧数据（固定 8 字节，未使用部分为 0）
    pub data: [u8; 8],

    /// 有效数据长度 (0-8)
    pub len: u8,

    /// 接收时间戳（微秒），0 表示不可用
    pub timestamp_us: u64,
}

impl CanFrame {
    /// 创建帧，超过 8 字节的数据被截断
    pub fn new(id: u32, data: &[u8]) -> Self {
        let mut fixed_data = [0u8; 8];
        let len = data.len().min(8);
        fixed_data[..len].copy_from_slice(&data[..len]);

        Self {
            id: id & ids::CAN_MSGID_FULL_M,
            data: fixed_data,
            len: len as u8,
            timestamp_us: 0,
        }
    }

    /// 从完整 8 字节缓冲区和 DLC 创建帧
    pub fn from_payload(id: u32, payload: [u8; 8], len: u8) -> Self {
        Self {
            id: id & ids::CAN_MSGID_FULL_M,
            data: payload,
            len: len.min(8),
            timestamp_us: 0,
        }
    }

    /// 附加时间戳
    pub fn with_timestamp(mut self, timestamp_us: u64) -> Self {
        self.timestamp_us = timestamp_us;
        self
    }

    /// 获取数据切片（只包含有效数据）
    pub fn data_slice(&self) -> &[u8] {
        &self.data[..self.len as usize]
    }

    /// 获取 CAN ID
    pub fn id(&self) -> u32 {
        self.id
    }

    /// 获取完整数据（8字节固定数组）
    pub fn data(&self) -> &[u8; 8] {
        &self.data
    }

    /// 是否为远程请求（无数据的请求帧）
    pub fn is_request(&self) -> bool {
        self.len == 0
    }

    pub(crate) fn expect_id(&self, id: u32) -> Result<(), ProtocolError> {
        if self.id != id {
            return Err(ProtocolError::InvalidCanId { id: self.id });
        }
        Ok(())
    }

    pub(crate) fn expect_len(&self, expected: usize) -> Result<(), ProtocolError> {
        if (self.len as usize) < expected {
            return Err(ProtocolError::InvalidLength {
                expected,
                actual: self.len as usize,
            });
        }
        Ok(())
    }
}

/// 协议解析错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProtocolError {
    #[error("Invalid frame length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("Invalid CAN ID: 0x{id:X}")]
    InvalidCanId { id: u32 },

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Invalid value for field {field}: {value}")]
    InvalidValue { field: String, value: i64 },
}

impl ProtocolError {
    pub fn invalid_value(field: impl Into<String>, value: impl Into<i64>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            value: value.into(),
        }
    }
}
