//! 驱动层错误类型定义

use robocan_can::CanError;
use robocan_protocol::ProtocolError;
use thiserror::Error;

/// 驱动层错误类型
#[derive(Error, Debug)]
pub enum DriverError {
    /// CAN 传输错误（总线关闭、缓冲区非法、不允许的操作等）
    #[error("CAN transport error: {0}")]
    Can(#[from] CanError),

    /// 协议编码/解析错误
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// 会话中没有该 ID 的发送任务（不会隐式创建）
    #[error("No TX job registered for 0x{id:08X}")]
    NoSuchJob { id: u32 },

    /// 数据长度超过 8 字节
    #[error("Invalid DLC {dlc} (must be 0-8)")]
    InvalidDlc { dlc: usize },

    /// 配置错误
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),
}
