//! 设备门面错误类型

use robocan_can::CanError;
use robocan_driver::DriverError;
use robocan_protocol::ProtocolError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// 当前控制模式不支持该操作
    #[error("{operation} is not supported in {mode} mode")]
    UnsupportedMode {
        mode: String,
        operation: &'static str,
    },
}

impl From<CanError> for DeviceError {
    fn from(err: CanError) -> Self {
        DeviceError::Driver(DriverError::Can(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_can_error_wraps_through_driver() {
        let err: DeviceError = CanError::BusOff.into();
        assert!(matches!(err, DeviceError::Driver(DriverError::Can(CanError::BusOff))));
        assert!(err.to_string().contains("Bus off"));
    }

    #[test]
    fn test_unsupported_mode_display() {
        let err = DeviceError::UnsupportedMode {
            mode: "PercentVbus".to_string(),
            operation: "set_pid",
        };
        assert_eq!(err.to_string(), "set_pid is not supported in PercentVbus mode");
    }
}
