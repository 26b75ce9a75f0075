//! Prelude - 常用类型的便捷导入
//!
//! ```rust
//! use robocan_sdk::prelude::*;
//! ```

// 设备层
pub use robocan_devices::{DeviceContext, DeviceError, Freshness, Jaguar, Pcm, Pdp, Sample, TalonSrx};

// 能力 trait
pub use robocan_driver::{Feedable, SpeedCommandable, Verifiable};

// 看门狗与配置
pub use robocan_driver::{RobocanConfig, SafetyRegistry, SafetySweeper};

// 总线
pub use robocan_can::{CanTransport, Clock, ManualClock, MonotonicClock, SendPeriod};
#[cfg(feature = "mock")]
pub use robocan_can::MockBus;

// 错误类型
pub use robocan_can::CanError;
pub use robocan_driver::DriverError;
pub use robocan_protocol::ProtocolError;
