//! Robocan SDK - 机器人控制器 CAN 设备 Rust SDK
//!
//! 本 SDK 采用分层架构，从底层到高层：
//!
//! - **协议层** (`protocol`): 帧编解码、仲裁 ID、各设备帧布局
//! - **CAN 层** (`can`): 周期发送 / 最新帧接收的总线抽象，SocketCAN 与内存总线
//! - **驱动层** (`driver`): 设备会话、参数校验、电机看门狗、配置
//! - **设备层** (`devices`): Talon SRX、Jaguar、PCM、PDP
//!
//! # 快速开始
//!
//! ```rust
//! use robocan_sdk::can::MockBus;
//! use robocan_sdk::prelude::*;
//! use std::sync::Arc;
//!
//! robocan_sdk::init_logging();
//!
//! let bus = Arc::new(MockBus::new());
//! let safety = SafetyRegistry::new();
//! let ctx = DeviceContext::new(bus.clone(), safety.clone());
//!
//! let talon = TalonSrx::new(&ctx, 5)?;
//! talon.set(0.25)?;
//! assert!(bus.periodic(0x0204_0005).is_some());
//! # Ok::<(), DeviceError>(())
//! ```

pub use robocan_can as can;
pub use robocan_devices as devices;
pub use robocan_driver as driver;
pub use robocan_protocol as protocol;

pub mod prelude;

pub use robocan_can::{CanError, CanTransport, SendPeriod};
pub use robocan_devices::{DeviceContext, DeviceError, Jaguar, Pcm, Pdp, Sample, TalonSrx};
pub use robocan_driver::{DriverError, RobocanConfig, SafetyRegistry, SafetySweeper};
pub use robocan_protocol::{CanFrame, ProtocolError};

use std::sync::Once;
use tracing_subscriber::EnvFilter;

/// 未设置 `RUST_LOG` 时的过滤规则
pub const DEFAULT_LOG_FILTER: &str = "robocan=info";

static LOGGING: Once = Once::new();

/// 安装 fmt 订阅者与 `log` 桥接；重复调用无副作用
///
/// 已有全局订阅者（例如测试框架安装的）时保留原订阅者。
pub fn init_logging() {
    LOGGING.call_once(|| {
        let _ = tracing_log::LogTracer::init();

        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .finish();
        if tracing::subscriber::set_global_default(subscriber).is_err() {
            tracing::debug!("Global subscriber already installed");
        }
    });
}
