//! # Robocan Devices
//!
//! 机器人控制器 CAN 设备门面：
//!
//! - [`TalonSrx`]：Talon SRX 电机控制器（Control 1 周期帧、状态帧、参数校验）
//! - [`Jaguar`]：Jaguar 电机控制器（受信任设定值、周期状态、参数校验）
//! - [`Pcm`]：气动控制模块（电磁阀、压缩机闭环、单次脉冲）
//! - [`Pdp`]：配电板（通道电流、母线电压、能量统计）
//!
//! 所有设备通过 [`DeviceContext`] 共享同一条总线、时钟、看门狗注册表和配置。
//! 状态读取返回 [`Sample`]，由调用方区分新数据、缓存、过期与从未收到。
//!
//! ```rust,no_run
//! use robocan_can::MockBus;
//! use robocan_devices::{DeviceContext, TalonSrx};
//! use robocan_driver::{SafetyRegistry, SpeedCommandable};
//! use std::sync::Arc;
//!
//! let ctx = DeviceContext::new(Arc::new(MockBus::new()), SafetyRegistry::new());
//! let talon = TalonSrx::new(&ctx, 5)?;
//! talon.set(0.5)?;
//! # Ok::<(), robocan_devices::DeviceError>(())
//! ```

mod context;
mod error;
pub mod jaguar;
pub mod pcm;
pub mod pdp;
mod sample;
pub mod talon;

pub use context::DeviceContext;
pub use error::DeviceError;
pub use jaguar::Jaguar;
pub use pcm::Pcm;
pub use pdp::Pdp;
pub use sample::{Freshness, Sample};
pub use talon::TalonSrx;
