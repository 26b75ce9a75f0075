//! # Robocan Driver
//!
//! 设备驱动层：在 [`CanTransport`](robocan_can::CanTransport) 之上为每个设备维护会话，
//! 并提供参数校验与电机安全看门狗。
//!
//! - [`session`]：周期发送任务与接收缓存（Fresh / Cached / Stale / NeverReceived）
//! - [`reconcile`]：参数写入、回读比较、有界重发
//! - [`safety`]：看门狗记录、显式注册表、后台巡检线程
//! - [`config`]：TOML 运行参数

pub mod capability;
pub mod config;
mod error;
pub mod reconcile;
pub mod safety;
pub mod session;

pub use capability::{Feedable, SpeedCommandable, Verifiable};
pub use config::{ConfigError, ReconcileConfig, RobocanConfig, SafetyConfig, SessionConfig};
pub use error::DriverError;
pub use reconcile::{Comparison, ParamReport, ParamState, ParameterChannel, ParameterReconciler};
pub use safety::{MotorSafety, SafetyHandle, SafetyRegistry, SafetySweeper, StopMotor};
pub use session::{DeviceSession, RxEntry, RxOutcome, TxJob};
