//! 设备上下文
//!
//! 汇集总线、时钟、看门狗注册表与配置，设备构造时从这里创建会话。

use robocan_can::{CanTransport, Clock, MonotonicClock};
use robocan_driver::{DeviceSession, RobocanConfig, SafetyRegistry};
use robocan_protocol::DeviceNumber;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub struct DeviceContext {
    transport: Arc<dyn CanTransport>,
    clock: Arc<dyn Clock>,
    safety: Arc<SafetyRegistry>,
    config: RobocanConfig,
}

impl DeviceContext {
    pub fn new(transport: Arc<dyn CanTransport>, safety: Arc<SafetyRegistry>) -> Self {
        Self {
            transport,
            clock: Arc::new(MonotonicClock::new()),
            safety,
            config: RobocanConfig::default(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_config(mut self, config: RobocanConfig) -> Self {
        self.config = config;
        self
    }

    pub fn transport(&self) -> &Arc<dyn CanTransport> {
        &self.transport
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn safety(&self) -> &Arc<SafetyRegistry> {
        &self.safety
    }

    pub fn config(&self) -> &RobocanConfig {
        &self.config
    }

    pub fn rx_timeout(&self) -> Duration {
        Duration::from_millis(self.config.session.default_rx_timeout_ms)
    }

    /// 为设备创建新会话
    pub fn session(&self, device: DeviceNumber) -> Arc<DeviceSession> {
        Arc::new(DeviceSession::new(
            device,
            self.transport.clone(),
            self.clock.clone(),
        ))
    }
}
