//! 配电板（PDP）
//!
//! 只读设备：16 路电流分布在 Status 1/2/3，Status 3 尾部为母线电压与温度，
//! 能量帧给出总电流、功率与累计能量。状态超过 100 ms 视为过期。

use crate::context::DeviceContext;
use crate::error::DeviceError;
use crate::sample::Sample;
use robocan_driver::DeviceSession;
use robocan_protocol::DeviceNumber;
use robocan_protocol::pdp::{self, PdpEnergy, PdpStatus3Extra};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub struct Pdp {
    session: Arc<DeviceSession>,
}

impl Pdp {
    pub fn new(ctx: &DeviceContext, device: u8) -> Result<Self, DeviceError> {
        let device = DeviceNumber::new(device)?;
        info!("PDP {} created", device);
        Ok(Self {
            session: ctx.session(device),
        })
    }

    pub fn device(&self) -> DeviceNumber {
        self.session.device()
    }

    fn read<T>(&self, base: u32, decode: impl FnOnce(&[u8; 8]) -> T) -> Result<Sample<T>, DeviceError> {
        let outcome = self.session.get_rx(
            self.session.id(base),
            Duration::from_millis(pdp::STATUS_TIMEOUT_MS),
        )?;
        Ok(Sample::from_outcome(&outcome, decode))
    }

    /// 通道电流（A），通道 [0, 15]
    pub fn current(&self, channel: u8) -> Result<Sample<f64>, DeviceError> {
        let (base, index) = pdp::channel_location(channel)?;
        self.read(base, |payload| pdp::channel_current(payload, index))
    }

    pub fn voltage(&self) -> Result<Sample<f64>, DeviceError> {
        self.read(pdp::STATUS_3, |p| PdpStatus3Extra::from_payload(p).bus_voltage())
    }

    /// 温度（°C）
    pub fn temperature(&self) -> Result<Sample<f64>, DeviceError> {
        self.read(pdp::STATUS_3, |p| PdpStatus3Extra::from_payload(p).temperature())
    }

    pub fn energy(&self) -> Result<Sample<PdpEnergy>, DeviceError> {
        self.read(pdp::STATUS_ENERGY, PdpEnergy::from_payload)
    }

    pub fn total_current(&self) -> Result<Sample<f64>, DeviceError> {
        Ok(self.energy()?.map(|e| e.total_current()))
    }

    /// 总功率（W）
    pub fn total_power(&self) -> Result<Sample<f64>, DeviceError> {
        Ok(self.energy()?.map(|e| e.total_power()))
    }

    /// 累计能量（J）
    pub fn total_energy(&self) -> Result<Sample<f64>, DeviceError> {
        Ok(self.energy()?.map(|e| e.total_energy()))
    }

    pub fn reset_total_energy(&self) -> Result<(), DeviceError> {
        self.session
            .send_once(&pdp::control_frame(self.device(), pdp::CONTROL_RESET_ENERGY))?;
        Ok(())
    }

    pub fn clear_sticky_faults(&self) -> Result<(), DeviceError> {
        self.session.send_once(&pdp::control_frame(
            self.device(),
            pdp::CONTROL_CLEAR_STICKY_FAULTS,
        ))?;
        Ok(())
    }
}
