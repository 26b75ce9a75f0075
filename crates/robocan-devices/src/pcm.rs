//! 气动控制模块（PCM）
//!
//! Control 1（电磁阀位、压缩机闭环使能、单次脉冲计数）以 20 ms 周期发送；
//! Control 3（单次脉冲时长）在首次设置时长时注册。状态帧超过 50 ms 视为过期。

use crate::context::DeviceContext;
use crate::error::DeviceError;
use crate::sample::Sample;
use robocan_can::SendPeriod;
use robocan_driver::DeviceSession;
use robocan_protocol::DeviceNumber;
use robocan_protocol::pcm::{self, PcmControl, PcmDebug, PcmStatus, PcmStatusFault};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

pub struct Pcm {
    session: Arc<DeviceSession>,
    control_id: u32,
    durations_id: u32,
}

impl Pcm {
    /// 注册 Control 1 并启用压缩机闭环
    pub fn new(ctx: &DeviceContext, device: u8) -> Result<Self, DeviceError> {
        let device = DeviceNumber::new(device)?;
        let session = ctx.session(device);
        let control_id = session.id(pcm::CONTROL_1);
        let durations_id = session.id(pcm::CONTROL_3);

        let mut control = PcmControl::default();
        control.set_closed_loop_enable(true);
        let mut payload = [0u8; 8];
        control.write_into(&mut payload);
        session.register_tx(
            control_id,
            SendPeriod::Every(pcm::CONTROL_PERIOD_MS),
            pcm::CONTROL_1_LEN,
            Some(&payload[..pcm::CONTROL_1_LEN]),
        )?;

        info!("PCM {} created", device);
        Ok(Self {
            session,
            control_id,
            durations_id,
        })
    }

    pub fn device(&self) -> DeviceNumber {
        self.session.device()
    }

    // ------------------------------------------------------------------
    // 控制
    // ------------------------------------------------------------------

    fn update_control<R>(&self, f: impl FnOnce(&mut PcmControl) -> R) -> Result<R, DeviceError> {
        let result = self.session.update_tx(self.control_id, |payload| {
            let mut control = PcmControl::from_payload(payload);
            let result = f(&mut control);
            control.write_into(payload);
            result
        })?;
        Ok(result)
    }

    /// 当前 Control 1 负载
    pub fn control(&self) -> Option<PcmControl> {
        self.session
            .tx_payload(self.control_id)
            .map(|payload| PcmControl::from_payload(&payload))
    }

    pub fn set_solenoid(&self, channel: u8, on: bool) -> Result<(), DeviceError> {
        let channel = pcm::check_channel(channel)?;
        self.update_control(|c| c.set_solenoid(channel, on))
    }

    /// 已下发的电磁阀输出位
    pub fn commanded_solenoids(&self) -> u8 {
        self.control().map(|c| c.solenoid_bits).unwrap_or(0)
    }

    pub fn set_closed_loop_control(&self, enabled: bool) -> Result<(), DeviceError> {
        debug!("PCM {} closed loop -> {}", self.device(), enabled);
        self.update_control(|c| c.set_closed_loop_enable(enabled))
    }

    pub fn closed_loop_control(&self) -> bool {
        self.control()
            .map(|c| c.byte3.closed_loop_enable())
            .unwrap_or(false)
    }

    /// 触发单次脉冲（时长由 `set_one_shot_duration` 决定）
    pub fn fire_one_shot(&self, channel: u8) -> Result<(), DeviceError> {
        let channel = pcm::check_channel(channel)?;
        self.update_control(|c| c.fire_one_shot(channel))
    }

    /// 单次脉冲时长，10 ms 分辨率，上限 2550 ms
    pub fn set_one_shot_duration(&self, channel: u8, duration_ms: u32) -> Result<(), DeviceError> {
        let channel = pcm::check_channel(channel)?;
        let units = pcm::one_shot_duration_units(duration_ms);
        if !self.session.has_tx(self.durations_id) {
            self.session.register_tx(
                self.durations_id,
                SendPeriod::Every(pcm::CONTROL_PERIOD_MS),
                pcm::CONTROL_3_LEN,
                None,
            )?;
        }
        self.session.update_tx(self.durations_id, |payload| {
            payload[channel as usize] = units;
        })?;
        Ok(())
    }

    pub fn clear_all_sticky_faults(&self) -> Result<(), DeviceError> {
        self.session
            .send_once(&pcm::clear_sticky_faults_frame(self.device()))?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // 状态
    // ------------------------------------------------------------------

    fn read<T>(&self, base: u32, decode: impl FnOnce(&[u8; 8]) -> T) -> Result<Sample<T>, DeviceError> {
        let outcome = self.session.get_rx(
            self.session.id(base),
            Duration::from_millis(pcm::STATUS_TIMEOUT_MS),
        )?;
        Ok(Sample::from_outcome(&outcome, decode))
    }

    pub fn status(&self) -> Result<Sample<PcmStatus>, DeviceError> {
        self.read(pcm::STATUS_1, PcmStatus::from_payload)
    }

    pub fn solenoid_faults(&self) -> Result<Sample<PcmStatusFault>, DeviceError> {
        self.read(pcm::STATUS_SOL_FAULTS, PcmStatusFault::from_payload)
    }

    pub fn debug_status(&self) -> Result<Sample<PcmDebug>, DeviceError> {
        self.read(pcm::STATUS_DEBUG, PcmDebug::from_payload)
    }

    /// 设备报告的电磁阀状态
    pub fn solenoid(&self, channel: u8) -> Result<Sample<bool>, DeviceError> {
        let channel = pcm::check_channel(channel)?;
        Ok(self.status()?.map(|s| s.solenoid(channel)))
    }

    pub fn all_solenoids(&self) -> Result<Sample<u8>, DeviceError> {
        Ok(self.status()?.map(|s| s.solenoid_bits))
    }

    pub fn compressor_on(&self) -> Result<Sample<bool>, DeviceError> {
        Ok(self.status()?.map(|s| s.byte1.compressor_on()))
    }

    /// 压力开关触发（储气罐已满）
    pub fn pressure_switch(&self) -> Result<Sample<bool>, DeviceError> {
        Ok(self.status()?.map(|s| s.byte1.pressure_switch_en()))
    }

    pub fn closed_loop_enabled(&self) -> Result<Sample<bool>, DeviceError> {
        Ok(self.status()?.map(|s| s.byte1.is_closed_loop_enabled()))
    }

    pub fn compressor_current(&self) -> Result<Sample<f64>, DeviceError> {
        Ok(self.status()?.map(|s| s.compressor_current()))
    }

    pub fn battery_voltage(&self) -> Result<Sample<f64>, DeviceError> {
        Ok(self.status()?.map(|s| s.battery_voltage()))
    }

    pub fn solenoid_voltage(&self) -> Result<Sample<f64>, DeviceError> {
        Ok(self.status()?.map(|s| s.solenoid_voltage()))
    }

    pub fn hardware_fault(&self) -> Result<Sample<bool>, DeviceError> {
        Ok(self.status()?.map(|s| s.byte1.fault_hardware_failure()))
    }

    pub fn compressor_current_too_high_fault(&self) -> Result<Sample<bool>, DeviceError> {
        Ok(self.status()?.map(|s| s.byte1.fault_comp_current_too_high()))
    }

    pub fn compressor_current_too_high_sticky_fault(&self) -> Result<Sample<bool>, DeviceError> {
        Ok(self
            .status()?
            .map(|s| s.byte1.sticky_fault_comp_current_too_high()))
    }

    pub fn compressor_shorted_fault(&self) -> Result<Sample<bool>, DeviceError> {
        Ok(self.status()?.map(|s| s.byte5.fault_di_too_high()))
    }

    pub fn compressor_shorted_sticky_fault(&self) -> Result<Sample<bool>, DeviceError> {
        Ok(self.status()?.map(|s| s.byte5.sticky_fault_di_too_high()))
    }

    /// 电磁阀供电保险丝熔断
    pub fn solenoid_fault(&self) -> Result<Sample<bool>, DeviceError> {
        Ok(self.status()?.map(|s| s.byte1.fault_fuse_tripped()))
    }

    pub fn solenoid_sticky_fault(&self) -> Result<Sample<bool>, DeviceError> {
        Ok(self.status()?.map(|s| s.byte1.sticky_fault_fuse_tripped()))
    }

    pub fn compressor_not_connected_fault(&self) -> Result<Sample<bool>, DeviceError> {
        Ok(self.solenoid_faults()?.map(|f| f.byte1.fault_comp_no_current()))
    }

    pub fn compressor_not_connected_sticky_fault(&self) -> Result<Sample<bool>, DeviceError> {
        Ok(self
            .solenoid_faults()?
            .map(|f| f.byte1.sticky_fault_comp_no_current()))
    }

    /// 因短路被屏蔽的电磁阀位
    pub fn solenoid_blacklist(&self) -> Result<Sample<u8>, DeviceError> {
        Ok(self.solenoid_faults()?.map(|f| f.solenoid_blacklist))
    }

    pub fn is_solenoid_blacklisted(&self, channel: u8) -> Result<Sample<bool>, DeviceError> {
        let channel = pcm::check_channel(channel)?;
        Ok(self.solenoid_faults()?.map(|f| f.is_blacklisted(channel)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::Freshness;
    use robocan_can::{CanFrame, ManualClock, MockBus};
    use robocan_driver::SafetyRegistry;
    use robocan_protocol::ProtocolError;

    fn setup(device: u8) -> (Pcm, Arc<MockBus>, Arc<ManualClock>) {
        let bus = Arc::new(MockBus::new());
        let clock = Arc::new(ManualClock::new());
        let ctx =
            DeviceContext::new(bus.clone(), SafetyRegistry::new()).with_clock(clock.clone());
        (Pcm::new(&ctx, device).unwrap(), bus, clock)
    }

    #[test]
    fn test_control_registered_with_closed_loop() {
        let (pcm, bus, _clock) = setup(0);
        let (frame, period) = bus.periodic(pcm::CONTROL_1).unwrap();
        assert_eq!(period, pcm::CONTROL_PERIOD_MS);
        assert_eq!(frame.len as usize, pcm::CONTROL_1_LEN);
        assert_eq!(frame.data[3], 0b0100_0000);
        assert!(pcm.closed_loop_control());

        pcm.set_closed_loop_control(false).unwrap();
        assert_eq!(bus.periodic(pcm::CONTROL_1).unwrap().0.data[3], 0);
    }

    #[test]
    fn test_solenoid_bits() {
        let (pcm, bus, _clock) = setup(1);
        pcm.set_solenoid(0, true).unwrap();
        pcm.set_solenoid(7, true).unwrap();
        pcm.set_solenoid(0, false).unwrap();
        assert_eq!(pcm.commanded_solenoids(), 0b1000_0000);
        assert_eq!(bus.periodic(pcm::CONTROL_1 | 1).unwrap().0.data[2], 0b1000_0000);

        assert!(matches!(
            pcm.set_solenoid(8, true),
            Err(DeviceError::Protocol(ProtocolError::InvalidValue { .. }))
        ));
    }

    #[test]
    fn test_one_shot() {
        let (pcm, bus, _clock) = setup(2);
        assert!(bus.periodic(pcm::CONTROL_3 | 2).is_none());
        pcm.set_one_shot_duration(3, 150).unwrap();
        pcm.set_one_shot_duration(4, 100_000).unwrap();
        let (frame, period) = bus.periodic(pcm::CONTROL_3 | 2).unwrap();
        assert_eq!(period, 20);
        assert_eq!(frame.data, [0, 0, 0, 15, 255, 0, 0, 0]);

        pcm.fire_one_shot(3).unwrap();
        assert_eq!(pcm.control().unwrap().one_shot_state(3), 1);
        pcm.fire_one_shot(3).unwrap();
        assert_eq!(pcm.control().unwrap().one_shot_state(3), 2);
    }

    #[test]
    fn test_clear_sticky_faults() {
        let (pcm, bus, _clock) = setup(3);
        pcm.clear_all_sticky_faults().unwrap();
        let sent = bus.last_sent(pcm::CONTROL_2 | 3).unwrap();
        assert_eq!(sent.period, SendPeriod::Once);
        assert_eq!(sent.frame.data_slice(), &[0, 0, 0, 0x80]);
    }

    #[test]
    fn test_status_getters_and_staleness() {
        let (pcm, bus, clock) = setup(4);
        assert_eq!(
            pcm.compressor_on().unwrap().freshness,
            Freshness::NeverReceived
        );

        let mut payload = [0u8; 8];
        payload[0] = 0b0000_0100;
        payload[1] = 0b1100_1001; // 压缩机开、保险丝熔断、闭环、压力开关
        payload[2] = 200;
        payload[5] = 0b0000_0010;
        bus.inject(CanFrame::new(pcm::STATUS_1 | 4, &payload));

        let on = pcm.compressor_on().unwrap();
        assert!(on.is_ok());
        assert!(on.value);
        assert!(pcm.pressure_switch().unwrap().value);
        assert!(pcm.closed_loop_enabled().unwrap().value);
        assert!(pcm.solenoid_fault().unwrap().value);
        assert!(pcm.compressor_shorted_fault().unwrap().value);
        assert!(!pcm.hardware_fault().unwrap().value);
        assert!(pcm.solenoid(2).unwrap().value);
        assert!((pcm.battery_voltage().unwrap().value - 14.0).abs() < 1e-9);

        clock.advance_ms(51);
        let stale = pcm.battery_voltage().unwrap();
        assert_eq!(stale.freshness, Freshness::Stale);
        assert!((stale.value - 14.0).abs() < 1e-9);
    }

    #[test]
    fn test_fault_frame() {
        let (pcm, bus, _clock) = setup(5);
        bus.inject(CanFrame::new(
            pcm::STATUS_SOL_FAULTS | 5,
            &[0b0000_0010, 0b0010_0000, 0, 0, 0, 0, 0, 0],
        ));
        assert!(pcm.compressor_not_connected_fault().unwrap().value);
        assert!(!pcm.compressor_not_connected_sticky_fault().unwrap().value);
        assert_eq!(pcm.solenoid_blacklist().unwrap().value, 0b10);
        assert!(pcm.is_solenoid_blacklisted(1).unwrap().value);
        assert!(!pcm.is_solenoid_blacklisted(0).unwrap().value);
    }
}
