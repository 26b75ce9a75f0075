//! Jaguar 电机控制器
//!
//! 设定值消息为受信任消息（2 字节令牌前缀），以 20 ms 周期发送。
//! 配置参数写入后经请求/应答回读校验；控制模式通过 STATUS_CMODE 校验，
//! 其"写入"即重新发送使能消息。STATUS_POWER 置位表示设备掉电重启。

use crate::context::DeviceContext;
use crate::error::DeviceError;
use crate::sample::Sample;
use parking_lot::Mutex;
use robocan_can::SendPeriod;
use robocan_driver::{
    Comparison, DeviceSession, DriverError, Feedable, MotorSafety, ParamState, ParameterChannel,
    ParameterReconciler, SafetyHandle, SpeedCommandable, StopMotor, Verifiable,
};
use robocan_protocol::jaguar::{
    self, Faults, JaguarMode, JaguarParam, LimitMode, Limits, NeutralMode, PeriodicStatus0,
    PeriodicStatus1, PeriodicStatus2,
};
use robocan_protocol::{DeviceNumber, Fxp16Scale, Fxp32Scale};
use std::sync::{Arc, Weak};
use tracing::{debug, error, info};

/// 未配置时的最大输出电压（V）
pub const DEFAULT_MAX_OUTPUT_VOLTAGE: f64 = 12.0;

const ALL_PARAMS: [JaguarParam; 15] = [
    JaguarParam::ControlMode,
    JaguarParam::SpeedReference,
    JaguarParam::PositionReference,
    JaguarParam::P,
    JaguarParam::I,
    JaguarParam::D,
    JaguarParam::NeutralMode,
    JaguarParam::EncoderCodesPerRev,
    JaguarParam::PotentiometerTurns,
    JaguarParam::LimitMode,
    JaguarParam::ForwardLimit,
    JaguarParam::ReverseLimit,
    JaguarParam::MaxOutputVoltage,
    JaguarParam::VoltageRampRate,
    JaguarParam::FaultTime,
];

const ALL_MODES: [JaguarMode; 5] = [
    JaguarMode::PercentVbus,
    JaguarMode::Current,
    JaguarMode::Speed,
    JaguarMode::Position,
    JaguarMode::Voltage,
];

// ============================================================================
// 参数通道
// ============================================================================

/// Jaguar 参数通道
pub struct JaguarChannel {
    session: Arc<DeviceSession>,
    mode: Mutex<JaguarMode>,
}

impl JaguarChannel {
    pub fn mode(&self) -> JaguarMode {
        *self.mode.lock()
    }

    fn send(&self, base: u32, data: &[u8]) -> Result<(), DriverError> {
        let frame = jaguar::message_frame(base, self.session.device(), data)?;
        self.session.send_once(&frame)
    }
}

impl ParameterChannel for JaguarChannel {
    type Key = JaguarParam;

    fn write(&self, key: JaguarParam, value: f64) -> Result<(), DriverError> {
        let mode = self.mode();
        if key == JaguarParam::ControlMode {
            // 位置模式使能时附带初始位置 0
            let data: &[u8] = match mode {
                JaguarMode::Position => &[0, 0, 0, 0],
                _ => &[],
            };
            return self.send(mode.enable_message(), data);
        }
        let (base, payload, len) = jaguar::encode_param(key, mode, value)?;
        self.send(base, &payload[..len])
    }

    fn request(&self, key: JaguarParam) -> Result<(), DriverError> {
        match jaguar::readback_message(key, self.mode()) {
            Some(base) => self
                .session
                .send_once(&jaguar::request_frame(base, self.session.device())),
            None => Ok(()),
        }
    }

    fn readback(&self, key: JaguarParam) -> Result<Option<f64>, DriverError> {
        let mode = self.mode();
        let Some(base) = jaguar::readback_message(key, mode) else {
            return Ok(None);
        };
        Ok(self
            .session
            .poll_fresh(self.session.id(base))?
            .map(|frame| jaguar::decode_param(key, mode, &frame.data)))
    }

    fn power_cycled(&self) -> Result<Option<bool>, DriverError> {
        Ok(self
            .session
            .poll_fresh(self.session.id(jaguar::LM_API_STATUS_POWER))?
            .map(|frame| frame.data[0] != 0))
    }

    fn clear_power_cycle(&self) -> Result<(), DriverError> {
        self.send(jaguar::LM_API_STATUS_POWER, &[1])
    }

    fn request_power_status(&self) -> Result<(), DriverError> {
        self.session.send_once(&jaguar::request_frame(
            jaguar::LM_API_STATUS_POWER,
            self.session.device(),
        ))
    }

    fn discard_readbacks(&self) -> Result<(), DriverError> {
        for mode in ALL_MODES {
            for key in ALL_PARAMS {
                if let Some(base) = jaguar::readback_message(key, mode) {
                    self.session.discard_rx(self.session.id(base))?;
                }
            }
        }
        Ok(())
    }

    fn comparison(&self, key: JaguarParam) -> Comparison {
        match key {
            JaguarParam::P
            | JaguarParam::I
            | JaguarParam::D
            | JaguarParam::ForwardLimit
            | JaguarParam::ReverseLimit => Comparison::Fixed32(Fxp32Scale::Q16_16_65536),
            JaguarParam::MaxOutputVoltage => Comparison::Tolerance(0.1),
            JaguarParam::VoltageRampRate => match self.mode() {
                JaguarMode::PercentVbus => Comparison::Tolerance(1.0 / 32767.0),
                _ => Comparison::Fixed16(Fxp16Scale::Q8_8_256),
            },
            JaguarParam::FaultTime => Comparison::Tolerance(0.001),
            _ => Comparison::Exact,
        }
    }
}

// ============================================================================
// 设备
// ============================================================================

#[derive(Debug, Clone, Copy)]
struct JaguarState {
    value: f64,
    inverted: bool,
    control_enabled: bool,
    stopped: bool,
    max_output_voltage: f64,
}

/// Jaguar 门面
pub struct Jaguar {
    session: Arc<DeviceSession>,
    params: ParameterReconciler<JaguarChannel>,
    safety: Arc<MotorSafety>,
    _safety_handle: SafetyHandle,
    state: Mutex<JaguarState>,
    rx_timeout: std::time::Duration,
}

impl Jaguar {
    /// 配置周期状态并以 PercentVbus 模式使能
    pub fn new(ctx: &DeviceContext, device: u8) -> Result<Arc<Self>, DeviceError> {
        let device = DeviceNumber::new(device)?;
        let session = ctx.session(device);

        for frame in jaguar::periodic_status_setup(device) {
            session.send_once(&frame)?;
        }
        session.send_once(&jaguar::request_frame(jaguar::CAN_MSGID_API_FIRMVER, device))?;

        let channel = JaguarChannel {
            session: session.clone(),
            mode: Mutex::new(JaguarMode::PercentVbus),
        };
        let params = ParameterReconciler::new(channel, ctx.config().reconcile.clone());
        for base in [
            jaguar::LM_API_PSTAT_DATA_S0,
            jaguar::LM_API_PSTAT_DATA_S1,
            jaguar::LM_API_PSTAT_DATA_S2,
        ] {
            params.watch_status(session.id(base));
        }

        let safety_config = ctx.config().safety.clone();
        let clock = ctx.clock().clone();
        let registry = ctx.safety().clone();
        let jaguar = Arc::new_cyclic(|weak: &Weak<Jaguar>| {
            let target: Weak<dyn StopMotor> = weak.clone();
            let safety = Arc::new(MotorSafety::new(clock, target, safety_config.enabled));
            safety.set_expiration(safety_config.expiration());
            let handle = registry.register(&safety);
            Jaguar {
                session,
                params,
                safety,
                _safety_handle: handle,
                state: Mutex::new(JaguarState {
                    value: 0.0,
                    inverted: false,
                    control_enabled: false,
                    stopped: false,
                    max_output_voltage: DEFAULT_MAX_OUTPUT_VOLTAGE,
                }),
                rx_timeout: ctx.rx_timeout(),
            }
        });
        jaguar.enable_control()?;
        info!("Jaguar {} created", device);
        Ok(jaguar)
    }

    pub fn device(&self) -> DeviceNumber {
        self.session.device()
    }

    pub fn safety(&self) -> &Arc<MotorSafety> {
        &self.safety
    }

    pub fn control_mode(&self) -> JaguarMode {
        self.params.channel().mode()
    }

    // ------------------------------------------------------------------
    // 控制
    // ------------------------------------------------------------------

    /// 切换控制模式；需要再次 `enable_control`（或停止后的 `set`）才生效
    pub fn set_control_mode(&self, mode: JaguarMode) -> Result<(), DeviceError> {
        self.disable_control()?;
        *self.params.channel().mode.lock() = mode;
        // 增益与斜率按模式区分，旧模式的值不再适用
        for key in [
            JaguarParam::P,
            JaguarParam::I,
            JaguarParam::D,
            JaguarParam::VoltageRampRate,
        ] {
            self.params.remove(key);
        }
        debug!("Jaguar {} mode -> {:?}", self.device(), mode);
        Ok(())
    }

    /// 发送使能消息并校验控制模式
    pub fn enable_control(&self) -> Result<(), DeviceError> {
        let mode = self.control_mode();
        self.state.lock().control_enabled = true;
        self.params.set(JaguarParam::ControlMode, u8::from(mode) as f64)?;
        Ok(())
    }

    /// 禁用所有模式并停止周期设定值
    pub fn disable_control(&self) -> Result<(), DeviceError> {
        let device = self.device();
        for mode in ALL_MODES {
            let frame = jaguar::message_frame(mode.disable_message(), device, &[])?;
            self.session.send_once(&frame)?;
            let set_id = self.session.id(mode.set_message());
            if self.session.has_tx(set_id) {
                self.session.unregister_tx(set_id)?;
            }
        }
        self.state.lock().control_enabled = false;
        self.params.remove(JaguarParam::ControlMode);
        Ok(())
    }

    pub fn is_control_enabled(&self) -> bool {
        self.state.lock().control_enabled
    }

    /// 仅 PercentVbus、Speed、Voltage 模式生效
    pub fn set_inverted(&self, inverted: bool) {
        self.state.lock().inverted = inverted;
    }

    pub fn is_inverted(&self) -> bool {
        self.state.lock().inverted
    }

    fn send_setpoint(&self, mode: JaguarMode, value: f64) -> Result<(), DeviceError> {
        let (payload, len) = mode.encode_setpoint(value);
        let frame = jaguar::message_frame(mode.set_message(), self.device(), &payload[..len])?;
        self.session.register_tx(
            frame.id,
            SendPeriod::Every(jaguar::SEND_MESSAGE_PERIOD_MS),
            frame.len as usize,
            Some(frame.data_slice()),
        )?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // 参数
    // ------------------------------------------------------------------

    pub fn set_speed_reference(&self, reference: u8) -> Result<(), DeviceError> {
        self.params.set(JaguarParam::SpeedReference, reference as f64)?;
        Ok(())
    }

    pub fn set_position_reference(&self, reference: u8) -> Result<(), DeviceError> {
        self.params.set(JaguarParam::PositionReference, reference as f64)?;
        Ok(())
    }

    /// 闭环增益，仅 Current/Speed/Position 模式
    pub fn set_pid(&self, p: f64, i: f64, d: f64) -> Result<(), DeviceError> {
        let mode = self.control_mode();
        if mode.pid_messages().is_none() {
            return Err(DeviceError::UnsupportedMode {
                mode: format!("{:?}", mode),
                operation: "set_pid",
            });
        }
        self.params.set(JaguarParam::P, p)?;
        self.params.set(JaguarParam::I, i)?;
        self.params.set(JaguarParam::D, d)?;
        Ok(())
    }

    pub fn set_neutral_mode(&self, mode: NeutralMode) -> Result<(), DeviceError> {
        self.params.set(JaguarParam::NeutralMode, u8::from(mode) as f64)?;
        Ok(())
    }

    pub fn set_encoder_codes_per_rev(&self, codes: u16) -> Result<(), DeviceError> {
        self.params.set(JaguarParam::EncoderCodesPerRev, codes as f64)?;
        Ok(())
    }

    pub fn set_potentiometer_turns(&self, turns: u16) -> Result<(), DeviceError> {
        self.params.set(JaguarParam::PotentiometerTurns, turns as f64)?;
        Ok(())
    }

    /// 启用软限位（单位：圈）
    pub fn configure_soft_position_limits(
        &self,
        forward: f64,
        reverse: f64,
    ) -> Result<(), DeviceError> {
        self.params.set(
            JaguarParam::LimitMode,
            u8::from(LimitMode::SoftPositionLimits) as f64,
        )?;
        self.params.set(JaguarParam::ForwardLimit, forward)?;
        self.params.set(JaguarParam::ReverseLimit, reverse)?;
        Ok(())
    }

    pub fn disable_soft_position_limits(&self) -> Result<(), DeviceError> {
        self.params.set(
            JaguarParam::LimitMode,
            u8::from(LimitMode::SwitchInputsOnly) as f64,
        )?;
        Ok(())
    }

    pub fn set_max_output_voltage(&self, volts: f64) -> Result<(), DeviceError> {
        self.state.lock().max_output_voltage = volts;
        self.params.set(JaguarParam::MaxOutputVoltage, volts)?;
        Ok(())
    }

    /// 电压斜率（V/s），仅 PercentVbus 与 Voltage 模式
    pub fn set_voltage_ramp_rate(&self, volts_per_second: f64) -> Result<(), DeviceError> {
        let mode = self.control_mode();
        let per_tick = match mode {
            JaguarMode::PercentVbus => {
                let max = self.state.lock().max_output_voltage;
                volts_per_second / (max * jaguar::CONTROLLER_RATE)
            },
            JaguarMode::Voltage => volts_per_second / jaguar::CONTROLLER_RATE,
            _ => {
                return Err(DeviceError::UnsupportedMode {
                    mode: format!("{:?}", mode),
                    operation: "set_voltage_ramp_rate",
                });
            },
        };
        self.params.set(JaguarParam::VoltageRampRate, per_tick)?;
        Ok(())
    }

    /// 故障恢复时间（秒），限幅 [0.5, 3.0]
    pub fn set_fault_time(&self, seconds: f64) -> Result<(), DeviceError> {
        let seconds = seconds.clamp(jaguar::MIN_FAULT_TIME_S, jaguar::MAX_FAULT_TIME_S);
        self.params.set(JaguarParam::FaultTime, seconds)?;
        Ok(())
    }

    pub fn poll_parameters(&self) -> Result<(), DeviceError> {
        self.params.poll()?;
        Ok(())
    }

    pub fn param_state(&self, param: JaguarParam) -> Option<ParamState> {
        self.params.state(param)
    }

    pub fn parameters(&self) -> &ParameterReconciler<JaguarChannel> {
        &self.params
    }

    // ------------------------------------------------------------------
    // 周期状态
    // ------------------------------------------------------------------

    fn read_status<T>(
        &self,
        base: u32,
        decode: impl FnOnce(&[u8; 8]) -> T,
    ) -> Result<Sample<T>, DeviceError> {
        let id = self.session.id(base);
        let outcome = self.session.get_rx(id, self.rx_timeout)?;
        if outcome.is_ok() {
            self.params.mark_status_seen(id);
        }
        Ok(Sample::from_outcome(&outcome, decode))
    }

    pub fn status0(&self) -> Result<Sample<PeriodicStatus0>, DeviceError> {
        self.read_status(jaguar::LM_API_PSTAT_DATA_S0, PeriodicStatus0::from_payload)
    }

    pub fn status1(&self) -> Result<Sample<PeriodicStatus1>, DeviceError> {
        self.read_status(jaguar::LM_API_PSTAT_DATA_S1, PeriodicStatus1::from_payload)
    }

    pub fn status2(&self) -> Result<Sample<PeriodicStatus2>, DeviceError> {
        self.read_status(jaguar::LM_API_PSTAT_DATA_S2, PeriodicStatus2::from_payload)
    }

    pub fn bus_voltage(&self) -> Result<Sample<f64>, DeviceError> {
        Ok(self.status0()?.map(|s| s.bus_voltage))
    }

    pub fn output_voltage(&self) -> Result<Sample<f64>, DeviceError> {
        Ok(self.status0()?.map(|s| s.output_voltage))
    }

    pub fn output_current(&self) -> Result<Sample<f64>, DeviceError> {
        Ok(self.status0()?.map(|s| s.output_current))
    }

    pub fn temperature(&self) -> Result<Sample<f64>, DeviceError> {
        Ok(self.status0()?.map(|s| s.temperature))
    }

    /// 位置（圈）
    pub fn position(&self) -> Result<Sample<f64>, DeviceError> {
        Ok(self.status1()?.map(|s| s.position))
    }

    /// 速度（rpm）
    pub fn speed(&self) -> Result<Sample<f64>, DeviceError> {
        Ok(self.status1()?.map(|s| s.speed))
    }

    pub fn limits(&self) -> Result<Sample<Limits>, DeviceError> {
        Ok(self.status2()?.map(|s| s.limits))
    }

    pub fn faults(&self) -> Result<Sample<Faults>, DeviceError> {
        Ok(self.status2()?.map(|s| s.faults))
    }

    /// 固件版本（构造时已请求）
    pub fn firmware_version(&self) -> Result<Sample<u32>, DeviceError> {
        self.read_status(jaguar::CAN_MSGID_API_FIRMVER, |p| {
            u32::from_le_bytes([p[0], p[1], p[2], p[3]])
        })
    }

    pub fn all_status_seen(&self) -> bool {
        self.params.all_status_seen()
    }
}

impl SpeedCommandable for Jaguar {
    type Error = DeviceError;

    /// 发送周期设定值并推进一次参数校验
    fn set(&self, value: f64) -> Result<(), DeviceError> {
        self.safety.feed();

        let restart = {
            let mut state = self.state.lock();
            std::mem::replace(&mut state.stopped, false)
        };
        if restart {
            self.enable_control()?;
        }

        let (enabled, inverted) = {
            let mut state = self.state.lock();
            state.value = value;
            (state.control_enabled, state.inverted)
        };
        if enabled {
            let mode = self.control_mode();
            let output = match mode {
                JaguarMode::PercentVbus | JaguarMode::Speed | JaguarMode::Voltage if inverted => {
                    -value
                },
                _ => value,
            };
            self.send_setpoint(mode, output)?;
        }

        self.params.poll()?;
        Ok(())
    }

    fn get(&self) -> f64 {
        self.state.lock().value
    }

    fn disable(&self) -> Result<(), DeviceError> {
        self.disable_control()
    }

    fn stop_motor(&self) -> Result<(), DeviceError> {
        self.disable_control()?;
        self.state.lock().stopped = true;
        Ok(())
    }
}

impl Feedable for Jaguar {
    fn feed(&self) {
        self.safety.feed();
    }
}

impl Verifiable for Jaguar {
    type Key = JaguarParam;

    fn all_verified(&self) -> bool {
        self.params.all_verified()
    }

    fn stuck_parameters(&self) -> Vec<JaguarParam> {
        self.params.stuck()
    }
}

impl StopMotor for Jaguar {
    fn stop_motor(&self) {
        if let Err(e) = SpeedCommandable::stop_motor(self) {
            error!("Jaguar {} failed to stop: {}", self.device(), e);
        }
    }

    fn description(&self) -> String {
        format!("Jaguar {}", self.device())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use robocan_can::{CanFrame, ManualClock, MockBus};
    use robocan_driver::SafetyRegistry;
    use robocan_protocol::ids::CAN_MSGID_DEVNO_M;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// 模拟 Jaguar：存储配置消息，应答请求；使能消息决定 STATUS_CMODE
    fn simulated_jaguar(
        power_cycled: Arc<AtomicBool>,
    ) -> impl FnMut(&CanFrame, SendPeriod) -> Vec<CanFrame> + Send {
        let mut stored: HashMap<u32, Vec<u8>> = HashMap::new();
        let mut mode = 0u8;
        move |frame: &CanFrame, _period: SendPeriod| {
            let base = frame.id & !CAN_MSGID_DEVNO_M;
            let device = frame.id & CAN_MSGID_DEVNO_M;
            if let Some(m) = ALL_MODES.iter().find(|m| m.enable_message() == base) {
                mode = u8::from(*m);
                return Vec::new();
            }
            if base == jaguar::LM_API_STATUS_POWER {
                if frame.len == 0 {
                    let flag = power_cycled.load(Ordering::SeqCst) as u8;
                    return vec![CanFrame::new(frame.id, &[flag])];
                }
                power_cycled.store(false, Ordering::SeqCst);
                return Vec::new();
            }
            if base == jaguar::LM_API_STATUS_CMODE {
                return vec![CanFrame::new(jaguar::LM_API_STATUS_CMODE | device, &[mode])];
            }
            if frame.len == 0 {
                return stored
                    .get(&base)
                    .map(|data| vec![CanFrame::new(frame.id, data)])
                    .unwrap_or_default();
            }
            stored.insert(base, frame.data_slice().to_vec());
            Vec::new()
        }
    }

    struct Fixture {
        jaguar: Arc<Jaguar>,
        bus: Arc<MockBus>,
        clock: Arc<ManualClock>,
        registry: Arc<SafetyRegistry>,
        power: Arc<AtomicBool>,
    }

    fn setup(device: u8) -> Fixture {
        let bus = Arc::new(MockBus::new());
        let power = Arc::new(AtomicBool::new(false));
        bus.set_responder(simulated_jaguar(power.clone()));
        let clock = Arc::new(ManualClock::new());
        let registry = SafetyRegistry::new();
        let ctx = DeviceContext::new(bus.clone(), registry.clone()).with_clock(clock.clone());
        let jaguar = Jaguar::new(&ctx, device).unwrap();
        Fixture {
            jaguar,
            bus,
            clock,
            registry,
            power,
        }
    }

    fn settle(jaguar: &Jaguar) {
        for _ in 0..4 {
            jaguar.poll_parameters().unwrap();
        }
    }

    #[test]
    fn test_construction_configures_periodic_status() {
        let f = setup(2);
        assert_eq!(f.bus.sent_to(jaguar::LM_API_PSTAT_PER_EN_S0 | 2).len(), 1);
        assert_eq!(
            f.bus.last_sent(jaguar::LM_API_PSTAT_CFG_S0 | 2).unwrap().frame.data,
            jaguar::PSTAT_MESSAGE_0
        );
        // 使能消息为受信任消息：仅令牌
        let enable = f.bus.last_sent(jaguar::LM_API_VOLT_T_EN | 2).unwrap();
        assert_eq!(enable.frame.data_slice(), &[0, 0]);
        assert!(f.jaguar.is_control_enabled());
    }

    #[test]
    fn test_percent_setpoint_is_trusted_and_periodic() {
        let f = setup(3);
        f.jaguar.set(1.0).unwrap();
        let sent = f.bus.last_sent(jaguar::LM_API_VOLT_T_SET | 3).unwrap();
        assert_eq!(sent.period, SendPeriod::Every(20));
        assert_eq!(sent.frame.data_slice(), &[0, 0, 0xFF, 0x7F]);

        f.jaguar.set_inverted(true);
        f.jaguar.set(0.5).unwrap();
        let sent = f.bus.last_sent(jaguar::LM_API_VOLT_T_SET | 3).unwrap();
        assert_eq!(
            jaguar::unpack_percentage(&sent.frame.data, 2),
            jaguar::unpack_percentage(&JaguarMode::PercentVbus.encode_setpoint(-0.5).0, 0)
        );
        assert_eq!(f.jaguar.get(), 0.5);
    }

    #[test]
    fn test_control_mode_verified_via_status() {
        let f = setup(4);
        settle(&f.jaguar);
        assert_eq!(f.jaguar.param_state(JaguarParam::ControlMode), Some(ParamState::Verified));
        assert!(f.jaguar.all_verified());
    }

    #[test]
    fn test_mode_change_stops_setpoint_and_requires_enable() {
        let f = setup(5);
        f.jaguar.set(0.3).unwrap();
        f.jaguar.set_control_mode(JaguarMode::Speed).unwrap();
        assert!(!f.jaguar.is_control_enabled());
        assert_eq!(f.bus.periodic(jaguar::LM_API_VOLT_T_SET | 5), None);
        assert!(f.bus.last_sent(jaguar::LM_API_SPD_DIS | 5).is_some());

        // 未使能时只记录设定值
        f.jaguar.set(100.0).unwrap();
        assert!(f.bus.last_sent(jaguar::LM_API_SPD_T_SET | 5).is_none());

        f.jaguar.enable_control().unwrap();
        f.jaguar.set(-1.5).unwrap();
        let sent = f.bus.last_sent(jaguar::LM_API_SPD_T_SET | 5).unwrap();
        assert_eq!(sent.frame.len, 6);
        assert_eq!(
            robocan_protocol::codec::unpack_i32_le(&sent.frame.data, 2),
            -98304
        );
    }

    #[test]
    fn test_pid_requires_closed_loop_mode() {
        let f = setup(6);
        assert!(matches!(
            f.jaguar.set_pid(1.0, 0.0, 0.0),
            Err(DeviceError::UnsupportedMode { operation: "set_pid", .. })
        ));
        f.jaguar.set_control_mode(JaguarMode::Position).unwrap();
        f.jaguar.enable_control().unwrap();
        f.jaguar.set_pid(1.5, 0.01, 0.25).unwrap();
        f.jaguar.configure_soft_position_limits(10.0, -10.0).unwrap();
        f.jaguar.set_encoder_codes_per_rev(360).unwrap();
        settle(&f.jaguar);
        assert!(f.jaguar.all_verified());
        assert!(f.jaguar.stuck_parameters().is_empty());
        // 使能位置模式附带 4 字节初始位置
        let enable = f.bus.last_sent(jaguar::LM_API_POS_T_EN | 6).unwrap();
        assert_eq!(enable.frame.len, 6);
    }

    #[test]
    fn test_fault_time_and_voltage_params() {
        let f = setup(7);
        f.jaguar.set_fault_time(10.0).unwrap();
        assert_eq!(f.jaguar.parameters().cached(JaguarParam::FaultTime), Some(3.0));
        f.jaguar.set_max_output_voltage(6.0).unwrap();
        f.jaguar.set_voltage_ramp_rate(12.0).unwrap();
        let cached = f.jaguar.parameters().cached(JaguarParam::VoltageRampRate).unwrap();
        assert!((cached - 12.0 / (6.0 * 1000.0)).abs() < 1e-12);
        settle(&f.jaguar);
        assert!(f.jaguar.all_verified());
        let sent = f.bus.last_sent(jaguar::LM_API_CFG_FAULT_TIME | 7).unwrap();
        assert_eq!(sent.frame.data_slice(), &[0xB8, 0x0B]);
    }

    #[test]
    fn test_power_cycle_resends_and_rewatches_status() {
        let f = setup(8);
        f.jaguar.set_neutral_mode(NeutralMode::Brake).unwrap();
        settle(&f.jaguar);
        f.bus.inject(CanFrame::new(jaguar::LM_API_PSTAT_DATA_S0 | 8, &[0; 8]));
        f.bus.inject(CanFrame::new(jaguar::LM_API_PSTAT_DATA_S1 | 8, &[0; 8]));
        f.bus.inject(CanFrame::new(jaguar::LM_API_PSTAT_DATA_S2 | 8, &[0; 8]));
        f.jaguar.status0().unwrap();
        f.jaguar.status1().unwrap();
        f.jaguar.status2().unwrap();
        assert!(f.jaguar.all_status_seen());

        f.power.store(true, Ordering::SeqCst);
        f.bus.clear_sent();
        settle(&f.jaguar);
        let writes = f
            .bus
            .sent_to(jaguar::LM_API_CFG_BRAKE_COAST | 8)
            .into_iter()
            .filter(|sent| !sent.frame.is_request())
            .count();
        assert_eq!(writes, 1);
        assert!(!f.power.load(Ordering::SeqCst));
        assert!(!f.jaguar.all_status_seen());
        assert!(f.jaguar.all_verified());
    }

    #[test]
    fn test_status_decoding() {
        let f = setup(9);
        let mut payload = [0u8; 8];
        robocan_protocol::codec::pack_fxp16_le(&mut payload, 0, 12.5, Fxp16Scale::Q8_8_256);
        jaguar::pack_percentage(&mut payload, 2, 0.5);
        robocan_protocol::codec::pack_fxp16_le(&mut payload, 4, 3.25, Fxp16Scale::Q8_8_256);
        robocan_protocol::codec::pack_fxp16_le(&mut payload, 6, 40.0, Fxp16Scale::Q8_8_256);
        f.bus.inject(CanFrame::new(jaguar::LM_API_PSTAT_DATA_S0 | 9, &payload));

        let status = f.jaguar.status0().unwrap();
        assert!(status.is_ok());
        assert_eq!(status.value.bus_voltage, 12.5);
        assert!((status.value.output_voltage - 6.25).abs() < 1e-3);
        assert_eq!(status.value.output_current, 3.25);
        assert_eq!(f.jaguar.temperature().unwrap().value, 40.0);

        f.clock.advance_ms(51);
        assert!(!f.jaguar.bus_voltage().unwrap().is_ok());
        assert!(!f.jaguar.speed().unwrap().is_ok());
    }

    #[test]
    fn test_watchdog_disables_then_set_reenables() {
        let f = setup(10);
        f.jaguar.set(0.5).unwrap();
        f.clock.advance_ms(200);
        assert_eq!(f.registry.check_motors(), 1);
        assert!(!f.jaguar.is_control_enabled());
        assert_eq!(f.bus.periodic(jaguar::LM_API_VOLT_T_SET | 10), None);

        f.jaguar.set(0.25).unwrap();
        assert!(f.jaguar.is_control_enabled());
        assert!(f.bus.periodic(jaguar::LM_API_VOLT_T_SET | 10).is_some());
    }
}
