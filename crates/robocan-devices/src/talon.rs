//! Talon SRX 电机控制器
//!
//! - Control 1 以周期帧发送（默认 10 ms，限幅 [1, 95] ms），所有设置走"读-改-写-提交"
//! - 状态帧 1/2/4/5 通过会话接收，返回带新鲜度的 [`Sample`]
//! - 增益、软限位等参数经参数帧写入并回读校验；Status 5 复位计数变化视为掉电重启
//! - 看门狗超时时切换为 NoDrive，下一次 `set` 恢复原控制模式

use crate::context::DeviceContext;
use crate::error::DeviceError;
use crate::sample::Sample;
use parking_lot::Mutex;
use robocan_can::{CanFrame, SendPeriod};
use robocan_driver::{
    Comparison, DeviceSession, DriverError, Feedable, MotorSafety, ParamState,
    ParameterChannel, ParameterReconciler, SafetyHandle, SpeedCommandable, StopMotor, Verifiable,
};
use robocan_protocol::talon::{
    self, BrakeOverride, Control1, FeedbackDevice, ParamResponse, ProfileSlot, Status1, Status2,
    Status4, Status5, TalonMode, TalonParam,
};
use robocan_protocol::{DeviceNumber, codec};
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, info, trace};

/// 单次读取参数应答的上限
const MAX_RESPONSE_DRAIN: usize = 16;

// ============================================================================
// 参数通道
// ============================================================================

#[derive(Debug, Default)]
struct ResetTracker {
    last_reset_count: Option<u16>,
    power_cycled: bool,
}

/// Talon 参数通道：参数设置/请求/应答帧，Status 5 复位计数作为掉电信号
pub struct TalonChannel {
    session: Arc<DeviceSession>,
    responses: Mutex<HashMap<TalonParam, i32>>,
    resets: Mutex<ResetTracker>,
}

impl TalonChannel {
    fn new(session: Arc<DeviceSession>) -> Self {
        Self {
            session,
            responses: Mutex::new(HashMap::new()),
            resets: Mutex::new(ResetTracker::default()),
        }
    }

    /// 收取应答帧存入表中（同一 ID 只保留最新帧，需要尽早收取）
    fn drain_responses(&self) -> Result<(), DriverError> {
        let id = self.session.id(talon::PARAM_RESPONSE);
        for _ in 0..MAX_RESPONSE_DRAIN {
            let Some(frame) = self.session.poll_fresh(id)? else {
                break;
            };
            match ParamResponse::try_from(frame) {
                Ok(response) => {
                    trace!("Param response {:?} = {}", response.param, response.raw);
                    self.responses.lock().insert(response.param, response.raw);
                },
                Err(e) => debug!("Ignoring malformed param response: {}", e),
            }
        }
        Ok(())
    }

    /// 最近收到的参数应答（原始值，不消费）
    pub fn last_response(&self, param: TalonParam) -> Result<Option<i32>, DriverError> {
        self.drain_responses()?;
        Ok(self.responses.lock().get(&param).copied())
    }
}

impl ParameterChannel for TalonChannel {
    type Key = TalonParam;

    fn write(&self, key: TalonParam, value: f64) -> Result<(), DriverError> {
        self.responses.lock().remove(&key);
        let frame = talon::param_set_frame(self.session.device(), key, key.encode(value));
        self.session.send_once(&frame)
    }

    fn request(&self, key: TalonParam) -> Result<(), DriverError> {
        self.drain_responses()?;
        self.session
            .send_once(&talon::param_request_frame(self.session.device(), key))
    }

    fn readback(&self, key: TalonParam) -> Result<Option<f64>, DriverError> {
        self.drain_responses()?;
        Ok(self.responses.lock().remove(&key).map(|raw| key.decode(raw)))
    }

    fn power_cycled(&self) -> Result<Option<bool>, DriverError> {
        let fresh = self.session.poll_fresh(self.session.id(talon::STATUS_5))?;
        let mut resets = self.resets.lock();
        if let Some(frame) = fresh {
            let reset_count = Status5::from_payload(&frame.data).reset_count;
            match resets.last_reset_count {
                Some(previous) if previous != reset_count => {
                    info!(
                        "Talon {} reset count changed {} -> {}",
                        self.session.device(),
                        previous,
                        reset_count
                    );
                    resets.power_cycled = true;
                },
                _ => {},
            }
            resets.last_reset_count = Some(reset_count);
        }
        Ok(resets.last_reset_count.map(|_| resets.power_cycled))
    }

    fn clear_power_cycle(&self) -> Result<(), DriverError> {
        self.resets.lock().power_cycled = false;
        Ok(())
    }

    fn request_power_status(&self) -> Result<(), DriverError> {
        // Status 5 由设备周期广播
        Ok(())
    }

    fn discard_readbacks(&self) -> Result<(), DriverError> {
        self.responses.lock().clear();
        self.session.discard_rx(self.session.id(talon::PARAM_RESPONSE))
    }

    fn comparison(&self, _key: TalonParam) -> Comparison {
        Comparison::Exact
    }

    /// 比较两侧线上编码（10.22 增益与整数参数统一处理）
    fn matches(&self, key: TalonParam, cached: f64, readback: f64) -> bool {
        key.encode(cached) == key.encode(readback)
    }
}

// ============================================================================
// 设备
// ============================================================================

#[derive(Debug, Clone, Copy)]
struct TalonState {
    mode: TalonMode,
    value: f64,
    stopped: bool,
    inverted: bool,
}

/// Talon SRX 门面
pub struct TalonSrx {
    session: Arc<DeviceSession>,
    params: ParameterReconciler<TalonChannel>,
    safety: Arc<MotorSafety>,
    _safety_handle: SafetyHandle,
    state: Mutex<TalonState>,
    control_id: u32,
}

impl TalonSrx {
    /// 注册 Control 1 周期帧（初始为 NoDrive）并登记看门狗
    pub fn new(ctx: &DeviceContext, device: u8) -> Result<Arc<Self>, DeviceError> {
        let device = DeviceNumber::new(device)?;
        let session = ctx.session(device);
        let control_id = session.id(talon::CONTROL_1);

        let period = ctx
            .config()
            .session
            .talon_control_period_ms
            .clamp(talon::MIN_CONTROL_PERIOD_MS, talon::MAX_CONTROL_PERIOD_MS);
        let mut payload = [0u8; 8];
        let mut control = Control1::default();
        control.set_mode(TalonMode::NoDrive);
        control.write_into(&mut payload);
        session.register_tx(control_id, SendPeriod::Every(period), 8, Some(&payload))?;

        let channel = TalonChannel::new(session.clone());
        let params = ParameterReconciler::new(channel, ctx.config().reconcile.clone());
        params.watch_status(session.id(talon::STATUS_1));
        params.watch_status(session.id(talon::STATUS_2));

        let safety_config = ctx.config().safety.clone();
        let clock = ctx.clock().clone();
        let registry = ctx.safety().clone();
        let talon = Arc::new_cyclic(|weak: &Weak<TalonSrx>| {
            let target: Weak<dyn StopMotor> = weak.clone();
            let safety = Arc::new(MotorSafety::new(clock, target, safety_config.enabled));
            safety.set_expiration(safety_config.expiration());
            let handle = registry.register(&safety);
            TalonSrx {
                session,
                params,
                safety,
                _safety_handle: handle,
                state: Mutex::new(TalonState {
                    mode: TalonMode::DutyCycle,
                    value: 0.0,
                    stopped: true,
                    inverted: false,
                }),
                control_id,
            }
        });
        info!("Talon SRX {} created (control period {} ms)", device, period);
        Ok(talon)
    }

    pub fn device(&self) -> DeviceNumber {
        self.session.device()
    }

    pub fn session(&self) -> &Arc<DeviceSession> {
        &self.session
    }

    pub fn safety(&self) -> &Arc<MotorSafety> {
        &self.safety
    }

    // ------------------------------------------------------------------
    // Control 1
    // ------------------------------------------------------------------

    fn update_control(&self, f: impl FnOnce(&mut Control1)) -> Result<(), DeviceError> {
        self.session.update_tx(self.control_id, |payload| {
            let mut control = Control1::from_payload(payload);
            f(&mut control);
            control.write_into(payload);
        })?;
        Ok(())
    }

    /// 当前 Control 1 负载
    pub fn control(&self) -> Option<Control1> {
        self.session
            .tx_payload(self.control_id)
            .map(|payload| Control1::from_payload(&payload))
    }

    /// 控制模式（`set` 时生效；已启用时立即切换并清零需求值）
    pub fn set_mode(&self, mode: TalonMode) -> Result<(), DeviceError> {
        let mut state = self.state.lock();
        state.mode = mode;
        if !state.stopped {
            self.update_control(|c| {
                c.set_mode(mode);
                c.demand = 0;
            })?;
        }
        debug!("Talon {} mode -> {:?}", self.device(), mode);
        Ok(())
    }

    pub fn mode(&self) -> TalonMode {
        self.state.lock().mode
    }

    /// 直接写入 24 位需求值；与 `set` 一样喂看门狗
    pub fn set_demand(&self, demand: i32) -> Result<(), DeviceError> {
        self.safety.feed();
        let mut state = self.state.lock();
        let mode = state.mode;
        state.stopped = false;
        self.update_control(|c| {
            c.set_mode(mode);
            c.demand = demand;
        })
    }

    pub fn set_profile_slot(&self, slot: ProfileSlot) -> Result<(), DeviceError> {
        self.update_control(|c| c.set_profile_slot(slot))
    }

    pub fn set_feedback_device(&self, device: FeedbackDevice) -> Result<(), DeviceError> {
        self.update_control(|c| c.set_feedback_device(device))
    }

    pub fn set_override_brake(&self, brake: BrakeOverride) -> Result<(), DeviceError> {
        self.update_control(|c| c.set_override_brake(brake))
    }

    pub fn set_override_limit_switch(&self, value: u8) -> Result<(), DeviceError> {
        self.update_control(|c| c.set_override_limit_switch(value))
    }

    pub fn set_rev_feedback_sensor(&self, reversed: bool) -> Result<(), DeviceError> {
        self.update_control(|c| c.set_rev_feedback_sensor(reversed))
    }

    pub fn set_rev_mot_during_close_loop(&self, reversed: bool) -> Result<(), DeviceError> {
        self.update_control(|c| c.set_rev_mot_during_close_loop(reversed))
    }

    pub fn set_ramp_throttle(&self, ramp: u8) -> Result<(), DeviceError> {
        self.update_control(|c| c.ramp_throttle = ramp)
    }

    /// 修改 Control 1 周期（限幅 [1, 95] ms）
    pub fn set_control_period(&self, period_ms: u32) -> Result<(), DeviceError> {
        let period = period_ms.clamp(talon::MIN_CONTROL_PERIOD_MS, talon::MAX_CONTROL_PERIOD_MS);
        self.session
            .change_tx_period(self.control_id, SendPeriod::Every(period))?;
        Ok(())
    }

    pub fn set_inverted(&self, inverted: bool) {
        self.state.lock().inverted = inverted;
    }

    pub fn is_inverted(&self) -> bool {
        self.state.lock().inverted
    }

    /// Control 3 单次帧
    pub fn clear_sticky_faults(&self) -> Result<(), DeviceError> {
        self.session
            .send_once(&talon::clear_sticky_faults_frame(self.device()))?;
        Ok(())
    }

    fn demand_for(state: &TalonState, value: f64) -> i32 {
        let signed = if state.inverted { -value } else { value };
        match state.mode {
            TalonMode::DutyCycle => talon::duty_cycle_to_demand(signed),
            // 8.8 定点伏特
            TalonMode::VoltCompen => (signed * 256.0) as i32,
            TalonMode::VelocityCloseLoop => signed as i32,
            TalonMode::PositionCloseLoop => value as i32,
            // 毫安
            TalonMode::CurrentCloseLoop => (signed * 1000.0) as i32,
            TalonMode::SlaveFollower | TalonMode::MotionProfile => value as i32,
            TalonMode::NoDrive => 0,
        }
    }

    fn halt(&self) -> Result<(), DeviceError> {
        self.state.lock().stopped = true;
        self.update_control(|c| {
            c.set_mode(TalonMode::NoDrive);
            c.demand = 0;
        })
    }

    // ------------------------------------------------------------------
    // 状态帧
    // ------------------------------------------------------------------

    fn read_status<T>(
        &self,
        base: u32,
        timeout_ms: u64,
        decode: impl FnOnce(&[u8; 8]) -> T,
    ) -> Result<Sample<T>, DeviceError> {
        let id = self.session.id(base);
        let outcome = self.session.get_rx(id, Duration::from_millis(timeout_ms))?;
        if outcome.is_ok() {
            self.params.mark_status_seen(id);
        }
        Ok(Sample::from_outcome(&outcome, decode))
    }

    pub fn status1(&self) -> Result<Sample<Status1>, DeviceError> {
        self.read_status(talon::STATUS_1, talon::STATUS_1_TIMEOUT_MS, Status1::from_payload)
    }

    pub fn status2(&self) -> Result<Sample<Status2>, DeviceError> {
        self.read_status(talon::STATUS_2, talon::STATUS_2_TIMEOUT_MS, Status2::from_payload)
    }

    pub fn status4(&self) -> Result<Sample<Status4>, DeviceError> {
        self.read_status(talon::STATUS_4, talon::STATUS_4_TIMEOUT_MS, Status4::from_payload)
    }

    pub fn status5(&self) -> Result<Sample<Status5>, DeviceError> {
        self.read_status(talon::STATUS_5, talon::STATUS_5_TIMEOUT_MS, Status5::from_payload)
    }

    /// 输出油门 [-1023, 1023]
    pub fn applied_throttle(&self) -> Result<Sample<i32>, DeviceError> {
        Ok(self.status1()?.map(|s| s.applied_throttle()))
    }

    pub fn close_loop_error(&self) -> Result<Sample<i32>, DeviceError> {
        Ok(self.status1()?.map(|s| s.close_loop_err))
    }

    /// (正向, 反向) 限位开关闭合
    pub fn limit_switches(&self) -> Result<Sample<(bool, bool)>, DeviceError> {
        Ok(self
            .status1()?
            .map(|s| (s.limit_switch_closed_for(), s.limit_switch_closed_rev())))
    }

    pub fn sensor_position(&self) -> Result<Sample<i32>, DeviceError> {
        Ok(self.status2()?.map(|s| s.sensor_position()))
    }

    pub fn sensor_velocity(&self) -> Result<Sample<i32>, DeviceError> {
        Ok(self.status2()?.map(|s| s.sensor_velocity()))
    }

    /// 输出电流（A）
    pub fn output_current(&self) -> Result<Sample<f64>, DeviceError> {
        Ok(self.status2()?.map(|s| s.current()))
    }

    pub fn temperature(&self) -> Result<Sample<f64>, DeviceError> {
        Ok(self.status4()?.map(|s| s.temperature()))
    }

    pub fn battery_voltage(&self) -> Result<Sample<f64>, DeviceError> {
        Ok(self.status4()?.map(|s| s.battery_voltage()))
    }

    pub fn reset_count(&self) -> Result<Sample<u16>, DeviceError> {
        Ok(self.status5()?.map(|s| s.reset_count))
    }

    pub fn reset_flags(&self) -> Result<Sample<u16>, DeviceError> {
        Ok(self.status5()?.map(|s| s.reset_flags))
    }

    pub fn firmware_version(&self) -> Result<Sample<u16>, DeviceError> {
        Ok(self.status5()?.map(|s| s.firmware_version))
    }

    // ------------------------------------------------------------------
    // 参数
    // ------------------------------------------------------------------

    /// 写入并登记校验
    pub fn set_param(&self, param: TalonParam, value: f64) -> Result<(), DeviceError> {
        self.params.set(param, value)?;
        Ok(())
    }

    pub fn set_p(&self, slot: ProfileSlot, p: f64) -> Result<(), DeviceError> {
        self.set_param(slot.p(), p)
    }

    pub fn set_i(&self, slot: ProfileSlot, i: f64) -> Result<(), DeviceError> {
        self.set_param(slot.i(), i)
    }

    pub fn set_d(&self, slot: ProfileSlot, d: f64) -> Result<(), DeviceError> {
        self.set_param(slot.d(), d)
    }

    pub fn set_f(&self, slot: ProfileSlot, f: f64) -> Result<(), DeviceError> {
        self.set_param(slot.f(), f)
    }

    pub fn set_izone(&self, slot: ProfileSlot, izone: i32) -> Result<(), DeviceError> {
        self.set_param(slot.izone(), izone as f64)
    }

    pub fn set_close_loop_ramp_rate(&self, slot: ProfileSlot, rate: i32) -> Result<(), DeviceError> {
        self.set_param(slot.ramp_rate(), rate as f64)
    }

    pub fn set_forward_soft_limit(&self, threshold: i32) -> Result<(), DeviceError> {
        self.set_param(TalonParam::SoftLimitForThreshold, threshold as f64)
    }

    pub fn set_reverse_soft_limit(&self, threshold: i32) -> Result<(), DeviceError> {
        self.set_param(TalonParam::SoftLimitRevThreshold, threshold as f64)
    }

    pub fn enable_forward_soft_limit(&self, enable: bool) -> Result<(), DeviceError> {
        self.set_param(TalonParam::SoftLimitForEnable, if enable { 1.0 } else { 0.0 })
    }

    pub fn enable_reverse_soft_limit(&self, enable: bool) -> Result<(), DeviceError> {
        self.set_param(TalonParam::SoftLimitRevEnable, if enable { 1.0 } else { 0.0 })
    }

    /// 推进一次参数校验
    pub fn poll_parameters(&self) -> Result<(), DeviceError> {
        self.params.poll()?;
        Ok(())
    }

    pub fn param_state(&self, param: TalonParam) -> Option<ParamState> {
        self.params.state(param)
    }

    pub fn parameters(&self) -> &ParameterReconciler<TalonChannel> {
        &self.params
    }

    /// 主动请求参数（不进入校验）
    pub fn request_param(&self, param: TalonParam) -> Result<(), DeviceError> {
        self.session
            .send_once(&talon::param_request_frame(self.device(), param))?;
        Ok(())
    }

    /// 最近一次参数应答（工程值）
    pub fn param_response(&self, param: TalonParam) -> Result<Option<f64>, DeviceError> {
        Ok(self
            .params
            .channel()
            .last_response(param)?
            .map(|raw| param.decode(raw)))
    }

    /// 所有登记的状态帧至少收到过一次
    pub fn all_status_seen(&self) -> bool {
        self.params.all_status_seen()
    }
}

impl SpeedCommandable for TalonSrx {
    type Error = DeviceError;

    /// 按当前模式换算需求值；停止后自动恢复控制模式
    fn set(&self, value: f64) -> Result<(), DeviceError> {
        self.safety.feed();
        let mut state = self.state.lock();
        let demand = Self::demand_for(&state, value);
        let mode = state.mode;
        state.stopped = false;
        state.value = value;
        self.update_control(|c| {
            c.set_mode(mode);
            c.demand = demand;
        })
    }

    fn get(&self) -> f64 {
        self.state.lock().value
    }

    fn disable(&self) -> Result<(), DeviceError> {
        self.halt()
    }

    fn stop_motor(&self) -> Result<(), DeviceError> {
        self.halt()
    }
}

impl Feedable for TalonSrx {
    fn feed(&self) {
        self.safety.feed();
    }
}

impl Verifiable for TalonSrx {
    type Key = TalonParam;

    fn all_verified(&self) -> bool {
        self.params.all_verified()
    }

    fn stuck_parameters(&self) -> Vec<TalonParam> {
        self.params.stuck()
    }
}

impl StopMotor for TalonSrx {
    fn stop_motor(&self) {
        if let Err(e) = self.halt() {
            tracing::error!("Talon {} failed to stop: {}", self.device(), e);
        }
    }

    fn description(&self) -> String {
        format!("Talon SRX {}", self.device())
    }
}

/// 设备侧应答器：收到参数设置时记录，收到参数请求时回送应答帧（测试用模拟 Talon）
pub fn param_echo(device: DeviceNumber) -> impl FnMut(&CanFrame, SendPeriod) -> Vec<CanFrame> + Send {
    let set_id = talon::param_set_id(device).raw();
    let request_id = talon::param_request_id(device).raw();
    let mut stored: HashMap<u8, i32> = HashMap::new();
    move |frame: &CanFrame, _period: SendPeriod| {
        if frame.id == set_id && frame.len >= 5 {
            stored.insert(frame.data[0], codec::unpack_i32(&frame.data, 1));
            Vec::new()
        } else if frame.id == request_id && frame.len >= 1 {
            match TalonParam::try_from(frame.data[0]) {
                Ok(param) => {
                    let raw = stored.get(&frame.data[0]).copied().unwrap_or(0);
                    vec![ParamResponse { param, raw }.to_frame(device)]
                },
                Err(_) => Vec::new(),
            }
        } else {
            Vec::new()
        }
    }
}
