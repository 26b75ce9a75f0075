//! Talon SRX 电机控制器帧布局
//!
//! 所有多字节字段为大端，位域按 LSB 在前排列（bilge 约定）。
//!
//! | 帧 | 基址 | 方向 |
//! |----|------|------|
//! | Control 1 | 0x02040000 | 控制器 → Talon，周期 10ms |
//! | Control 3 | 0x02040080 | 控制器 → Talon，单次（清除粘滞故障） |
//! | Status 1..9 | 0x02041400 + 0x40·(n-1) | Talon → 控制器 |
//! | Param Request / Response / Set | 0x02041800 / 0x02041840 / 0x02041880 | 双向 |

use crate::codec::{self, Payload};
use crate::{CanFrame, DeviceNumber, ProtocolError, ids::ArbitrationId};
use bilge::prelude::*;
use num_enum::{IntoPrimitive, TryFromPrimitive};

// ============================================================================
// 仲裁 ID
// ============================================================================

pub const STATUS_1: u32 = 0x0204_1400;
pub const STATUS_2: u32 = 0x0204_1440;
pub const STATUS_3: u32 = 0x0204_1480;
pub const STATUS_4: u32 = 0x0204_14C0;
pub const STATUS_5: u32 = 0x0204_1500;
pub const STATUS_6: u32 = 0x0204_1540;
pub const STATUS_7: u32 = 0x0204_1580;
pub const STATUS_8: u32 = 0x0204_15C0;
pub const STATUS_9: u32 = 0x0204_1600;

pub const CONTROL_1: u32 = 0x0204_0000;
pub const CONTROL_2: u32 = 0x0204_0040;
pub const CONTROL_3: u32 = 0x0204_0080;
pub const CONTROL_5: u32 = 0x0204_0100;
pub const CONTROL_6: u32 = 0x0204_0140;

pub const PARAM_REQUEST: u32 = 0x0204_1800;
pub const PARAM_RESPONSE: u32 = 0x0204_1840;
pub const PARAM_SET: u32 = 0x0204_1880;

/// 参数应答的期望超时
pub const EXPECTED_RESPONSE_TIMEOUT_MS: u64 = 200;

/// 默认控制帧周期
pub const DEFAULT_CONTROL_PERIOD_MS: u32 = 10;
pub const MIN_CONTROL_PERIOD_MS: u32 = 1;
pub const MAX_CONTROL_PERIOD_MS: u32 = 95;

/// 各状态帧的缓存超时（毫秒）
pub const STATUS_1_TIMEOUT_MS: u64 = 50;
pub const STATUS_2_TIMEOUT_MS: u64 = 50;
pub const STATUS_4_TIMEOUT_MS: u64 = 200;
pub const STATUS_5_TIMEOUT_MS: u64 = 999;

/// 占空比模式下需求值满量程
pub const DUTY_CYCLE_FULL_SCALE: f64 = 1023.0;

fn id_for(base: u32, device: DeviceNumber) -> ArbitrationId {
    ArbitrationId::for_device(base, device)
}

pub fn control_1_id(device: DeviceNumber) -> ArbitrationId {
    id_for(CONTROL_1, device)
}

pub fn control_3_id(device: DeviceNumber) -> ArbitrationId {
    id_for(CONTROL_3, device)
}

pub fn status_id(index: u8, device: DeviceNumber) -> Result<ArbitrationId, ProtocolError> {
    if !(1..=9).contains(&index) {
        return Err(ProtocolError::invalid_value("status_index", index));
    }
    Ok(id_for(STATUS_1 + 0x40 * (index as u32 - 1), device))
}

pub fn param_request_id(device: DeviceNumber) -> ArbitrationId {
    id_for(PARAM_REQUEST, device)
}

pub fn param_response_id(device: DeviceNumber) -> ArbitrationId {
    id_for(PARAM_RESPONSE, device)
}

pub fn param_set_id(device: DeviceNumber) -> ArbitrationId {
    id_for(PARAM_SET, device)
}

fn expect_base(frame: &CanFrame, base: u32) -> Result<(), ProtocolError> {
    frame.expect_id(base | (frame.id & crate::ids::CAN_MSGID_DEVNO_M))
}

// ============================================================================
// 枚举
// ============================================================================

/// 控制模式（Control 1 ModeSelect）
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum TalonMode {
    /// 需求值为 11 位有符号占空比 [-1023, 1023]
    DutyCycle = 0,
    PositionCloseLoop = 1,
    VelocityCloseLoop = 2,
    CurrentCloseLoop = 3,
    /// 需求值为 8.8 定点目标电压
    VoltCompen = 4,
    /// 需求值为主 Talon 的设备号
    SlaveFollower = 5,
    /// 运动曲线；需求值为曲线输出选择（0 禁用、1 启用、2 保持）
    MotionProfile = 6,
    /// 输出归零（遵循刹车/滑行设置）
    NoDrive = 15,
}

/// 反馈传感器选择
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum FeedbackDevice {
    QuadEncoder = 0,
    AnalogPot = 2,
    AnalogEncoder = 3,
    EncRising = 4,
    EncFalling = 5,
}

/// 刹车模式覆盖
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum BrakeOverride {
    UseDefaultsFromFlash = 0,
    OverrideCoast = 1,
    OverrideBrake = 2,
}

/// 参数枚举（参数请求/应答/设置帧的第 0 字节）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum TalonParam {
    Slot0P = 1,
    Slot0I = 2,
    Slot0D = 3,
    Slot0F = 4,
    Slot0IZone = 5,
    Slot0CloseLoopRampRate = 6,
    Slot1P = 11,
    Slot1I = 12,
    Slot1D = 13,
    Slot1F = 14,
    Slot1IZone = 15,
    Slot1CloseLoopRampRate = 16,
    SoftLimitForThreshold = 21,
    SoftLimitRevThreshold = 22,
    SoftLimitForEnable = 23,
    SoftLimitRevEnable = 24,
    OnBootBrakeMode = 31,
    OnBootLimitSwitchForwardNormallyClosed = 32,
    OnBootLimitSwitchReverseNormallyClosed = 33,
    OnBootLimitSwitchForwardDisable = 34,
    OnBootLimitSwitchReverseDisable = 35,
    SensorPosition = 73,
    SensorVelocity = 74,
    Current = 75,
    Temp = 85,
    BatteryV = 86,
    ResetCount = 87,
    ResetFlags = 88,
    FirmVers = 89,
}

/// 10.22 定点系数
pub const FLOAT_TO_FXP_10_22: f64 = 0x40_0000 as f64;
pub const FXP_TO_FLOAT_10_22: f64 = 1.0 / FLOAT_TO_FXP_10_22;

/// PID 增益槽位
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProfileSlot {
    #[default]
    Slot0,
    Slot1,
}

impl ProfileSlot {
    pub fn p(self) -> TalonParam {
        match self {
            ProfileSlot::Slot0 => TalonParam::Slot0P,
            ProfileSlot::Slot1 => TalonParam::Slot1P,
        }
    }

    pub fn i(self) -> TalonParam {
        match self {
            ProfileSlot::Slot0 => TalonParam::Slot0I,
            ProfileSlot::Slot1 => TalonParam::Slot1I,
        }
    }

    pub fn d(self) -> TalonParam {
        match self {
            ProfileSlot::Slot0 => TalonParam::Slot0D,
            ProfileSlot::Slot1 => TalonParam::Slot1D,
        }
    }

    pub fn f(self) -> TalonParam {
        match self {
            ProfileSlot::Slot0 => TalonParam::Slot0F,
            ProfileSlot::Slot1 => TalonParam::Slot1F,
        }
    }

    pub fn izone(self) -> TalonParam {
        match self {
            ProfileSlot::Slot0 => TalonParam::Slot0IZone,
            ProfileSlot::Slot1 => TalonParam::Slot1IZone,
        }
    }

    pub fn ramp_rate(self) -> TalonParam {
        match self {
            ProfileSlot::Slot0 => TalonParam::Slot0CloseLoopRampRate,
            ProfileSlot::Slot1 => TalonParam::Slot1CloseLoopRampRate,
        }
    }

    fn bit(self) -> bool {
        matches!(self, ProfileSlot::Slot1)
    }
}

impl TalonParam {
    /// 工程值 → 线上原始比特
    ///
    /// - P/I/D：无符号 10.22，限幅 [0, 1023]
    /// - F：有符号 10.22，限幅 [-512, 512]
    /// - 其他：整数
    pub fn encode(self, value: f64) -> i32 {
        match self {
            TalonParam::Slot0P
            | TalonParam::Slot0I
            | TalonParam::Slot0D
            | TalonParam::Slot1P
            | TalonParam::Slot1I
            | TalonParam::Slot1D => {
                let unsigned = (value.clamp(0.0, 1023.0) * FLOAT_TO_FXP_10_22) as u32;
                unsigned as i32
            },
            TalonParam::Slot0F | TalonParam::Slot1F => {
                (value.clamp(-512.0, 512.0) * FLOAT_TO_FXP_10_22) as i32
            },
            _ => value as i32,
        }
    }

    /// 线上原始比特 → 工程值
    pub fn decode(self, raw: i32) -> f64 {
        match self {
            TalonParam::Slot0P
            | TalonParam::Slot0I
            | TalonParam::Slot0D
            | TalonParam::Slot0F
            | TalonParam::Slot1P
            | TalonParam::Slot1I
            | TalonParam::Slot1D
            | TalonParam::Slot1F
            | TalonParam::Current
            | TalonParam::Temp
            | TalonParam::BatteryV => raw as f64 * FXP_TO_FLOAT_10_22,
            _ => raw as f64,
        }
    }
}

// ============================================================================
// Control 1
// ============================================================================

/// Control 1 Byte 5
#[bitsize(8)]
#[derive(FromBits, DebugBits, Clone, Copy, Default)]
pub struct Control1Byte5 {
    pub profile_slot_select: bool,     // Bit 0
    pub feedback_device_select: u4,    // Bit 1-4
    pub override_limit_switch_en: u3,  // Bit 5-7
}

/// Control 1 Byte 6
#[bitsize(8)]
#[derive(FromBits, DebugBits, Clone, Copy, Default)]
pub struct Control1Byte6 {
    pub rev_feedback_sensor: bool,          // Bit 0
    pub rev_mot_during_close_loop_en: bool, // Bit 1
    pub override_brake_type: u2,            // Bit 2-3
    pub mode_select: u4,                    // Bit 4-7
}

/// Control 1 字段偏移
pub const CONTROL_1_DEMAND_OFFSET: usize = 2;
pub const CONTROL_1_RAMP_THROTTLE_OFFSET: usize = 7;

/// Control 1 通用控制帧 (0x02040000)
///
/// ```text
/// Byte 0-1: Token
/// Byte 2-4: Demand（24 位有符号，大端）
/// Byte 5:   ProfileSlotSelect:1 FeedbackDeviceSelect:4 OverrideLimitSwitchEn:3
/// Byte 6:   RevFeedbackSensor:1 RevMotDuringCloseLoopEn:1 OverrideBrakeType:2 ModeSelect:4
/// Byte 7:   RampThrottle
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct Control1 {
    pub token: u16,
    pub demand: i32,
    pub byte5: Control1Byte5,
    pub byte6: Control1Byte6,
    pub ramp_throttle: u8,
}

impl Control1 {
    /// 从会话中保存的负载读出
    pub fn from_payload(payload: &Payload) -> Self {
        Self {
            token: codec::unpack_u16(payload, 0),
            demand: codec::unpack_i24(payload, CONTROL_1_DEMAND_OFFSET),
            byte5: Control1Byte5::from(u8::new(payload[5])),
            byte6: Control1Byte6::from(u8::new(payload[6])),
            ramp_throttle: payload[CONTROL_1_RAMP_THROTTLE_OFFSET],
        }
    }

    /// 写回负载（读-改-写的最后一步）
    pub fn write_into(&self, payload: &mut Payload) {
        codec::pack_u16(payload, 0, self.token);
        codec::pack_i24(payload, CONTROL_1_DEMAND_OFFSET, self.demand);
        payload[5] = u8::from(self.byte5).value();
        payload[6] = u8::from(self.byte6).value();
        payload[CONTROL_1_RAMP_THROTTLE_OFFSET] = self.ramp_throttle;
    }

    pub fn mode(&self) -> Result<TalonMode, ProtocolError> {
        let raw = self.byte6.mode_select().value();
        TalonMode::try_from(raw).map_err(|_| ProtocolError::invalid_value("mode_select", raw))
    }

    pub fn set_mode(&mut self, mode: TalonMode) {
        self.byte6.set_mode_select(u4::new(u8::from(mode)));
    }

    pub fn set_feedback_device(&mut self, device: FeedbackDevice) {
        self.byte5.set_feedback_device_select(u4::new(u8::from(device)));
    }

    pub fn set_profile_slot(&mut self, slot: ProfileSlot) {
        self.byte5.set_profile_slot_select(slot.bit());
    }

    pub fn set_override_brake(&mut self, brake: BrakeOverride) {
        self.byte6.set_override_brake_type(u2::new(u8::from(brake)));
    }

    pub fn set_override_limit_switch(&mut self, value: u8) {
        self.byte5.set_override_limit_switch_en(u3::new(value & 0x07));
    }

    pub fn set_rev_feedback_sensor(&mut self, reversed: bool) {
        self.byte6.set_rev_feedback_sensor(reversed);
    }

    pub fn set_rev_mot_during_close_loop(&mut self, reversed: bool) {
        self.byte6.set_rev_mot_during_close_loop_en(reversed);
    }
}

/// 占空比 [-1, 1] → 需求值 [-1023, 1023]
pub fn duty_cycle_to_demand(value: f64) -> i32 {
    (value.clamp(-1.0, 1.0) * DUTY_CYCLE_FULL_SCALE) as i32
}

// ============================================================================
// Control 3
// ============================================================================

/// Control 3 单次标志
#[bitsize(8)]
#[derive(FromBits, DebugBits, Clone, Copy, Default)]
pub struct Control3Flags {
    pub zero_feedback_sensor: bool, // Bit 0
    pub clear_sticky_faults: bool,  // Bit 1
    pub reserved: u6,               // Bit 2-7
}

/// 构建清除粘滞故障单次帧
pub fn clear_sticky_faults_frame(device: DeviceNumber) -> CanFrame {
    let mut flags = Control3Flags::default();
    flags.set_clear_sticky_faults(true);
    CanFrame::new(
        control_3_id(device).raw(),
        &[u8::from(flags).value(), 0, 0, 0],
    )
}

// ============================================================================
// Status 1 (General, 10ms)
// ============================================================================

#[bitsize(8)]
#[derive(FromBits, DebugBits, Clone, Copy, Default)]
pub struct Status1Byte3 {
    pub applied_throttle_h3: u3,        // Bit 0-2
    pub fault_rev_soft_lim: bool,       // Bit 3
    pub fault_for_soft_lim: bool,       // Bit 4
    pub tok_locked: bool,               // Bit 5
    pub limit_switch_closed_rev: bool,  // Bit 6
    pub limit_switch_closed_for: bool,  // Bit 7
}

#[bitsize(8)]
#[derive(FromBits, DebugBits, Clone, Copy, Default)]
pub struct Status1Byte5 {
    pub mode_select_h1: u1,          // Bit 0
    pub feedback_device_select: u4,  // Bit 1-4
    pub limit_switch_en: u3,         // Bit 5-7
}

#[bitsize(8)]
#[derive(FromBits, DebugBits, Clone, Copy, Default)]
pub struct Status1Byte6 {
    pub fault_hardware_failure: bool, // Bit 0
    pub fault_rev_lim: bool,          // Bit 1
    pub fault_for_lim: bool,          // Bit 2
    pub fault_under_voltage: bool,    // Bit 3
    pub fault_over_temp: bool,        // Bit 4
    pub mode_select_b3: u3,           // Bit 5-7
}

/// Status 1 通用状态帧
///
/// ```text
/// Byte 0-2: CloseLoopErr（24 位有符号）
/// Byte 3:   AppliedThrottle_h3:3 故障/限位标志
/// Byte 4:   AppliedThrottle_l8
/// Byte 5:   ModeSelect_h1:1 FeedbackDeviceSelect:4 LimitSwitchEn:3
/// Byte 6:   故障标志:5 ModeSelect_b3:3
/// Byte 7:   TokenSeed
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct Status1 {
    pub close_loop_err: i32,
    pub byte3: Status1Byte3,
    pub applied_throttle_l8: u8,
    pub byte5: Status1Byte5,
    pub byte6: Status1Byte6,
    pub token_seed: u8,
}

impl Status1 {
    /// 11 位有符号输出油门 [-1023, 1023]
    pub fn applied_throttle(&self) -> i32 {
        let raw = ((self.byte3.applied_throttle_h3().value() as u32) << 8)
            | self.applied_throttle_l8 as u32;
        codec::sign_extend(raw, 11)
    }

    pub fn mode_select(&self) -> u8 {
        (self.byte5.mode_select_h1().value() << 3) | self.byte6.mode_select_b3().value()
    }

    pub fn fault_over_temp(&self) -> bool {
        self.byte6.fault_over_temp()
    }

    pub fn fault_under_voltage(&self) -> bool {
        self.byte6.fault_under_voltage()
    }

    pub fn fault_for_lim(&self) -> bool {
        self.byte6.fault_for_lim()
    }

    pub fn fault_rev_lim(&self) -> bool {
        self.byte6.fault_rev_lim()
    }

    pub fn fault_hardware_failure(&self) -> bool {
        self.byte6.fault_hardware_failure()
    }

    pub fn fault_for_soft_lim(&self) -> bool {
        self.byte3.fault_for_soft_lim()
    }

    pub fn fault_rev_soft_lim(&self) -> bool {
        self.byte3.fault_rev_soft_lim()
    }

    pub fn limit_switch_closed_for(&self) -> bool {
        self.byte3.limit_switch_closed_for()
    }

    pub fn limit_switch_closed_rev(&self) -> bool {
        self.byte3.limit_switch_closed_rev()
    }

    /// 从 8 字节负载解析（不校验 ID）
    pub fn from_payload(payload: &Payload) -> Self {
        Self {
            close_loop_err: codec::unpack_i24(payload, 0),
            byte3: Status1Byte3::from(u8::new(payload[3])),
            applied_throttle_l8: payload[4],
            byte5: Status1Byte5::from(u8::new(payload[5])),
            byte6: Status1Byte6::from(u8::new(payload[6])),
            token_seed: payload[7],
        }
    }
}

impl TryFrom<CanFrame> for Status1 {
    type Error = ProtocolError;

    fn try_from(frame: CanFrame) -> Result<Self, Self::Error> {
        expect_base(&frame, STATUS_1)?;
        frame.expect_len(8)?;
        Ok(Self::from_payload(&frame.data))
    }
}

// ============================================================================
// Status 2 (Feedback, 20ms)
// ============================================================================

#[bitsize(8)]
#[derive(FromBits, DebugBits, Clone, Copy, Default)]
pub struct Status2Byte6 {
    pub stcky_fault_over_temp: bool,      // Bit 0
    pub stcky_fault_under_voltage: bool,  // Bit 1
    pub stcky_fault_for_lim: bool,        // Bit 2
    pub stcky_fault_rev_lim: bool,        // Bit 3
    pub stcky_fault_for_soft_lim: bool,   // Bit 4
    pub stcky_fault_rev_soft_lim: bool,   // Bit 5
    pub current_l2: u2,                   // Bit 6-7
}

#[bitsize(8)]
#[derive(FromBits, DebugBits, Clone, Copy, Default)]
pub struct Status2Byte7 {
    pub brake_is_enabled: bool,     // Bit 0
    pub profile_slot_select: bool,  // Bit 1
    pub vel_div4: bool,             // Bit 2
    pub pos_div8: bool,             // Bit 3
    pub reserved: u4,               // Bit 4-7
}

/// Status 2 反馈帧
///
/// ```text
/// Byte 0-2: SensorPosition（24 位有符号，PosDiv8 时 ×8）
/// Byte 3-4: SensorVelocity（16 位有符号，VelDiv4 时 ×4）
/// Byte 5:   Current_h8
/// Byte 6:   粘滞故障:6 Current_l2:2
/// Byte 7:   BrakeIsEnabled ProfileSlotSelect VelDiv4 PosDiv8
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct Status2 {
    pub sensor_position_raw: i32,
    pub sensor_velocity_raw: i16,
    pub current_h8: u8,
    pub byte6: Status2Byte6,
    pub byte7: Status2Byte7,
}

impl Status2 {
    pub fn sensor_position(&self) -> i32 {
        if self.byte7.pos_div8() {
            self.sensor_position_raw.saturating_mul(8)
        } else {
            self.sensor_position_raw
        }
    }

    pub fn sensor_velocity(&self) -> i32 {
        let raw = self.sensor_velocity_raw as i32;
        if self.byte7.vel_div4() { raw * 4 } else { raw }
    }

    /// 输出电流（A），10 位 × 0.125
    pub fn current(&self) -> f64 {
        let raw = ((self.current_h8 as u32) << 2) | self.byte6.current_l2().value() as u32;
        raw as f64 * codec::AMPS_PER_COUNT
    }

    pub fn brake_is_enabled(&self) -> bool {
        self.byte7.brake_is_enabled()
    }

    pub fn from_payload(payload: &Payload) -> Self {
        Self {
            sensor_position_raw: codec::unpack_i24(payload, 0),
            sensor_velocity_raw: codec::unpack_i16(payload, 3),
            current_h8: payload[5],
            byte6: Status2Byte6::from(u8::new(payload[6])),
            byte7: Status2Byte7::from(u8::new(payload[7])),
        }
    }
}

impl TryFrom<CanFrame> for Status2 {
    type Error = ProtocolError;

    fn try_from(frame: CanFrame) -> Result<Self, Self::Error> {
        expect_base(&frame, STATUS_2)?;
        frame.expect_len(8)?;
        Ok(Self::from_payload(&frame.data))
    }
}

// ============================================================================
// Status 4 (AinTempVbat, 100ms)
// ============================================================================

/// Status 4 模拟输入 / 温度 / 电池电压
///
/// ```text
/// Byte 0-2: AnalogInWithOv（24 位有符号）
/// Byte 3-4: AnalogInVel（16 位有符号）
/// Byte 5:   Temp
/// Byte 6:   BatteryV
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Status4 {
    pub analog_in_with_ov: i32,
    pub analog_in_vel: i16,
    pub temp_raw: u8,
    pub battery_v_raw: u8,
}

impl Status4 {
    /// 温度（℃）：raw × 0.6451612903 − 50
    pub fn temperature(&self) -> f64 {
        codec::linear(self.temp_raw as f64, 0.645_161_290_3, -50.0)
    }

    /// 电池电压（V）：raw × 0.05 + 4
    pub fn battery_voltage(&self) -> f64 {
        codec::battery_voltage(self.battery_v_raw)
    }

    pub fn from_payload(payload: &Payload) -> Self {
        Self {
            analog_in_with_ov: codec::unpack_i24(payload, 0),
            analog_in_vel: codec::unpack_i16(payload, 3),
            temp_raw: payload[5],
            battery_v_raw: payload[6],
        }
    }
}

impl TryFrom<CanFrame> for Status4 {
    type Error = ProtocolError;

    fn try_from(frame: CanFrame) -> Result<Self, Self::Error> {
        expect_base(&frame, STATUS_4)?;
        frame.expect_len(7)?;
        Ok(Self::from_payload(&frame.data))
    }
}

// ============================================================================
// Status 5 (Startup)
// ============================================================================

/// Status 5 启动信息
///
/// ```text
/// Byte 0-1: ResetCount
/// Byte 2-3: ResetFlags
/// Byte 4-5: FirmVers
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Status5 {
    pub reset_count: u16,
    pub reset_flags: u16,
    pub firmware_version: u16,
}

impl Status5 {
    pub fn from_payload(payload: &Payload) -> Self {
        Self {
            reset_count: codec::unpack_u16(payload, 0),
            reset_flags: codec::unpack_u16(payload, 2),
            firmware_version: codec::unpack_u16(payload, 4),
        }
    }
}

impl TryFrom<CanFrame> for Status5 {
    type Error = ProtocolError;

    fn try_from(frame: CanFrame) -> Result<Self, Self::Error> {
        expect_base(&frame, STATUS_5)?;
        frame.expect_len(6)?;
        Ok(Self::from_payload(&frame.data))
    }
}

// ============================================================================
// 参数帧
// ============================================================================

/// 参数请求帧：Byte 0 = 参数枚举
pub fn param_request_frame(device: DeviceNumber, param: TalonParam) -> CanFrame {
    CanFrame::new(param_request_id(device).raw(), &[u8::from(param)])
}

/// 参数设置帧：Byte 0 = 参数枚举，Byte 1-4 = 大端原始值
pub fn param_set_frame(device: DeviceNumber, param: TalonParam, raw: i32) -> CanFrame {
    let mut payload = [0u8; 8];
    payload[0] = u8::from(param);
    codec::pack_i32(&mut payload, 1, raw);
    CanFrame::from_payload(param_set_id(device).raw(), payload, 5)
}

/// 参数应答帧
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamResponse {
    pub param: TalonParam,
    pub raw: i32,
}

impl ParamResponse {
    pub fn value(&self) -> f64 {
        self.param.decode(self.raw)
    }

    /// 构建应答帧（设备侧，测试中模拟 Talon 使用）
    pub fn to_frame(&self, device: DeviceNumber) -> CanFrame {
        let mut payload = [0u8; 8];
        payload[0] = u8::from(self.param);
        codec::pack_i32(&mut payload, 1, self.raw);
        CanFrame::from_payload(param_response_id(device).raw(), payload, 5)
    }
}

impl TryFrom<CanFrame> for ParamResponse {
    type Error = ProtocolError;

    fn try_from(frame: CanFrame) -> Result<Self, Self::Error> {
        expect_base(&frame, PARAM_RESPONSE)?;
        frame.expect_len(5)?;
        let param = TalonParam::try_from(frame.data[0])
            .map_err(|_| ProtocolError::invalid_value("param_enum", frame.data[0]))?;
        Ok(Self {
            param,
            raw: codec::unpack_i32(&frame.data, 1),
        })
    }
}
