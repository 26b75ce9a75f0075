//! Jaguar 电机控制器帧布局
//!
//! Jaguar 字段为小端。消息 ID = 厂商(LM) | 设备类型(Motor) | API 类别 | 序号 << 6 | 设备号。
//! 受信任的控制消息（`*_T_EN` / `*_T_SET`）在数据前附加 2 字节令牌（全 0）。

use crate::codec::{self, Fxp16Scale, Fxp32Scale, Payload};
use crate::ids::{ArbitrationId, CAN_MSGID_API_S, CAN_MSGID_DEVNO_M};
use crate::{CanFrame, DeviceNumber, ProtocolError};
use bilge::prelude::*;
use num_enum::{IntoPrimitive, TryFromPrimitive};

pub const CAN_MSGID_MFR_LM: u32 = 0x0002_0000;
pub const CAN_MSGID_DTYPE_MOTOR: u32 = 0x0200_0000;

const LM_MOTOR: u32 = CAN_MSGID_MFR_LM | CAN_MSGID_DTYPE_MOTOR;

pub const CAN_API_MC_VOLTAGE: u32 = 0x0000_0000;
pub const CAN_API_MC_SPD: u32 = 0x0000_0400;
pub const CAN_API_MC_VCOMP: u32 = 0x0000_0800;
pub const CAN_API_MC_POS: u32 = 0x0000_0c00;
pub const CAN_API_MC_ICTRL: u32 = 0x0000_1000;
pub const CAN_API_MC_STATUS: u32 = 0x0000_1400;
pub const CAN_API_MC_PSTAT: u32 = 0x0000_1800;
pub const CAN_API_MC_CFG: u32 = 0x0000_1c00;

const fn api(class: u32, index: u32) -> u32 {
    LM_MOTOR | class | (index << CAN_MSGID_API_S)
}

pub const LM_API_VOLT_T_EN: u32 = api(CAN_API_MC_VOLTAGE, 4);
pub const LM_API_VOLT_T_SET: u32 = api(CAN_API_MC_VOLTAGE, 5);
pub const LM_API_VOLT_DIS: u32 = api(CAN_API_MC_VOLTAGE, 1);
pub const LM_API_VOLT_SET_RAMP: u32 = api(CAN_API_MC_VOLTAGE, 3);

pub const LM_API_SPD_DIS: u32 = api(CAN_API_MC_SPD, 1);
pub const LM_API_SPD_PC: u32 = api(CAN_API_MC_SPD, 3);
pub const LM_API_SPD_IC: u32 = api(CAN_API_MC_SPD, 4);
pub const LM_API_SPD_DC: u32 = api(CAN_API_MC_SPD, 5);
pub const LM_API_SPD_REF: u32 = api(CAN_API_MC_SPD, 6);
pub const LM_API_SPD_T_EN: u32 = api(CAN_API_MC_SPD, 7);
pub const LM_API_SPD_T_SET: u32 = api(CAN_API_MC_SPD, 8);

pub const LM_API_VCOMP_DIS: u32 = api(CAN_API_MC_VCOMP, 1);
pub const LM_API_VCOMP_COMP_RAMP: u32 = api(CAN_API_MC_VCOMP, 4);
pub const LM_API_VCOMP_T_EN: u32 = api(CAN_API_MC_VCOMP, 5);
pub const LM_API_VCOMP_T_SET: u32 = api(CAN_API_MC_VCOMP, 6);

pub const LM_API_POS_DIS: u32 = api(CAN_API_MC_POS, 1);
pub const LM_API_POS_PC: u32 = api(CAN_API_MC_POS, 3);
pub const LM_API_POS_IC: u32 = api(CAN_API_MC_POS, 4);
pub const LM_API_POS_DC: u32 = api(CAN_API_MC_POS, 5);
pub const LM_API_POS_REF: u32 = api(CAN_API_MC_POS, 6);
pub const LM_API_POS_T_EN: u32 = api(CAN_API_MC_POS, 7);
pub const LM_API_POS_T_SET: u32 = api(CAN_API_MC_POS, 8);

pub const LM_API_ICTRL_DIS: u32 = api(CAN_API_MC_ICTRL, 1);
pub const LM_API_ICTRL_PC: u32 = api(CAN_API_MC_ICTRL, 3);
pub const LM_API_ICTRL_IC: u32 = api(CAN_API_MC_ICTRL, 4);
pub const LM_API_ICTRL_DC: u32 = api(CAN_API_MC_ICTRL, 5);
pub const LM_API_ICTRL_T_EN: u32 = api(CAN_API_MC_ICTRL, 6);
pub const LM_API_ICTRL_T_SET: u32 = api(CAN_API_MC_ICTRL, 7);

pub const LM_API_STATUS_POWER: u32 = api(CAN_API_MC_STATUS, 8);
pub const LM_API_STATUS_CMODE: u32 = api(CAN_API_MC_STATUS, 9);

pub const LM_API_PSTAT_PER_EN_S0: u32 = api(CAN_API_MC_PSTAT, 0);
pub const LM_API_PSTAT_PER_EN_S1: u32 = api(CAN_API_MC_PSTAT, 1);
pub const LM_API_PSTAT_PER_EN_S2: u32 = api(CAN_API_MC_PSTAT, 2);
pub const LM_API_PSTAT_CFG_S0: u32 = api(CAN_API_MC_PSTAT, 4);
pub const LM_API_PSTAT_CFG_S1: u32 = api(CAN_API_MC_PSTAT, 5);
pub const LM_API_PSTAT_CFG_S2: u32 = api(CAN_API_MC_PSTAT, 6);
pub const LM_API_PSTAT_DATA_S0: u32 = api(CAN_API_MC_PSTAT, 8);
pub const LM_API_PSTAT_DATA_S1: u32 = api(CAN_API_MC_PSTAT, 9);
pub const LM_API_PSTAT_DATA_S2: u32 = api(CAN_API_MC_PSTAT, 10);

pub const LM_API_CFG_ENC_LINES: u32 = api(CAN_API_MC_CFG, 1);
pub const LM_API_CFG_POT_TURNS: u32 = api(CAN_API_MC_CFG, 2);
pub const LM_API_CFG_BRAKE_COAST: u32 = api(CAN_API_MC_CFG, 3);
pub const LM_API_CFG_LIMIT_MODE: u32 = api(CAN_API_MC_CFG, 4);
pub const LM_API_CFG_LIMIT_FWD: u32 = api(CAN_API_MC_CFG, 5);
pub const LM_API_CFG_LIMIT_REV: u32 = api(CAN_API_MC_CFG, 6);
pub const LM_API_CFG_MAX_VOUT: u32 = api(CAN_API_MC_CFG, 7);
pub const LM_API_CFG_FAULT_TIME: u32 = api(CAN_API_MC_CFG, 8);

/// 固件版本（通用 API，无厂商/设备类型前缀）
pub const CAN_MSGID_API_FIRMVER: u32 = 0x0000_0200;

/// 设定值与周期状态的发送周期
pub const SEND_MESSAGE_PERIOD_MS: u32 = 20;
/// 构造时等待状态消息的轮询次数
pub const RECEIVE_STATUS_ATTEMPTS: u32 = 50;
/// 控制器内部速率（每秒更新次数）
pub const CONTROLLER_RATE: f64 = 1000.0;

/// 最小 / 最大故障恢复时间（秒）
pub const MIN_FAULT_TIME_S: f64 = 0.5;
pub const MAX_FAULT_TIME_S: f64 = 3.0;

const TRUSTED_MESSAGES: [u32; 10] = [
    LM_API_VOLT_T_EN,
    LM_API_VOLT_T_SET,
    LM_API_SPD_T_EN,
    LM_API_SPD_T_SET,
    LM_API_VCOMP_T_EN,
    LM_API_VCOMP_T_SET,
    LM_API_POS_T_EN,
    LM_API_POS_T_SET,
    LM_API_ICTRL_T_EN,
    LM_API_ICTRL_T_SET,
];

/// 受信任消息的令牌长度
pub const TRUST_TOKEN_LEN: usize = 2;

pub fn is_trusted(base: u32) -> bool {
    let base = base & !CAN_MSGID_DEVNO_M;
    TRUSTED_MESSAGES.contains(&base)
}

/// 构建发往 Jaguar 的消息帧，受信任消息自动加令牌
pub fn message_frame(
    base: u32,
    device: DeviceNumber,
    data: &[u8],
) -> Result<CanFrame, ProtocolError> {
    let id = ArbitrationId::for_device(base, device).raw();
    if is_trusted(base) {
        if data.len() > codec::FRAME_SIZE - TRUST_TOKEN_LEN {
            return Err(ProtocolError::InvalidLength {
                expected: codec::FRAME_SIZE - TRUST_TOKEN_LEN,
                actual: data.len(),
            });
        }
        let mut payload = [0u8; 8];
        payload[TRUST_TOKEN_LEN..TRUST_TOKEN_LEN + data.len()].copy_from_slice(data);
        return Ok(CanFrame::from_payload(
            id,
            payload,
            (data.len() + TRUST_TOKEN_LEN) as u8,
        ));
    }
    if data.len() > codec::FRAME_SIZE {
        return Err(ProtocolError::InvalidLength {
            expected: codec::FRAME_SIZE,
            actual: data.len(),
        });
    }
    Ok(CanFrame::new(id, data))
}

/// 构建无数据的请求帧（Jaguar 以同一 ID 应答）
pub fn request_frame(base: u32, device: DeviceNumber) -> CanFrame {
    CanFrame::new(ArbitrationId::for_device(base, device).raw(), &[])
}

// ============================================================================
// 枚举
// ============================================================================

/// 控制模式（STATUS_CMODE 回读值）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum JaguarMode {
    PercentVbus = 0,
    Current = 1,
    Speed = 2,
    Position = 3,
    Voltage = 4,
}

impl JaguarMode {
    /// 使能控制的消息
    pub fn enable_message(self) -> u32 {
        match self {
            JaguarMode::PercentVbus => LM_API_VOLT_T_EN,
            JaguarMode::Current => LM_API_ICTRL_T_EN,
            JaguarMode::Speed => LM_API_SPD_T_EN,
            JaguarMode::Position => LM_API_POS_T_EN,
            JaguarMode::Voltage => LM_API_VCOMP_T_EN,
        }
    }

    /// 禁用控制的消息
    pub fn disable_message(self) -> u32 {
        match self {
            JaguarMode::PercentVbus => LM_API_VOLT_DIS,
            JaguarMode::Current => LM_API_ICTRL_DIS,
            JaguarMode::Speed => LM_API_SPD_DIS,
            JaguarMode::Position => LM_API_POS_DIS,
            JaguarMode::Voltage => LM_API_VCOMP_DIS,
        }
    }

    /// 设定值消息
    pub fn set_message(self) -> u32 {
        match self {
            JaguarMode::PercentVbus => LM_API_VOLT_T_SET,
            JaguarMode::Current => LM_API_ICTRL_T_SET,
            JaguarMode::Speed => LM_API_SPD_T_SET,
            JaguarMode::Position => LM_API_POS_T_SET,
            JaguarMode::Voltage => LM_API_VCOMP_T_SET,
        }
    }

    /// PID 系数消息（P, I, D），仅闭环模式可用
    pub fn pid_messages(self) -> Option<[u32; 3]> {
        match self {
            JaguarMode::Speed => Some([LM_API_SPD_PC, LM_API_SPD_IC, LM_API_SPD_DC]),
            JaguarMode::Position => Some([LM_API_POS_PC, LM_API_POS_IC, LM_API_POS_DC]),
            JaguarMode::Current => Some([LM_API_ICTRL_PC, LM_API_ICTRL_IC, LM_API_ICTRL_DC]),
            JaguarMode::PercentVbus | JaguarMode::Voltage => None,
        }
    }

    /// 编码设定值负载（不含令牌）
    ///
    /// - PercentVbus：限幅 [-1, 1]，×32767
    /// - Speed / Position：Q16.16
    /// - Current / Voltage：Q8.8
    pub fn encode_setpoint(self, value: f64) -> ([u8; 8], usize) {
        let mut payload = [0u8; 8];
        let len = match self {
            JaguarMode::PercentVbus => {
                pack_percentage(&mut payload, 0, value.clamp(-1.0, 1.0));
                2
            },
            JaguarMode::Speed | JaguarMode::Position => {
                codec::pack_fxp32_le(&mut payload, 0, value, Fxp32Scale::Q16_16_65536);
                4
            },
            JaguarMode::Current | JaguarMode::Voltage => {
                codec::pack_fxp16_le(&mut payload, 0, value, Fxp16Scale::Q8_8_256);
                2
            },
        };
        (payload, len)
    }
}

/// 中性（无驱动）时的 H 桥行为
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum NeutralMode {
    Jumper = 0,
    Brake = 1,
    Coast = 2,
}

/// 限位模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum LimitMode {
    SwitchInputsOnly = 0,
    SoftPositionLimits = 1,
}

/// 速度/位置参考源
pub const LM_REF_ENCODER: u8 = 0x00;
pub const LM_REF_POT: u8 = 0x01;
pub const LM_REF_INV_ENCODER: u8 = 0x02;
pub const LM_REF_QUAD_ENCODER: u8 = 0x03;
pub const LM_REF_NONE: u8 = 0xff;

// ============================================================================
// 百分比编码
// ============================================================================

/// 百分比：raw = trunc(value × 32767)，小端 2 字节
#[track_caller]
pub fn pack_percentage(buf: &mut Payload, offset: usize, value: f64) {
    codec::pack_i16_le(buf, offset, (value * 32767.0) as i16);
}

#[track_caller]
pub fn unpack_percentage(buf: &Payload, offset: usize) -> f64 {
    codec::unpack_i16_le(buf, offset) as f64 / 32767.0
}

// ============================================================================
// 周期状态
// ============================================================================

const LM_PSTAT_END: u8 = 0;
const LM_PSTAT_VOLTOUT_B0: u8 = 1;
const LM_PSTAT_VOLTOUT_B1: u8 = 2;
const LM_PSTAT_VOLTBUS_B0: u8 = 3;
const LM_PSTAT_VOLTBUS_B1: u8 = 4;
const LM_PSTAT_CURRENT_B0: u8 = 5;
const LM_PSTAT_CURRENT_B1: u8 = 6;
const LM_PSTAT_TEMP_B0: u8 = 7;
const LM_PSTAT_TEMP_B1: u8 = 8;
const LM_PSTAT_POS_B0: u8 = 9;
const LM_PSTAT_POS_B1: u8 = 10;
const LM_PSTAT_POS_B2: u8 = 11;
const LM_PSTAT_POS_B3: u8 = 12;
const LM_PSTAT_SPD_B0: u8 = 13;
const LM_PSTAT_SPD_B1: u8 = 14;
const LM_PSTAT_SPD_B2: u8 = 15;
const LM_PSTAT_SPD_B3: u8 = 16;
const LM_PSTAT_LIMIT_CLR: u8 = 18;
const LM_PSTAT_FAULT: u8 = 19;

/// 周期状态 0：母线电压、输出电压、输出电流、温度
pub const PSTAT_MESSAGE_0: [u8; 8] = [
    LM_PSTAT_VOLTBUS_B0,
    LM_PSTAT_VOLTBUS_B1,
    LM_PSTAT_VOLTOUT_B0,
    LM_PSTAT_VOLTOUT_B1,
    LM_PSTAT_CURRENT_B0,
    LM_PSTAT_CURRENT_B1,
    LM_PSTAT_TEMP_B0,
    LM_PSTAT_TEMP_B1,
];

/// 周期状态 1：位置、速度
pub const PSTAT_MESSAGE_1: [u8; 8] = [
    LM_PSTAT_POS_B0,
    LM_PSTAT_POS_B1,
    LM_PSTAT_POS_B2,
    LM_PSTAT_POS_B3,
    LM_PSTAT_SPD_B0,
    LM_PSTAT_SPD_B1,
    LM_PSTAT_SPD_B2,
    LM_PSTAT_SPD_B3,
];

/// 周期状态 2：限位、故障
pub const PSTAT_MESSAGE_2: [u8; 8] = [
    LM_PSTAT_LIMIT_CLR,
    LM_PSTAT_FAULT,
    LM_PSTAT_END,
    0,
    0,
    0,
    0,
    0,
];

/// 周期状态配置帧序列：三个周期使能帧 + 三个内容配置帧
pub fn periodic_status_setup(device: DeviceNumber) -> Vec<CanFrame> {
    let mut period = [0u8; 8];
    codec::pack_i16_le(&mut period, 0, SEND_MESSAGE_PERIOD_MS as i16);
    let mut frames = Vec::with_capacity(6);
    for base in [LM_API_PSTAT_PER_EN_S0, LM_API_PSTAT_PER_EN_S1, LM_API_PSTAT_PER_EN_S2] {
        frames.push(CanFrame::new(
            ArbitrationId::for_device(base, device).raw(),
            &period[..2],
        ));
    }
    for (base, content) in [
        (LM_API_PSTAT_CFG_S0, PSTAT_MESSAGE_0),
        (LM_API_PSTAT_CFG_S1, PSTAT_MESSAGE_1),
        (LM_API_PSTAT_CFG_S2, PSTAT_MESSAGE_2),
    ] {
        frames.push(CanFrame::new(
            ArbitrationId::for_device(base, device).raw(),
            &content,
        ));
    }
    frames
}

/// 周期状态 0 数据
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PeriodicStatus0 {
    pub bus_voltage: f64,
    pub output_voltage: f64,
    pub output_current: f64,
    pub temperature: f64,
}

impl PeriodicStatus0 {
    pub fn from_payload(payload: &Payload) -> Self {
        let bus_voltage = codec::unpack_fxp16_le(payload, 0, Fxp16Scale::Q8_8_256);
        Self {
            bus_voltage,
            output_voltage: unpack_percentage(payload, 2) * bus_voltage,
            output_current: codec::unpack_fxp16_le(payload, 4, Fxp16Scale::Q8_8_256),
            temperature: codec::unpack_fxp16_le(payload, 6, Fxp16Scale::Q8_8_256),
        }
    }
}

/// 周期状态 1 数据
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PeriodicStatus1 {
    pub position: f64,
    pub speed: f64,
}

impl PeriodicStatus1 {
    pub fn from_payload(payload: &Payload) -> Self {
        Self {
            position: codec::unpack_fxp32_le(payload, 0, Fxp32Scale::Q16_16_65536),
            speed: codec::unpack_fxp32_le(payload, 4, Fxp32Scale::Q16_16_65536),
        }
    }
}

/// 限位状态位
#[bitsize(8)]
#[derive(FromBits, DebugBits, Clone, Copy, Default, PartialEq)]
pub struct Limits {
    pub forward: bool,          // Bit 0
    pub reverse: bool,          // Bit 1
    pub soft_forward: bool,     // Bit 2
    pub soft_reverse: bool,     // Bit 3
    pub sticky_forward: bool,   // Bit 4
    pub sticky_reverse: bool,   // Bit 5
    pub sticky_soft_forward: bool, // Bit 6
    pub sticky_soft_reverse: bool, // Bit 7
}

/// 故障位
#[bitsize(8)]
#[derive(FromBits, DebugBits, Clone, Copy, Default, PartialEq)]
pub struct Faults {
    pub current_fault: bool,     // Bit 0
    pub temperature_fault: bool, // Bit 1
    pub bus_voltage_fault: bool, // Bit 2
    pub gate_driver_fault: bool, // Bit 3
    pub reserved: u4,            // Bit 4-7
}

/// 周期状态 2 数据
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PeriodicStatus2 {
    pub limits: Limits,
    pub faults: Faults,
}

impl PeriodicStatus2 {
    pub fn from_payload(payload: &Payload) -> Self {
        Self {
            limits: Limits::from(u8::new(payload[0])),
            faults: Faults::from(u8::new(payload[1])),
        }
    }
}

// ============================================================================
// 配置参数
// ============================================================================

/// 可回读校验的配置参数
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum JaguarParam {
    ControlMode,
    SpeedReference,
    PositionReference,
    P,
    I,
    D,
    NeutralMode,
    EncoderCodesPerRev,
    PotentiometerTurns,
    LimitMode,
    ForwardLimit,
    ReverseLimit,
    MaxOutputVoltage,
    VoltageRampRate,
    FaultTime,
}

/// 参数编码：(消息基址, 负载, 长度)
///
/// `VoltageRampRate` 的值为线上单位：PercentVbus 模式下每控制周期的百分比，
/// Voltage 模式下每控制周期的伏特数。
pub fn encode_param(
    param: JaguarParam,
    mode: JaguarMode,
    value: f64,
) -> Result<(u32, [u8; 8], usize), ProtocolError> {
    let mut payload = [0u8; 8];
    let (base, len) = match param {
        JaguarParam::ControlMode => {
            return Err(ProtocolError::ParseError(
                "control mode is verified through STATUS_CMODE, not written".to_string(),
            ));
        },
        JaguarParam::SpeedReference => {
            payload[0] = value as u8;
            (LM_API_SPD_REF, 1)
        },
        JaguarParam::PositionReference => {
            payload[0] = value as u8;
            (LM_API_POS_REF, 1)
        },
        JaguarParam::P | JaguarParam::I | JaguarParam::D => {
            let messages = mode
                .pid_messages()
                .ok_or_else(|| ProtocolError::invalid_value("pid_mode", u8::from(mode)))?;
            let index = match param {
                JaguarParam::P => 0,
                JaguarParam::I => 1,
                _ => 2,
            };
            codec::pack_fxp32_le(&mut payload, 0, value, Fxp32Scale::Q16_16_65536);
            (messages[index], 4)
        },
        JaguarParam::NeutralMode => {
            payload[0] = value as u8;
            (LM_API_CFG_BRAKE_COAST, 1)
        },
        JaguarParam::EncoderCodesPerRev => {
            codec::pack_u16_le(&mut payload, 0, value as u16);
            (LM_API_CFG_ENC_LINES, 2)
        },
        JaguarParam::PotentiometerTurns => {
            codec::pack_u16_le(&mut payload, 0, value as u16);
            (LM_API_CFG_POT_TURNS, 2)
        },
        JaguarParam::LimitMode => {
            payload[0] = value as u8;
            (LM_API_CFG_LIMIT_MODE, 1)
        },
        JaguarParam::ForwardLimit => {
            codec::pack_fxp32_le(&mut payload, 0, value, Fxp32Scale::Q16_16_65536);
            payload[4] = 1;
            (LM_API_CFG_LIMIT_FWD, 5)
        },
        JaguarParam::ReverseLimit => {
            codec::pack_fxp32_le(&mut payload, 0, value, Fxp32Scale::Q16_16_65536);
            payload[4] = 0;
            (LM_API_CFG_LIMIT_REV, 5)
        },
        JaguarParam::MaxOutputVoltage => {
            codec::pack_fxp16_le(&mut payload, 0, value, Fxp16Scale::Q8_8_256);
            (LM_API_CFG_MAX_VOUT, 2)
        },
        JaguarParam::VoltageRampRate => match mode {
            JaguarMode::PercentVbus => {
                pack_percentage(&mut payload, 0, value);
                (LM_API_VOLT_SET_RAMP, 2)
            },
            JaguarMode::Voltage => {
                codec::pack_fxp16_le(&mut payload, 0, value, Fxp16Scale::Q8_8_256);
                (LM_API_VCOMP_COMP_RAMP, 2)
            },
            _ => return Err(ProtocolError::invalid_value("ramp_mode", u8::from(mode))),
        },
        JaguarParam::FaultTime => {
            let ms = (value.clamp(MIN_FAULT_TIME_S, MAX_FAULT_TIME_S) * 1000.0) as u16;
            codec::pack_u16_le(&mut payload, 0, ms);
            (LM_API_CFG_FAULT_TIME, 2)
        },
    };
    Ok((base, payload, len))
}

/// 参数回读使用的消息基址
pub fn readback_message(param: JaguarParam, mode: JaguarMode) -> Option<u32> {
    match param {
        JaguarParam::ControlMode => Some(LM_API_STATUS_CMODE),
        JaguarParam::FaultTime => Some(LM_API_CFG_FAULT_TIME),
        _ => encode_param(param, mode, 0.0).ok().map(|(base, _, _)| base),
    }
}

/// 参数回读解码（与 `encode_param` 对应）
pub fn decode_param(param: JaguarParam, mode: JaguarMode, payload: &Payload) -> f64 {
    match param {
        JaguarParam::ControlMode
        | JaguarParam::SpeedReference
        | JaguarParam::PositionReference
        | JaguarParam::NeutralMode
        | JaguarParam::LimitMode => payload[0] as f64,
        JaguarParam::P
        | JaguarParam::I
        | JaguarParam::D
        | JaguarParam::ForwardLimit
        | JaguarParam::ReverseLimit => {
            codec::unpack_fxp32_le(payload, 0, Fxp32Scale::Q16_16_65536)
        },
        JaguarParam::EncoderCodesPerRev | JaguarParam::PotentiometerTurns => {
            codec::unpack_u16_le(payload, 0) as f64
        },
        JaguarParam::MaxOutputVoltage => codec::unpack_fxp16_le(payload, 0, Fxp16Scale::Q8_8_256),
        JaguarParam::VoltageRampRate => match mode {
            JaguarMode::PercentVbus => unpack_percentage(payload, 0),
            _ => codec::unpack_fxp16_le(payload, 0, Fxp16Scale::Q8_8_256),
        },
        JaguarParam::FaultTime => codec::unpack_u16_le(payload, 0) as f64 / 1000.0,
    }
}
