//! PCM（气动控制模块）帧布局
//!
//! 多字节字段高位在前；位域按 LSB 优先排列（bilge 约定）。

use crate::codec::{self, Payload};
use crate::ids::ArbitrationId;
use crate::{CanFrame, DeviceNumber, ProtocolError};
use bilge::prelude::*;

pub const STATUS_1: u32 = 0x0904_1400;
pub const STATUS_SOL_FAULTS: u32 = 0x0904_1440;
pub const STATUS_DEBUG: u32 = 0x0904_1480;

pub const CONTROL_1: u32 = 0x0904_1C00;
pub const CONTROL_2: u32 = 0x0904_1C40;
pub const CONTROL_3: u32 = 0x0904_1C80;

/// Control 1 / Control 3 发送周期
pub const CONTROL_PERIOD_MS: u32 = 20;
/// 状态帧过期阈值
pub const STATUS_TIMEOUT_MS: u64 = 50;

pub const CONTROL_1_LEN: usize = 6;
pub const CONTROL_3_LEN: usize = 8;

/// 电磁阀通道数
pub const SOLENOID_CHANNELS: u8 = 8;

/// 单次脉冲时长分辨率（毫秒/单位）
pub const ONE_SHOT_MS_PER_UNIT: u32 = 10;

/// 电磁阀电压与压缩机电流的分辨率
pub const VOLTS_AMPS_PER_COUNT: f64 = 0.03125;

/// 校验通道号 [0, 7]
pub fn check_channel(channel: u8) -> Result<u8, ProtocolError> {
    if channel >= SOLENOID_CHANNELS {
        return Err(ProtocolError::invalid_value("solenoid_channel", channel));
    }
    Ok(channel)
}

// ============================================================================
// Status 1
// ============================================================================

/// Status 1 字节 1
#[bitsize(8)]
#[derive(FromBits, DebugBits, Clone, Copy, Default)]
pub struct PcmStatusByte1 {
    pub compressor_on: bool,                       // Bit 0
    pub sticky_fault_fuse_tripped: bool,           // Bit 1
    pub sticky_fault_comp_current_too_high: bool,  // Bit 2
    pub fault_fuse_tripped: bool,                  // Bit 3
    pub fault_comp_current_too_high: bool,         // Bit 4
    pub fault_hardware_failure: bool,              // Bit 5
    pub is_closed_loop_enabled: bool,              // Bit 6
    pub pressure_switch_en: bool,                  // Bit 7
}

/// Status 1 字节 4：压缩机电流高 6 位 + 电磁阀电压低 2 位
#[bitsize(8)]
#[derive(FromBits, DebugBits, Clone, Copy, Default)]
pub struct PcmStatusByte4 {
    pub compressor_current_top6: u6,   // Bit 0-5
    pub solenoid_voltage_btm2: u2,     // Bit 6-7
}

/// Status 1 字节 5
#[bitsize(8)]
#[derive(FromBits, DebugBits, Clone, Copy, Default)]
pub struct PcmStatusByte5 {
    pub sticky_fault_di_too_high: bool, // Bit 0
    pub fault_di_too_high: bool,        // Bit 1
    pub module_enabled: bool,           // Bit 2
    pub closed_loop_output: bool,       // Bit 3
    pub compressor_current_btm4: u4,    // Bit 4-7
}

/// PCM Status 1
#[derive(Debug, Clone, Copy, Default)]
pub struct PcmStatus {
    pub solenoid_bits: u8,
    pub byte1: PcmStatusByte1,
    pub batt_voltage_raw: u8,
    pub solenoid_voltage_top8: u8,
    pub byte4: PcmStatusByte4,
    pub byte5: PcmStatusByte5,
    pub token_seed: u16,
}

impl PcmStatus {
    pub fn from_payload(payload: &Payload) -> Self {
        Self {
            solenoid_bits: payload[0],
            byte1: PcmStatusByte1::from(u8::new(payload[1])),
            batt_voltage_raw: payload[2],
            solenoid_voltage_top8: payload[3],
            byte4: PcmStatusByte4::from(u8::new(payload[4])),
            byte5: PcmStatusByte5::from(u8::new(payload[5])),
            token_seed: codec::unpack_u16(payload, 6),
        }
    }

    pub fn solenoid(&self, channel: u8) -> bool {
        self.solenoid_bits & (1 << (channel & 7)) != 0
    }

    /// 电池电压（V）：raw × 0.05 + 4
    pub fn battery_voltage(&self) -> f64 {
        codec::battery_voltage(self.batt_voltage_raw)
    }

    /// 电磁阀供电电压（V），10 位
    pub fn solenoid_voltage(&self) -> f64 {
        let raw = ((self.solenoid_voltage_top8 as u32) << 2)
            | self.byte4.solenoid_voltage_btm2().value() as u32;
        raw as f64 * VOLTS_AMPS_PER_COUNT
    }

    /// 压缩机电流（A），10 位
    pub fn compressor_current(&self) -> f64 {
        let raw = ((self.byte4.compressor_current_top6().value() as u32) << 4)
            | self.byte5.compressor_current_btm4().value() as u32;
        raw as f64 * VOLTS_AMPS_PER_COUNT
    }
}

impl TryFrom<CanFrame> for PcmStatus {
    type Error = ProtocolError;

    fn try_from(frame: CanFrame) -> Result<Self, Self::Error> {
        frame.expect_len(8)?;
        Ok(Self::from_payload(&frame.data))
    }
}

// ============================================================================
// Status Sol Faults / Debug
// ============================================================================

#[bitsize(8)]
#[derive(FromBits, DebugBits, Clone, Copy, Default)]
pub struct PcmFaultByte1 {
    pub reserved: u4,                          // Bit 0-3
    pub sticky_fault_comp_no_current: bool,    // Bit 4
    pub fault_comp_no_current: bool,           // Bit 5
    pub sticky_fault_solenoid_jumper: bool,    // Bit 6
    pub fault_solenoid_jumper: bool,           // Bit 7
}

/// 电磁阀故障帧
#[derive(Debug, Clone, Copy, Default)]
pub struct PcmStatusFault {
    /// 黑名单：被禁用的电磁阀（需断电复位）
    pub solenoid_blacklist: u8,
    pub byte1: PcmFaultByte1,
}

impl PcmStatusFault {
    pub fn from_payload(payload: &Payload) -> Self {
        Self {
            solenoid_blacklist: payload[0],
            byte1: PcmFaultByte1::from(u8::new(payload[1])),
        }
    }

    pub fn is_blacklisted(&self, channel: u8) -> bool {
        self.solenoid_blacklist & (1 << (channel & 7)) != 0
    }
}

/// 调试帧（令牌校验统计）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PcmDebug {
    pub token_fails: u16,
    pub last_failed_token: u16,
    pub token_successes: u16,
}

impl PcmDebug {
    pub fn from_payload(payload: &Payload) -> Self {
        Self {
            token_fails: codec::unpack_u16(payload, 0),
            last_failed_token: codec::unpack_u16(payload, 2),
            token_successes: codec::unpack_u16(payload, 4),
        }
    }
}

// ============================================================================
// Control 1
// ============================================================================

/// Control 1 字节 3
#[bitsize(8)]
#[derive(FromBits, DebugBits, Clone, Copy, Default)]
pub struct PcmControlByte3 {
    pub reserved: u4,               // Bit 0-3
    pub close_loop_output: bool,    // Bit 4
    pub compressor_on: bool,        // Bit 5
    pub closed_loop_enable: bool,   // Bit 6
    pub clear_sticky_faults: bool,  // Bit 7
}

/// PCM Control 1（周期发送）
///
/// 字节 0-1 为令牌，字节 2 为电磁阀位图，字节 4-5 为单次脉冲字段（每通道 2 位）。
#[derive(Debug, Clone, Copy, Default)]
pub struct PcmControl {
    pub token: u16,
    pub solenoid_bits: u8,
    pub byte3: PcmControlByte3,
    pub one_shot_field: u16,
}

impl PcmControl {
    pub fn from_payload(payload: &Payload) -> Self {
        Self {
            token: codec::unpack_u16(payload, 0),
            solenoid_bits: payload[2],
            byte3: PcmControlByte3::from(u8::new(payload[3])),
            one_shot_field: codec::unpack_u16(payload, 4),
        }
    }

    pub fn write_into(&self, payload: &mut Payload) {
        codec::pack_u16(payload, 0, self.token);
        payload[2] = self.solenoid_bits;
        payload[3] = u8::from(self.byte3).value();
        codec::pack_u16(payload, 4, self.one_shot_field);
    }

    pub fn set_solenoid(&mut self, channel: u8, on: bool) {
        let bit = 1u8 << (channel & 7);
        if on {
            self.solenoid_bits |= bit;
        } else {
            self.solenoid_bits &= !bit;
        }
    }

    pub fn set_closed_loop_enable(&mut self, enable: bool) {
        self.byte3.set_closed_loop_enable(enable);
    }

    /// 触发单次脉冲：通道的 2 位计数按 1 → 2 → 3 → 1 轮换
    pub fn fire_one_shot(&mut self, channel: u8) {
        let shift = 2 * (channel & 7) as u16;
        let mask: u16 = 0b11;
        let current = (self.one_shot_field >> shift) & mask;
        let next = current % 3 + 1;
        self.one_shot_field = (self.one_shot_field & !(mask << shift)) | (next << shift);
    }

    pub fn one_shot_state(&self, channel: u8) -> u8 {
        ((self.one_shot_field >> (2 * (channel & 7) as u16)) & 0b11) as u8
    }
}

/// Control 2：仅清除粘滞故障（字节 3 bit 7）
pub fn clear_sticky_faults_frame(device: DeviceNumber) -> CanFrame {
    let id = ArbitrationId::for_device(CONTROL_2, device).raw();
    CanFrame::new(id, &[0, 0, 0, 0x80])
}

/// Control 3 单次脉冲时长编码：10 ms 为单位，上限 255
pub fn one_shot_duration_units(duration_ms: u32) -> u8 {
    (duration_ms / ONE_SHOT_MS_PER_UNIT).min(0xFF) as u8
}
