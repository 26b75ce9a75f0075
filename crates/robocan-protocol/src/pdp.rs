//! PDP（配电板）帧布局
//!
//! 通道电流为 10 位、0.125 A/单位，在 Status 1/2/3 中按高位在前的连续比特流打包：
//! Status 1 承载通道 0-5，Status 2 承载 6-11，Status 3 承载 12-15 以及母线电压、温度。

use crate::codec::{self, Payload};
use crate::ids::{ArbitrationId, CAN_MSGID_API_S};
use crate::{CanFrame, DeviceNumber, ProtocolError};

/// 设备类型 PowerDistribution (8) | 厂商 CTRE (4)
pub const PDP_BASE: u32 = 0x0804_0000;

pub const API_STATUS_1: u32 = 0x50;
pub const API_STATUS_2: u32 = 0x51;
pub const API_STATUS_3: u32 = 0x52;
pub const API_STATUS_ENERGY: u32 = 0x5D;
pub const API_CONTROL_1: u32 = 0x70;

pub const STATUS_1: u32 = PDP_BASE | (API_STATUS_1 << CAN_MSGID_API_S);
pub const STATUS_2: u32 = PDP_BASE | (API_STATUS_2 << CAN_MSGID_API_S);
pub const STATUS_3: u32 = PDP_BASE | (API_STATUS_3 << CAN_MSGID_API_S);
pub const STATUS_ENERGY: u32 = PDP_BASE | (API_STATUS_ENERGY << CAN_MSGID_API_S);
pub const CONTROL_1: u32 = PDP_BASE | (API_CONTROL_1 << CAN_MSGID_API_S);

/// 状态帧过期阈值
pub const STATUS_TIMEOUT_MS: u64 = 100;

/// 通道数
pub const CHANNELS: u8 = 16;

const CURRENT_BITS: u32 = 10;

/// Control 1 标志
pub const CONTROL_RESET_ENERGY: u8 = 0x40;
pub const CONTROL_CLEAR_STICKY_FAULTS: u8 = 0x80;

/// 温度换算系数
pub const TEMPERATURE_SCALE: f64 = 1.032_508_369_575_42;
pub const TEMPERATURE_OFFSET: f64 = -67.856_450_048_496_6;

pub fn check_channel(channel: u8) -> Result<u8, ProtocolError> {
    if channel >= CHANNELS {
        return Err(ProtocolError::invalid_value("pdp_channel", channel));
    }
    Ok(channel)
}

/// 通道所在的状态帧基址与帧内序号
pub fn channel_location(channel: u8) -> Result<(u32, usize), ProtocolError> {
    let channel = check_channel(channel)?;
    Ok(match channel {
        0..=5 => (STATUS_1, channel as usize),
        6..=11 => (STATUS_2, (channel - 6) as usize),
        _ => (STATUS_3, (channel - 12) as usize),
    })
}

// 高位在前的比特流读写：start 为从字节 0 最高位起算的比特序号
fn read_bits(payload: &Payload, start: u32, width: u32) -> u32 {
    let stream = u64::from_be_bytes(*payload);
    ((stream >> (64 - start - width)) & ((1u64 << width) - 1)) as u32
}

fn write_bits(payload: &mut Payload, start: u32, width: u32, value: u32) {
    let mask = ((1u64 << width) - 1) << (64 - start - width);
    let mut stream = u64::from_be_bytes(*payload);
    stream = (stream & !mask) | (((value as u64) << (64 - start - width)) & mask);
    *payload = stream.to_be_bytes();
}

/// 帧内第 index 个 10 位通道电流原始值
pub fn channel_raw(payload: &Payload, index: usize) -> u16 {
    read_bits(payload, index as u32 * CURRENT_BITS, CURRENT_BITS) as u16
}

pub fn set_channel_raw(payload: &mut Payload, index: usize, raw: u16) {
    write_bits(payload, index as u32 * CURRENT_BITS, CURRENT_BITS, raw as u32);
}

/// 通道电流（A）
pub fn channel_current(payload: &Payload, index: usize) -> f64 {
    channel_raw(payload, index) as f64 * codec::AMPS_PER_COUNT
}

/// Status 3 尾部字段
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PdpStatus3Extra {
    pub internal_resistance_mohm: u8,
    pub bus_voltage_raw: u8,
    pub temperature_raw: u8,
}

impl PdpStatus3Extra {
    pub fn from_payload(payload: &Payload) -> Self {
        Self {
            internal_resistance_mohm: payload[5],
            bus_voltage_raw: payload[6],
            temperature_raw: payload[7],
        }
    }

    pub fn write_into(&self, payload: &mut Payload) {
        payload[5] = self.internal_resistance_mohm;
        payload[6] = self.bus_voltage_raw;
        payload[7] = self.temperature_raw;
    }

    /// 母线电压（V）：raw × 0.05 + 4
    pub fn bus_voltage(&self) -> f64 {
        codec::battery_voltage(self.bus_voltage_raw)
    }

    /// 温度（°C）
    pub fn temperature(&self) -> f64 {
        codec::linear(self.temperature_raw as f64, TEMPERATURE_SCALE, TEMPERATURE_OFFSET)
    }
}

/// 能量帧
///
/// 字节 0 为测量周期（毫秒），其后依次为 12 位总电流、16 位功率、28 位能量。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PdpEnergy {
    pub tmeas_ms: u8,
    pub total_current_raw: u16,
    pub power_raw: u16,
    pub energy_raw: u32,
}

impl PdpEnergy {
    pub fn from_payload(payload: &Payload) -> Self {
        Self {
            tmeas_ms: payload[0],
            total_current_raw: read_bits(payload, 8, 12) as u16,
            power_raw: read_bits(payload, 20, 16) as u16,
            energy_raw: read_bits(payload, 36, 28),
        }
    }

    pub fn to_payload(&self) -> Payload {
        let mut payload = [0u8; 8];
        payload[0] = self.tmeas_ms;
        write_bits(&mut payload, 8, 12, self.total_current_raw as u32);
        write_bits(&mut payload, 20, 16, self.power_raw as u32);
        write_bits(&mut payload, 36, 28, self.energy_raw);
        payload
    }

    /// 总电流（A）
    pub fn total_current(&self) -> f64 {
        self.total_current_raw as f64 * 0.125
    }

    /// 总功率（W）
    pub fn total_power(&self) -> f64 {
        self.power_raw as f64 * 0.125
    }

    /// 累计能量（J）：0.125 mW 单位 × 测量周期
    pub fn total_energy(&self) -> f64 {
        self.energy_raw as f64 * 0.125 * 0.001 * self.tmeas_ms as f64
    }
}

impl TryFrom<CanFrame> for PdpEnergy {
    type Error = ProtocolError;

    fn try_from(frame: CanFrame) -> Result<Self, Self::Error> {
        frame.expect_len(8)?;
        Ok(Self::from_payload(&frame.data))
    }
}

/// Control 1 单字节帧
pub fn control_frame(device: DeviceNumber, flags: u8) -> CanFrame {
    CanFrame::new(ArbitrationId::for_device(CONTROL_1, device).raw(), &[flags])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids() {
        assert_eq!(STATUS_1, 0x0804_1400);
        assert_eq!(STATUS_3, 0x0804_1480);
        assert_eq!(STATUS_ENERGY, 0x0804_1740);
        assert_eq!(CONTROL_1, 0x0804_1C00);
    }

    #[test]
    fn test_channel_layout_matches_split_fields() {
        // 通道 0：字节 0 为高 8 位，字节 1 高 2 位为低 2 位
        // 通道 1：字节 1 低 6 位为高 6 位，字节 2 高 4 位为低 4 位
        let payload = [0xAB, 0b11_000101, 0b1010_0000, 0, 0, 0, 0, 0];
        assert_eq!(channel_raw(&payload, 0), (0xAB << 2) | 0b11);
        assert_eq!(channel_raw(&payload, 1), (0b000101 << 4) | 0b1010);
    }

    #[test]
    fn test_channel_write_read() {
        let mut payload = [0u8; 8];
        for (index, raw) in [1023u16, 1, 512, 77, 300, 999].iter().enumerate() {
            set_channel_raw(&mut payload, index, *raw);
        }
        assert_eq!(channel_raw(&payload, 0), 1023);
        assert_eq!(channel_raw(&payload, 3), 77);
        assert_eq!(channel_raw(&payload, 5), 999);
        assert_eq!(channel_current(&payload, 2), 64.0);
    }

    #[test]
    fn test_channel_location() {
        assert_eq!(channel_location(0).unwrap(), (STATUS_1, 0));
        assert_eq!(channel_location(7).unwrap(), (STATUS_2, 1));
        assert_eq!(channel_location(15).unwrap(), (STATUS_3, 3));
        assert!(channel_location(16).is_err());
    }

    #[test]
    fn test_status3_extra() {
        let extra = PdpStatus3Extra::from_payload(&[0, 0, 0, 0, 0, 10, 160, 100]);
        assert_eq!(extra.internal_resistance_mohm, 10);
        assert!((extra.bus_voltage() - 12.0).abs() < 1e-9);
        let expected = 100.0 * TEMPERATURE_SCALE + TEMPERATURE_OFFSET;
        assert!((extra.temperature() - expected).abs() < 1e-9);
    }

    #[test]
    fn test_energy_frame() {
        let energy = PdpEnergy {
            tmeas_ms: 20,
            total_current_raw: 0xABC,
            power_raw: 0x1234,
            energy_raw: 0x0FED_CBA9,
        };
        let payload = energy.to_payload();
        // 总电流高 8 位位于字节 1
        assert_eq!(payload[1], 0xAB);
        assert_eq!(payload[2] >> 4, 0xC);
        assert_eq!(PdpEnergy::from_payload(&payload), energy);

        assert_eq!(energy.total_current(), 0xABC as f64 * 0.125);
        assert_eq!(energy.total_power(), 0x1234 as f64 * 0.125);
        let joules = 0x0FED_CBA9 as f64 * 0.125 * 0.001 * 20.0;
        assert!((energy.total_energy() - joules).abs() < 1e-6);
    }

    #[test]
    fn test_control_frames() {
        let dev = DeviceNumber::new(0).unwrap();
        assert_eq!(
            control_frame(dev, CONTROL_RESET_ENERGY).data_slice(),
            &[0x40]
        );
        assert_eq!(
            control_frame(dev, CONTROL_CLEAR_STICKY_FAULTS).id,
            CONTROL_1
        );
    }
}
