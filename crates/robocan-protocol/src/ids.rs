//! 29 位仲裁 ID 与设备号
//!
//! 仲裁 ID = {厂商 / 设备类型 / API 类别前缀} | {设备号（低 6 位）}。
//!
//! ```text
//!  28      24 23          16 15                6 5        0
//! +----------+--------------+-------------------+----------+
//! | dev type | manufacturer |  API (class | id) | dev num  |
//! +----------+--------------+-------------------+----------+
//! ```

use crate::ProtocolError;
use std::fmt;

pub const CAN_MSGID_FULL_M: u32 = 0x1fff_ffff;
pub const CAN_MSGID_DEVNO_M: u32 = 0x0000_003f;
pub const CAN_MSGID_API_M: u32 = 0x0000_ffc0;
pub const CAN_MSGID_MFR_M: u32 = 0x00ff_0000;
pub const CAN_MSGID_DTYPE_M: u32 = 0x1f00_0000;

pub const CAN_MSGID_API_S: u32 = 6;
pub const CAN_MSGID_MFR_S: u32 = 16;
pub const CAN_MSGID_DTYPE_S: u32 = 24;

/// 设备号上限（含）
pub const MAX_DEVICE_NUMBER: u8 = 63;

/// 设备号（0-63），占仲裁 ID 的低 6 位
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeviceNumber(u8);

impl DeviceNumber {
    /// 创建设备号，超出 [0, 63] 返回错误
    pub fn new(value: u8) -> Result<Self, ProtocolError> {
        if value > MAX_DEVICE_NUMBER {
            return Err(ProtocolError::invalid_value("device_number", value));
        }
        Ok(Self(value))
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for DeviceNumber {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl fmt::Display for DeviceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 29 位仲裁 ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ArbitrationId(u32);

impl ArbitrationId {
    /// 由 API 基址与设备号组合
    ///
    /// `base` 中落在设备号位上的比特被忽略，保证不同设备号不会冲突。
    pub const fn for_device(base: u32, device: DeviceNumber) -> Self {
        Self((base & CAN_MSGID_FULL_M & !CAN_MSGID_DEVNO_M) | device.0 as u32)
    }

    /// 从原始 ID 创建（截断到 29 位）
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw & CAN_MSGID_FULL_M)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }

    /// 设备号字段
    pub fn device_number(self) -> DeviceNumber {
        DeviceNumber((self.0 & CAN_MSGID_DEVNO_M) as u8)
    }

    /// API 字段（类别 + 序号）
    pub fn api(self) -> u16 {
        ((self.0 & CAN_MSGID_API_M) >> CAN_MSGID_API_S) as u16
    }

    /// 厂商字段
    pub fn manufacturer(self) -> u8 {
        ((self.0 & CAN_MSGID_MFR_M) >> CAN_MSGID_MFR_S) as u8
    }

    /// 设备类型字段
    pub fn device_type(self) -> u8 {
        ((self.0 & CAN_MSGID_DTYPE_M) >> CAN_MSGID_DTYPE_S) as u8
    }

    /// 去掉设备号后的 API 基址
    pub fn base(self) -> u32 {
        self.0 & !CAN_MSGID_DEVNO_M
    }
}

impl From<ArbitrationId> for u32 {
    fn from(id: ArbitrationId) -> Self {
        id.0
    }
}

impl fmt::Display for ArbitrationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_number_range() {
        assert!(DeviceNumber::new(0).is_ok());
        assert!(DeviceNumber::new(63).is_ok());
        assert!(matches!(
            DeviceNumber::new(64),
            Err(ProtocolError::InvalidValue { value: 64, .. })
        ));
        assert!(DeviceNumber::try_from(200u8).is_err());
    }

    #[test]
    fn test_for_device_combines_base_and_number() {
        let dev = DeviceNumber::new(5).unwrap();
        let id = ArbitrationId::for_device(0x0204_0000, dev);
        assert_eq!(id.raw(), 0x0204_0005);
        assert_eq!(id.device_number(), dev);
        assert_eq!(id.base(), 0x0204_0000);
    }

    #[test]
    fn test_for_device_ignores_stray_device_bits_in_base() {
        let dev = DeviceNumber::new(1).unwrap();
        let id = ArbitrationId::for_device(0x0204_003F, dev);
        assert_eq!(id.raw(), 0x0204_0001);
    }

    #[test]
    fn test_field_accessors() {
        // Jaguar 电机类 STATUS_POWER (class 0x1400, index 8)，设备号 12
        let id = ArbitrationId::from_raw(0x0202_0000 | 0x1400 | (8 << 6) | 12);
        assert_eq!(id.device_type(), 2);
        assert_eq!(id.manufacturer(), 2);
        assert_eq!(id.api(), (0x1400 >> 6) | 8);
        assert_eq!(id.device_number().value(), 12);
    }

    #[test]
    fn test_display() {
        let id = ArbitrationId::from_raw(0x0204_1400);
        assert_eq!(id.to_string(), "0x02041400");
    }
}
