//! 接口状态检查
//!
//! 通过 sysfs 判断接口是否存在、是否处于 UP 状态（只检查，不自动配置）。

use crate::{CanDeviceError, CanDeviceErrorKind, CanError};
use std::path::Path;

const IFF_UP: u32 = 0x1;

/// 返回 `Ok(true)` 表示接口已 UP，`Ok(false)` 表示存在但未启动
pub fn check_interface_status(interface: &str) -> Result<bool, CanError> {
    let base = Path::new("/sys/class/net").join(interface);
    if !base.exists() {
        return Err(CanError::Device(CanDeviceError::new(
            CanDeviceErrorKind::NotFound,
            format!(
                "CAN interface '{}' does not exist. Create it first, e.g.:\n  sudo ip link add dev {} type vcan",
                interface, interface
            ),
        )));
    }

    let flags = std::fs::read_to_string(base.join("flags"))?;
    let flags = parse_flags(&flags).ok_or_else(|| {
        CanError::Device(CanDeviceError::new(
            CanDeviceErrorKind::Backend,
            format!("Unreadable flags for interface '{}': {}", interface, flags.trim()),
        ))
    })?;
    Ok(flags & IFF_UP != 0)
}

fn parse_flags(raw: &str) -> Option<u32> {
    let raw = raw.trim();
    let hex = raw.strip_prefix("0x").unwrap_or(raw);
    u32::from_str_radix(hex, 16).ok()
}
