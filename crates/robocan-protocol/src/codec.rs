//! 帧字段编解码
//!
//! 所有函数操作 8 字节帧缓冲区，字段位置由调用方给出字节偏移。
//!
//! - 大端（默认）：Talon SRX / PCM / PDP
//! - 小端（`*_le`）：Jaguar
//!
//! 越界（`offset + width > 8`）属于编程错误，立即 panic，
//! 不会写入相邻字段。

/// 帧缓冲区大小
pub const FRAME_SIZE: usize = 8;

/// 帧缓冲区
pub type Payload = [u8; FRAME_SIZE];

#[track_caller]
fn field(offset: usize, width: usize) -> std::ops::Range<usize> {
    match offset.checked_add(width) {
        Some(end) if end <= FRAME_SIZE => offset..end,
        _ => panic!(
            "field at offset {} with width {} exceeds the {}-byte frame",
            offset, width, FRAME_SIZE
        ),
    }
}

#[track_caller]
fn write(buf: &mut Payload, offset: usize, bytes: &[u8]) {
    let range = field(offset, bytes.len());
    buf[range].copy_from_slice(bytes);
}

#[track_caller]
fn read<const N: usize>(buf: &Payload, offset: usize) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&buf[field(offset, N)]);
    out
}

// ============================================================================
// 整数字段（大端）
// ============================================================================

#[track_caller]
pub fn pack_u8(buf: &mut Payload, offset: usize, value: u8) {
    write(buf, offset, &[value]);
}

#[track_caller]
pub fn pack_i8(buf: &mut Payload, offset: usize, value: i8) {
    write(buf, offset, &value.to_be_bytes());
}

#[track_caller]
pub fn pack_u16(buf: &mut Payload, offset: usize, value: u16) {
    write(buf, offset, &value.to_be_bytes());
}

#[track_caller]
pub fn pack_i16(buf: &mut Payload, offset: usize, value: i16) {
    write(buf, offset, &value.to_be_bytes());
}

#[track_caller]
pub fn pack_u32(buf: &mut Payload, offset: usize, value: u32) {
    write(buf, offset, &value.to_be_bytes());
}

#[track_caller]
pub fn pack_i32(buf: &mut Payload, offset: usize, value: i32) {
    write(buf, offset, &value.to_be_bytes());
}

/// 24 位有符号字段（高 8 位被截掉）
#[track_caller]
pub fn pack_i24(buf: &mut Payload, offset: usize, value: i32) {
    let bytes = value.to_be_bytes();
    write(buf, offset, &bytes[1..]);
}

#[track_caller]
pub fn unpack_u8(buf: &Payload, offset: usize) -> u8 {
    read::<1>(buf, offset)[0]
}

#[track_caller]
pub fn unpack_i8(buf: &Payload, offset: usize) -> i8 {
    i8::from_be_bytes(read(buf, offset))
}

#[track_caller]
pub fn unpack_u16(buf: &Payload, offset: usize) -> u16 {
    u16::from_be_bytes(read(buf, offset))
}

#[track_caller]
pub fn unpack_i16(buf: &Payload, offset: usize) -> i16 {
    i16::from_be_bytes(read(buf, offset))
}

#[track_caller]
pub fn unpack_u32(buf: &Payload, offset: usize) -> u32 {
    u32::from_be_bytes(read(buf, offset))
}

#[track_caller]
pub fn unpack_i32(buf: &Payload, offset: usize) -> i32 {
    i32::from_be_bytes(read(buf, offset))
}

/// 24 位无符号字段
#[track_caller]
pub fn unpack_u24(buf: &Payload, offset: usize) -> u32 {
    let [h, m, l] = read::<3>(buf, offset);
    u32::from_be_bytes([0, h, m, l])
}

/// 24 位有符号字段（符号扩展）
#[track_caller]
pub fn unpack_i24(buf: &Payload, offset: usize) -> i32 {
    sign_extend(unpack_u24(buf, offset), 24)
}

// ============================================================================
// 整数字段（小端，Jaguar）
// ============================================================================

#[track_caller]
pub fn pack_i16_le(buf: &mut Payload, offset: usize, value: i16) {
    write(buf, offset, &value.to_le_bytes());
}

#[track_caller]
pub fn pack_u16_le(buf: &mut Payload, offset: usize, value: u16) {
    write(buf, offset, &value.to_le_bytes());
}

#[track_caller]
pub fn pack_i32_le(buf: &mut Payload, offset: usize, value: i32) {
    write(buf, offset, &value.to_le_bytes());
}

#[track_caller]
pub fn unpack_i16_le(buf: &Payload, offset: usize) -> i16 {
    i16::from_le_bytes(read(buf, offset))
}

#[track_caller]
pub fn unpack_u16_le(buf: &Payload, offset: usize) -> u16 {
    u16::from_le_bytes(read(buf, offset))
}

#[track_caller]
pub fn unpack_i32_le(buf: &Payload, offset: usize) -> i32 {
    i32::from_le_bytes(read(buf, offset))
}

// ============================================================================
// 定点数
// ============================================================================

/// 定点数量化时的舍入方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rounding {
    /// 四舍五入（远离零）
    Nearest,
    /// 向零截断（C 风格强制转换）
    TowardZero,
}

impl Rounding {
    fn apply(self, scaled: f64) -> f64 {
        match self {
            Rounding::Nearest => scaled.round(),
            Rounding::TowardZero => scaled.trunc(),
        }
    }
}

/// Q8.8 风格 16 位定点数的比例族
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fxp16Scale {
    /// raw = round(value * 255)
    Q8_8_255,
    /// raw = trunc(value * 256)（Jaguar）
    Q8_8_256,
}

impl Fxp16Scale {
    pub const fn factor(self) -> f64 {
        match self {
            Fxp16Scale::Q8_8_255 => 255.0,
            Fxp16Scale::Q8_8_256 => 256.0,
        }
    }

    pub const fn rounding(self) -> Rounding {
        match self {
            Fxp16Scale::Q8_8_255 => Rounding::Nearest,
            Fxp16Scale::Q8_8_256 => Rounding::TowardZero,
        }
    }

    /// 量化为线上整数（饱和到 i16 范围，NaN 为 0）
    pub fn quantize(self, value: f64) -> i16 {
        self.rounding().apply(value * self.factor()) as i16
    }

    pub fn dequantize(self, raw: i16) -> f64 {
        raw as f64 / self.factor()
    }
}

/// Q16.16 风格 32 位定点数的比例族
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fxp32Scale {
    /// raw = round(value * 65535)
    Q16_16_65535,
    /// raw = trunc(value * 65536)（Jaguar）
    Q16_16_65536,
}

impl Fxp32Scale {
    pub const fn factor(self) -> f64 {
        match self {
            Fxp32Scale::Q16_16_65535 => 65535.0,
            Fxp32Scale::Q16_16_65536 => 65536.0,
        }
    }

    pub const fn rounding(self) -> Rounding {
        match self {
            Fxp32Scale::Q16_16_65535 => Rounding::Nearest,
            Fxp32Scale::Q16_16_65536 => Rounding::TowardZero,
        }
    }

    /// 量化为线上整数（饱和到 i32 范围，NaN 为 0）
    pub fn quantize(self, value: f64) -> i32 {
        self.rounding().apply(value * self.factor()) as i32
    }

    pub fn dequantize(self, raw: i32) -> f64 {
        raw as f64 / self.factor()
    }
}

/// Q8.8 定点数，大端 2 字节
#[track_caller]
pub fn pack_fxp16(buf: &mut Payload, offset: usize, value: f64, scale: Fxp16Scale) {
    pack_i16(buf, offset, scale.quantize(value));
}

#[track_caller]
pub fn unpack_fxp16(buf: &Payload, offset: usize, scale: Fxp16Scale) -> f64 {
    scale.dequantize(unpack_i16(buf, offset))
}

/// Q16.16 定点数，大端 4 字节
#[track_caller]
pub fn pack_fxp32(buf: &mut Payload, offset: usize, value: f64, scale: Fxp32Scale) {
    pack_i32(buf, offset, scale.quantize(value));
}

#[track_caller]
pub fn unpack_fxp32(buf: &Payload, offset: usize, scale: Fxp32Scale) -> f64 {
    scale.dequantize(unpack_i32(buf, offset))
}

/// Q8.8 定点数，小端 2 字节
#[track_caller]
pub fn pack_fxp16_le(buf: &mut Payload, offset: usize, value: f64, scale: Fxp16Scale) {
    pack_i16_le(buf, offset, scale.quantize(value));
}

#[track_caller]
pub fn unpack_fxp16_le(buf: &Payload, offset: usize, scale: Fxp16Scale) -> f64 {
    scale.dequantize(unpack_i16_le(buf, offset))
}

/// Q16.16 定点数，小端 4 字节
#[track_caller]
pub fn pack_fxp32_le(buf: &mut Payload, offset: usize, value: f64, scale: Fxp32Scale) {
    pack_i32_le(buf, offset, scale.quantize(value));
}

#[track_caller]
pub fn unpack_fxp32_le(buf: &Payload, offset: usize, scale: Fxp32Scale) -> f64 {
    scale.dequantize(unpack_i32_le(buf, offset))
}

// ============================================================================
// 位域与线性换算
// ============================================================================

/// 取出 `byte` 中从第 `shift` 位起 `width` 位（LSB 为第 0 位）
pub fn get_bits(byte: u8, shift: u8, width: u8) -> u8 {
    debug_assert!(shift + width <= 8);
    (byte >> shift) & mask(width)
}

/// 写入 `byte` 中从第 `shift` 位起 `width` 位，其他位保持不变
pub fn set_bits(byte: &mut u8, shift: u8, width: u8, value: u8) {
    debug_assert!(shift + width <= 8);
    let m = mask(width) << shift;
    *byte = (*byte & !m) | ((value << shift) & m);
}

fn mask(width: u8) -> u8 {
    if width >= 8 { 0xFF } else { (1u8 << width) - 1 }
}

/// 将 `bits` 位二进制补码扩展为 i32
pub fn sign_extend(raw: u32, bits: u32) -> i32 {
    debug_assert!((1..=32).contains(&bits));
    let shift = 32 - bits;
    ((raw << shift) as i32) >> shift
}

/// raw * per_count + offset
pub fn linear(raw: f64, per_count: f64, offset: f64) -> f64 {
    raw * per_count + offset
}

/// 电流：0.125 A / count
pub const AMPS_PER_COUNT: f64 = 0.125;
/// 电池电压：0.05 V / count + 4 V
pub const BATTERY_VOLTS_PER_COUNT: f64 = 0.05;
pub const BATTERY_VOLTS_OFFSET: f64 = 4.0;

/// 电池电压字节解码（Talon / PCM / PDP 通用）
pub fn battery_voltage(raw: u8) -> f64 {
    linear(raw as f64, BATTERY_VOLTS_PER_COUNT, BATTERY_VOLTS_OFFSET)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_i16_big_endian() {
        let mut buf = [0u8; 8];
        pack_i16(&mut buf, 2, 0x1234);
        assert_eq!(buf, [0, 0, 0x12, 0x34, 0, 0, 0, 0]);
        assert_eq!(unpack_i16(&buf, 2), 0x1234);
    }

    #[test]
    fn test_pack_i32_negative() {
        let mut buf = [0u8; 8];
        pack_i32(&mut buf, 4, -1);
        assert_eq!(&buf[4..], &[0xFF; 4]);
        assert_eq!(unpack_i32(&buf, 4), -1);
        assert_eq!(unpack_u32(&buf, 4), u32::MAX);
    }

    #[test]
    fn test_pack_i24_demand() {
        let mut buf = [0u8; 8];
        pack_i24(&mut buf, 2, 1023);
        assert_eq!(&buf[2..5], &[0x00, 0x03, 0xFF]);

        pack_i24(&mut buf, 2, -1023);
        assert_eq!(unpack_i24(&buf, 2), -1023);
        assert_eq!(&buf[2..5], &[0xFF, 0xFC, 0x01]);
    }

    #[test]
    fn test_little_endian_variants() {
        let mut buf = [0u8; 8];
        pack_i16_le(&mut buf, 0, 0x1234);
        pack_i32_le(&mut buf, 2, 0x0A0B_0C0D);
        assert_eq!(buf, [0x34, 0x12, 0x0D, 0x0C, 0x0B, 0x0A, 0, 0]);
        assert_eq!(unpack_i16_le(&buf, 0), 0x1234);
        assert_eq!(unpack_i32_le(&buf, 2), 0x0A0B_0C0D);
    }

    #[test]
    fn test_fxp16_scale_255_rounds() {
        let mut buf = [0u8; 8];
        pack_fxp16(&mut buf, 0, 0.5, Fxp16Scale::Q8_8_255);
        assert_eq!(unpack_i16(&buf, 0), 128);
        assert_eq!(unpack_fxp16(&buf, 0, Fxp16Scale::Q8_8_255), 128.0 / 255.0);
    }

    #[test]
    fn test_fxp16_scale_256_truncates() {
        assert_eq!(Fxp16Scale::Q8_8_256.quantize(1.999), 511);
        assert_eq!(Fxp16Scale::Q8_8_256.quantize(-1.999), -511);
        assert_eq!(Fxp16Scale::Q8_8_256.dequantize(384), 1.5);
    }

    #[test]
    fn test_fxp32_families() {
        assert_eq!(Fxp32Scale::Q16_16_65536.quantize(1.5), 98304);
        assert_eq!(Fxp32Scale::Q16_16_65535.quantize(0.5), 32768);
        let mut buf = [0u8; 8];
        pack_fxp32_le(&mut buf, 0, -2.25, Fxp32Scale::Q16_16_65536);
        assert_eq!(unpack_fxp32_le(&buf, 0, Fxp32Scale::Q16_16_65536), -2.25);
    }

    #[test]
    fn test_fxp_saturates() {
        assert_eq!(Fxp16Scale::Q8_8_256.quantize(1e9), i16::MAX);
        assert_eq!(Fxp16Scale::Q8_8_256.quantize(-1e9), i16::MIN);
        assert_eq!(Fxp32Scale::Q16_16_65536.quantize(f64::NAN), 0);
    }

    #[test]
    #[should_panic(expected = "exceeds the 8-byte frame")]
    fn test_pack_past_end_panics() {
        let mut buf = [0u8; 8];
        pack_i32(&mut buf, 5, 1);
    }

    #[test]
    #[should_panic(expected = "exceeds the 8-byte frame")]
    fn test_unpack_past_end_panics() {
        let buf = [0u8; 8];
        let _ = unpack_i24(&buf, 6);
    }

    #[test]
    #[should_panic(expected = "exceeds the 8-byte frame")]
    fn test_offset_overflow_panics() {
        let mut buf = [0u8; 8];
        pack_u8(&mut buf, usize::MAX, 1);
    }

    #[test]
    fn test_bits() {
        let mut byte = 0b1010_0000;
        set_bits(&mut byte, 0, 4, 0b1111);
        assert_eq!(byte, 0b1010_1111);
        set_bits(&mut byte, 4, 4, 0b0001);
        assert_eq!(byte, 0b0001_1111);
        assert_eq!(get_bits(byte, 4, 4), 1);
        assert_eq!(get_bits(byte, 0, 8), byte);
    }

    #[test]
    fn test_sign_extend() {
        assert_eq!(sign_extend(0x3FF, 10), -1);
        assert_eq!(sign_extend(0x1FF, 10), 511);
        assert_eq!(sign_extend(0x400, 11), -1024);
        assert_eq!(sign_extend(0xFFFF_FFFF, 32), -1);
    }

    #[test]
    fn test_battery_voltage() {
        assert_eq!(battery_voltage(0), 4.0);
        assert!((battery_voltage(160) - 12.0).abs() < 1e-9);
    }
}
