//! # wire 模块：线上原语
//!
//! ## 设计意图（Why）
//! - protobuf 线上格式只有四种载荷形态（varint、8 字节、长度前缀、4 字节），本模块以纯函数形式
//!   实现它们的编解码，供流对象与引擎共享；
//! - 纯函数不依赖流状态，便于属性测试直接覆盖边界值。
//!
//! ## 交互契约（What）
//! - varint：每字节低 7 位承载数据、高位为续位标记，最长 10 字节；超长即 [`CodecError::MalformedVarint`]；
//! - zig-zag：`(n << 1) ^ (n >> 63)`，仅用于有符号 varint 种类；
//! - 定长：小端序，恰好 4 或 8 字节；
//! - 键：`(tag << 3) | wire_type`，以 varint 编码。

use crate::error::CodecError;

/// varint 的最大编码长度（64 位值 / 每字节 7 位，向上取整）。
pub const MAX_VARINT_LEN: usize = 10;

/// 线上 wire type。
///
/// 3/4（group）与 6/7 未被支持，解析时返回 [`CodecError::InvalidWireType`]。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum WireType {
    /// varint 载荷。
    Varint = 0,
    /// 8 字节小端载荷。
    Bit64 = 1,
    /// varint 长度前缀 + 原始字节。
    LengthDelimited = 2,
    /// 4 字节小端载荷。
    Bit32 = 5,
}

impl WireType {
    /// 由原始 3 位数值构造。
    pub const fn from_bits(bits: u8) -> Result<Self, CodecError> {
        match bits {
            0 => Ok(Self::Varint),
            1 => Ok(Self::Bit64),
            2 => Ok(Self::LengthDelimited),
            5 => Ok(Self::Bit32),
            other => Err(CodecError::InvalidWireType { wire_type: other }),
        }
    }

    /// 定长载荷的字节数；varint 与长度前缀返回 `None`。
    #[must_use]
    pub const fn fixed_len(self) -> Option<usize> {
        match self {
            Self::Bit32 => Some(4),
            Self::Bit64 => Some(8),
            Self::Varint | Self::LengthDelimited => None,
        }
    }
}

/// 栈上保存的 varint 编码结果。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EncodedVarint {
    bytes: [u8; MAX_VARINT_LEN],
    len: u8,
}

impl EncodedVarint {
    /// 编码后的字节。
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes[..usize::from(self.len)]
    }

    /// 编码长度（1..=10）。
    #[must_use]
    #[allow(clippy::len_without_is_empty)]
    pub const fn len(&self) -> usize {
        self.len as usize
    }
}

impl core::ops::Deref for EncodedVarint {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.as_slice()
    }
}

/// 将 64 位无符号整数编码为 varint。
///
/// 值 `< 128` 恰好占 1 字节；一般地，编码长度为 `ceil(有效位数 / 7)`，最少 1 字节。
#[must_use]
pub fn encode_varint(mut value: u64) -> EncodedVarint {
    let mut bytes = [0u8; MAX_VARINT_LEN];
    let mut len = 0;
    loop {
        let low = (value & 0x7F) as u8;
        value >>= 7;
        if value == 0 {
            bytes[len] = low;
            len += 1;
            break;
        }
        bytes[len] = low | 0x80;
        len += 1;
    }
    EncodedVarint {
        bytes,
        len: len as u8,
    }
}

/// 计算 varint 编码长度而不真正编码。
#[must_use]
pub const fn varint_len(value: u64) -> usize {
    let bits = 64 - (value | 1).leading_zeros() as usize;
    bits.div_ceil(7)
}

/// 从切片开头解码一个 varint，返回值与消耗的字节数。
///
/// - 切片在终止字节前耗尽：[`CodecError::EndOfStream`]；
/// - 前 10 个字节均带续位：[`CodecError::MalformedVarint`]。
///
/// 第 10 字节中超出 64 位的高位被丢弃，与常见实现保持一致。
pub fn decode_varint(input: &[u8]) -> Result<(u64, usize), CodecError> {
    let mut value = 0u64;
    for (index, byte) in input.iter().copied().take(MAX_VARINT_LEN).enumerate() {
        value |= u64::from(byte & 0x7F) << (7 * index);
        if byte & 0x80 == 0 {
            return Ok((value, index + 1));
        }
    }
    if input.len() >= MAX_VARINT_LEN {
        Err(CodecError::MalformedVarint)
    } else {
        Err(CodecError::EndOfStream)
    }
}

/// zig-zag 编码：小绝对值的负数也得到短 varint。
#[must_use]
pub const fn zigzag_encode(value: i64) -> u64 {
    ((value << 1) ^ (value >> 63)) as u64
}

/// zig-zag 解码，[`zigzag_encode`] 的逆运算。
#[must_use]
pub const fn zigzag_decode(value: u64) -> i64 {
    ((value >> 1) as i64) ^ -((value & 1) as i64)
}

/// 组合字段编号与 wire type 为线上键。
#[must_use]
pub const fn make_key(tag: u32, wire_type: WireType) -> u64 {
    ((tag as u64) << 3) | wire_type as u64
}

/// 拆分线上键为 `(tag, wire_type)`。
///
/// 编号为 0 或超出 `u32` 的键返回 [`CodecError::InvalidTag`]。
pub fn split_key(key: u64) -> Result<(u32, WireType), CodecError> {
    let wire_type = WireType::from_bits((key & 0x07) as u8)?;
    let tag = u32::try_from(key >> 3).map_err(|_| CodecError::InvalidTag)?;
    if tag == 0 {
        return Err(CodecError::InvalidTag);
    }
    Ok((tag, wire_type))
}
