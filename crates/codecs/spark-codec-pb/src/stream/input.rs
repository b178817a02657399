use super::ByteSource;
use crate::error::CodecError;
use crate::wire::{MAX_VARINT_LEN, WireType, zigzag_decode};

enum Source<'a> {
    /// 尚未读取的剩余切片；长度始终不小于 `bytes_left`。
    Slice(&'a [u8]),
    Pull(&'a mut dyn ByteSource),
}

impl Source<'_> {
    fn narrow(&mut self, len: usize) -> Source<'_> {
        match self {
            Source::Slice(data) => Source::Slice(&data[..len.min(data.len())]),
            Source::Pull(source) => Source::Pull(&mut **source),
        }
    }
}

/// 带剩余字节预算的输入流。
///
/// # 教案式说明
/// - **意图 (Why)**：解码引擎需要一个既能包裹内存切片、又能包裹阻塞式驱动的统一读取入口，
///   并能为长度前缀载荷划出精确的子窗口。
/// - **契约 (What)**：
///   - 每次成功的 `read(buf)` 恰好使 [`bytes_left`](Self::bytes_left) 减少 `buf.len()`；
///   - 请求超过预算立即失败，不会触碰底层源；
///   - [`first_fault`](Self::first_fault) 保留首个故障，子流故障会被父流吸收。
/// - **设计权衡 (Trade-offs)**：无界拉取流（[`from_source_unbounded`](Self::from_source_unbounded)）
///   在键边界遇到源耗尽时视为消息正常结束，代价是无法区分「恰好在字段边界被截断」的输入。
pub struct InputStream<'a> {
    source: Source<'a>,
    bytes_left: usize,
    unbounded: bool,
    first_fault: Option<CodecError>,
}

impl<'a> InputStream<'a> {
    /// 以内存切片构造输入流，预算等于切片长度。
    #[must_use]
    pub fn from_slice(data: &'a [u8]) -> Self {
        Self {
            source: Source::Slice(data),
            bytes_left: data.len(),
            unbounded: false,
            first_fault: None,
        }
    }

    /// 以拉取源构造输入流，`len` 为调用方已知的消息长度。
    pub fn from_source(source: &'a mut dyn ByteSource, len: usize) -> Self {
        Self {
            source: Source::Pull(source),
            bytes_left: len,
            unbounded: false,
            first_fault: None,
        }
    }

    /// 以长度未知的拉取源构造输入流，读取到源耗尽为止。
    pub fn from_source_unbounded(source: &'a mut dyn ByteSource) -> Self {
        Self {
            source: Source::Pull(source),
            bytes_left: usize::MAX,
            unbounded: true,
            first_fault: None,
        }
    }

    /// 剩余可读字节数。
    #[must_use]
    pub const fn bytes_left(&self) -> usize {
        self.bytes_left
    }

    /// 本流记录的首个故障。
    #[must_use]
    pub const fn first_fault(&self) -> Option<CodecError> {
        self.first_fault
    }

    /// 记录故障（仅保留首个）并原样返回，便于 `Err(stream.fault(e))` 写法。
    pub fn fault(&mut self, error: CodecError) -> CodecError {
        self.first_fault.get_or_insert(error);
        error
    }

    fn read_unrecorded(&mut self, buf: &mut [u8]) -> Result<(), CodecError> {
        if buf.len() > self.bytes_left {
            return Err(CodecError::EndOfStream);
        }
        match &mut self.source {
            Source::Slice(data) => {
                let remaining: &'a [u8] = *data;
                let Some(head) = remaining.get(..buf.len()) else {
                    return Err(CodecError::EndOfStream);
                };
                buf.copy_from_slice(head);
                *data = &remaining[buf.len()..];
            }
            Source::Pull(source) => source.pull(buf)?,
        }
        self.bytes_left -= buf.len();
        Ok(())
    }

    /// 读取恰好 `buf.len()` 个字节。
    pub fn read(&mut self, buf: &mut [u8]) -> Result<(), CodecError> {
        self.read_unrecorded(buf).map_err(|err| self.fault(err))
    }

    /// 丢弃 `count` 个字节。
    pub fn skip(&mut self, count: usize) -> Result<(), CodecError> {
        if count > self.bytes_left {
            return Err(self.fault(CodecError::EndOfStream));
        }
        let result = match &mut self.source {
            Source::Slice(data) => {
                let remaining: &'a [u8] = *data;
                match remaining.get(count..) {
                    Some(rest) => {
                        *data = rest;
                        Ok(())
                    }
                    None => Err(CodecError::EndOfStream),
                }
            }
            Source::Pull(source) => source.skip(count),
        };
        match result {
            Ok(()) => {
                self.bytes_left -= count;
                Ok(())
            }
            Err(err) => Err(self.fault(err)),
        }
    }

    /// 读取单个字节。
    pub fn read_byte(&mut self) -> Result<u8, CodecError> {
        let mut byte = [0u8; 1];
        self.read(&mut byte)?;
        Ok(byte[0])
    }

    /// 读取一个 varint。
    pub fn read_varint(&mut self) -> Result<u64, CodecError> {
        let first = self.read_byte()?;
        self.finish_varint(first)
    }

    fn finish_varint(&mut self, first: u8) -> Result<u64, CodecError> {
        let mut value = u64::from(first & 0x7F);
        if first & 0x80 == 0 {
            return Ok(value);
        }
        for index in 1..MAX_VARINT_LEN {
            let byte = self.read_byte()?;
            value |= u64::from(byte & 0x7F) << (7 * index);
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(self.fault(CodecError::MalformedVarint))
    }

    /// 读取 zig-zag 编码的有符号 varint。
    pub fn read_svarint(&mut self) -> Result<i64, CodecError> {
        self.read_varint().map(zigzag_decode)
    }

    /// 读取 4 字节小端整数。
    pub fn read_fixed32(&mut self) -> Result<u32, CodecError> {
        let mut raw = [0u8; 4];
        self.read(&mut raw)?;
        Ok(u32::from_le_bytes(raw))
    }

    /// 读取 8 字节小端整数。
    pub fn read_fixed64(&mut self) -> Result<u64, CodecError> {
        let mut raw = [0u8; 8];
        self.read(&mut raw)?;
        Ok(u64::from_le_bytes(raw))
    }

    /// 读取长度前缀，并确认其不超过剩余预算。
    pub fn read_length(&mut self) -> Result<usize, CodecError> {
        let raw = self.read_varint()?;
        match usize::try_from(raw) {
            Ok(len) if len <= self.bytes_left => Ok(len),
            _ => Err(self.fault(CodecError::EndOfStream)),
        }
    }

    /// 读取下一个线上键。
    ///
    /// 预算耗尽时返回 `Ok(None)`；无界拉取流在键的首字节处遇到源耗尽同样视为结束。
    pub fn read_key(&mut self) -> Result<Option<u64>, CodecError> {
        if self.bytes_left == 0 {
            return Ok(None);
        }
        let mut first = [0u8; 1];
        match self.read_unrecorded(&mut first) {
            Ok(()) => self.finish_varint(first[0]).map(Some),
            Err(CodecError::EndOfStream) if self.unbounded => {
                self.bytes_left = 0;
                Ok(None)
            }
            Err(err) => Err(self.fault(err)),
        }
    }

    /// 按 wire type 跳过一个字段的载荷。
    pub fn skip_field(&mut self, wire_type: WireType) -> Result<(), CodecError> {
        match wire_type {
            WireType::Varint => self.read_varint().map(drop),
            WireType::LengthDelimited => {
                let len = self.read_length()?;
                self.skip(len)
            }
            WireType::Bit32 | WireType::Bit64 => {
                let len = wire_type.fixed_len().unwrap_or(0);
                self.skip(len)
            }
        }
    }

    /// 将一个非长度前缀字段的原始载荷复制到 `buf`，返回字节数。
    ///
    /// 用于把标量值交给回调时构造独立的小窗口。
    pub fn read_raw_value(
        &mut self,
        wire_type: WireType,
        buf: &mut [u8; MAX_VARINT_LEN],
    ) -> Result<usize, CodecError> {
        match wire_type {
            WireType::Varint => {
                for index in 0..MAX_VARINT_LEN {
                    buf[index] = self.read_byte()?;
                    if buf[index] & 0x80 == 0 {
                        return Ok(index + 1);
                    }
                }
                Err(self.fault(CodecError::MalformedVarint))
            }
            WireType::Bit32 | WireType::Bit64 => {
                let len = wire_type.fixed_len().unwrap_or(0);
                self.read(&mut buf[..len])?;
                Ok(len)
            }
            WireType::LengthDelimited => Err(self.fault(CodecError::InvalidWireType {
                wire_type: WireType::LengthDelimited as u8,
            })),
        }
    }

    /// 在接下来的 `len` 个字节上运行 `body`，返回其结果与子流未消费的字节数。
    ///
    /// 无论 `body` 成功与否，父流都恰好前移子流实际消费的字节数，并吸收子流的首个故障。
    pub fn with_substream<R>(
        &mut self,
        len: usize,
        body: impl FnOnce(&mut InputStream<'_>) -> Result<R, CodecError>,
    ) -> Result<(R, usize), CodecError> {
        if len > self.bytes_left {
            return Err(self.fault(CodecError::EndOfStream));
        }
        let (result, leftover, sub_fault) = {
            let mut sub = InputStream {
                source: self.source.narrow(len),
                bytes_left: len,
                unbounded: false,
                first_fault: None,
            };
            let result = body(&mut sub);
            (result, sub.bytes_left, sub.first_fault)
        };
        let consumed = len - leftover;
        if let Source::Slice(data) = &mut self.source {
            let remaining: &'a [u8] = *data;
            *data = &remaining[consumed.min(remaining.len())..];
        }
        self.bytes_left -= consumed;
        if let Some(fault) = sub_fault {
            self.fault(fault);
        }
        result.map(|value| (value, leftover))
    }

    /// 读取长度前缀，再在其声明的窗口上运行 `body`。
    pub fn with_length_delimited<R>(
        &mut self,
        body: impl FnOnce(&mut InputStream<'_>) -> Result<R, CodecError>,
    ) -> Result<(R, usize), CodecError> {
        let len = self.read_length()?;
        self.with_substream(len, body)
    }
}

impl core::fmt::Debug for InputStream<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let kind = match self.source {
            Source::Slice(_) => "slice",
            Source::Pull(_) => "pull",
        };
        f.debug_struct("InputStream")
            .field("source", &kind)
            .field("bytes_left", &self.bytes_left)
            .field("first_fault", &self.first_fault)
            .finish()
    }
}
