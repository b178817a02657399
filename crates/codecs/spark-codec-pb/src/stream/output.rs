#[cfg(feature = "alloc")]
use bytes::BytesMut;

use super::ByteSink;
use crate::error::CodecError;
use crate::wire::{WireType, encode_varint, make_key, zigzag_encode};

enum Sink<'a> {
    Slice(&'a mut [u8]),
    Counting,
    Push(&'a mut dyn ByteSink),
    #[cfg(feature = "alloc")]
    Growable(&'a mut BytesMut),
}

/// 带写入计数与上限的输出流。
///
/// # 教案式说明
/// - **意图 (Why)**：编码引擎需要两种输出能力：真实写出，以及只统计字节数的「试编码」，
///   后者用于计算子消息与 packed 数组的长度前缀。
/// - **契约 (What)**：
///   - 有界汇（切片、带上限的推送汇）在空间不足时返回 [`CodecError::BufferFull`]，且不写入任何部分字节；
///   - [`bytes_written`](Self::bytes_written) 始终等于已成功写出的字节数，失败后同样精确；
///   - 计数流的写入永远成功。
/// - **设计权衡 (Trade-offs)**：可增长的 `BytesMut` 汇需要 `alloc`，但分配权属于调用方，引擎本身仍零分配。
pub struct OutputStream<'a> {
    sink: Sink<'a>,
    bytes_written: usize,
    max_size: usize,
    first_fault: Option<CodecError>,
}

impl<'a> OutputStream<'a> {
    /// 写入定长切片，上限为切片长度。
    pub fn from_slice(buf: &'a mut [u8]) -> Self {
        let max_size = buf.len();
        Self {
            sink: Sink::Slice(buf),
            bytes_written: 0,
            max_size,
            first_fault: None,
        }
    }

    /// 仅计数、不保存任何字节。
    #[must_use]
    pub const fn counting() -> Self {
        Self {
            sink: Sink::Counting,
            bytes_written: 0,
            max_size: usize::MAX,
            first_fault: None,
        }
    }

    /// 推送到用户字节汇，最多写出 `max_size` 字节。
    pub fn from_sink(sink: &'a mut dyn ByteSink, max_size: usize) -> Self {
        Self {
            sink: Sink::Push(sink),
            bytes_written: 0,
            max_size,
            first_fault: None,
        }
    }

    /// 追加到可增长缓冲；计数从 0 开始，与缓冲已有内容无关。
    #[cfg(feature = "alloc")]
    pub fn growable(buf: &'a mut BytesMut) -> Self {
        Self {
            sink: Sink::Growable(buf),
            bytes_written: 0,
            max_size: usize::MAX,
            first_fault: None,
        }
    }

    /// 已写出的字节数。
    #[must_use]
    pub const fn bytes_written(&self) -> usize {
        self.bytes_written
    }

    /// 写入上限。
    #[must_use]
    pub const fn max_size(&self) -> usize {
        self.max_size
    }

    /// 是否为纯计数流。
    #[must_use]
    pub const fn is_counting(&self) -> bool {
        matches!(self.sink, Sink::Counting)
    }

    /// 本流记录的首个故障。
    #[must_use]
    pub const fn first_fault(&self) -> Option<CodecError> {
        self.first_fault
    }

    /// 记录故障（仅保留首个）并原样返回。
    pub fn fault(&mut self, error: CodecError) -> CodecError {
        self.first_fault.get_or_insert(error);
        error
    }

    /// 追加字节；要么全部写入，要么一个字节也不写。
    pub fn write(&mut self, bytes: &[u8]) -> Result<(), CodecError> {
        let Some(end) = self.reserve(bytes.len()) else {
            return Err(self.fault(CodecError::BufferFull));
        };
        let start = self.bytes_written;
        let result = match &mut self.sink {
            Sink::Slice(buf) => match buf.get_mut(start..end) {
                Some(dst) => {
                    dst.copy_from_slice(bytes);
                    Ok(())
                }
                None => Err(CodecError::BufferFull),
            },
            Sink::Counting => Ok(()),
            Sink::Push(sink) => sink.push(bytes),
            #[cfg(feature = "alloc")]
            Sink::Growable(buf) => {
                buf.extend_from_slice(bytes);
                Ok(())
            }
        };
        match result {
            Ok(()) => {
                self.bytes_written = end;
                Ok(())
            }
            Err(err) => Err(self.fault(err)),
        }
    }

    fn reserve(&self, len: usize) -> Option<usize> {
        self.bytes_written
            .checked_add(len)
            .filter(|end| *end <= self.max_size)
    }

    /// 在计数流上直接累加 `len` 字节，省去构造载荷。
    pub(crate) fn count(&mut self, len: usize) -> Result<(), CodecError> {
        match self.reserve(len) {
            Some(end) if self.is_counting() => {
                self.bytes_written = end;
                Ok(())
            }
            _ => Err(self.fault(CodecError::BufferFull)),
        }
    }

    /// 写出 varint。
    pub fn write_varint(&mut self, value: u64) -> Result<(), CodecError> {
        self.write(&encode_varint(value))
    }

    /// 写出 zig-zag 编码的有符号 varint。
    pub fn write_svarint(&mut self, value: i64) -> Result<(), CodecError> {
        self.write_varint(zigzag_encode(value))
    }

    /// 写出 4 字节小端整数。
    pub fn write_fixed32(&mut self, value: u32) -> Result<(), CodecError> {
        self.write(&value.to_le_bytes())
    }

    /// 写出 8 字节小端整数。
    pub fn write_fixed64(&mut self, value: u64) -> Result<(), CodecError> {
        self.write(&value.to_le_bytes())
    }

    /// 写出线上键。
    pub fn write_key(&mut self, tag: u32, wire_type: WireType) -> Result<(), CodecError> {
        self.write_varint(make_key(tag, wire_type))
    }

    /// 写出长度前缀与载荷。
    pub fn write_length_delimited(&mut self, payload: &[u8]) -> Result<(), CodecError> {
        self.write_varint(payload.len() as u64)?;
        self.write(payload)
    }

    /// 在一个最多 `size` 字节的子流上运行 `body`，返回其结果与子流写出的字节数。
    ///
    /// 子流与父流共享同一个汇；父流计数按子流实际写出量前移，并吸收子流的首个故障。
    pub fn with_substream<R>(
        &mut self,
        size: usize,
        body: impl FnOnce(&mut OutputStream<'_>) -> Result<R, CodecError>,
    ) -> Result<(R, usize), CodecError> {
        let start = self.bytes_written;
        let room = self.max_size - start;
        let (result, written, sub_fault) = {
            let sink = match &mut self.sink {
                Sink::Slice(buf) => Sink::Slice(buf.get_mut(start..).unwrap_or_default()),
                Sink::Counting => Sink::Counting,
                Sink::Push(sink) => Sink::Push(&mut **sink),
                #[cfg(feature = "alloc")]
                Sink::Growable(buf) => Sink::Growable(&mut **buf),
            };
            let mut sub = OutputStream {
                sink,
                bytes_written: 0,
                max_size: size.min(room),
                first_fault: None,
            };
            let result = body(&mut sub);
            (result, sub.bytes_written, sub.first_fault)
        };
        self.bytes_written = start + written;
        if let Some(fault) = sub_fault {
            self.fault(fault);
        }
        result.map(|value| (value, written))
    }
}

impl core::fmt::Debug for OutputStream<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let kind = match self.sink {
            Sink::Slice(_) => "slice",
            Sink::Counting => "counting",
            Sink::Push(_) => "push",
            #[cfg(feature = "alloc")]
            Sink::Growable(_) => "growable",
        };
        f.debug_struct("OutputStream")
            .field("sink", &kind)
            .field("bytes_written", &self.bytes_written)
            .field("max_size", &self.max_size)
            .field("first_fault", &self.first_fault)
            .finish()
    }
}
