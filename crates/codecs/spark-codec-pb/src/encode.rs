//! # encode 模块：描述符驱动的编码引擎
//!
//! ## 设计意图（Why）
//! - 与解码对称：按表序遍历字段，依据修饰符判断是否存在，再按种类写出键与载荷；
//! - 子消息与 packed 数组的长度前缀需要预先知道载荷大小，引擎用计数流先「试编码」一遍，
//!   从而无需任何中间缓冲。
//!
//! ## 交互契约（What）
//! - 必填字段总是写出；可选字段看存在标记；重复字段计数大于 0 才写出；回调字段只要绑定就调用；
//! - 可 packed 的重复数值字段总以 packed 形式写出，其余重复字段逐元素写键；
//! - 失败立即返回，已写出的字节保留，[`OutputStream::bytes_written`] 精确反映已写出量。
//!
//! ## 风险提示（Trade-offs）
//! - 子消息在计数遍与写出遍各遍历一次，嵌套越深重复遍历越多；回调同样会被调用两次，
//!   两次产出不一致时返回 [`CodecError::SubmessageSizeChanged`]。

use core::ops::{Deref, DerefMut};

use tracing::{trace, warn};

use crate::callback::Callbacks;
use crate::config::CodecConfig;
use crate::descriptor::{ContentKind, FieldDescriptor, Modifier, active_fields};
use crate::error::CodecError;
use crate::record::{
    RecordRef, load_uint, read_bytes_container, read_text_container, sign_extend,
};
use crate::stream::OutputStream;
use crate::wire::WireType;

/// 以默认配置、无回调编码一个消息。
pub fn encode(
    fields: &[FieldDescriptor],
    record: &[u8],
    stream: &mut OutputStream<'_>,
) -> Result<(), CodecError> {
    EncodeContext::new().encode(fields, record, stream)
}

/// 编码带 varint 长度前缀的消息。
pub fn encode_delimited(
    fields: &[FieldDescriptor],
    record: &[u8],
    stream: &mut OutputStream<'_>,
) -> Result<(), CodecError> {
    EncodeContext::new().encode_delimited(fields, record, stream)
}

/// 计算消息编码后的字节数而不输出。
pub fn encoded_len(fields: &[FieldDescriptor], record: &[u8]) -> Result<usize, CodecError> {
    EncodeContext::new().encoded_len(fields, record)
}

/// 编码上下文：配置、回调表与当前嵌套层级。
pub struct EncodeContext<'s, 'c> {
    config: CodecConfig,
    callbacks: Callbacks<'s, 'c>,
    current_depth: u16,
}

impl<'s, 'c> EncodeContext<'s, 'c> {
    /// 默认配置、无回调。
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(CodecConfig::DEFAULT)
    }

    /// 指定配置；编码只使用其中的嵌套深度上限。
    #[must_use]
    pub fn with_config(config: CodecConfig) -> Self {
        Self {
            config,
            callbacks: Callbacks::none(),
            current_depth: 0,
        }
    }

    /// 绑定回调表。
    #[must_use]
    pub fn with_callbacks(mut self, callbacks: Callbacks<'s, 'c>) -> Self {
        self.callbacks = callbacks;
        self
    }

    /// 生效配置。
    #[must_use]
    pub const fn config(&self) -> &CodecConfig {
        &self.config
    }

    /// 当前嵌套层级。
    #[must_use]
    pub const fn current_depth(&self) -> u16 {
        self.current_depth
    }

    /// 进入一层子消息，语义同 [`DecodeContext::enter_frame`](crate::DecodeContext::enter_frame)。
    pub fn enter_frame(&mut self) -> Result<EncodeFrameGuard<'_, 's, 'c>, CodecError> {
        let limit = self.config.max_recursion_depth.get();
        if self.current_depth >= limit {
            warn!(depth = self.current_depth, limit, "encoder nesting limit reached");
            return Err(CodecError::RecursionLimit { depth: limit });
        }
        self.current_depth += 1;
        Ok(EncodeFrameGuard { ctx: self })
    }

    /// 编码一个消息。
    pub fn encode(
        &mut self,
        fields: &[FieldDescriptor],
        record: &[u8],
        stream: &mut OutputStream<'_>,
    ) -> Result<(), CodecError> {
        self.encode_message(fields, record, stream)
            .map_err(|err| stream.fault(err))
    }

    /// 编码带 varint 长度前缀的消息。
    pub fn encode_delimited(
        &mut self,
        fields: &[FieldDescriptor],
        record: &[u8],
        stream: &mut OutputStream<'_>,
    ) -> Result<(), CodecError> {
        let size = self.encoded_len(fields, record)?;
        self.write_framed(0, size, stream, |ctx, sub| ctx.encode_message(fields, record, sub))
            .map_err(|err| stream.fault(err))
    }

    /// 计算消息编码后的字节数。
    pub fn encoded_len(
        &mut self,
        fields: &[FieldDescriptor],
        record: &[u8],
    ) -> Result<usize, CodecError> {
        let mut counter = OutputStream::counting();
        self.encode_message(fields, record, &mut counter)?;
        Ok(counter.bytes_written())
    }

    fn encode_message(
        &mut self,
        fields: &[FieldDescriptor],
        record: &[u8],
        stream: &mut OutputStream<'_>,
    ) -> Result<(), CodecError> {
        let view = RecordRef::new(record);
        for field in active_fields(fields) {
            match field.modifier() {
                Modifier::Required => self.encode_single(field, view, stream)?,
                Modifier::Optional => {
                    if view.has(field)? {
                        self.encode_single(field, view, stream)?;
                    }
                }
                Modifier::Repeated => self.encode_repeated(field, view, stream)?,
                Modifier::Callback => self.encode_callback(field, view, stream)?,
            }
        }
        Ok(())
    }

    fn encode_single(
        &mut self,
        field: &FieldDescriptor,
        view: RecordRef<'_>,
        stream: &mut OutputStream<'_>,
    ) -> Result<(), CodecError> {
        stream.write_key(field.tag(), field.kind().wire_type())?;
        self.encode_value(field, view.slot(field, 0)?, stream)
    }

    fn encode_repeated(
        &mut self,
        field: &FieldDescriptor,
        view: RecordRef<'_>,
        stream: &mut OutputStream<'_>,
    ) -> Result<(), CodecError> {
        let count = view.count(field)?;
        if count > field.max_count() {
            return Err(CodecError::ArrayFull { tag: field.tag() });
        }
        if count == 0 {
            return Ok(());
        }
        let kind = field.kind();
        if !kind.is_packable() {
            for index in 0..count {
                stream.write_key(field.tag(), kind.wire_type())?;
                self.encode_value(field, view.slot(field, index)?, stream)?;
            }
            return Ok(());
        }
        let size = match kind.wire_type().fixed_len() {
            Some(width) => width
                .checked_mul(count)
                .ok_or_else(|| field.invalid("packed size overflow"))?,
            None => {
                let mut counter = OutputStream::counting();
                for index in 0..count {
                    encode_scalar(field, view.slot(field, index)?, &mut counter)?;
                }
                counter.bytes_written()
            }
        };
        stream.write_key(field.tag(), WireType::LengthDelimited)?;
        stream.write_varint(size as u64)?;
        for index in 0..count {
            encode_scalar(field, view.slot(field, index)?, stream)?;
        }
        Ok(())
    }

    fn encode_value(
        &mut self,
        field: &FieldDescriptor,
        slot: &[u8],
        stream: &mut OutputStream<'_>,
    ) -> Result<(), CodecError> {
        if field.kind() != ContentKind::Submessage {
            return encode_scalar(field, slot, stream);
        }
        let table = field
            .submessage()
            .ok_or_else(|| field.invalid("submessage without table"))?;
        let mut frame = self.enter_frame()?;
        let size = frame.encoded_len(table, slot)?;
        frame.write_framed(field.tag(), size, stream, |ctx, sub| {
            ctx.encode_message(table, slot, sub)
        })
    }

    /// 写出长度前缀，再在恰好 `size` 字节的子流上运行 `body`。
    fn write_framed(
        &mut self,
        tag: u32,
        size: usize,
        stream: &mut OutputStream<'_>,
        body: impl FnOnce(&mut Self, &mut OutputStream<'_>) -> Result<(), CodecError>,
    ) -> Result<(), CodecError> {
        stream.write_varint(size as u64)?;
        if stream.is_counting() {
            return stream.count(size);
        }
        let ((), written) = stream.with_substream(size, |sub| body(self, sub))?;
        if written != size {
            warn!(tag, size, written, "submessage size changed between passes");
            return Err(CodecError::SubmessageSizeChanged { tag });
        }
        Ok(())
    }

    fn encode_callback(
        &mut self,
        field: &FieldDescriptor,
        view: RecordRef<'_>,
        stream: &mut OutputStream<'_>,
    ) -> Result<(), CodecError> {
        let handle = view.handle(field)?;
        let Some(callback) = self.callbacks.resolve(field, handle)? else {
            return Ok(());
        };
        let before = stream.bytes_written();
        callback.encode(stream, field)?;
        trace!(
            tag = field.tag(),
            written = stream.bytes_written() - before,
            counting = stream.is_counting(),
            "callback field encoded"
        );
        Ok(())
    }
}

impl Default for EncodeContext<'_, '_> {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for EncodeContext<'_, '_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EncodeContext")
            .field("config", &self.config)
            .field("callbacks", &self.callbacks)
            .field("current_depth", &self.current_depth)
            .finish()
    }
}

/// 编码递归守卫。
pub struct EncodeFrameGuard<'g, 's, 'c> {
    ctx: &'g mut EncodeContext<'s, 'c>,
}

impl<'s, 'c> Deref for EncodeFrameGuard<'_, 's, 'c> {
    type Target = EncodeContext<'s, 'c>;

    fn deref(&self) -> &Self::Target {
        self.ctx
    }
}

impl DerefMut for EncodeFrameGuard<'_, '_, '_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.ctx
    }
}

impl Drop for EncodeFrameGuard<'_, '_, '_> {
    fn drop(&mut self) {
        self.ctx.current_depth = self.ctx.current_depth.saturating_sub(1);
    }
}

fn encode_scalar(
    field: &FieldDescriptor,
    slot: &[u8],
    stream: &mut OutputStream<'_>,
) -> Result<(), CodecError> {
    match field.kind() {
        ContentKind::Varint => {
            if !matches!(slot.len(), 1 | 2 | 4 | 8) {
                return Err(field.invalid("varint width must be 1, 2, 4 or 8"));
            }
            stream.write_varint(load_uint(slot))
        }
        ContentKind::SVarint => {
            if !matches!(slot.len(), 4 | 8) {
                return Err(field.invalid("signed varint width must be 4 or 8"));
            }
            stream.write_svarint(sign_extend(load_uint(slot), slot.len()))
        }
        ContentKind::Fixed32 | ContentKind::Fixed64 => {
            if Some(slot.len()) != field.kind().wire_type().fixed_len() {
                return Err(field.invalid("fixed width mismatch"));
            }
            stream.write(slot)
        }
        ContentKind::Bytes => stream.write_length_delimited(read_bytes_container(field, slot)?),
        ContentKind::String => stream.write_length_delimited(read_text_container(field, slot)?),
        ContentKind::Submessage => Err(field.invalid("submessage encoded as scalar")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static POINT: [FieldDescriptor; 2] = [
        FieldDescriptor::required(1, ContentKind::SVarint, 0, 4),
        FieldDescriptor::required(2, ContentKind::SVarint, 4, 4),
    ];

    #[test]
    fn signed_varints_use_zigzag() {
        let mut record = [0u8; 8];
        record[..4].copy_from_slice(&(-1i32).to_le_bytes());
        record[4..].copy_from_slice(&64i32.to_le_bytes());
        let mut out = [0u8; 8];
        let mut stream = OutputStream::from_slice(&mut out);
        encode(&POINT, &record, &mut stream).expect("缓冲充足");
        let written = stream.bytes_written();
        assert_eq!(&out[..written], &[0x08, 0x01, 0x10, 0x80, 0x01]);
    }

    #[test]
    fn encoded_len_matches_real_pass() {
        let record = [0xFFu8; 8];
        let len = encoded_len(&POINT, &record).expect("计数遍不会失败");
        let mut out = [0u8; 16];
        let mut stream = OutputStream::from_slice(&mut out);
        encode(&POINT, &record, &mut stream).expect("缓冲充足");
        assert_eq!(stream.bytes_written(), len);
    }
}
