//! # decode 模块：描述符驱动的解码引擎
//!
//! ## 设计意图（Why）
//! - 一个通用遍历器即可解码任意消息：读键、查表、按修饰符与种类把载荷写入记录对应位置；
//! - 引擎不分配内存、不回溯，输入可以来自只能顺序读取的拉取源。
//!
//! ## 交互契约（What）
//! - 输入：描述符表、[`InputStream`]、调用方持有的记录字节区；
//! - 成功：所有出现的已知字段写入记录，未知字段被跳过，必填字段全部出现；
//! - 失败：返回首个错误并记录到流的 `first_fault`；记录可能已被部分写入；
//! - [`decode`] 不清零记录，未出现的字段保持原值；需要初始化时使用 [`decode_with_defaults`]
//!   或在配置中开启 `init_defaults`。
//!
//! ## 实现策略（How）
//! - 查表从上一次命中位置开始循环线性搜索，键按表序到达时每次只比较一次；
//! - packed 重复字段在长度前缀窗口内逐个追加，每追加一个立即更新计数，
//!   溢出时记录中保留已解码的前 `max_count` 个元素；
//! - 子消息通过 [`DecodeContext::enter_frame`] 进入，守卫析构时回退层级。
//!
//! ## 风险提示（Trade-offs）
//! - 同一非重复字段多次出现时后者覆盖前者，不报错；
//! - 无界拉取流在字段边界被截断时无法与正常结束区分，见 [`InputStream::from_source_unbounded`]。

use core::ops::{Deref, DerefMut};

use tracing::{debug, trace, warn};

use crate::callback::Callbacks;
use crate::config::CodecConfig;
use crate::descriptor::{ContentKind, DefaultValue, FieldDescriptor, Modifier, active_fields};
use crate::error::CodecError;
use crate::record::{
    BYTES_LEN_SIZE, RecordMut, RecordRef, store_uint, write_bytes_container, write_text_container,
};
use crate::required::RequiredFieldSet;
use crate::stream::InputStream;
use crate::wire::{MAX_VARINT_LEN, WireType, split_key};

/// 以默认配置、无回调解码一个消息。
///
/// # 示例
/// ```
/// use spark_codec_pb::{ContentKind, FieldDescriptor, InputStream, RecordRef, decode};
///
/// static COUNTER: [FieldDescriptor; 1] = [FieldDescriptor::required(1, ContentKind::Varint, 0, 4)];
///
/// let mut record = [0u8; 4];
/// let mut stream = InputStream::from_slice(&[0x08, 0x96, 0x01]);
/// decode(&COUNTER, &mut stream, &mut record).expect("合法输入");
/// assert_eq!(RecordRef::new(&record).uint(&COUNTER[0]), Ok(150));
/// ```
pub fn decode(
    fields: &[FieldDescriptor],
    stream: &mut InputStream<'_>,
    record: &mut [u8],
) -> Result<(), CodecError> {
    DecodeContext::new().decode(fields, stream, record)
}

/// 先套用默认值再解码。
pub fn decode_with_defaults(
    fields: &[FieldDescriptor],
    stream: &mut InputStream<'_>,
    record: &mut [u8],
) -> Result<(), CodecError> {
    DecodeContext::with_config(CodecConfig::DEFAULT.with_init_defaults(true))
        .decode(fields, stream, record)
}

/// 解码带 varint 长度前缀的消息。
pub fn decode_delimited(
    fields: &[FieldDescriptor],
    stream: &mut InputStream<'_>,
    record: &mut [u8],
) -> Result<(), CodecError> {
    DecodeContext::new().decode_delimited(fields, stream, record)
}

/// 将记录中的字段恢复为默认值。
///
/// 必填/可选字段写入声明的默认值或零，可选字段存在标记清除，重复字段计数归零，
/// 必填子消息递归处理，可选子消息只清除存在标记，回调句柄保持不变。
pub fn set_to_defaults(fields: &[FieldDescriptor], record: &mut [u8]) -> Result<(), CodecError> {
    DecodeContext::new().set_to_defaults(fields, record)
}

/// 解码上下文：配置、回调表与当前嵌套层级。
///
/// # 教案式说明
/// - **意图 (Why)**：把一次解码调用需要的全部可变状态收拢到一处，递归时只需传递 `&mut self`。
/// - **契约 (What)**：上下文可复用于多次调用；每次进入子消息层级加一，离开时由守卫回退。
/// - **设计权衡 (Trade-offs)**：回调表以可变借用持有，同一时刻只能服务一个解码调用。
pub struct DecodeContext<'s, 'c> {
    config: CodecConfig,
    callbacks: Callbacks<'s, 'c>,
    current_depth: u16,
}

impl<'s, 'c> DecodeContext<'s, 'c> {
    /// 默认配置、无回调。
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(CodecConfig::DEFAULT)
    }

    /// 指定配置。
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

    /// 进入一层子消息。
    ///
    /// 层级已达 `max_recursion_depth` 时返回 [`CodecError::RecursionLimit`]；
    /// 返回的守卫析构时层级自动回退。
    pub fn enter_frame(&mut self) -> Result<DecodeFrameGuard<'_, 's, 'c>, CodecError> {
        let limit = self.config.max_recursion_depth.get();
        if self.current_depth >= limit {
            warn!(depth = self.current_depth, limit, "decoder nesting limit reached");
            return Err(CodecError::RecursionLimit { depth: limit });
        }
        self.current_depth += 1;
        Ok(DecodeFrameGuard { ctx: self })
    }

    /// 解码一个消息；配置开启 `init_defaults` 时先套用默认值。
    pub fn decode(
        &mut self,
        fields: &[FieldDescriptor],
        stream: &mut InputStream<'_>,
        record: &mut [u8],
    ) -> Result<(), CodecError> {
        if self.config.init_defaults {
            self.set_to_defaults(fields, record)
                .map_err(|err| stream.fault(err))?;
        }
        self.decode_message(fields, stream, record)
    }

    /// 解码带 varint 长度前缀的消息。
    pub fn decode_delimited(
        &mut self,
        fields: &[FieldDescriptor],
        stream: &mut InputStream<'_>,
        record: &mut [u8],
    ) -> Result<(), CodecError> {
        let ((), leftover) = stream.with_length_delimited(|sub| self.decode(fields, sub, record))?;
        if leftover != 0 {
            return Err(stream.fault(CodecError::TruncatedSubmessage { tag: 0 }));
        }
        Ok(())
    }

    /// 将记录中的字段恢复为默认值，见 [`set_to_defaults`]。
    pub fn set_to_defaults(
        &mut self,
        fields: &[FieldDescriptor],
        record: &mut [u8],
    ) -> Result<(), CodecError> {
        let mut view = RecordMut::new(record);
        for field in active_fields(fields) {
            match field.modifier() {
                Modifier::Callback => continue,
                Modifier::Repeated => {
                    view.set_count(field, 0)?;
                    continue;
                }
                Modifier::Optional => {
                    view.set_has(field, false)?;
                    // 可选子消息只清标记，内容在真正解码时初始化。
                    if field.kind() == ContentKind::Submessage {
                        continue;
                    }
                }
                Modifier::Required => {}
            }
            if field.kind() == ContentKind::Submessage {
                let table = field
                    .submessage()
                    .ok_or_else(|| field.invalid("submessage without table"))?;
                let sub_record = view.slot_mut(field, 0)?;
                let mut frame = self.enter_frame()?;
                frame.set_to_defaults(table, sub_record)?;
                continue;
            }
            let slot = view.slot_mut(field, 0)?;
            slot.fill(0);
            match (field.kind(), field.default_value()) {
                (ContentKind::Bytes, Some(DefaultValue::Bytes(value))) => {
                    write_bytes_container(field, slot, value)?;
                }
                (ContentKind::String, Some(DefaultValue::Bytes(value))) => {
                    write_text_container(field, slot, value)?;
                }
                (ContentKind::Bytes | ContentKind::String, _) | (_, None) => {}
                (_, Some(DefaultValue::Scalar(bits))) => store_uint(slot, bits),
                (_, Some(DefaultValue::Bytes(_))) => {
                    return Err(field.invalid("default does not match kind"));
                }
            }
        }
        Ok(())
    }

    fn decode_message(
        &mut self,
        fields: &[FieldDescriptor],
        stream: &mut InputStream<'_>,
        record: &mut [u8],
    ) -> Result<(), CodecError> {
        let fields = active_fields(fields);
        let mut required = RequiredFieldSet::new(self.config.max_required_fields);
        let mut cursor = 0;
        while let Some(key) = stream.read_key()? {
            if key == 0 {
                if self.config.zero_tag_terminates {
                    trace!("zero key terminates message");
                    break;
                }
                return Err(stream.fault(CodecError::InvalidTag));
            }
            let (tag, wire_type) = split_key(key).map_err(|err| stream.fault(err))?;
            let Some(position) = find_field(fields, tag, cursor) else {
                trace!(tag, ?wire_type, "skipping unknown field");
                stream.skip_field(wire_type)?;
                continue;
            };
            cursor = position;
            let field = &fields[position];
            if field.modifier() == Modifier::Required {
                required.mark(required_index(fields, position));
            }
            self.decode_field(field, wire_type, stream, record)
                .map_err(|err| stream.fault(err))?;
        }
        check_required(fields, &required).map_err(|err| stream.fault(err))
    }

    fn decode_field(
        &mut self,
        field: &FieldDescriptor,
        wire_type: WireType,
        stream: &mut InputStream<'_>,
        record: &mut [u8],
    ) -> Result<(), CodecError> {
        match field.modifier() {
            Modifier::Required => {
                expect_wire_type(field, wire_type)?;
                self.decode_value(field, 0, stream, record)
            }
            Modifier::Optional => {
                expect_wire_type(field, wire_type)?;
                self.decode_value(field, 0, stream, record)?;
                RecordMut::new(record).set_has(field, true)
            }
            Modifier::Repeated
                if wire_type == WireType::LengthDelimited && field.kind().is_packable() =>
            {
                let ((), _) = stream.with_length_delimited(|sub| {
                    while sub.bytes_left() > 0 {
                        self.append_value(field, sub, record)?;
                    }
                    Ok(())
                })?;
                Ok(())
            }
            Modifier::Repeated => {
                expect_wire_type(field, wire_type)?;
                self.append_value(field, stream, record)
            }
            Modifier::Callback => self.decode_callback(field, wire_type, stream, record),
        }
    }

    fn append_value(
        &mut self,
        field: &FieldDescriptor,
        stream: &mut InputStream<'_>,
        record: &mut [u8],
    ) -> Result<(), CodecError> {
        let index = RecordRef::new(record).count(field)?;
        if index >= field.max_count() {
            debug!(tag = field.tag(), capacity = field.max_count(), "repeated field overflow");
            return Err(CodecError::ArrayFull { tag: field.tag() });
        }
        self.decode_value(field, index, stream, record)?;
        RecordMut::new(record).set_count(field, index + 1)
    }

    fn decode_value(
        &mut self,
        field: &FieldDescriptor,
        index: usize,
        stream: &mut InputStream<'_>,
        record: &mut [u8],
    ) -> Result<(), CodecError> {
        let mut view = RecordMut::new(record);
        let slot = view.slot_mut(field, index)?;
        if field.kind() == ContentKind::Submessage {
            return self.decode_submessage(field, stream, slot);
        }
        decode_scalar(field, stream, slot)
    }

    fn decode_submessage(
        &mut self,
        field: &FieldDescriptor,
        stream: &mut InputStream<'_>,
        sub_record: &mut [u8],
    ) -> Result<(), CodecError> {
        let table = field
            .submessage()
            .ok_or_else(|| field.invalid("submessage without table"))?;
        let tag = field.tag();
        let mut frame = self.enter_frame()?;
        let ((), leftover) = stream.with_length_delimited(|sub| {
            trace!(tag, len = sub.bytes_left(), depth = frame.current_depth, "entering submessage");
            frame.decode(table, sub, sub_record)
        })?;
        if leftover != 0 {
            debug!(tag, leftover, "submessage not fully consumed");
            return Err(CodecError::TruncatedSubmessage { tag });
        }
        Ok(())
    }

    fn decode_callback(
        &mut self,
        field: &FieldDescriptor,
        wire_type: WireType,
        stream: &mut InputStream<'_>,
        record: &mut [u8],
    ) -> Result<(), CodecError> {
        let tag = field.tag();
        let handle = RecordRef::new(record).handle(field)?;
        let Some(callback) = self.callbacks.resolve(field, handle)? else {
            trace!(tag, "callback field unbound, skipping");
            return stream.skip_field(wire_type);
        };
        if wire_type == WireType::LengthDelimited {
            let ((), _) = stream.with_length_delimited(|sub| {
                loop {
                    let before = sub.bytes_left();
                    callback.decode(sub, field)?;
                    match sub.bytes_left() {
                        0 => return Ok(()),
                        left if left == before => return Err(CodecError::CallbackFailed { tag }),
                        _ => {}
                    }
                }
            })?;
            return Ok(());
        }
        let mut raw = [0u8; MAX_VARINT_LEN];
        let len = stream.read_raw_value(wire_type, &mut raw)?;
        let mut sub = InputStream::from_slice(&raw[..len]);
        callback.decode(&mut sub, field)
    }
}

impl Default for DecodeContext<'_, '_> {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for DecodeContext<'_, '_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DecodeContext")
            .field("config", &self.config)
            .field("callbacks", &self.callbacks)
            .field("current_depth", &self.current_depth)
            .finish()
    }
}

/// 解码递归守卫，离开作用域时层级自动回退。
pub struct DecodeFrameGuard<'g, 's, 'c> {
    ctx: &'g mut DecodeContext<'s, 'c>,
}

impl<'s, 'c> Deref for DecodeFrameGuard<'_, 's, 'c> {
    type Target = DecodeContext<'s, 'c>;

    fn deref(&self) -> &Self::Target {
        self.ctx
    }
}

impl DerefMut for DecodeFrameGuard<'_, '_, '_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.ctx
    }
}

impl Drop for DecodeFrameGuard<'_, '_, '_> {
    fn drop(&mut self) {
        self.ctx.current_depth = self.ctx.current_depth.saturating_sub(1);
    }
}

fn find_field(fields: &[FieldDescriptor], tag: u32, start: usize) -> Option<usize> {
    let len = fields.len();
    (0..len)
        .map(|step| (start + step) % len)
        .find(|&position| fields[position].tag() == tag)
}

fn required_index(fields: &[FieldDescriptor], position: usize) -> usize {
    fields[..position]
        .iter()
        .filter(|field| field.modifier() == Modifier::Required)
        .count()
}

fn check_required(
    fields: &[FieldDescriptor],
    required: &RequiredFieldSet,
) -> Result<(), CodecError> {
    let missing = fields
        .iter()
        .filter(|field| field.modifier() == Modifier::Required)
        .enumerate()
        .find(|(index, _)| required.is_tracked(*index) && !required.contains(*index));
    match missing {
        Some((_, field)) => {
            warn!(tag = field.tag(), "required field missing");
            Err(CodecError::MissingRequiredField { tag: field.tag() })
        }
        None => Ok(()),
    }
}

fn expect_wire_type(field: &FieldDescriptor, wire_type: WireType) -> Result<(), CodecError> {
    if field.kind().wire_type() == wire_type {
        Ok(())
    } else {
        Err(CodecError::WireTypeMismatch { tag: field.tag() })
    }
}

fn decode_scalar(
    field: &FieldDescriptor,
    stream: &mut InputStream<'_>,
    slot: &mut [u8],
) -> Result<(), CodecError> {
    match field.kind() {
        ContentKind::Varint => {
            if !matches!(slot.len(), 1 | 2 | 4 | 8) {
                return Err(field.invalid("varint width must be 1, 2, 4 or 8"));
            }
            store_uint(slot, stream.read_varint()?);
        }
        ContentKind::SVarint => {
            if !matches!(slot.len(), 4 | 8) {
                return Err(field.invalid("signed varint width must be 4 or 8"));
            }
            store_uint(slot, stream.read_svarint()? as u64);
        }
        ContentKind::Fixed32 | ContentKind::Fixed64 => {
            if Some(slot.len()) != field.kind().wire_type().fixed_len() {
                return Err(field.invalid("fixed width mismatch"));
            }
            stream.read(slot)?;
        }
        ContentKind::Bytes => {
            let len = stream.read_length()?;
            let (header, body) = slot
                .split_at_mut_checked(BYTES_LEN_SIZE)
                .ok_or_else(|| field.invalid("bytes container smaller than header"))?;
            let dst = body
                .get_mut(..len)
                .ok_or(CodecError::FieldOverflow { tag: field.tag() })?;
            stream.read(dst)?;
            store_uint(header, len as u64);
        }
        ContentKind::String => {
            let len = stream.read_length()?;
            if len >= slot.len() {
                return Err(CodecError::FieldOverflow { tag: field.tag() });
            }
            stream.read(&mut slot[..len])?;
            slot[len] = 0;
        }
        ContentKind::Submessage => return Err(field.invalid("submessage decoded as scalar")),
    }
    Ok(())
}
