//! # record 模块：记录字节区访问
//!
//! ## 设计意图（Why）
//! - 记录是调用方持有的一段定长字节区，字段按描述符给出的偏移散布其中；引擎只通过本模块读写它，
//!   所有越界都转化为 [`CodecError::InvalidDescriptor`]，不会出现未定义行为；
//! - 同一套访问器也公开给调用方，用来填充待编码的记录或读取解码结果，避免手算偏移。
//!
//! ## 存储约定（What）
//! - 标量：小端序，宽度即 `element_size`；有符号读取按宽度做符号扩展；
//! - 存在标记：1 字节，非零为存在；重复字段计数：4 字节小端；
//! - 字节数组容器：4 字节小端长度头 + 容量字节；文本：NUL 结尾；
//! - 回调句柄：`element_size` 宽度的小端整数，0 表示未绑定。

use crate::descriptor::{ContentKind, FieldDescriptor, Modifier};
use crate::error::CodecError;

/// 可选字段存在标记的字节数。
pub const PRESENCE_SIZE: usize = 1;
/// 重复字段元素计数的字节数。
pub const COUNT_SIZE: usize = 4;
/// 字节数组容器长度头的字节数。
pub const BYTES_LEN_SIZE: usize = 4;

/// 以小端序读取 1..=8 字节的无符号整数。
pub(crate) fn load_uint(slot: &[u8]) -> u64 {
    let mut raw = [0u8; 8];
    let len = slot.len().min(8);
    raw[..len].copy_from_slice(&slot[..len]);
    u64::from_le_bytes(raw)
}

/// 以小端序写入，超出宽度的高位被截断。
pub(crate) fn store_uint(slot: &mut [u8], value: u64) {
    let len = slot.len().min(8);
    slot[..len].copy_from_slice(&value.to_le_bytes()[..len]);
}

/// 按宽度做符号扩展。
pub(crate) fn sign_extend(value: u64, width: usize) -> i64 {
    match width {
        1..=7 => {
            let shift = 64 - 8 * width as u32;
            ((value << shift) as i64) >> shift
        }
        _ => value as i64,
    }
}

fn range(
    field: &FieldDescriptor,
    start: Option<usize>,
    len: usize,
    record_len: usize,
) -> Result<core::ops::Range<usize>, CodecError> {
    start
        .and_then(|start| Some(start..start.checked_add(len)?))
        .filter(|range| range.end <= record_len)
        .ok_or_else(|| field.invalid("storage outside record"))
}

fn element_range(
    field: &FieldDescriptor,
    index: usize,
    record_len: usize,
) -> Result<core::ops::Range<usize>, CodecError> {
    let capacity = match field.modifier() {
        Modifier::Repeated => field.max_count(),
        Modifier::Required | Modifier::Optional | Modifier::Callback => 1,
    };
    if index >= capacity {
        return Err(field.invalid("element index beyond capacity"));
    }
    let start = index
        .checked_mul(field.element_size())
        .and_then(|offset| offset.checked_add(field.data_offset()));
    range(field, start, field.element_size(), record_len)
}

fn marker_range(
    field: &FieldDescriptor,
    record_len: usize,
) -> Result<core::ops::Range<usize>, CodecError> {
    let len = match field.modifier() {
        Modifier::Optional => PRESENCE_SIZE,
        Modifier::Repeated => COUNT_SIZE,
        Modifier::Required | Modifier::Callback => {
            return Err(field.invalid("field has no presence marker"));
        }
    };
    range(field, field.presence_location(), len, record_len)
}

fn bytes_payload<'r>(field: &FieldDescriptor, slot: &'r [u8]) -> Result<&'r [u8], CodecError> {
    let (header, body) = slot
        .split_at_checked(BYTES_LEN_SIZE)
        .ok_or_else(|| field.invalid("bytes container smaller than header"))?;
    let len = usize::try_from(load_uint(header)).unwrap_or(usize::MAX);
    body.get(..len)
        .ok_or(CodecError::FieldOverflow { tag: field.tag() })
}

/// 容器内找不到 NUL 说明文本占满了终止符的位置，按溢出处理。
fn text_payload<'r>(field: &FieldDescriptor, slot: &'r [u8]) -> Result<&'r [u8], CodecError> {
    let end = slot
        .iter()
        .position(|byte| *byte == 0)
        .ok_or(CodecError::FieldOverflow { tag: field.tag() })?;
    Ok(&slot[..end])
}

/// 只读记录视图。
#[derive(Clone, Copy, Debug)]
pub struct RecordRef<'r> {
    bytes: &'r [u8],
}

impl<'r> RecordRef<'r> {
    /// 包装记录字节区。
    #[must_use]
    pub const fn new(bytes: &'r [u8]) -> Self {
        Self { bytes }
    }

    /// 底层字节。
    #[must_use]
    pub const fn as_bytes(&self) -> &'r [u8] {
        self.bytes
    }

    /// 第 `index` 个元素的原始存储。
    pub fn slot(&self, field: &FieldDescriptor, index: usize) -> Result<&'r [u8], CodecError> {
        let range = element_range(field, index, self.bytes.len())?;
        Ok(&self.bytes[range])
    }

    /// 可选字段是否存在。
    pub fn has(&self, field: &FieldDescriptor) -> Result<bool, CodecError> {
        let range = marker_range(field, self.bytes.len())?;
        Ok(self.bytes[range].iter().any(|byte| *byte != 0))
    }

    /// 重复字段的元素个数。
    pub fn count(&self, field: &FieldDescriptor) -> Result<usize, CodecError> {
        let range = marker_range(field, self.bytes.len())?;
        Ok(usize::try_from(load_uint(&self.bytes[range])).unwrap_or(usize::MAX))
    }

    /// 无符号标量（零扩展）。
    pub fn uint(&self, field: &FieldDescriptor) -> Result<u64, CodecError> {
        self.element_uint(field, 0)
    }

    /// 第 `index` 个元素的无符号值。
    pub fn element_uint(&self, field: &FieldDescriptor, index: usize) -> Result<u64, CodecError> {
        self.slot(field, index).map(load_uint)
    }

    /// 有符号标量（按宽度符号扩展）。
    pub fn int(&self, field: &FieldDescriptor) -> Result<i64, CodecError> {
        self.element_int(field, 0)
    }

    /// 第 `index` 个元素的有符号值。
    pub fn element_int(&self, field: &FieldDescriptor, index: usize) -> Result<i64, CodecError> {
        let slot = self.slot(field, index)?;
        Ok(sign_extend(load_uint(slot), slot.len()))
    }

    /// `float` 标量。
    pub fn float(&self, field: &FieldDescriptor) -> Result<f32, CodecError> {
        Ok(f32::from_bits(self.uint(field)? as u32))
    }

    /// `double` 标量。
    pub fn double(&self, field: &FieldDescriptor) -> Result<f64, CodecError> {
        self.uint(field).map(f64::from_bits)
    }

    /// 字节数组载荷（不含长度头）。
    pub fn bytes(&self, field: &FieldDescriptor) -> Result<&'r [u8], CodecError> {
        self.element_bytes(field, 0)
    }

    /// 第 `index` 个字节数组元素的载荷。
    pub fn element_bytes(
        &self,
        field: &FieldDescriptor,
        index: usize,
    ) -> Result<&'r [u8], CodecError> {
        let slot = self.slot(field, index)?;
        bytes_payload(field, slot)
    }

    /// 文本载荷（不含 NUL）；容器内没有 NUL 时返回 [`CodecError::FieldOverflow`]。
    pub fn text(&self, field: &FieldDescriptor) -> Result<&'r [u8], CodecError> {
        self.element_text(field, 0)
    }

    /// 第 `index` 个文本元素。
    pub fn element_text(&self, field: &FieldDescriptor, index: usize) -> Result<&'r [u8], CodecError> {
        let slot = self.slot(field, index)?;
        text_payload(field, slot)
    }

    /// 回调句柄。
    pub fn handle(&self, field: &FieldDescriptor) -> Result<u32, CodecError> {
        let raw = self.uint(field)?;
        u32::try_from(raw).map_err(|_| CodecError::UnboundCallback {
            tag: field.tag(),
            handle: u32::MAX,
        })
    }

    /// 子消息视图。
    pub fn submessage(&self, field: &FieldDescriptor) -> Result<RecordRef<'r>, CodecError> {
        self.element_submessage(field, 0)
    }

    /// 第 `index` 个子消息元素的视图。
    pub fn element_submessage(
        &self,
        field: &FieldDescriptor,
        index: usize,
    ) -> Result<RecordRef<'r>, CodecError> {
        self.slot(field, index).map(RecordRef::new)
    }
}

/// 可写记录视图。
///
/// 设置标量不会自动修改存在标记或计数；需要时配合 [`set_has`](Self::set_has) /
/// [`push_uint`](Self::push_uint) 等方法使用。
#[derive(Debug)]
pub struct RecordMut<'r> {
    bytes: &'r mut [u8],
}

impl<'r> RecordMut<'r> {
    /// 包装记录字节区。
    pub const fn new(bytes: &'r mut [u8]) -> Self {
        Self { bytes }
    }

    /// 只读视图。
    #[must_use]
    pub fn view(&self) -> RecordRef<'_> {
        RecordRef::new(self.bytes)
    }

    /// 第 `index` 个元素的可写存储。
    pub fn slot_mut(
        &mut self,
        field: &FieldDescriptor,
        index: usize,
    ) -> Result<&mut [u8], CodecError> {
        let range = element_range(field, index, self.bytes.len())?;
        Ok(&mut self.bytes[range])
    }

    /// 设置可选字段存在标记。
    pub fn set_has(&mut self, field: &FieldDescriptor, present: bool) -> Result<(), CodecError> {
        let range = marker_range(field, self.bytes.len())?;
        store_uint(&mut self.bytes[range], u64::from(present));
        Ok(())
    }

    /// 设置重复字段元素个数。
    pub fn set_count(&mut self, field: &FieldDescriptor, count: usize) -> Result<(), CodecError> {
        let range = marker_range(field, self.bytes.len())?;
        store_uint(&mut self.bytes[range], count as u64);
        Ok(())
    }

    /// 设置无符号标量（按宽度截断）。
    pub fn set_uint(&mut self, field: &FieldDescriptor, value: u64) -> Result<(), CodecError> {
        self.set_element_uint(field, 0, value)
    }

    /// 设置第 `index` 个元素的无符号值。
    pub fn set_element_uint(
        &mut self,
        field: &FieldDescriptor,
        index: usize,
        value: u64,
    ) -> Result<(), CodecError> {
        store_uint(self.slot_mut(field, index)?, value);
        Ok(())
    }

    /// 设置有符号标量。
    pub fn set_int(&mut self, field: &FieldDescriptor, value: i64) -> Result<(), CodecError> {
        self.set_uint(field, value as u64)
    }

    /// 设置 `float` 标量。
    pub fn set_float(&mut self, field: &FieldDescriptor, value: f32) -> Result<(), CodecError> {
        self.set_uint(field, u64::from(value.to_bits()))
    }

    /// 设置 `double` 标量。
    pub fn set_double(&mut self, field: &FieldDescriptor, value: f64) -> Result<(), CodecError> {
        self.set_uint(field, value.to_bits())
    }

    /// 设置字节数组载荷；超过容量返回 [`CodecError::FieldOverflow`]。
    pub fn set_bytes(&mut self, field: &FieldDescriptor, payload: &[u8]) -> Result<(), CodecError> {
        self.set_element_bytes(field, 0, payload)
    }

    /// 设置第 `index` 个字节数组元素。
    pub fn set_element_bytes(
        &mut self,
        field: &FieldDescriptor,
        index: usize,
        payload: &[u8],
    ) -> Result<(), CodecError> {
        let slot = self.slot_mut(field, index)?;
        write_bytes_container(field, slot, payload)
    }

    /// 设置文本；文本加 NUL 超过容量返回 [`CodecError::FieldOverflow`]。
    pub fn set_text(&mut self, field: &FieldDescriptor, text: &[u8]) -> Result<(), CodecError> {
        self.set_element_text(field, 0, text)
    }

    /// 设置第 `index` 个文本元素。
    pub fn set_element_text(
        &mut self,
        field: &FieldDescriptor,
        index: usize,
        text: &[u8],
    ) -> Result<(), CodecError> {
        let slot = self.slot_mut(field, index)?;
        write_text_container(field, slot, text)
    }

    /// 设置回调句柄。
    pub fn set_handle(&mut self, field: &FieldDescriptor, handle: u32) -> Result<(), CodecError> {
        self.set_uint(field, u64::from(handle))
    }

    /// 向重复字段追加一个数值元素。
    pub fn push_uint(&mut self, field: &FieldDescriptor, value: u64) -> Result<(), CodecError> {
        let index = self.next_index(field)?;
        self.set_element_uint(field, index, value)?;
        self.set_count(field, index + 1)
    }

    /// 向重复字段追加一个字节数组或文本元素（按字段种类选择容器格式）。
    pub fn push_bytes(&mut self, field: &FieldDescriptor, payload: &[u8]) -> Result<(), CodecError> {
        let index = self.next_index(field)?;
        match field.kind() {
            ContentKind::String => self.set_element_text(field, index, payload)?,
            _ => self.set_element_bytes(field, index, payload)?,
        }
        self.set_count(field, index + 1)
    }

    fn next_index(&self, field: &FieldDescriptor) -> Result<usize, CodecError> {
        let index = self.view().count(field)?;
        if index >= field.max_count() {
            return Err(CodecError::ArrayFull { tag: field.tag() });
        }
        Ok(index)
    }

    /// 子消息的可写视图。
    pub fn submessage_mut(&mut self, field: &FieldDescriptor) -> Result<RecordMut<'_>, CodecError> {
        self.element_submessage_mut(field, 0)
    }

    /// 第 `index` 个子消息元素的可写视图。
    pub fn element_submessage_mut(
        &mut self,
        field: &FieldDescriptor,
        index: usize,
    ) -> Result<RecordMut<'_>, CodecError> {
        self.slot_mut(field, index).map(RecordMut::new)
    }
}

pub(crate) fn write_bytes_container(
    field: &FieldDescriptor,
    slot: &mut [u8],
    payload: &[u8],
) -> Result<(), CodecError> {
    let (header, body) = slot
        .split_at_mut_checked(BYTES_LEN_SIZE)
        .ok_or_else(|| field.invalid("bytes container smaller than header"))?;
    let dst = body
        .get_mut(..payload.len())
        .ok_or(CodecError::FieldOverflow { tag: field.tag() })?;
    dst.copy_from_slice(payload);
    store_uint(header, payload.len() as u64);
    Ok(())
}

pub(crate) fn write_text_container(
    field: &FieldDescriptor,
    slot: &mut [u8],
    text: &[u8],
) -> Result<(), CodecError> {
    if text.len() >= slot.len() {
        return Err(CodecError::FieldOverflow { tag: field.tag() });
    }
    slot[..text.len()].copy_from_slice(text);
    slot[text.len()] = 0;
    Ok(())
}

pub(crate) fn read_bytes_container<'r>(
    field: &FieldDescriptor,
    slot: &'r [u8],
) -> Result<&'r [u8], CodecError> {
    bytes_payload(field, slot)
}

pub(crate) fn read_text_container<'r>(
    field: &FieldDescriptor,
    slot: &'r [u8],
) -> Result<&'r [u8], CodecError> {
    text_payload(field, slot)
}
