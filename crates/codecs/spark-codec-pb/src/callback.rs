//! # callback 模块：回调字段绑定
//!
//! ## 设计意图（Why）
//! - 长度不定的字段（大字符串、流式数组、递归结构）无法放进定长记录，交给调用方代码逐次处理；
//! - 记录只存一个小整数句柄，真正的回调对象放在每次调用的 [`Callbacks`] 表中，这样记录依旧是纯数据，
//!   而回调可以持有任意上下文（闭包状态、外部缓冲、计数器等）。
//!
//! ## 契约（What）
//! - 句柄 `n` 选中表中第 `n - 1` 项；句柄 0 表示未绑定：解码时跳过该字段，编码时不输出；
//! - 句柄超出表长度是编程错误，返回 [`CodecError::UnboundCallback`]；
//! - 解码回调拿到的流恰好覆盖该字段本次出现的载荷；编码回调直接拿到实际输出流，需自行写出键与载荷，
//!   并且会在计数遍与写出遍各被调用一次，两次必须产出相同字节。

use crate::descriptor::FieldDescriptor;
use crate::error::CodecError;
use crate::stream::{InputStream, OutputStream};

/// 回调字段的处理逻辑。
///
/// 两个方向都有默认实现：解码默认丢弃载荷，编码默认什么也不写，实现方只需覆盖关心的方向。
pub trait FieldCallback {
    /// 消费 `stream` 中该字段的载荷。长度前缀字段会被重复调用直至载荷读完。
    fn decode(
        &mut self,
        stream: &mut InputStream<'_>,
        field: &FieldDescriptor,
    ) -> Result<(), CodecError> {
        let _ = field;
        let left = stream.bytes_left();
        stream.skip(left)
    }

    /// 向 `stream` 写出该字段（含线上键）。
    fn encode(
        &mut self,
        stream: &mut OutputStream<'_>,
        field: &FieldDescriptor,
    ) -> Result<(), CodecError> {
        let _ = (stream, field);
        Ok(())
    }
}

/// 一次编解码调用使用的回调表。
pub struct Callbacks<'s, 'c> {
    slots: &'s mut [&'c mut dyn FieldCallback],
}

impl<'s, 'c> Callbacks<'s, 'c> {
    /// 以调用方持有的回调数组构造。
    pub fn new(slots: &'s mut [&'c mut dyn FieldCallback]) -> Self {
        Self { slots }
    }

    /// 空表：所有非零句柄都会报错。
    #[must_use]
    pub fn none() -> Self {
        Self {
            slots: Default::default(),
        }
    }

    /// 表中第 `index` 项对应的句柄值。
    #[must_use]
    pub const fn handle_for(index: usize) -> u32 {
        index as u32 + 1
    }

    /// 回调数量。
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// 表是否为空。
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// 解析句柄：0 返回 `Ok(None)`，越界返回 [`CodecError::UnboundCallback`]。
    pub fn resolve(
        &mut self,
        field: &FieldDescriptor,
        handle: u32,
    ) -> Result<Option<&mut dyn FieldCallback>, CodecError> {
        let Some(index) = (handle as usize).checked_sub(1) else {
            return Ok(None);
        };
        match self.slots.get_mut(index) {
            Some(callback) => {
                let callback: &mut dyn FieldCallback = &mut **callback;
                Ok(Some(callback))
            }
            None => Err(CodecError::UnboundCallback {
                tag: field.tag(),
                handle,
            }),
        }
    }
}

impl Default for Callbacks<'_, '_> {
    fn default() -> Self {
        Self::none()
    }
}

impl core::fmt::Debug for Callbacks<'_, '_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Callbacks")
            .field("len", &self.slots.len())
            .finish()
    }
}
