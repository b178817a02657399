//! 集成测试共用的描述符表与记录布局。
//!
//! 布局均按默认 8 位描述符档位书写，偏移与字段编号都不超过 255。

#![allow(dead_code)]

use spark_codec_pb::{ContentKind, DefaultValue, FieldCallback, FieldDescriptor, InputStream};
use spark_codec_pb::{CodecError, OutputStream, WireType};

/// `{ required varint 1, optional fixed32 2, repeated varint 3 [max 4] }`。
///
/// | 范围 | 内容 |
/// |------|------|
/// | 0..4 | 字段 1 |
/// | 4 | 字段 2 存在标记 |
/// | 5..9 | 字段 2 |
/// | 9..13 | 字段 3 计数 |
/// | 13..29 | 字段 3 元素 |
pub static SCENARIO: [FieldDescriptor; 4] = [
    FieldDescriptor::required(1, ContentKind::Varint, 0, 4),
    FieldDescriptor::optional(2, ContentKind::Fixed32, 5, -1, 4),
    FieldDescriptor::repeated(3, ContentKind::Varint, 13, -4, 4, 4),
    FieldDescriptor::END,
];

pub const SCENARIO_LEN: usize = 29;

/// 电话号码：`{ required string number [11], optional varint kind [1] = 1 }`。
pub static PHONE: [FieldDescriptor; 2] = [
    FieldDescriptor::required(1, ContentKind::String, 0, 12),
    FieldDescriptor::optional(2, ContentKind::Varint, 13, -1, 1).with_default(DefaultValue::Scalar(1)),
];

pub const PHONE_LEN: usize = 14;

/// 通讯录条目。
///
/// | 范围 | 内容 |
/// |------|------|
/// | 0..4 | `id` |
/// | 4..20 | `name`（文本，容量 15） |
/// | 20 | `email` 存在标记 |
/// | 21..37 | `email` |
/// | 37..41 | `phones` 计数 |
/// | 41..69 | `phones`（2 × 14） |
/// | 69..73 | `scores` 计数 |
/// | 73..89 | `scores`（4 × sint32） |
/// | 89 | `avatar` 存在标记 |
/// | 90..102 | `avatar`（长度头 + 8 字节） |
/// | 102 | `notes` 回调句柄 |
pub static PERSON: [FieldDescriptor; 8] = [
    FieldDescriptor::required(1, ContentKind::Varint, 0, 4),
    FieldDescriptor::required(2, ContentKind::String, 4, 16),
    FieldDescriptor::optional(3, ContentKind::String, 21, -1, 16),
    FieldDescriptor::repeated(4, ContentKind::Submessage, 41, -4, 14, 2)
        .with_submessage(&PHONE),
    FieldDescriptor::repeated(5, ContentKind::SVarint, 73, -4, 4, 4),
    FieldDescriptor::optional(6, ContentKind::Bytes, 90, -1, 12),
    FieldDescriptor::callback(7, 102, 1),
    FieldDescriptor::END,
];

pub const PERSON_LEN: usize = 103;

pub fn person_field(tag: u32) -> &'static FieldDescriptor {
    PERSON
        .iter()
        .find(|field| field.tag() == tag)
        .expect("测试表中必须存在该字段")
}

/// 三层档案的叶子：`{ required varint id [4], optional string caption [7] }`。
pub static LABEL: [FieldDescriptor; 2] = [
    FieldDescriptor::required(1, ContentKind::Varint, 0, 4),
    FieldDescriptor::optional(2, ContentKind::String, 5, -1, 8),
];

pub const LABEL_LEN: usize = 13;

/// 中间层：`{ required fixed32 code, repeated Label labels [max 2] }`。
///
/// | 范围 | 内容 |
/// |------|------|
/// | 0..4 | `code` |
/// | 4..8 | `labels` 计数 |
/// | 8..34 | `labels`（2 × 13） |
pub static SHELF: [FieldDescriptor; 2] = [
    FieldDescriptor::required(1, ContentKind::Fixed32, 0, 4),
    FieldDescriptor::repeated(2, ContentKind::Submessage, 8, -4, 13, 2).with_submessage(&LABEL),
];

pub const SHELF_LEN: usize = 34;

/// 顶层：`{ required varint version, repeated Shelf shelves [max 2], optional Label primary }`。
///
/// | 范围 | 内容 |
/// |------|------|
/// | 0..4 | `version` |
/// | 4..8 | `shelves` 计数 |
/// | 8..76 | `shelves`（2 × 34） |
/// | 76 | `primary` 存在标记 |
/// | 77..90 | `primary` |
pub static ARCHIVE: [FieldDescriptor; 3] = [
    FieldDescriptor::required(1, ContentKind::Varint, 0, 4),
    FieldDescriptor::repeated(2, ContentKind::Submessage, 8, -4, 34, 2).with_submessage(&SHELF),
    FieldDescriptor::optional(3, ContentKind::Submessage, 77, -1, 13).with_submessage(&LABEL),
];

pub const ARCHIVE_LEN: usize = 90;

/// 自引用链表节点：`{ required varint value [4], optional Node next }`。
///
/// `next` 与整条记录重叠，每深入一层即复用同一片字节，从而用定长记录表达任意深度的输入。
pub static NODE: [FieldDescriptor; 2] = [
    FieldDescriptor::required(1, ContentKind::Varint, 0, 4),
    FieldDescriptor::optional(2, ContentKind::Submessage, 0, 5, 6).with_submessage(&NODE),
];

pub const NODE_LEN: usize = 6;

/// 按线格式拼出 `depth` 层嵌套的节点消息。
pub fn nested_nodes(depth: usize) -> Vec<u8> {
    let mut message = vec![0x08, 0x01];
    for _ in 0..depth {
        let mut outer = vec![0x08, 0x01, 0x12];
        outer.extend_from_slice(spark_codec_pb::wire::encode_varint(message.len() as u64).as_slice());
        outer.extend_from_slice(&message);
        message = outer;
    }
    message
}

/// 把每次出现的载荷收集起来的解码回调，并可把预设片段作为字段写出。
#[derive(Debug, Default)]
pub struct Collector {
    pub received: Vec<Vec<u8>>,
    pub invocations: usize,
    pub outgoing: Vec<Vec<u8>>,
}

impl FieldCallback for Collector {
    fn decode(
        &mut self,
        stream: &mut InputStream<'_>,
        _field: &FieldDescriptor,
    ) -> Result<(), CodecError> {
        self.invocations += 1;
        let mut payload = vec![0u8; stream.bytes_left()];
        stream.read(&mut payload)?;
        self.received.push(payload);
        Ok(())
    }

    fn encode(
        &mut self,
        stream: &mut OutputStream<'_>,
        field: &FieldDescriptor,
    ) -> Result<(), CodecError> {
        for chunk in &self.outgoing {
            stream.write_key(field.tag(), WireType::LengthDelimited)?;
            stream.write_length_delimited(chunk)?;
        }
        Ok(())
    }
}
