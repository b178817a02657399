#![cfg_attr(not(feature = "std"), no_std)]
#![warn(missing_docs)]
#![deny(unsafe_code)]

//! # spark-codec-pb
//!
//! ## 教案目的（Why）
//! - **定位**：面向内存受限目标的 Protocol Buffers 编解码器，消息的形状由静态描述符表给出，
//!   而不是为每个消息生成专门的序列化代码；
//! - **架构角色**：代码生成器（不在本 crate 内）为每个消息产出一张 [`FieldDescriptor`] 表与一段定长记录布局，
//!   运行时只有一个通用的解码遍历器与一个通用的编码遍历器；
//! - **设计策略**：引擎不分配内存、不做动态派发之外的间接调用，输入输出通过可替换的字节源与字节汇抽象。
//!
//! ## 交互契约（What）
//! - **记录**：调用方持有的一段字节区，字段按描述符给出的偏移存放；[`RecordRef`]/[`RecordMut`] 提供带边界检查的访问；
//! - **解码**：[`decode`] 把 [`InputStream`] 中的消息写入记录；[`DecodeContext`] 承载配置、回调表与嵌套预算；
//! - **编码**：[`encode`] 按表序把记录写到 [`OutputStream`]；[`encoded_len`] 只计算长度；
//! - **回调字段**：长度不定的字段交给 [`FieldCallback`] 实现方处理，记录只存句柄；
//! - **错误**：所有失败都以 [`CodecError`] 表达，并带稳定的错误码（见 [`codes`]）。
//!
//! ## 实现策略（How）
//! - 线格式原语位于 [`wire`]，流抽象位于 [`stream`]，二者不了解描述符；
//! - [`descriptor`] 定义字段类型字节的两段编码（内容种类 + 修饰符）与描述符数值宽度档位；
//! - 解码与编码共享 [`CodecConfig`]，深度限制在两个方向都生效。
//!
//! ## 风险提示（Trade-offs）
//! - 描述符表与记录布局的一致性由 [`validate_table`] 检查，引擎自身只在访问时做边界检查；
//! - 默认 8 位描述符档位限制字段号与偏移不超过 255，更大的消息需开启 `descriptor-16bit` 或 `descriptor-32bit`。

pub mod callback;
pub mod config;
pub mod decode;
pub mod descriptor;
pub mod encode;
pub mod error;
pub mod record;
pub mod required;
pub mod stream;
pub mod wire;

pub use callback::{Callbacks, FieldCallback};
pub use config::{CodecConfig, ConfigError, DEFAULT_MAX_RECURSION_DEPTH};
pub use decode::{
    DecodeContext, DecodeFrameGuard, decode, decode_delimited, decode_with_defaults,
    set_to_defaults,
};
pub use descriptor::{
    ContentKind, DefaultValue, DescriptorProfile, FieldDelta, FieldDescriptor, FieldExtra,
    FieldType, FieldWord, Modifier, active_fields, largest_value, validate_table,
};
pub use encode::{EncodeContext, EncodeFrameGuard, encode, encode_delimited, encoded_len};
pub use error::{CodecError, DecodeError, EncodeError, codes};
pub use record::{BYTES_LEN_SIZE, COUNT_SIZE, PRESENCE_SIZE, RecordMut, RecordRef};
pub use required::RequiredFieldSet;
pub use stream::{ByteSink, ByteSource, InputStream, OutputStream};
pub use wire::WireType;
