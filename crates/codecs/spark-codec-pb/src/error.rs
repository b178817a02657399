//! # error 模块说明
//!
//! ## 角色定位（Why）
//! - 编解码引擎的所有失败路径共用一个错误枚举 [`CodecError`]，`decode`/`encode` 的调用方无需区分两套类型；
//! - 流对象会记录「首个故障」，因此错误值必须可廉价复制（`Copy`），不能携带堆分配的上下文。
//!
//! ## 契约（What）
//! - 启用 `std` 时派生 [`thiserror::Error`]；`no_std` 下提供等价的 [`fmt::Display`] 实现；
//! - 每个变体都映射到 [`codes`] 中的稳定错误码，遵循 `<领域>.<语义>` 命名，便于日志检索与告警聚合；
//! - 携带 `tag` 的变体指明出错字段的线上编号，方便与 `.proto` 定义对照排障。
//!
//! ## 风险提示（Trade-offs）
//! - `InvalidDescriptor::reason` 使用 `&'static str`：描述符错误属于编程错误，固定文案足以定位；
//! - 源/汇端的底层 I/O 错误只以 `SourceFailed`/`SinkFailed` 呈现，详细原因由适配器通过 `tracing` 输出。

#[cfg(not(feature = "std"))]
use core::fmt;

#[cfg(feature = "std")]
use thiserror::Error;

/// 编解码统一错误域。
///
/// # 教案式说明
/// - **意图 (Why)**：面向受限目标的编解码引擎只向调用方报告「是否成功 + 一条诊断」，这里用强类型枚举替代
///   字符串诊断，既保留首错语义又允许调用方按变体分支处理。
/// - **契约 (What)**：所有变体均为 `Copy`，可在流对象中缓存；[`CodecError::code`] 返回稳定码值。
/// - **设计权衡 (Trade-offs)**：`#[non_exhaustive]` 预留扩展空间，调用方匹配时需保留兜底分支。
#[cfg_attr(feature = "std", derive(Error))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum CodecError {
    /// 读取请求超过输入流剩余预算，或拉取源已耗尽。
    #[cfg_attr(feature = "std", error("input stream ended before the value was complete"))]
    EndOfStream,
    /// 有界输出流没有足够空间容纳本次写入。
    #[cfg_attr(feature = "std", error("output stream is full"))]
    BufferFull,
    /// 连续 10 个字节都带有续位标记，varint 无法终止。
    #[cfg_attr(feature = "std", error("varint does not terminate within 10 bytes"))]
    MalformedVarint,
    /// 重复字段的元素数超过 `max_count`。
    #[cfg_attr(feature = "std", error("repeated field {tag} exceeds its capacity"))]
    ArrayFull {
        /// 出错字段的线上编号。
        tag: u32,
    },
    /// 消息结束时仍有必填字段未出现。
    #[cfg_attr(feature = "std", error("required field {tag} is missing"))]
    MissingRequiredField {
        /// 缺失字段的线上编号。
        tag: u32,
    },
    /// 子消息解码结束后其长度前缀声明的字节未被完全消费。
    #[cfg_attr(feature = "std", error("submessage field {tag} left unconsumed bytes"))]
    TruncatedSubmessage {
        /// 子消息字段的线上编号。
        tag: u32,
    },
    /// 线上出现了不支持的 wire type（3、4、6、7）。
    #[cfg_attr(feature = "std", error("unsupported wire type {wire_type}"))]
    InvalidWireType {
        /// 原始 wire type 数值。
        wire_type: u8,
    },
    /// 已知字段的 wire type 与其内容种类不符。
    #[cfg_attr(feature = "std", error("wire type does not match the kind of field {tag}"))]
    WireTypeMismatch {
        /// 出错字段的线上编号。
        tag: u32,
    },
    /// 字段编号为 0 或超出 32 位范围。
    #[cfg_attr(feature = "std", error("invalid field tag"))]
    InvalidTag,
    /// 字节串或文本长度超过记录中的容器容量。
    #[cfg_attr(feature = "std", error("payload of field {tag} overflows its container"))]
    FieldOverflow {
        /// 出错字段的线上编号。
        tag: u32,
    },
    /// 子消息嵌套层级超过配置上限。
    #[cfg_attr(feature = "std", error("nesting depth exceeds the limit of {depth}"))]
    RecursionLimit {
        /// 生效的层级上限。
        depth: u16,
    },
    /// 子消息的计数遍与实际写出遍产出的字节数不同。
    #[cfg_attr(feature = "std", error("submessage field {tag} changed size between passes"))]
    SubmessageSizeChanged {
        /// 子消息字段的线上编号。
        tag: u32,
    },
    /// 回调在非空负载上没有任何进展；回调实现也可返回此变体报告自身失败。
    #[cfg_attr(feature = "std", error("callback for field {tag} failed"))]
    CallbackFailed {
        /// 回调字段的线上编号。
        tag: u32,
    },
    /// 记录中存放的回调句柄在本次调用的回调表中不存在。
    #[cfg_attr(feature = "std", error("callback handle {handle} of field {tag} is not bound"))]
    UnboundCallback {
        /// 回调字段的线上编号。
        tag: u32,
        /// 记录中存放的句柄值。
        handle: u32,
    },
    /// 描述符与记录布局或内容种类不一致。
    #[cfg_attr(feature = "std", error("invalid descriptor for field {tag}: {reason}"))]
    InvalidDescriptor {
        /// 出错描述符的字段编号（表级错误为 0）。
        tag: u32,
        /// 固定诊断文案。
        reason: &'static str,
    },
    /// 用户提供的字节源报告失败。
    #[cfg_attr(feature = "std", error("byte source failed"))]
    SourceFailed,
    /// 用户提供的字节汇报告失败。
    #[cfg_attr(feature = "std", error("byte sink failed"))]
    SinkFailed,
}

impl CodecError {
    /// 返回稳定错误码，取值见 [`codes`]。
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::EndOfStream => codes::END_OF_STREAM,
            Self::BufferFull => codes::BUFFER_FULL,
            Self::MalformedVarint => codes::MALFORMED_VARINT,
            Self::ArrayFull { .. } => codes::ARRAY_FULL,
            Self::MissingRequiredField { .. } => codes::MISSING_REQUIRED,
            Self::TruncatedSubmessage { .. } => codes::TRUNCATED_SUBMESSAGE,
            Self::InvalidWireType { .. } | Self::WireTypeMismatch { .. } => codes::WIRE_TYPE,
            Self::InvalidTag => codes::INVALID_TAG,
            Self::FieldOverflow { .. } => codes::FIELD_OVERFLOW,
            Self::RecursionLimit { .. } => codes::RECURSION_LIMIT,
            Self::SubmessageSizeChanged { .. } => codes::SIZE_CHANGED,
            Self::CallbackFailed { .. } | Self::UnboundCallback { .. } => codes::CALLBACK,
            Self::InvalidDescriptor { .. } => codes::INVALID_DESCRIPTOR,
            Self::SourceFailed | Self::SinkFailed => codes::IO,
        }
    }

    /// 判断错误是否由线上数据本身造成（而非描述符、回调或 I/O）。
    ///
    /// 网关类调用方可据此区分「丢弃对端报文」与「本端配置缺陷」两类处置。
    #[must_use]
    pub const fn is_malformed_input(&self) -> bool {
        matches!(
            self,
            Self::EndOfStream
                | Self::MalformedVarint
                | Self::ArrayFull { .. }
                | Self::MissingRequiredField { .. }
                | Self::TruncatedSubmessage { .. }
                | Self::InvalidWireType { .. }
                | Self::WireTypeMismatch { .. }
                | Self::InvalidTag
                | Self::FieldOverflow { .. }
                | Self::RecursionLimit { .. }
        )
    }
}

#[cfg(not(feature = "std"))]
impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EndOfStream => f.write_str("input stream ended before the value was complete"),
            Self::BufferFull => f.write_str("output stream is full"),
            Self::MalformedVarint => f.write_str("varint does not terminate within 10 bytes"),
            Self::ArrayFull { tag } => write!(f, "repeated field {tag} exceeds its capacity"),
            Self::MissingRequiredField { tag } => write!(f, "required field {tag} is missing"),
            Self::TruncatedSubmessage { tag } => {
                write!(f, "submessage field {tag} left unconsumed bytes")
            }
            Self::InvalidWireType { wire_type } => write!(f, "unsupported wire type {wire_type}"),
            Self::WireTypeMismatch { tag } => {
                write!(f, "wire type does not match the kind of field {tag}")
            }
            Self::InvalidTag => f.write_str("invalid field tag"),
            Self::FieldOverflow { tag } => write!(f, "payload of field {tag} overflows its container"),
            Self::RecursionLimit { depth } => write!(f, "nesting depth exceeds the limit of {depth}"),
            Self::SubmessageSizeChanged { tag } => {
                write!(f, "submessage field {tag} changed size between passes")
            }
            Self::CallbackFailed { tag } => write!(f, "callback for field {tag} failed"),
            Self::UnboundCallback { tag, handle } => {
                write!(f, "callback handle {handle} of field {tag} is not bound")
            }
            Self::InvalidDescriptor { tag, reason } => {
                write!(f, "invalid descriptor for field {tag}: {reason}")
            }
            Self::SourceFailed => f.write_str("byte source failed"),
            Self::SinkFailed => f.write_str("byte sink failed"),
        }
    }
}

/// 解码方向的错误别名。
pub type DecodeError = CodecError;

/// 编码方向的错误别名。
pub type EncodeError = CodecError;

/// 稳定错误码集合。
///
/// 码值遵循 `pb.<语义>`，一经发布不得修改；新增语义请追加常量而非复用既有码值。
pub mod codes {
    /// 输入提前结束。
    pub const END_OF_STREAM: &str = "pb.end_of_stream";
    /// 输出空间不足。
    pub const BUFFER_FULL: &str = "pb.buffer_full";
    /// varint 超长。
    pub const MALFORMED_VARINT: &str = "pb.malformed_varint";
    /// 重复字段超出容量。
    pub const ARRAY_FULL: &str = "pb.array_full";
    /// 必填字段缺失。
    pub const MISSING_REQUIRED: &str = "pb.missing_required";
    /// 子消息未被完整消费。
    pub const TRUNCATED_SUBMESSAGE: &str = "pb.truncated_submessage";
    /// wire type 非法或与字段不符。
    pub const WIRE_TYPE: &str = "pb.wire_type";
    /// 字段编号非法。
    pub const INVALID_TAG: &str = "pb.invalid_tag";
    /// 字节串/文本溢出容器。
    pub const FIELD_OVERFLOW: &str = "pb.field_overflow";
    /// 嵌套层级超限。
    pub const RECURSION_LIMIT: &str = "pb.recursion_limit";
    /// 子消息两遍编码长度不一致。
    pub const SIZE_CHANGED: &str = "pb.size_changed";
    /// 回调失败或未绑定。
    pub const CALLBACK: &str = "pb.callback";
    /// 描述符与记录布局冲突。
    pub const INVALID_DESCRIPTOR: &str = "pb.invalid_descriptor";
    /// 字节源/字节汇失败。
    pub const IO: &str = "pb.io";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_follow_domain_prefix() {
        let samples = [
            CodecError::EndOfStream,
            CodecError::ArrayFull { tag: 3 },
            CodecError::InvalidDescriptor {
                tag: 1,
                reason: "x",
            },
            CodecError::SinkFailed,
        ];
        for err in samples {
            assert!(err.code().starts_with("pb."), "错误码 {} 缺少领域前缀", err.code());
        }
    }

    #[test]
    fn malformed_input_excludes_local_faults() {
        assert!(CodecError::MalformedVarint.is_malformed_input());
        assert!(CodecError::MissingRequiredField { tag: 1 }.is_malformed_input());
        assert!(!CodecError::BufferFull.is_malformed_input());
        assert!(!CodecError::UnboundCallback { tag: 1, handle: 2 }.is_malformed_input());
    }

    #[cfg(feature = "std")]
    #[test]
    fn display_names_the_field() {
        let text = std::format!("{}", CodecError::MissingRequiredField { tag: 7 });
        assert_eq!(text, "required field 7 is missing");
    }
}
