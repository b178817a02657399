//! # descriptor 模块：字段描述符数据模型
//!
//! ## 设计意图（Why）
//! - 编解码引擎本身不认识任何具体消息，所有「这个字段叫几号、怎么编码、存在记录哪里、最多几个」
//!   的知识都压缩在一张只读描述符表中；表通常由代码生成器输出为 `static` 数据，烧录在 Flash 中；
//! - 字段类型以单字节两段半字节表示：低 4 位是内容种类，高 4 位是修饰符，既紧凑又便于生成器直接写常量。
//!
//! ## 交互契约（What）
//! - 表以 tag 为 0 的哨兵结尾，或直到切片末尾；引擎只遍历第一个哨兵之前的前缀，tag 无需有序；
//! - `data_offset` 为字段存储在记录字节区中的绝对偏移；`presence_offset` 为自数据起点到「存在标记」
//!   （optional）或「元素计数」（repeated）的有符号距离；
//! - 数值宽度（[`FieldWord`] / [`FieldDelta`]）由构建特性选择档位，见 [`DescriptorProfile`]。
//!
//! ## 实现策略（How）
//! - 全部构造器为 `const fn`，可在 `static` 表中直接调用并在编译期求值；
//! - [`validate_table`] 在上线前一次性检查表与记录布局是否自洽，引擎运行期仍会逐次做越界检查。
//!
//! ## 风险提示（Trade-offs）
//! - 子消息表之间可以互相引用甚至自引用（递归消息），因此 `Debug`/`PartialEq` 不展开嵌套表，
//!   只比较/打印表地址与长度。

use core::fmt;

use crate::error::CodecError;
use crate::record::{BYTES_LEN_SIZE, COUNT_SIZE, PRESENCE_SIZE};
use crate::required::REQUIRED_SET_CAPACITY;
use crate::wire::WireType;

/// 描述符中无符号数值字段（tag、偏移、元素大小、容量）的宽度。
#[cfg(feature = "descriptor-32bit")]
pub type FieldWord = u32;
/// 描述符中无符号数值字段（tag、偏移、元素大小、容量）的宽度。
#[cfg(all(feature = "descriptor-16bit", not(feature = "descriptor-32bit")))]
pub type FieldWord = u16;
/// 描述符中无符号数值字段（tag、偏移、元素大小、容量）的宽度。
#[cfg(not(any(feature = "descriptor-16bit", feature = "descriptor-32bit")))]
pub type FieldWord = u8;

/// 描述符中 `presence_offset` 的宽度。
#[cfg(feature = "descriptor-32bit")]
pub type FieldDelta = i32;
/// 描述符中 `presence_offset` 的宽度。
#[cfg(all(feature = "descriptor-16bit", not(feature = "descriptor-32bit")))]
pub type FieldDelta = i16;
/// 描述符中 `presence_offset` 的宽度。
#[cfg(not(any(feature = "descriptor-16bit", feature = "descriptor-32bit")))]
pub type FieldDelta = i8;

/// 描述符数值宽度档位。
///
/// # 教案式说明
/// - **意图 (Why)**：小消息用 8 位字段即可描述，每个描述符只占几个字节；大记录或大编号才需要 16/32 位，
///   档位在构建期选择，运行期没有分支成本。
/// - **契约 (What)**：[`DescriptorProfile::ACTIVE`] 反映当前构建；[`DescriptorProfile::fitting`] 给出
///   能容纳某个最大值的最窄档位，供生成器或构建脚本决定开启哪个特性。
/// - **设计权衡 (Trade-offs)**：三个档位的线上行为完全一致，差别只在描述符内存占用与可表达范围。
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DescriptorProfile {
    /// 8 位档（默认）。
    Narrow,
    /// 16 位档（`descriptor-16bit`）。
    Medium,
    /// 32 位档（`descriptor-32bit`）。
    Wide,
}

impl DescriptorProfile {
    /// 当前构建生效的档位。
    #[cfg(feature = "descriptor-32bit")]
    pub const ACTIVE: Self = Self::Wide;
    /// 当前构建生效的档位。
    #[cfg(all(feature = "descriptor-16bit", not(feature = "descriptor-32bit")))]
    pub const ACTIVE: Self = Self::Medium;
    /// 当前构建生效的档位。
    #[cfg(not(any(feature = "descriptor-16bit", feature = "descriptor-32bit")))]
    pub const ACTIVE: Self = Self::Narrow;

    /// 档位可表达的最大无符号值。
    #[must_use]
    pub const fn max_word(self) -> u32 {
        match self {
            Self::Narrow => u8::MAX as u32,
            Self::Medium => u16::MAX as u32,
            Self::Wide => u32::MAX,
        }
    }

    /// 可表达的最大 `presence_offset` 绝对值。
    #[must_use]
    pub const fn max_delta(self) -> u32 {
        match self {
            Self::Narrow => i8::MAX as u32,
            Self::Medium => i16::MAX as u32,
            Self::Wide => i32::MAX as u32,
        }
    }

    /// 能容纳 `largest` 的最窄档位。
    #[must_use]
    pub const fn fitting(largest: u32) -> Self {
        if largest <= Self::Narrow.max_word() {
            Self::Narrow
        } else if largest <= Self::Medium.max_word() {
            Self::Medium
        } else {
            Self::Wide
        }
    }
}

/// 字段内容种类（类型字节的低半字节）。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ContentKind {
    /// 无符号/零扩展 varint，存储宽度 1、2、4 或 8 字节。
    Varint = 0x00,
    /// zig-zag 有符号 varint，存储宽度 4 或 8 字节。
    SVarint = 0x01,
    /// 4 字节小端定长。
    Fixed32 = 0x02,
    /// 8 字节小端定长。
    Fixed64 = 0x03,
    /// 带 4 字节长度头的字节数组容器。
    Bytes = 0x04,
    /// NUL 结尾的文本。
    String = 0x05,
    /// 嵌套消息。
    Submessage = 0x06,
}

impl ContentKind {
    /// 可 packed 的最后一个种类。
    pub const LAST_PACKABLE: Self = Self::Fixed64;

    const fn from_nibble(bits: u8) -> Option<Self> {
        match bits {
            0x00 => Some(Self::Varint),
            0x01 => Some(Self::SVarint),
            0x02 => Some(Self::Fixed32),
            0x03 => Some(Self::Fixed64),
            0x04 => Some(Self::Bytes),
            0x05 => Some(Self::String),
            0x06 => Some(Self::Submessage),
            _ => None,
        }
    }

    /// 数值种类可在重复字段中以 packed 形式出现。
    #[must_use]
    pub const fn is_packable(self) -> bool {
        self as u8 <= Self::LAST_PACKABLE as u8
    }

    /// 种类对应的线上 wire type。
    #[must_use]
    pub const fn wire_type(self) -> WireType {
        match self {
            Self::Varint | Self::SVarint => WireType::Varint,
            Self::Fixed32 => WireType::Bit32,
            Self::Fixed64 => WireType::Bit64,
            Self::Bytes | Self::String | Self::Submessage => WireType::LengthDelimited,
        }
    }
}

/// 字段修饰符（类型字节的高半字节）。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Modifier {
    /// 必填：总是编码，解码时必须出现。
    Required = 0x00,
    /// 可选：由 1 字节存在标记控制。
    Optional = 0x10,
    /// 重复：定长数组 + 4 字节元素计数。
    Repeated = 0x20,
    /// 回调：记录只保存回调句柄，由调用方代码处理载荷。
    Callback = 0x30,
}

impl Modifier {
    const fn from_nibble(bits: u8) -> Option<Self> {
        match bits {
            0x00 => Some(Self::Required),
            0x10 => Some(Self::Optional),
            0x20 => Some(Self::Repeated),
            0x30 => Some(Self::Callback),
            _ => None,
        }
    }
}

/// 打包后的字段类型字节。
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldType(u8);

impl FieldType {
    const KIND_MASK: u8 = 0x0F;
    const MODIFIER_MASK: u8 = 0xF0;

    /// 组合种类与修饰符。
    #[must_use]
    pub const fn new(kind: ContentKind, modifier: Modifier) -> Self {
        Self(kind as u8 | modifier as u8)
    }

    /// 从原始字节还原，未定义的半字节返回 [`CodecError::InvalidDescriptor`]。
    pub const fn from_bits(bits: u8) -> Result<Self, CodecError> {
        match (
            ContentKind::from_nibble(bits & Self::KIND_MASK),
            Modifier::from_nibble(bits & Self::MODIFIER_MASK),
        ) {
            (Some(_), Some(_)) => Ok(Self(bits)),
            _ => Err(CodecError::InvalidDescriptor {
                tag: 0,
                reason: "undefined field type bits",
            }),
        }
    }

    /// 原始字节。
    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// 内容种类。
    #[must_use]
    pub const fn kind(self) -> ContentKind {
        match ContentKind::from_nibble(self.0 & Self::KIND_MASK) {
            Some(kind) => kind,
            None => ContentKind::Varint,
        }
    }

    /// 修饰符。
    #[must_use]
    pub const fn modifier(self) -> Modifier {
        match Modifier::from_nibble(self.0 & Self::MODIFIER_MASK) {
            Some(modifier) => modifier,
            None => Modifier::Required,
        }
    }
}

impl fmt::Debug for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}|{:?}", self.modifier(), self.kind())
    }
}

/// 字段默认值。
///
/// 标量以「存储位模式」保存，写入时按 `element_size` 截断为小端字节；字节串与文本保存载荷本身。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DefaultValue {
    /// 标量位模式。
    Scalar(u64),
    /// 字节串或文本载荷。
    Bytes(&'static [u8]),
}

impl DefaultValue {
    /// 有符号整数默认值（按存储宽度截断后即为补码）。
    #[must_use]
    pub const fn signed(value: i64) -> Self {
        Self::Scalar(value as u64)
    }

    /// `float` 默认值。
    #[must_use]
    pub const fn float(value: f32) -> Self {
        Self::Scalar(value.to_bits() as u64)
    }

    /// `double` 默认值。
    #[must_use]
    pub const fn double(value: f64) -> Self {
        Self::Scalar(value.to_bits())
    }

    /// 文本默认值。
    #[must_use]
    pub const fn text(value: &'static str) -> Self {
        Self::Bytes(value.as_bytes())
    }
}

/// 描述符的附加数据：默认值或嵌套表。
#[derive(Clone, Copy)]
pub enum FieldExtra {
    /// 无附加数据。
    None,
    /// 字段默认值。
    Default(DefaultValue),
    /// 子消息的描述符表。
    Submessage(&'static [FieldDescriptor]),
}

impl fmt::Debug for FieldExtra {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Default(value) => f.debug_tuple("Default").field(value).finish(),
            Self::Submessage(table) => write!(f, "Submessage({} fields @ {:p})", table.len(), table.as_ptr()),
        }
    }
}

impl PartialEq for FieldExtra {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::None, Self::None) => true,
            (Self::Default(a), Self::Default(b)) => a == b,
            (Self::Submessage(a), Self::Submessage(b)) => core::ptr::eq(*a, *b),
            _ => false,
        }
    }
}

impl Eq for FieldExtra {}

/// 单个字段的描述符。
///
/// # 教案式说明
/// - **意图 (Why)**：把 `.proto` 中一个字段的线上与内存布局信息压缩为一条定长记录，供引擎查表驱动。
/// - **契约 (What)**：
///   - `tag == 0` 表示表结束；
///   - 重复字段的第 `i` 个元素位于 `data_offset + i * element_size`；
///   - 回调字段的 `element_size` 是句柄的存储宽度（1/2/4/8），句柄 0 表示未绑定。
/// - **设计权衡 (Trade-offs)**：字段以 `pub` 暴露，便于生成器与测试直接构造；推荐使用 `const fn` 构造器，
///   它们保证类型字节的两段半字节合法。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FieldDescriptor {
    /// 线上字段编号。
    pub tag: FieldWord,
    /// 种类与修饰符。
    pub field_type: FieldType,
    /// 字段存储在记录中的绝对偏移。
    pub data_offset: FieldWord,
    /// 自数据起点到存在标记/元素计数的距离。
    pub presence_offset: FieldDelta,
    /// 单个元素的存储字节数。
    pub element_size: FieldWord,
    /// 重复字段的数组容量；其他修饰符为 0。
    pub max_count: FieldWord,
    /// 默认值或嵌套表。
    pub extra: FieldExtra,
}

impl FieldDescriptor {
    /// 表结束哨兵。
    pub const END: Self = Self {
        tag: 0,
        field_type: FieldType::new(ContentKind::Varint, Modifier::Required),
        data_offset: 0,
        presence_offset: 0,
        element_size: 0,
        max_count: 0,
        extra: FieldExtra::None,
    };

    /// 必填字段。
    #[must_use]
    pub const fn required(
        tag: FieldWord,
        kind: ContentKind,
        data_offset: FieldWord,
        element_size: FieldWord,
    ) -> Self {
        Self {
            tag,
            field_type: FieldType::new(kind, Modifier::Required),
            data_offset,
            presence_offset: 0,
            element_size,
            max_count: 0,
            extra: FieldExtra::None,
        }
    }

    /// 可选字段，`presence_offset` 指向 1 字节存在标记。
    #[must_use]
    pub const fn optional(
        tag: FieldWord,
        kind: ContentKind,
        data_offset: FieldWord,
        presence_offset: FieldDelta,
        element_size: FieldWord,
    ) -> Self {
        Self {
            tag,
            field_type: FieldType::new(kind, Modifier::Optional),
            data_offset,
            presence_offset,
            element_size,
            max_count: 0,
            extra: FieldExtra::None,
        }
    }

    /// 重复字段，`count_offset` 指向 4 字节元素计数。
    #[must_use]
    pub const fn repeated(
        tag: FieldWord,
        kind: ContentKind,
        data_offset: FieldWord,
        count_offset: FieldDelta,
        element_size: FieldWord,
        max_count: FieldWord,
    ) -> Self {
        Self {
            tag,
            field_type: FieldType::new(kind, Modifier::Repeated),
            data_offset,
            presence_offset: count_offset,
            element_size,
            max_count,
            extra: FieldExtra::None,
        }
    }

    /// 回调字段，`handle_size` 为句柄存储宽度。
    #[must_use]
    pub const fn callback(tag: FieldWord, data_offset: FieldWord, handle_size: FieldWord) -> Self {
        Self {
            tag,
            field_type: FieldType::new(ContentKind::Varint, Modifier::Callback),
            data_offset,
            presence_offset: 0,
            element_size: handle_size,
            max_count: 0,
            extra: FieldExtra::None,
        }
    }

    /// 附加默认值。
    #[must_use]
    pub const fn with_default(mut self, value: DefaultValue) -> Self {
        self.extra = FieldExtra::Default(value);
        self
    }

    /// 附加子消息表。
    #[must_use]
    pub const fn with_submessage(mut self, table: &'static [FieldDescriptor]) -> Self {
        self.extra = FieldExtra::Submessage(table);
        self
    }

    /// 线上字段编号。
    #[must_use]
    pub fn tag(&self) -> u32 {
        u32::from(self.tag)
    }

    /// 内容种类。
    #[must_use]
    pub const fn kind(&self) -> ContentKind {
        self.field_type.kind()
    }

    /// 修饰符。
    #[must_use]
    pub const fn modifier(&self) -> Modifier {
        self.field_type.modifier()
    }

    /// 数据起点。
    #[must_use]
    pub const fn data_offset(&self) -> usize {
        self.data_offset as usize
    }

    /// 单个元素字节数。
    #[must_use]
    pub const fn element_size(&self) -> usize {
        self.element_size as usize
    }

    /// 重复字段容量。
    #[must_use]
    pub const fn max_count(&self) -> usize {
        self.max_count as usize
    }

    /// 存在标记/元素计数的绝对位置；落在地址空间之外时返回 `None`。
    #[must_use]
    pub const fn presence_location(&self) -> Option<usize> {
        let location = self.data_offset as isize + self.presence_offset as isize;
        if location < 0 {
            None
        } else {
            Some(location as usize)
        }
    }

    /// 子消息表。
    #[must_use]
    pub const fn submessage(&self) -> Option<&'static [FieldDescriptor]> {
        match self.extra {
            FieldExtra::Submessage(table) => Some(table),
            _ => None,
        }
    }

    /// 默认值。
    #[must_use]
    pub const fn default_value(&self) -> Option<DefaultValue> {
        match self.extra {
            FieldExtra::Default(value) => Some(value),
            _ => None,
        }
    }

    /// 表结束哨兵。
    #[must_use]
    pub fn is_terminator(&self) -> bool {
        self.tag() == 0
    }

    pub(crate) const fn invalid(&self, reason: &'static str) -> CodecError {
        CodecError::InvalidDescriptor {
            tag: self.tag as u32,
            reason,
        }
    }
}

/// 表中第一个哨兵之前的有效字段。
#[must_use]
pub fn active_fields(fields: &[FieldDescriptor]) -> &[FieldDescriptor] {
    let end = fields
        .iter()
        .position(FieldDescriptor::is_terminator)
        .unwrap_or(fields.len());
    &fields[..end]
}

/// 表中出现的最大无符号数值，用于挑选描述符档位。
#[must_use]
pub fn largest_value(fields: &[FieldDescriptor]) -> u32 {
    active_fields(fields)
        .iter()
        .flat_map(|field| {
            [
                field.tag(),
                field.data_offset as u32,
                field.element_size as u32,
                field.max_count as u32,
                (field.presence_offset as i64).unsigned_abs() as u32,
            ]
        })
        .max()
        .unwrap_or(0)
}

/// 在记录长度为 `record_len` 的前提下检查描述符表是否自洽。
///
/// # 教案式说明
/// - **意图 (Why)**：手写或生成的表一旦与记录布局错位，运行期表现为莫名的越界错误；上线前调用一次
///   可把问题定位到具体字段。
/// - **契约 (What)**：检查 tag 唯一、存储与存在标记落在记录内、元素大小与种类匹配、重复字段容量非零、
///   子消息表存在并递归合法、必填字段数不超过跟踪集合容量。
/// - **实现策略 (How)**：递归时携带当前路径上的表地址，已在路径上的表（递归消息）不再展开。
pub fn validate_table(fields: &[FieldDescriptor], record_len: usize) -> Result<(), CodecError> {
    validate_inner(fields, record_len, None)
}

struct TablePath<'p> {
    table: *const FieldDescriptor,
    parent: Option<&'p TablePath<'p>>,
}

impl TablePath<'_> {
    fn contains(&self, table: *const FieldDescriptor) -> bool {
        core::ptr::eq(self.table, table) || self.parent.is_some_and(|parent| parent.contains(table))
    }
}

fn validate_inner(
    fields: &[FieldDescriptor],
    record_len: usize,
    parent: Option<&TablePath<'_>>,
) -> Result<(), CodecError> {
    let fields = active_fields(fields);
    let path = TablePath {
        table: fields.as_ptr(),
        parent,
    };
    let mut required = 0usize;
    for (index, field) in fields.iter().enumerate() {
        if fields[..index].iter().any(|other| other.tag == field.tag) {
            return Err(field.invalid("duplicate tag"));
        }
        validate_storage(field, record_len)?;
        match field.modifier() {
            Modifier::Required => required += 1,
            Modifier::Callback if matches!(field.element_size(), 1 | 2 | 4 | 8) => continue,
            Modifier::Callback => return Err(field.invalid("callback handle width")),
            Modifier::Optional | Modifier::Repeated => {}
        }
        validate_kind(field)?;
        if let Some(table) = field.submessage()
            && !path.contains(table.as_ptr())
        {
            validate_inner(table, field.element_size(), Some(&path))?;
        }
    }
    if required > REQUIRED_SET_CAPACITY {
        return Err(CodecError::InvalidDescriptor {
            tag: 0,
            reason: "too many required fields to track",
        });
    }
    Ok(())
}

fn validate_storage(field: &FieldDescriptor, record_len: usize) -> Result<(), CodecError> {
    let slots = match field.modifier() {
        Modifier::Repeated if field.max_count() == 0 => {
            return Err(field.invalid("repeated field without capacity"));
        }
        Modifier::Repeated => field.max_count(),
        Modifier::Required | Modifier::Optional | Modifier::Callback => 1,
    };
    let data_end = field
        .element_size()
        .checked_mul(slots)
        .and_then(|len| len.checked_add(field.data_offset()));
    if data_end.is_none_or(|end| end > record_len) {
        return Err(field.invalid("storage exceeds record"));
    }
    let marker_len = match field.modifier() {
        Modifier::Optional => PRESENCE_SIZE,
        Modifier::Repeated => COUNT_SIZE,
        Modifier::Required | Modifier::Callback => return Ok(()),
    };
    match field.presence_location() {
        Some(location) if location + marker_len <= record_len => Ok(()),
        _ => Err(field.invalid("presence marker outside record")),
    }
}

fn validate_kind(field: &FieldDescriptor) -> Result<(), CodecError> {
    let size = field.element_size();
    let size_ok = match field.kind() {
        ContentKind::Varint => matches!(size, 1 | 2 | 4 | 8),
        ContentKind::SVarint => matches!(size, 4 | 8),
        ContentKind::Fixed32 => size == 4,
        ContentKind::Fixed64 => size == 8,
        ContentKind::Bytes => size > BYTES_LEN_SIZE,
        ContentKind::String => size >= 1,
        ContentKind::Submessage => true,
    };
    if !size_ok {
        return Err(field.invalid("element size does not fit kind"));
    }
    let kind = field.kind();
    match field.extra {
        FieldExtra::Submessage(_) if kind == ContentKind::Submessage => Ok(()),
        FieldExtra::Submessage(_) => Err(field.invalid("table attached to scalar field")),
        _ if kind == ContentKind::Submessage => Err(field.invalid("submessage without table")),
        FieldExtra::Default(DefaultValue::Bytes(value)) => match kind {
            ContentKind::Bytes if value.len() <= size - BYTES_LEN_SIZE => Ok(()),
            ContentKind::String if value.len() < size => Ok(()),
            ContentKind::Bytes | ContentKind::String => {
                Err(field.invalid("default exceeds container"))
            }
            _ => Err(field.invalid("default does not match kind")),
        },
        FieldExtra::Default(DefaultValue::Scalar(_))
            if matches!(kind, ContentKind::Bytes | ContentKind::String) =>
        {
            Err(field.invalid("default does not match kind"))
        }
        FieldExtra::Default(_) | FieldExtra::None => Ok(()),
    }
}
