//! # config 模块：编解码限制与选项
//!
//! ## 设计意图（Why）
//! - 嵌套深度与必填字段跟踪上限决定了引擎最坏情况下的栈与内存占用，需要由部署方显式掌控；
//! - 零键终止、解码前套用默认值等行为在不同对端之间存在差异，集中为一个可序列化的配置对象，
//!   便于与其他服务配置一起从 TOML/JSON 加载。
//!
//! ## 契约（What）
//! - [`CodecConfig::DEFAULT`]：深度 32、必填上限 64、零键终止开启、默认值套用关闭；
//! - [`CodecConfig::validate`] 拒绝低于 64 或高于集合容量的必填上限；
//! - 反序列化时缺省字段取默认值，未知字段报错。

use core::num::NonZeroU16;

use serde::{Deserialize, Serialize};

use crate::required::{DEFAULT_REQUIRED_LIMIT, REQUIRED_SET_CAPACITY};

/// 默认嵌套深度上限。
pub const DEFAULT_MAX_RECURSION_DEPTH: NonZeroU16 = match NonZeroU16::new(32) {
    Some(depth) => depth,
    None => NonZeroU16::MIN,
};

/// 编解码配置。
///
/// # 教案式说明
/// - **意图 (Why)**：对应解码上下文中的「预算」，限定单次调用可以消耗的嵌套层级与跟踪资源。
/// - **契约 (What)**：
///   - `max_recursion_depth`：进入子消息的最大层数，编码与解码共用；
///   - `max_required_fields`：每个消息跟踪的必填字段数上限；
///   - `zero_tag_terminates`：解码时遇到值为 0 的键视为消息结束；关闭时视为 [`InvalidTag`](crate::CodecError::InvalidTag)；
///   - `init_defaults`：解码消息（含每个子消息）前先套用默认值。
/// - **设计权衡 (Trade-offs)**：结构体实现 `Copy`，上下文按值持有，避免配置在调用期间被修改。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CodecConfig {
    /// 子消息最大嵌套层数。
    pub max_recursion_depth: NonZeroU16,
    /// 每个消息跟踪的必填字段数上限。
    pub max_required_fields: u16,
    /// 零键是否终止消息。
    pub zero_tag_terminates: bool,
    /// 解码前是否套用默认值。
    pub init_defaults: bool,
}

impl CodecConfig {
    /// 默认配置。
    pub const DEFAULT: Self = Self {
        max_recursion_depth: DEFAULT_MAX_RECURSION_DEPTH,
        max_required_fields: DEFAULT_REQUIRED_LIMIT,
        zero_tag_terminates: true,
        init_defaults: false,
    };

    /// 调整嵌套深度上限。
    #[must_use]
    pub const fn with_max_recursion_depth(mut self, depth: NonZeroU16) -> Self {
        self.max_recursion_depth = depth;
        self
    }

    /// 调整必填字段跟踪上限。
    #[must_use]
    pub const fn with_max_required_fields(mut self, limit: u16) -> Self {
        self.max_required_fields = limit;
        self
    }

    /// 调整零键终止行为。
    #[must_use]
    pub const fn with_zero_tag_terminates(mut self, enabled: bool) -> Self {
        self.zero_tag_terminates = enabled;
        self
    }

    /// 调整默认值套用行为。
    #[must_use]
    pub const fn with_init_defaults(mut self, enabled: bool) -> Self {
        self.init_defaults = enabled;
        self
    }

    /// 检查配置取值范围。
    pub const fn validate(&self) -> Result<(), ConfigError> {
        if self.max_required_fields < DEFAULT_REQUIRED_LIMIT {
            return Err(ConfigError::RequiredLimitTooLow {
                limit: self.max_required_fields,
            });
        }
        if self.max_required_fields as usize > REQUIRED_SET_CAPACITY {
            return Err(ConfigError::RequiredLimitTooHigh {
                limit: self.max_required_fields,
            });
        }
        Ok(())
    }
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// 配置校验错误。
#[cfg_attr(feature = "std", derive(thiserror::Error))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// 必填上限低于 64。
    #[cfg_attr(
        feature = "std",
        error("max_required_fields {limit} is below the minimum of 64")
    )]
    RequiredLimitTooLow {
        /// 配置值。
        limit: u16,
    },
    /// 必填上限超过跟踪集合容量。
    #[cfg_attr(
        feature = "std",
        error("max_required_fields {limit} exceeds the tracking capacity of 256")
    )]
    RequiredLimitTooHigh {
        /// 配置值。
        limit: u16,
    },
}

#[cfg(not(feature = "std"))]
impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::RequiredLimitTooLow { limit } => {
                write!(f, "max_required_fields {limit} is below the minimum of 64")
            }
            Self::RequiredLimitTooHigh { limit } => {
                write!(f, "max_required_fields {limit} exceeds the tracking capacity of 256")
            }
        }
    }
}
