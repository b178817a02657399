//! 必填字段跟踪集合。
//!
//! 每次解码一个消息时创建，按「字段在表中是第几个必填字段」置位，消息结束时逐一核对。
//! 容量固定，不依赖堆；序号超过生效上限的必填字段不被跟踪，也就不会因缺失而报错。

/// 集合的硬容量（位数）。
pub const REQUIRED_SET_CAPACITY: usize = 256;

/// 默认跟踪上限。
pub const DEFAULT_REQUIRED_LIMIT: u16 = 64;

const WORDS: usize = REQUIRED_SET_CAPACITY / 64;

/// 定长位集。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RequiredFieldSet {
    words: [u64; WORDS],
    limit: u16,
}

impl RequiredFieldSet {
    /// 以生效上限构造，上限会被钳制到 [`REQUIRED_SET_CAPACITY`]。
    #[must_use]
    pub const fn new(limit: u16) -> Self {
        let limit = if limit as usize > REQUIRED_SET_CAPACITY {
            REQUIRED_SET_CAPACITY as u16
        } else {
            limit
        };
        Self {
            words: [0; WORDS],
            limit,
        }
    }

    /// 生效上限。
    #[must_use]
    pub const fn limit(&self) -> usize {
        self.limit as usize
    }

    /// 序号是否在跟踪范围内。
    #[must_use]
    pub const fn is_tracked(&self, index: usize) -> bool {
        index < self.limit as usize
    }

    /// 标记第 `index` 个必填字段已出现；未被跟踪时返回 `false`。
    pub fn mark(&mut self, index: usize) -> bool {
        if !self.is_tracked(index) {
            return false;
        }
        self.words[index / 64] |= 1 << (index % 64);
        true
    }

    /// 第 `index` 个必填字段是否已出现。
    #[must_use]
    pub const fn contains(&self, index: usize) -> bool {
        self.is_tracked(index) && self.words[index / 64] & (1 << (index % 64)) != 0
    }

    /// 已标记的数量。
    #[must_use]
    pub fn len(&self) -> usize {
        self.words.iter().map(|word| word.count_ones() as usize).sum()
    }

    /// 是否尚未标记任何字段。
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for RequiredFieldSet {
    fn default() -> Self {
        Self::new(DEFAULT_REQUIRED_LIMIT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marks_within_limit_only() {
        let mut set = RequiredFieldSet::default();
        assert!(set.mark(0));
        assert!(set.mark(63));
        assert!(!set.mark(64), "默认上限之外的序号不应被跟踪");
        assert!(set.contains(63));
        assert!(!set.contains(1));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn limit_is_clamped_to_capacity() {
        let mut set = RequiredFieldSet::new(1_000);
        assert_eq!(set.limit(), REQUIRED_SET_CAPACITY);
        assert!(set.mark(255));
        assert!(!set.mark(256));
    }
}
