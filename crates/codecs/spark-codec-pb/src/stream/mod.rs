//! # stream 模块：有界字节流
//!
//! ## 设计意图（Why）
//! - 引擎只需要「按需读取 N 个字节」与「追加 N 个字节」两种能力，数据究竟来自内存切片、
//!   串口驱动还是文件句柄，应当对引擎透明；
//! - 每个流都携带剩余字节预算（输入）或写入计数与上限（输出），使嵌套子消息可以在不复制数据的前提下
//!   被限定在精确的字节窗口内。
//!
//! ## 交互契约（What）
//! - [`InputStream`]：切片或 [`ByteSource`] 拉取源，读取超过预算即 [`CodecError::EndOfStream`]；
//! - [`OutputStream`]：定长切片、可增长 `BytesMut`、[`ByteSink`] 推送汇或纯计数；
//! - 两类流都记录「首个故障」，后续错误不会覆盖它，便于事后诊断。
//!
//! ## 实现策略（How）
//! - 源/汇以 `&mut dyn Trait` 形式持有，子流通过重借用共享同一个源/汇，闭包返回后父流按实际消耗量前移；
//! - 适配器（`std::io`、`bytes::Buf`、闭包）位于 [`adapters`]，按特性开关编译。

pub mod adapters;
mod input;
mod output;

pub use adapters::FnSource;
#[cfg(feature = "alloc")]
pub use adapters::BufSource;
#[cfg(feature = "std")]
pub use adapters::{IoSink, IoSource};
pub use input::InputStream;
pub use output::OutputStream;

use crate::error::CodecError;

/// 拉取式字节源。
///
/// # 契约
/// - `pull` 必须恰好填满 `buf`，否则返回错误；源已耗尽时返回 [`CodecError::EndOfStream`]，
///   其他底层故障返回 [`CodecError::SourceFailed`]；
/// - `skip` 默认以小块 `pull` 实现，可按源的能力覆盖为真正的前移。
pub trait ByteSource {
    /// 读取恰好 `buf.len()` 个字节。
    fn pull(&mut self, buf: &mut [u8]) -> Result<(), CodecError>;

    /// 丢弃 `count` 个字节。
    fn skip(&mut self, mut count: usize) -> Result<(), CodecError> {
        let mut scratch = [0u8; 32];
        while count > 0 {
            let step = count.min(scratch.len());
            self.pull(&mut scratch[..step])?;
            count -= step;
        }
        Ok(())
    }
}

/// 推送式字节汇。
///
/// # 契约
/// - `push` 成功表示全部字节已被接收；失败时返回错误（通常为 [`CodecError::SinkFailed`]）；
/// - 底层设备可能在失败前已接收一段前缀，[`OutputStream::bytes_written`] 只统计成功的 `push`；
///   需要知道设备实际收下多少字节的汇应自行计数，见 [`IoSink::bytes_accepted`](adapters::IoSink::bytes_accepted)。
pub trait ByteSink {
    /// 追加 `bytes`。
    fn push(&mut self, bytes: &[u8]) -> Result<(), CodecError>;
}
