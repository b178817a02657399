//! 字节源/字节汇适配器。
//!
//! - [`FnSource`]：闭包形式的拉取函数，适合对接裸机驱动；
//! - [`BufSource`]（`alloc`）：任意 [`bytes::Buf`]，例如收包得到的 `Bytes` 或链式缓冲；
//! - [`IoSource`] / [`IoSink`]（`std`）：`std::io::Read` / `Write`，底层错误经 `tracing` 记录后折叠为
//!   [`CodecError::SourceFailed`] / [`CodecError::SinkFailed`]。

use super::ByteSource;
#[cfg(feature = "std")]
use super::ByteSink;
use crate::error::CodecError;

/// 以闭包实现的拉取源。
pub struct FnSource<F> {
    pull: F,
}

impl<F> FnSource<F>
where
    F: FnMut(&mut [u8]) -> Result<(), CodecError>,
{
    /// 包装拉取闭包；闭包须恰好填满传入缓冲。
    pub const fn new(pull: F) -> Self {
        Self { pull }
    }
}

impl<F> ByteSource for FnSource<F>
where
    F: FnMut(&mut [u8]) -> Result<(), CodecError>,
{
    fn pull(&mut self, buf: &mut [u8]) -> Result<(), CodecError> {
        (self.pull)(buf)
    }
}

#[cfg(feature = "alloc")]
mod buf {
    use bytes::Buf;

    use super::{ByteSource, CodecError};

    /// 基于 [`Buf`] 的拉取源，`skip` 直接前移游标而不复制。
    #[derive(Debug)]
    pub struct BufSource<B> {
        inner: B,
    }

    impl<B: Buf> BufSource<B> {
        /// 包装缓冲。
        pub const fn new(inner: B) -> Self {
            Self { inner }
        }

        /// 缓冲中剩余的字节数，可直接作为 [`InputStream::from_source`](crate::InputStream::from_source) 的长度。
        pub fn remaining(&self) -> usize {
            self.inner.remaining()
        }

        /// 取回内部缓冲。
        pub fn into_inner(self) -> B {
            self.inner
        }
    }

    impl<B: Buf> ByteSource for BufSource<B> {
        fn pull(&mut self, buf: &mut [u8]) -> Result<(), CodecError> {
            if self.inner.remaining() < buf.len() {
                return Err(CodecError::EndOfStream);
            }
            self.inner.copy_to_slice(buf);
            Ok(())
        }

        fn skip(&mut self, count: usize) -> Result<(), CodecError> {
            if self.inner.remaining() < count {
                return Err(CodecError::EndOfStream);
            }
            self.inner.advance(count);
            Ok(())
        }
    }
}

#[cfg(feature = "alloc")]
pub use buf::BufSource;

#[cfg(feature = "std")]
mod io {
    use std::io::{ErrorKind, Read, Write};

    use super::{ByteSink, ByteSource, CodecError};

    /// 基于 [`Read`] 的拉取源。
    #[derive(Debug)]
    pub struct IoSource<R> {
        reader: R,
    }

    impl<R: Read> IoSource<R> {
        /// 包装读取端。
        pub const fn new(reader: R) -> Self {
            Self { reader }
        }

        /// 取回读取端。
        pub fn into_inner(self) -> R {
            self.reader
        }
    }

    impl<R: Read> ByteSource for IoSource<R> {
        fn pull(&mut self, buf: &mut [u8]) -> Result<(), CodecError> {
            self.reader.read_exact(buf).map_err(|err| {
                if err.kind() == ErrorKind::UnexpectedEof {
                    CodecError::EndOfStream
                } else {
                    tracing::debug!(error = %err, "byte source read failed");
                    CodecError::SourceFailed
                }
            })
        }
    }

    /// 基于 [`Write`] 的推送汇。
    ///
    /// 写入端可能在失败前只收下部分字节，[`IoSink::bytes_accepted`] 记录写入端实际收下的总字节数。
    #[derive(Debug)]
    pub struct IoSink<W> {
        writer: W,
        accepted: u64,
    }

    impl<W: Write> IoSink<W> {
        /// 包装写入端。
        pub const fn new(writer: W) -> Self {
            Self {
                writer,
                accepted: 0,
            }
        }

        /// 写入端实际收下的字节数，包括失败的 `push` 已写出的前缀。
        pub const fn bytes_accepted(&self) -> u64 {
            self.accepted
        }

        /// 取回写入端。
        pub fn into_inner(self) -> W {
            self.writer
        }
    }

    impl<W: Write> ByteSink for IoSink<W> {
        fn push(&mut self, mut bytes: &[u8]) -> Result<(), CodecError> {
            while !bytes.is_empty() {
                match self.writer.write(bytes) {
                    Ok(0) => {
                        tracing::debug!(accepted = self.accepted, "byte sink accepted no bytes");
                        return Err(CodecError::SinkFailed);
                    }
                    Ok(written) => {
                        self.accepted += written as u64;
                        bytes = &bytes[written..];
                    }
                    Err(err) if err.kind() == ErrorKind::Interrupted => {}
                    Err(err) => {
                        tracing::debug!(error = %err, accepted = self.accepted, "byte sink write failed");
                        return Err(CodecError::SinkFailed);
                    }
                }
            }
            Ok(())
        }
    }
}

#[cfg(feature = "std")]
pub use io::{IoSink, IoSource};
