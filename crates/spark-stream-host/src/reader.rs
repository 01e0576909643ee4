//! 内存 Reader。
//!
//! 原生 BYOB 读取把块写入调用方视图，放不下的尾部重新排回队首，下一次读取继续交付。

use std::sync::Arc;

use async_trait::async_trait;
use spark_stream_shim::{
    ByteView, Chunk, ClosedState, NativeReader, ReadResult, ReaderMode, Result, StreamError,
};

use crate::stream::Shared;

/// 持有某条内存流锁的 Reader。
pub struct MemoryReader {
    shared: Arc<Shared>,
    token: u64,
    mode: ReaderMode,
}

impl MemoryReader {
    pub(crate) fn new(shared: Arc<Shared>, token: u64, mode: ReaderMode) -> Self {
        Self {
            shared,
            token,
            mode,
        }
    }

    pub fn mode(&self) -> ReaderMode {
        self.mode
    }
}

#[async_trait]
impl NativeReader for MemoryReader {
    async fn read(&self) -> Result<ReadResult> {
        match self.shared.next_chunk(self.token).await? {
            Some(chunk) => Ok(ReadResult::chunk(chunk)),
            None => Ok(ReadResult::done()),
        }
    }

    async fn read_into(&self, view: ByteView) -> Result<ReadResult> {
        if self.mode != ReaderMode::Byob {
            return Err(StreamError::Unsupported {
                operation: "read_into",
            });
        }
        let Some(chunk) = self.shared.next_chunk(self.token).await? else {
            return Ok(ReadResult::finished(Some(Chunk::Bytes(view))));
        };
        let bytes = chunk.to_byte_vec()?;
        let written = view.fill_prefix(&bytes);
        if written < bytes.len() {
            self.shared.unshift(Chunk::from(bytes[written..].to_vec()));
        }
        Ok(ReadResult::chunk(view.prefix(written)?))
    }

    async fn cancel(&self, reason: Option<String>) -> Result<()> {
        if !self.shared.is_held_by(self.token) {
            return Err(StreamError::Released);
        }
        self.shared.cancel(reason).await
    }

    fn release_lock(&self) -> Result<()> {
        self.shared.release(self.token);
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.shared.is_held_by(self.token)
    }

    async fn closed(&self) -> Result<ClosedState> {
        self.shared.closed(self.token).await
    }
}
