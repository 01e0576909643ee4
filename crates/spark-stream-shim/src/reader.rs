//! # reader 模块说明
//!
//! ## 角色定位（Why）
//! [`Reader`] 是带模式标签的读取句柄。模式在构造时确定：
//! - `Default`：直接委托宿主 Reader；
//! - `Byob`：读取写入调用方提供的视图。宿主支持原生 BYOB 时直接委托 `read_into`，
//!   否则以“普通读取 + 复制”仿真。
//!
//! ## BYOB 读取流程（How）
//! 1. 没有视图且没有上次中断遗留的视图时，退化为普通读取；
//! 2. 先把视图登记到控制器侧表并缓存到 Reader 上，再发起宿主读取，
//!    生产端的 `pull` 因此可以在同一次调用中通过 `byob_request` 发现该视图；
//! 3. 流结束时交回原视图，`done == true`；
//! 4. 否则把块的前 `min(块长, 视图长)` 字节复制到视图起点，返回覆盖已复制区间的视图，
//!    超出视图容量的尾部被丢弃；
//! 5. 步骤 2~4 中任何失败都降级为普通读取，不向调用方报告。
//!
//! ## 风险提示（Trade-offs）
//! 仿真路径不会把多余字节重新入队，调用方提供的视图过小时数据会丢失；
//! 原生 BYOB 宿主则保留剩余字节。

use std::{fmt, sync::Arc};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::{
    byob::ControllerLink,
    chunk::{Chunk, ReadResult, ReaderMode, ReaderOptions},
    error::{Result, StreamError},
    host::{ClosedState, NativeReader, StreamId},
    registry::{PendingViews, StashGuard},
    runtime::DetachedSpawner,
    stream::ReadableStream,
    terminate::Terminable,
    view::ByteView,
};

pub(crate) struct ReaderParts {
    pub(crate) stream_id: StreamId,
    pub(crate) mode: ReaderMode,
    pub(crate) native: Arc<dyn NativeReader>,
    pub(crate) native_byob: bool,
    pub(crate) link: Arc<ControllerLink>,
    pub(crate) pending: Arc<PendingViews>,
    pub(crate) spawner: Arc<dyn DetachedSpawner>,
    pub(crate) log_throw_reasons: bool,
}

pub(crate) struct ReaderCore {
    pub(crate) parts: ReaderParts,
    cached_view: Mutex<Option<ByteView>>,
}

/// 仿真读取失败时的降级位置。
enum Degraded {
    /// 宿主读取本身失败，块尚未被消费。
    BeforeRead(StreamError),
    /// 已经取到块，但无法复制进视图。
    AfterRead { chunk: Chunk, cause: StreamError },
}

/// 流的读取句柄，克隆后共享同一个底层 Reader。
#[derive(Clone)]
pub struct Reader {
    pub(crate) core: Arc<ReaderCore>,
}

impl Reader {
    pub(crate) fn new(parts: ReaderParts) -> Self {
        Self {
            core: Arc::new(ReaderCore {
                parts,
                cached_view: Mutex::new(None),
            }),
        }
    }

    /// 等价于 `stream.get_reader(options)`。
    pub async fn for_stream(stream: &ReadableStream, options: ReaderOptions) -> Result<Self> {
        stream.get_reader(options).await
    }

    pub fn mode(&self) -> ReaderMode {
        self.core.parts.mode
    }

    pub fn is_byob(&self) -> bool {
        self.core.parts.mode == ReaderMode::Byob
    }

    /// 是否由宿主原生 BYOB Reader 支撑。
    pub fn is_native_byob(&self) -> bool {
        self.core.parts.native_byob
    }

    pub fn stream_id(&self) -> StreamId {
        self.core.parts.stream_id
    }

    /// 两个句柄是否指向同一个 Reader。
    pub fn same_reader(&self, other: &Reader) -> bool {
        Arc::ptr_eq(&self.core, &other.core)
    }

    /// 是否仍持有流的锁。
    pub fn is_active(&self) -> bool {
        self.core.parts.native.is_active()
    }

    /// 读取下一块。`view` 只在 BYOB 模式下生效。
    pub async fn read(&self, view: Option<ByteView>) -> Result<ReadResult> {
        let parts = &self.core.parts;
        if parts.mode == ReaderMode::Default {
            return parts.native.read().await;
        }
        let view = match view {
            Some(view) => {
                *self.core.cached_view.lock() = Some(view.clone());
                view
            }
            None => {
                let cached = self.core.cached_view.lock().clone();
                match cached {
                    Some(view) => view,
                    None => return parts.native.read().await,
                }
            }
        };
        let outcome = self.fill_view(&view).await;
        self.core.cached_view.lock().take();
        match outcome {
            Ok(result) => Ok(result),
            Err(Degraded::BeforeRead(cause)) => {
                tracing::debug!(
                    code = cause.code(),
                    error = %cause,
                    "byob read degraded to a plain read"
                );
                parts.native.read().await
            }
            Err(Degraded::AfterRead { chunk, cause }) => {
                tracing::debug!(
                    code = cause.code(),
                    chunk = chunk.type_name(),
                    "byob copy failed, returning the chunk as read"
                );
                Ok(ReadResult::chunk(chunk))
            }
        }
    }

    async fn fill_view(&self, view: &ByteView) -> Result<ReadResult, Degraded> {
        let parts = &self.core.parts;
        let _stash = StashGuard::new(&parts.pending, parts.link.id(), view.clone());
        let result = if parts.native_byob {
            parts.native.read_into(view.clone()).await
        } else {
            parts.native.read().await
        }
        .map_err(Degraded::BeforeRead)?;

        if result.done {
            return Ok(ReadResult::finished(Some(Chunk::Bytes(view.clone()))));
        }
        if parts.native_byob {
            return Ok(result);
        }
        let Some(chunk) = result.value else {
            return Ok(result);
        };
        let bytes = match chunk.to_byte_vec() {
            Ok(bytes) => bytes,
            Err(cause) => return Err(Degraded::AfterRead { chunk, cause }),
        };
        let copied = view.fill_prefix(&bytes);
        if copied < bytes.len() {
            tracing::trace!(
                copied,
                dropped = bytes.len() - copied,
                "byob view smaller than chunk, tail dropped"
            );
        }
        match view.prefix(copied) {
            Ok(filled) => Ok(ReadResult::chunk(filled)),
            Err(cause) => Err(Degraded::AfterRead { chunk, cause }),
        }
    }

    /// 上次读取被中断时遗留的视图。
    pub fn cached_view(&self) -> Option<ByteView> {
        self.core.cached_view.lock().clone()
    }

    pub async fn cancel(&self, reason: Option<String>) -> Result<()> {
        self.core.parts.native.cancel(reason).await
    }

    pub fn release_lock(&self) -> Result<()> {
        self.core.parts.native.release_lock()
    }

    /// 流进入终态时完成；流出错或锁在终态之前被释放时返回错误。
    pub async fn closed(&self) -> Result<ClosedState> {
        self.core.parts.native.closed().await
    }

    pub(crate) fn spawner(&self) -> &Arc<dyn DetachedSpawner> {
        &self.core.parts.spawner
    }

    pub(crate) fn log_throw_reasons(&self) -> bool {
        self.core.parts.log_throw_reasons
    }
}

#[async_trait]
impl Terminable for Reader {
    async fn cancel(&self, reason: Option<String>) -> Result<()> {
        Reader::cancel(self, reason).await
    }

    fn release_lock(&self) -> Result<()> {
        Reader::release_lock(self)
    }

    async fn closed(&self) -> Result<ClosedState> {
        Reader::closed(self).await
    }
}

impl fmt::Debug for Reader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reader")
            .field("stream_id", &self.core.parts.stream_id)
            .field("mode", &self.core.parts.mode)
            .field("native_byob", &self.core.parts.native_byob)
            .field("active", &self.is_active())
            .finish()
    }
}
