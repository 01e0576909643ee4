//! # stream 模块说明
//!
//! ## 角色定位（Why）
//! [`ReadableStream`] 是消费端看到的流：它包裹宿主原生流，记录模式标签与重新派生次数，
//! 并提供 `get_reader`、`async_iterator`/`values`、`cancel` 等入口。
//!
//! ## 状态机（What）
//! `未锁定 → 锁定(default) | 锁定(byob) → 未锁定`。模式在第一次 `get_reader` 时确定，
//! 一旦标记为 BYOB，即使经过重新派生也保持不变。锁的互斥由宿主保证，本层只观测 `locked`。
//!
//! ## 生命周期
//! 流被销毁时，从 Reader 缓存与待填充视图表中移除自身条目。

use std::{fmt, sync::Arc};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::{
    byob::{ControllerLink, StreamController},
    chunk::{ReaderMode, ReaderOptions, StreamType},
    error::{Result, StreamError},
    host::{NativeController, NativeSource, NativeStream, StreamId},
    reader::{Reader, ReaderParts},
    recovery::{Backing, StreamTags, acquire},
    shim::Shim,
    terminate::Terminable,
};

/// 生产端回调。所有方法都有空实现，按需覆盖。
#[async_trait]
pub trait UnderlyingSource: Send + Sync + 'static {
    async fn start(&self, controller: &StreamController) -> Result<()> {
        let _ = controller;
        Ok(())
    }

    async fn pull(&self, controller: &StreamController) -> Result<()> {
        let _ = controller;
        Ok(())
    }

    async fn cancel(&self, reason: Option<String>) -> Result<()> {
        let _ = reason;
        Ok(())
    }
}

/// 把用户回调适配为宿主源，并在每次回调前绑定宿主控制器。
struct BridgedSource {
    source: Arc<dyn UnderlyingSource>,
    controller: StreamController,
    link: Arc<ControllerLink>,
}

#[async_trait]
impl NativeSource for BridgedSource {
    async fn start(&self, controller: Arc<dyn NativeController>) -> Result<()> {
        self.link.attach(controller);
        self.source.start(&self.controller).await
    }

    async fn pull(&self, controller: Arc<dyn NativeController>) -> Result<()> {
        self.link.attach(controller);
        self.source.pull(&self.controller).await
    }

    async fn cancel(&self, reason: Option<String>) -> Result<()> {
        self.source.cancel(reason).await
    }
}

struct StreamInner {
    id: StreamId,
    shim: Shim,
    backing: Mutex<Backing>,
    link: Arc<ControllerLink>,
}

impl Drop for StreamInner {
    fn drop(&mut self) {
        self.shim.readers().remove(self.id);
        self.shim.pending().clear(self.link.id());
    }
}

/// 兼容层可读流。
#[derive(Clone)]
pub struct ReadableStream {
    inner: Arc<StreamInner>,
}

impl ReadableStream {
    /// 以默认类型构造流。
    pub fn new(shim: &Shim, source: impl UnderlyingSource) -> Result<Self> {
        Self::with_type(shim, source, StreamType::Default)
    }

    /// 以指定类型构造流。
    ///
    /// 宿主不支持字节流时，原生流按默认类型构造，但兼容层仍保留 `Bytes` 标签，
    /// 之后的 BYOB 读取全部走仿真路径。
    pub fn with_type(
        shim: &Shim,
        source: impl UnderlyingSource,
        stream_type: StreamType,
    ) -> Result<Self> {
        let link = Arc::new(ControllerLink::new(stream_type == StreamType::Bytes));
        let bridged = Arc::new(BridgedSource {
            source: Arc::new(source),
            controller: StreamController::new(Arc::clone(&link), Arc::clone(shim.pending())),
            link: Arc::clone(&link),
        });
        let capabilities = shim.host().capabilities();
        let native_type = if stream_type == StreamType::Bytes && !capabilities.byte_streams {
            tracing::debug!(
                "host lacks byte streams, constructing a default stream with a bytes tag"
            );
            StreamType::Default
        } else {
            stream_type
        };
        let native = shim.host().construct(bridged, native_type)?;
        Ok(Self::assemble(shim, native, StreamTags::new(stream_type), link))
    }

    /// 包裹一条已有的宿主流。
    pub fn from_native(shim: &Shim, native: Arc<dyn NativeStream>) -> Self {
        let stream_type = native.stream_type();
        let link = Arc::new(ControllerLink::new(stream_type == StreamType::Bytes));
        Self::assemble(shim, native, StreamTags::new(stream_type), link)
    }

    fn assemble(
        shim: &Shim,
        native: Arc<dyn NativeStream>,
        tags: StreamTags,
        link: Arc<ControllerLink>,
    ) -> Self {
        Self {
            inner: Arc::new(StreamInner {
                id: StreamId::next(),
                shim: shim.clone(),
                backing: Mutex::new(Backing { native, tags }),
                link,
            }),
        }
    }

    pub fn id(&self) -> StreamId {
        self.inner.id
    }

    pub fn locked(&self) -> bool {
        self.backing().native.locked()
    }

    /// 兼容层记录的源类型标签。
    pub fn stream_type(&self) -> StreamType {
        self.backing().tags.stream_type
    }

    pub fn mode(&self) -> ReaderMode {
        self.backing().tags.mode
    }

    /// 累计的重新派生次数。
    pub fn attempts(&self) -> u32 {
        self.backing().tags.attempts
    }

    /// 当前背后的宿主流；重新派生后与构造时不同。
    pub fn native(&self) -> Arc<dyn NativeStream> {
        Arc::clone(&self.backing().native)
    }

    fn backing(&self) -> Backing {
        self.inner.backing.lock().clone()
    }

    /// 获取 Reader；字节模式的构造失败会触发有界恢复。
    pub async fn get_reader(&self, options: ReaderOptions) -> Result<Reader> {
        let shim = &self.inner.shim;
        let acquired =
            acquire(shim.host(), &self.inner.backing, options.mode, shim.policy()).await?;
        if acquired.mode == ReaderMode::Byob {
            self.inner.link.mark_byte_mode();
        }
        let config = shim.config();
        Ok(Reader::new(ReaderParts {
            stream_id: self.inner.id,
            mode: acquired.mode,
            native: acquired.reader,
            native_byob: acquired.native_byob,
            link: Arc::clone(&self.inner.link),
            pending: Arc::clone(shim.pending()),
            spawner: shim.spawner(),
            log_throw_reasons: config.log_throw_reasons,
        }))
    }

    /// 取消流；已锁定时返回 [`StreamError::Locked`]。
    pub async fn cancel(&self, reason: Option<String>) -> Result<()> {
        let native = self.native();
        if native.locked() {
            return Err(StreamError::Locked);
        }
        native.cancel(reason).await
    }

    /// 迭代入口：首次调用获取并缓存默认 Reader，之后返回同一个 Reader。
    ///
    /// 缓存的 Reader 已释放锁时重新获取。获取失败原样返回给调用方。
    pub async fn async_iterator(&self) -> Result<Reader> {
        let readers = self.inner.shim.readers();
        if let Some(reader) = readers.active(self.inner.id) {
            return Ok(reader);
        }
        let reader = self.get_reader(ReaderOptions::default()).await?;
        readers.insert(self.inner.id, reader.clone());
        Ok(reader)
    }

    /// [`async_iterator`](Self::async_iterator) 的别名。
    pub async fn values(&self) -> Result<Reader> {
        self.async_iterator().await
    }
}

#[async_trait]
impl Terminable for ReadableStream {
    async fn cancel(&self, reason: Option<String>) -> Result<()> {
        ReadableStream::cancel(self, reason).await
    }
}

#[async_trait]
impl Terminable for StreamController {
    async fn close(&self) -> Result<()> {
        StreamController::close(self)
    }
}

impl fmt::Debug for ReadableStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadableStream")
            .field("id", &self.inner.id)
            .field("backing", &*self.inner.backing.lock())
            .finish()
    }
}
