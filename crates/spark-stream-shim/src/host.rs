//! # host 模块说明
//!
//! ## 角色定位（Why）
//! 兼容层不自己实现流引擎，而是包裹宿主提供的原生原语。本模块定义宿主需要满足的最小契约：
//! 构造流、获取 Reader、控制器入队，以及“通过响应体物化”重新派生一条流。
//!
//! ## 契约要点（What）
//! - 所有 trait 对象均为 `Send + Sync`，可在任意执行器上被持有；
//! - 原生 Reader 的 [`NativeReader::read_into`] 默认返回 `Unsupported`，
//!   只有声明 `native_byob` 的宿主才会被调用该方法；
//! - [`NativeHost::materialize`] 必须返回一条与原流内容一致的**新**流，
//!   原流在调用后处于锁定状态。

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use async_trait::async_trait;

use crate::{
    chunk::{Chunk, ReadResult, ReaderMode, StreamType},
    error::{Result, StreamError},
    view::ByteView,
};

static NEXT_STREAM_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_CONTROLLER_ID: AtomicU64 = AtomicU64::new(1);

/// 兼容层内部为每条流分配的身份，用作侧表键。
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct StreamId(u64);

impl StreamId {
    pub(crate) fn next() -> Self {
        Self(NEXT_STREAM_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

/// 控制器身份，用作待填充视图侧表的键。
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct ControllerId(u64);

impl ControllerId {
    pub(crate) fn next() -> Self {
        Self(NEXT_CONTROLLER_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

/// `closed()` 观测到的终态。
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ClosedState {
    Closed,
    Cancelled,
}

/// 宿主能力声明。
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct HostCapabilities {
    /// 是否能在字节流上构造原生 BYOB Reader。
    pub native_byob: bool,
    /// 是否支持 `type: "bytes"` 的源。
    pub byte_streams: bool,
}

/// 原生控制器：生产端向流内推送数据的句柄。
pub trait NativeController: Send + Sync {
    fn enqueue(&self, chunk: Chunk) -> Result<()>;

    fn close(&self) -> Result<()>;

    fn error(&self, reason: String);

    /// 队列剩余容量；流进入终态后为 `None`。
    fn desired_size(&self) -> Option<i64>;
}

/// 宿主在构造流时接收的底层源。
#[async_trait]
pub trait NativeSource: Send + Sync {
    async fn start(&self, controller: Arc<dyn NativeController>) -> Result<()>;

    async fn pull(&self, controller: Arc<dyn NativeController>) -> Result<()>;

    async fn cancel(&self, reason: Option<String>) -> Result<()>;
}

/// 原生 Reader。
#[async_trait]
pub trait NativeReader: Send + Sync {
    async fn read(&self) -> Result<ReadResult>;

    /// 原生 BYOB 读取：把数据写入 `view` 并返回共享同一缓冲区的结果视图。
    async fn read_into(&self, view: ByteView) -> Result<ReadResult> {
        let _ = view;
        Err(StreamError::Unsupported {
            operation: "read_into",
        })
    }

    async fn cancel(&self, reason: Option<String>) -> Result<()>;

    fn release_lock(&self) -> Result<()>;

    /// 是否仍持有流的锁。
    fn is_active(&self) -> bool;

    async fn closed(&self) -> Result<ClosedState>;
}

/// 原生流。
#[async_trait]
pub trait NativeStream: Send + Sync {
    fn stream_type(&self) -> StreamType;

    fn locked(&self) -> bool;

    fn get_reader(&self, mode: ReaderMode) -> Result<Arc<dyn NativeReader>>;

    async fn cancel(&self, reason: Option<String>) -> Result<()>;
}

/// 宿主引擎入口。
#[async_trait]
pub trait NativeHost: Send + Sync {
    fn capabilities(&self) -> HostCapabilities;

    /// 以给定源与类型构造原生流。
    fn construct(
        &self,
        source: Arc<dyn NativeSource>,
        stream_type: StreamType,
    ) -> Result<Arc<dyn NativeStream>>;

    /// 把流包进响应体再取回其 body，得到一条内容相同的新流。
    async fn materialize(&self, stream: Arc<dyn NativeStream>) -> Result<Arc<dyn NativeStream>>;
}
