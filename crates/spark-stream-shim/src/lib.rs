//! # spark-stream-shim
//!
//! ## 定位与职责（Why）
//! - 为宿主提供的可读流原语补齐异步迭代协议、BYOB（自带缓冲区）读取与字节模式控制器桥接；
//! - 宿主在字节流上构造 BYOB Reader 失败时，经响应体往返重新派生流并有界重试，
//!   调用方只会看到成功的 Reader 或明确的获取错误。
//!
//! ## 架构嵌入（Where）
//! - `host` 模块定义宿主需要实现的原语契约，参考实现位于 `spark-stream-host`；
//! - `stream`/`reader`/`iter` 构成消费端表面；`byob` 构成生产端表面；
//! - `recovery` 负责获取策略与重新派生，`terminate` 负责尽力而为的终止序列；
//! - `registry` 保存以身份为键的侧表，`shim` 把配置、宿主与侧表聚合为显式上下文。
//!
//! ## Feature 策略（Trade-offs）
//! - `runtime-tokio`（默认）启用 [`TokioSpawner`]，`return`/`throw` 的后台终止优先派发到当前 Tokio 运行时；
//! - 关闭后只保留 [`ThreadSpawner`]，库本身不再依赖任何异步运行时。

/// 错误域与稳定错误码。
pub mod error;

/// 配置解析与校验。
pub mod config;

/// 共享缓冲区与带类型视图。
pub mod view;

/// 数据块、读取结果与 Reader 选项。
pub mod chunk;

/// 宿主原语契约。
pub mod host;

/// 后台任务派发。
pub mod runtime;

/// 尽力而为的终止序列。
pub mod terminate;

/// 以身份为键的侧表。
pub mod registry;

/// 生产端控制器与 BYOB 请求。
pub mod byob;

/// 构造失败后的有界恢复。
pub mod recovery;

/// 兼容层上下文。
pub mod shim;

/// 消费端流。
pub mod stream;

/// 带模式标签的 Reader 与 BYOB 仿真。
pub mod reader;

/// 迭代协议适配。
pub mod iter;

mod from;

pub use byob::{ByobRequest, StreamController};
pub use chunk::{Chunk, ReadResult, ReaderMode, ReaderOptions, StreamType};
pub use config::{ConfigError, ShimConfig};
pub use error::{ErrorKind, Result, StreamError};
pub use host::{
    ClosedState, ControllerId, HostCapabilities, NativeController, NativeHost, NativeReader,
    NativeSource, NativeStream, StreamId,
};
pub use iter::ReaderStream;
pub use reader::Reader;
pub use recovery::{AcquireStrategy, RecoveryPolicy, StreamTags};
pub use runtime::{DetachedSpawner, ThreadSpawner};
#[cfg(feature = "runtime-tokio")]
pub use runtime::TokioSpawner;
pub use shim::{Shim, ShimBuilder};
pub use stream::{ReadableStream, UnderlyingSource};
pub use terminate::{Terminable, terminate};
pub use view::{ArrayBuffer, ByteView, ViewKind};
