//! 后台任务派发。
//!
//! `return()`/`throw()` 需要立即返回，同时让终止序列在后台完成。兼容层不绑定具体执行器，
//! 而是通过 [`DetachedSpawner`] 把 future 交给调用方选择的运行时。

use std::{fmt, thread};

use futures::future::BoxFuture;

/// 派发“发出即忘”的后台任务。
pub trait DetachedSpawner: Send + Sync + 'static {
    fn spawn_detached(&self, task: BoxFuture<'static, ()>);
}

/// 每个任务一个线程，在线程内以 `block_on` 驱动。
///
/// 不依赖任何异步运行时，适合测试与同步调用方。
#[derive(Clone, Copy, Default)]
pub struct ThreadSpawner;

impl DetachedSpawner for ThreadSpawner {
    fn spawn_detached(&self, task: BoxFuture<'static, ()>) {
        let spawned = thread::Builder::new()
            .name("spark-stream-detached".into())
            .spawn(move || futures::executor::block_on(task));
        if let Err(err) = spawned {
            tracing::warn!(error = %err, "failed to spawn detached termination thread");
        }
    }
}

impl fmt::Debug for ThreadSpawner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ThreadSpawner")
    }
}

/// 优先派发到当前 Tokio 运行时；不在运行时上下文中时退回 [`ThreadSpawner`]。
#[cfg(feature = "runtime-tokio")]
#[derive(Clone, Copy, Debug, Default)]
pub struct TokioSpawner;

#[cfg(feature = "runtime-tokio")]
impl DetachedSpawner for TokioSpawner {
    fn spawn_detached(&self, task: BoxFuture<'static, ()>) {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                drop(handle.spawn(task));
            }
            Err(_) => ThreadSpawner.spawn_detached(task),
        }
    }
}

#[cfg(feature = "runtime-tokio")]
pub(crate) type DefaultSpawner = TokioSpawner;

#[cfg(not(feature = "runtime-tokio"))]
pub(crate) type DefaultSpawner = ThreadSpawner;
