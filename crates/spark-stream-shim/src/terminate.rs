//! # terminate 模块说明
//!
//! ## 角色定位（Why）
//! 迭代器的 `return`/`throw`/`async_dispose` 都需要“尽力而为”地终止底层对象。
//! 目标可能是 Reader、流或控制器，它们各自只支持终止序列中的一部分步骤。
//!
//! ## 契约要点（What）
//! - 按固定顺序尝试 `cancel(reason)` → `close()` → `release_lock()`；
//! - 每一步独立执行，任一步失败（包括不支持）都不会阻止后续步骤；
//! - 最后观测一次 `closed()`，失败时返回 `None`；
//! - 本函数本身永不失败。

use async_trait::async_trait;

use crate::{
    error::{Result, StreamError},
    host::ClosedState,
};

/// 可被终止序列处理的对象。
///
/// 默认实现均返回 [`StreamError::Unsupported`]，实现方只覆盖自己真正支持的步骤。
#[async_trait]
pub trait Terminable: Send + Sync {
    async fn cancel(&self, reason: Option<String>) -> Result<()> {
        let _ = reason;
        Err(StreamError::Unsupported {
            operation: "cancel",
        })
    }

    async fn close(&self) -> Result<()> {
        Err(StreamError::Unsupported { operation: "close" })
    }

    fn release_lock(&self) -> Result<()> {
        Err(StreamError::Unsupported {
            operation: "release_lock",
        })
    }

    async fn closed(&self) -> Result<ClosedState> {
        Err(StreamError::Unsupported {
            operation: "closed",
        })
    }
}

/// 依次执行终止步骤并吞掉所有失败。
pub async fn terminate<T>(target: &T, reason: Option<String>) -> Option<ClosedState>
where
    T: Terminable + ?Sized,
{
    if let Err(err) = target.cancel(reason).await {
        skipped("cancel", &err);
    }
    if let Err(err) = target.close().await {
        skipped("close", &err);
    }
    if let Err(err) = target.release_lock() {
        skipped("release_lock", &err);
    }
    target.closed().await.ok()
}

fn skipped(step: &'static str, err: &StreamError) {
    tracing::trace!(step, code = err.code(), error = %err, "termination step skipped");
}
