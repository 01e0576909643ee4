//! 迭代协议适配。
//!
//! Reader 本身就是单遍迭代器：`next` 委托 `read`，`r#return`/`throw` 在后台触发终止序列后
//! 立即报告完成，`async_dispose` 则等待终止序列结束。
//!
//! `r#return`/`throw` 返回时锁可能尚未释放，调用方只能依赖“最终会释放”；
//! 需要同步保证时使用 [`Reader::async_dispose`]。

use std::{
    pin::Pin,
    task::{Context, Poll, ready},
};

use futures::{FutureExt, Stream, future::BoxFuture};

use crate::{
    chunk::{Chunk, ReadResult},
    error::Result,
    host::ClosedState,
    reader::Reader,
    terminate::terminate,
};

impl Reader {
    /// 读取下一块，等价于 `read(None)`。
    pub async fn next(&self) -> Result<ReadResult> {
        self.read(None).await
    }

    /// Reader 是自身的迭代器。
    pub fn async_iterator(&self) -> Reader {
        self.clone()
    }

    /// 在后台终止 Reader 并立即报告完成，回显 `reason`。
    pub fn r#return(&self, reason: Option<String>) -> ReadResult {
        self.spawn_termination(reason.clone());
        ReadResult::finished(reason.map(Chunk::Text))
    }

    /// 与 [`r#return`](Self::r#return) 相同，另外记录 `reason`。
    pub fn throw(&self, reason: Option<String>) -> ReadResult {
        if self.log_throw_reasons() {
            tracing::error!(
                stream_id = self.stream_id().get(),
                reason = reason.as_deref().unwrap_or("<none>"),
                "stream iteration aborted by throw"
            );
        }
        self.r#return(reason)
    }

    /// 等待终止序列完成后返回观测到的终态。
    pub async fn async_dispose(&self, reason: Option<String>) -> Option<ClosedState> {
        terminate(self, reason).await
    }

    /// 转换为 [`futures::Stream`]。
    pub fn into_stream(self) -> ReaderStream {
        ReaderStream {
            reader: self,
            in_flight: None,
            finished: false,
        }
    }

    fn spawn_termination(&self, reason: Option<String>) {
        let reader = self.clone();
        self.spawner().spawn_detached(
            async move {
                let state = terminate(&reader, reason).await;
                tracing::trace!(state = ?state, "detached termination finished");
            }
            .boxed(),
        );
    }
}

/// 以 `futures::Stream` 形式消费 Reader。
///
/// - 流正常结束或出错时释放锁；
/// - 未结束就被丢弃时触发 [`Reader::r#return`]。
pub struct ReaderStream {
    reader: Reader,
    in_flight: Option<BoxFuture<'static, Result<ReadResult>>>,
    finished: bool,
}

impl ReaderStream {
    pub fn reader(&self) -> &Reader {
        &self.reader
    }

    fn finish(&mut self) {
        self.finished = true;
        self.in_flight = None;
        if let Err(err) = self.reader.release_lock() {
            tracing::trace!(code = err.code(), error = %err, "release after iteration skipped");
        }
    }
}

impl Stream for ReaderStream {
    type Item = Result<Chunk>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(None);
        }
        let reader = &this.reader;
        let read = this.in_flight.get_or_insert_with(|| {
            let reader = reader.clone();
            async move { reader.read(None).await }.boxed()
        });
        let outcome = ready!(read.poll_unpin(cx));
        this.in_flight = None;
        match outcome {
            Ok(ReadResult {
                done: false,
                value: Some(chunk),
            }) => Poll::Ready(Some(Ok(chunk))),
            Ok(ReadResult {
                done: false,
                value: None,
            }) => {
                cx.waker().wake_by_ref();
                Poll::Pending
            }
            Ok(_) => {
                this.finish();
                Poll::Ready(None)
            }
            Err(err) => {
                this.finish();
                Poll::Ready(Some(Err(err)))
            }
        }
    }
}

impl Drop for ReaderStream {
    fn drop(&mut self) {
        if !self.finished {
            self.in_flight = None;
            self.reader.r#return(None);
        }
    }
}
