//! 由迭代器或异步流构造可读流。
//!
//! 构造出的流以拉取方式驱动：每次 `pull` 取一个元素入队，源耗尽时关闭流，
//! 元素为错误时令流进入错误态。

use std::{fmt::Display, pin::Pin};

use async_trait::async_trait;
use futures::{Stream, StreamExt, TryStream, TryStreamExt, lock::Mutex as AsyncMutex};
use parking_lot::Mutex;

use crate::{
    byob::StreamController,
    chunk::Chunk,
    error::{Result, StreamError},
    shim::Shim,
    stream::{ReadableStream, UnderlyingSource},
};

struct IterSource<I> {
    items: Mutex<Option<I>>,
}

#[async_trait]
impl<I> UnderlyingSource for IterSource<I>
where
    I: Iterator + Send + 'static,
    I::Item: Into<Chunk> + Send,
{
    async fn pull(&self, controller: &StreamController) -> Result<()> {
        let next = self.items.lock().as_mut().and_then(Iterator::next);
        match next {
            Some(item) => controller.enqueue(item),
            None => {
                self.items.lock().take();
                controller.close()
            }
        }
    }

    async fn cancel(&self, _reason: Option<String>) -> Result<()> {
        self.items.lock().take();
        Ok(())
    }
}

type BoxedTryStream<T, E> = Pin<Box<dyn Stream<Item = core::result::Result<T, E>> + Send>>;

struct TryStreamSource<T, E> {
    items: AsyncMutex<Option<BoxedTryStream<T, E>>>,
}

#[async_trait]
impl<T, E> UnderlyingSource for TryStreamSource<T, E>
where
    T: Into<Chunk> + Send + 'static,
    E: Display + Send + 'static,
{
    async fn pull(&self, controller: &StreamController) -> Result<()> {
        let mut items = self.items.lock().await;
        let next = match items.as_mut() {
            Some(stream) => stream.next().await,
            None => None,
        };
        match next {
            Some(Ok(item)) => controller.enqueue(item),
            Some(Err(err)) => {
                items.take();
                let reason = err.to_string();
                controller.error(reason.clone())?;
                Err(StreamError::errored(reason))
            }
            None => {
                items.take();
                controller.close()
            }
        }
    }

    async fn cancel(&self, _reason: Option<String>) -> Result<()> {
        self.items.lock().await.take();
        Ok(())
    }
}

impl ReadableStream {
    /// 依次产出迭代器的元素。
    pub fn from_iter<I>(shim: &Shim, items: I) -> Result<Self>
    where
        I: IntoIterator,
        I::IntoIter: Send + 'static,
        I::Item: Into<Chunk> + Send,
    {
        Self::new(
            shim,
            IterSource {
                items: Mutex::new(Some(items.into_iter())),
            },
        )
    }

    /// 依次产出异步流的元素。
    pub fn from_stream<S>(shim: &Shim, items: S) -> Result<Self>
    where
        S: Stream + Send + 'static,
        S::Item: Into<Chunk> + Send + 'static,
    {
        Self::from_try_stream(shim, items.map(Ok::<_, core::convert::Infallible>))
    }

    /// 依次产出异步流的元素，遇到 `Err` 时令流出错。
    pub fn from_try_stream<S>(shim: &Shim, items: S) -> Result<Self>
    where
        S: TryStream + Send + 'static,
        S::Ok: Into<Chunk> + Send + 'static,
        S::Error: Display + Send + 'static,
    {
        let boxed: BoxedTryStream<S::Ok, S::Error> = Box::pin(items.into_stream());
        Self::new(
            shim,
            TryStreamSource {
                items: AsyncMutex::new(Some(boxed)),
            },
        )
    }
}
