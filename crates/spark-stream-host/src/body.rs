//! # body 模块说明
//!
//! ## 角色定位（Why）
//! 响应体是宿主保证“总能产出规范流”的中介：任何流包进 [`Response`] 后再取回 `body()`，
//! 得到的新流内容相同，且在引擎支持时为字节流。兼容层的构造失败恢复依赖这一点。
//!
//! ## 契约要点（What）
//! - 以流为 body 构造时立即锁定源流；
//! - `body()` 惰性构造并缓存，多次调用返回同一条流；
//! - body 流逐次拉取源流：字节块复制到新缓冲区，文本按 UTF-8 编码，其它块令 body 流出错；
//! - 源流结束或出错后释放源 Reader；源流的错误传入 body 流。

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use spark_stream_shim::{
    ByteView, Chunk, NativeController, NativeReader, NativeSource, NativeStream, ReaderMode,
    Result, StreamError,
};

use crate::engine::MemoryHost;

/// 响应或请求的 body 来源。
pub enum Body {
    Empty,
    Bytes(Bytes),
    Text(String),
    Stream(Arc<dyn NativeStream>),
}

enum Feed {
    Fixed(Mutex<Option<Bytes>>),
    Upstream(Arc<dyn NativeReader>),
}

/// 把 body 来源适配为宿主源。
struct BodySource {
    feed: Feed,
}

impl BodySource {
    fn release_upstream(&self) {
        if let Feed::Upstream(reader) = &self.feed {
            if let Err(err) = reader.release_lock() {
                tracing::trace!(error = %err, "upstream release skipped");
            }
        }
    }
}

#[async_trait]
impl NativeSource for BodySource {
    async fn start(&self, _controller: Arc<dyn NativeController>) -> Result<()> {
        Ok(())
    }

    async fn pull(&self, controller: Arc<dyn NativeController>) -> Result<()> {
        let reader = match &self.feed {
            Feed::Fixed(bytes) => {
                let next = bytes.lock().take();
                if let Some(bytes) = next.filter(|bytes| !bytes.is_empty()) {
                    controller.enqueue(Chunk::Bytes(ByteView::from_bytes(bytes)))?;
                }
                return controller.close();
            }
            Feed::Upstream(reader) => Arc::clone(reader),
        };
        let result = match reader.read().await {
            Ok(result) => result,
            Err(err) => {
                self.release_upstream();
                return Err(err);
            }
        };
        if result.done {
            self.release_upstream();
            return controller.close();
        }
        let bytes = match result.value {
            Some(Chunk::Bytes(view)) => view.to_vec(),
            Some(Chunk::Text(text)) => text.into_bytes(),
            Some(other) => {
                self.release_upstream();
                return Err(StreamError::NotBytes {
                    found: other.type_name(),
                });
            }
            None => return Ok(()),
        };
        controller.enqueue(Chunk::from(bytes))
    }

    async fn cancel(&self, reason: Option<String>) -> Result<()> {
        if let Feed::Upstream(reader) = &self.feed {
            reader.cancel(reason).await?;
            self.release_upstream();
        }
        Ok(())
    }
}

struct BodyHolder {
    stream: Option<Arc<dyn NativeStream>>,
}

impl BodyHolder {
    fn new(host: &MemoryHost, body: Body) -> Result<Self> {
        let feed = match body {
            Body::Empty => return Ok(Self { stream: None }),
            Body::Bytes(bytes) => Feed::Fixed(Mutex::new(Some(bytes))),
            Body::Text(text) => Feed::Fixed(Mutex::new(Some(Bytes::from(text.into_bytes())))),
            Body::Stream(stream) => Feed::Upstream(stream.get_reader(ReaderMode::Default)?),
        };
        let stream: Arc<dyn NativeStream> =
            host.construct_stream(Arc::new(BodySource { feed }), host.body_type())?;
        Ok(Self {
            stream: Some(stream),
        })
    }

    fn body(&self) -> Option<Arc<dyn NativeStream>> {
        self.stream.clone()
    }

    fn body_used(&self) -> bool {
        self.stream.as_ref().is_some_and(|stream| stream.locked())
    }
}

/// 响应对象。
pub struct Response {
    body: BodyHolder,
}

impl Response {
    /// 构造响应；以流为 body 时立即锁定该流。
    pub fn new(host: &MemoryHost, body: Body) -> Result<Self> {
        Ok(Self {
            body: BodyHolder::new(host, body)?,
        })
    }

    /// body 流；空 body 返回 `None`。
    pub fn body(&self) -> Option<Arc<dyn NativeStream>> {
        self.body.body()
    }

    /// body 流是否已被锁定。
    pub fn body_used(&self) -> bool {
        self.body.body_used()
    }
}

/// 请求对象；`GET`/`HEAD` 没有 body。
pub struct Request {
    method: String,
    body: BodyHolder,
}

impl Request {
    pub fn new(host: &MemoryHost, method: impl Into<String>, body: Body) -> Result<Self> {
        let method = method.into();
        let bodiless = method.eq_ignore_ascii_case("GET") || method.eq_ignore_ascii_case("HEAD");
        if bodiless && !matches!(body, Body::Empty) {
            return Err(StreamError::invalid_state(format!(
                "{method} request cannot carry a body"
            )));
        }
        Ok(Self {
            body: BodyHolder::new(host, body)?,
            method,
        })
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn body(&self) -> Option<Arc<dyn NativeStream>> {
        self.body.body()
    }

    pub fn body_used(&self) -> bool {
        self.body.body_used()
    }
}
