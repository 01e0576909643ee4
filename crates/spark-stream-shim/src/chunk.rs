//! 读取结果与 Reader 选项。

use bytes::Bytes;

use crate::{
    error::{Result, StreamError},
    view::ByteView,
};

/// 流中传递的单个数据块。
///
/// 字节模式的流只接受 [`Chunk::Bytes`]；默认模式的流可以承载任意变体。
#[derive(Clone, Debug, PartialEq)]
pub enum Chunk {
    Bytes(ByteView),
    Text(String),
    Integer(i64),
}

impl Chunk {
    /// 诊断用类型名。
    pub fn type_name(&self) -> &'static str {
        match self {
            Chunk::Bytes(view) => view.kind().name(),
            Chunk::Text(_) => "string",
            Chunk::Integer(_) => "number",
        }
    }

    pub fn as_view(&self) -> Option<&ByteView> {
        match self {
            Chunk::Bytes(view) => Some(view),
            _ => None,
        }
    }

    /// 复制字节内容；非字节块返回 [`StreamError::NotBytes`]。
    pub fn to_byte_vec(&self) -> Result<Vec<u8>> {
        match self {
            Chunk::Bytes(view) => Ok(view.to_vec()),
            other => Err(StreamError::NotBytes {
                found: other.type_name(),
            }),
        }
    }
}

impl From<ByteView> for Chunk {
    fn from(view: ByteView) -> Self {
        Chunk::Bytes(view)
    }
}

impl From<Bytes> for Chunk {
    fn from(bytes: Bytes) -> Self {
        Chunk::Bytes(ByteView::from_bytes(bytes))
    }
}

impl From<Vec<u8>> for Chunk {
    fn from(bytes: Vec<u8>) -> Self {
        Chunk::Bytes(ByteView::from_vec(bytes))
    }
}

impl From<&[u8]> for Chunk {
    fn from(bytes: &[u8]) -> Self {
        Chunk::Bytes(ByteView::from_slice(bytes))
    }
}

impl From<String> for Chunk {
    fn from(text: String) -> Self {
        Chunk::Text(text)
    }
}

impl From<&str> for Chunk {
    fn from(text: &str) -> Self {
        Chunk::Text(text.to_owned())
    }
}

impl From<i64> for Chunk {
    fn from(value: i64) -> Self {
        Chunk::Integer(value)
    }
}

/// 一次读取的结果。
///
/// `done == true` 时 `value` 可能仍携带内容：BYOB 读取在流结束时会交回调用方的视图，
/// `return`/`throw` 会回显传入的原因。
#[derive(Clone, Debug, PartialEq)]
pub struct ReadResult {
    pub value: Option<Chunk>,
    pub done: bool,
}

impl ReadResult {
    pub fn chunk(value: impl Into<Chunk>) -> Self {
        Self {
            value: Some(value.into()),
            done: false,
        }
    }

    pub fn done() -> Self {
        Self {
            value: None,
            done: true,
        }
    }

    /// 结束标记，附带一个回显值。
    pub fn finished(value: Option<Chunk>) -> Self {
        Self { value, done: true }
    }

    pub fn into_chunk(self) -> Option<Chunk> {
        self.value
    }
}

/// Reader 的读取模式，在构造时确定且不可更改。
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub enum ReaderMode {
    #[default]
    Default,
    Byob,
}

/// 流的源类型。
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub enum StreamType {
    #[default]
    Default,
    Bytes,
}

/// `get_reader` 的选项。
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ReaderOptions {
    pub mode: ReaderMode,
}

impl ReaderOptions {
    pub fn byob() -> Self {
        Self {
            mode: ReaderMode::Byob,
        }
    }
}
