//! 字节视图模型：共享底层缓冲区 + 带元素类型的窗口。
//!
//! BYOB 读取的核心约束是“结果视图与调用方提供的视图共享同一块底层缓冲区”，
//! 因此 [`ArrayBuffer`] 以 `Arc` 共享存储，[`ByteView`] 只记录窗口与元素类型。
//! 身份比较走 [`ArrayBuffer::same_buffer`]，内容比较走 `PartialEq`。

use std::{fmt, sync::Arc};

use bytes::Bytes;
use parking_lot::RwLock;

use crate::error::{Result, StreamError};

/// 可被多个视图共享的可变字节存储。
#[derive(Clone, Default)]
pub struct ArrayBuffer {
    storage: Arc<RwLock<Vec<u8>>>,
}

impl ArrayBuffer {
    /// 分配 `len` 字节的零填充缓冲区。
    pub fn new(len: usize) -> Self {
        Self::from_vec(vec![0; len])
    }

    /// 接管既有字节。
    pub fn from_vec(bytes: Vec<u8>) -> Self {
        Self {
            storage: Arc::new(RwLock::new(bytes)),
        }
    }

    pub fn byte_length(&self) -> usize {
        self.storage.read().len()
    }

    /// 两个句柄是否指向同一块存储。
    pub fn same_buffer(&self, other: &ArrayBuffer) -> bool {
        Arc::ptr_eq(&self.storage, &other.storage)
    }

    fn read_range(&self, offset: usize, len: usize) -> Vec<u8> {
        let guard = self.storage.read();
        guard[offset..offset + len].to_vec()
    }

    fn write_at(&self, offset: usize, src: &[u8]) {
        let mut guard = self.storage.write();
        guard[offset..offset + src.len()].copy_from_slice(src);
    }
}

impl fmt::Debug for ArrayBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArrayBuffer")
            .field("byte_length", &self.byte_length())
            .finish()
    }
}

/// 视图的元素类型族。
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ViewKind {
    Uint8,
    Uint8Clamped,
    Int8,
    Uint16,
    Int16,
    Uint32,
    Int32,
    Float32,
    Float64,
    BigInt64,
    BigUint64,
    DataView,
}

impl ViewKind {
    /// 每个元素占用的字节数；`DataView` 视为逐字节。
    pub const fn element_size(self) -> usize {
        match self {
            ViewKind::Uint8 | ViewKind::Uint8Clamped | ViewKind::Int8 | ViewKind::DataView => 1,
            ViewKind::Uint16 | ViewKind::Int16 => 2,
            ViewKind::Uint32 | ViewKind::Int32 | ViewKind::Float32 => 4,
            ViewKind::Float64 | ViewKind::BigInt64 | ViewKind::BigUint64 => 8,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            ViewKind::Uint8 => "Uint8Array",
            ViewKind::Uint8Clamped => "Uint8ClampedArray",
            ViewKind::Int8 => "Int8Array",
            ViewKind::Uint16 => "Uint16Array",
            ViewKind::Int16 => "Int16Array",
            ViewKind::Uint32 => "Uint32Array",
            ViewKind::Int32 => "Int32Array",
            ViewKind::Float32 => "Float32Array",
            ViewKind::Float64 => "Float64Array",
            ViewKind::BigInt64 => "BigInt64Array",
            ViewKind::BigUint64 => "BigUint64Array",
            ViewKind::DataView => "DataView",
        }
    }
}

/// 共享缓冲区上的一个带类型窗口。
///
/// # 契约说明（What）
/// - `byte_offset` 与 `byte_length` 均按元素宽度对齐，且窗口完全落在缓冲区内；
/// - 克隆视图只复制句柄，写入通过任一克隆对其它克隆可见；
/// - [`ByteView::prefix`] 与 [`ByteView::same_family`] 产生的新视图保持元素类型与底层缓冲区不变。
#[derive(Clone)]
pub struct ByteView {
    kind: ViewKind,
    buffer: ArrayBuffer,
    byte_offset: usize,
    byte_length: usize,
}

impl ByteView {
    /// 在既有缓冲区上建立视图，校验越界与对齐。
    pub fn new(
        kind: ViewKind,
        buffer: ArrayBuffer,
        byte_offset: usize,
        byte_length: usize,
    ) -> Result<Self> {
        let element = kind.element_size();
        if byte_offset % element != 0 || byte_length % element != 0 {
            return Err(StreamError::range(format!(
                "{} window {byte_offset}+{byte_length} is not aligned to {element} bytes",
                kind.name()
            )));
        }
        let end = byte_offset
            .checked_add(byte_length)
            .ok_or_else(|| StreamError::range("view window overflows usize"))?;
        if end > buffer.byte_length() {
            return Err(StreamError::range(format!(
                "view window ends at {end} but buffer holds {} bytes",
                buffer.byte_length()
            )));
        }
        Ok(Self {
            kind,
            buffer,
            byte_offset,
            byte_length,
        })
    }

    /// 分配一块新缓冲区并覆盖整个缓冲区建立 `Uint8` 视图。
    pub fn with_capacity(len: usize) -> Self {
        Self {
            kind: ViewKind::Uint8,
            buffer: ArrayBuffer::new(len),
            byte_offset: 0,
            byte_length: len,
        }
    }

    pub fn from_slice(bytes: &[u8]) -> Self {
        Self::from_vec(bytes.to_vec())
    }

    pub fn from_vec(bytes: Vec<u8>) -> Self {
        let len = bytes.len();
        Self {
            kind: ViewKind::Uint8,
            buffer: ArrayBuffer::from_vec(bytes),
            byte_offset: 0,
            byte_length: len,
        }
    }

    pub fn from_bytes(bytes: Bytes) -> Self {
        Self::from_vec(bytes.to_vec())
    }

    pub fn kind(&self) -> ViewKind {
        self.kind
    }

    pub fn buffer(&self) -> &ArrayBuffer {
        &self.buffer
    }

    pub fn byte_offset(&self) -> usize {
        self.byte_offset
    }

    pub fn byte_length(&self) -> usize {
        self.byte_length
    }

    pub fn is_empty(&self) -> bool {
        self.byte_length == 0
    }

    /// 复制窗口内容。
    pub fn to_vec(&self) -> Vec<u8> {
        self.buffer.read_range(self.byte_offset, self.byte_length)
    }

    pub fn to_bytes(&self) -> Bytes {
        Bytes::from(self.to_vec())
    }

    /// 在窗口内偏移 `offset` 处写入 `src`。
    pub fn write(&self, offset: usize, src: &[u8]) -> Result<()> {
        let end = offset
            .checked_add(src.len())
            .ok_or_else(|| StreamError::range("write overflows usize"))?;
        if end > self.byte_length {
            return Err(StreamError::range(format!(
                "write of {} bytes at {offset} exceeds view length {}",
                src.len(),
                self.byte_length
            )));
        }
        self.buffer.write_at(self.byte_offset + offset, src);
        Ok(())
    }

    /// 从窗口起点写入 `src` 的前缀，返回实际写入的字节数。
    ///
    /// 写入量取 `src` 与窗口长度的较小值，再向下取整到元素宽度；
    /// 剩余字节由调用方决定如何处理。
    pub fn fill_prefix(&self, src: &[u8]) -> usize {
        let element = self.kind.element_size();
        let n = src.len().min(self.byte_length);
        let n = n - n % element;
        if n > 0 {
            self.buffer.write_at(self.byte_offset, &src[..n]);
        }
        n
    }

    /// 同类型、同缓冲区上的另一个窗口。
    pub fn same_family(&self, byte_offset: usize, byte_length: usize) -> Result<Self> {
        Self::new(self.kind, self.buffer.clone(), byte_offset, byte_length)
    }

    /// 截取窗口的前 `n` 字节。
    pub fn prefix(&self, n: usize) -> Result<Self> {
        if n > self.byte_length {
            return Err(StreamError::range(format!(
                "prefix of {n} bytes exceeds view length {}",
                self.byte_length
            )));
        }
        self.same_family(self.byte_offset, n)
    }
}

impl PartialEq for ByteView {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.to_vec() == other.to_vec()
    }
}

impl fmt::Debug for ByteView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ByteView")
            .field("kind", &self.kind.name())
            .field("byte_offset", &self.byte_offset)
            .field("byte_length", &self.byte_length)
            .field("bytes", &self.to_vec())
            .finish()
    }
}
