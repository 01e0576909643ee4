//! # byob 模块说明
//!
//! ## 角色定位（Why）
//! 生产端回调拿到的是 [`StreamController`]。在字节模式下，生产端需要通过
//! [`StreamController::byob_request`] 发现消费端提供的视图，直接写入调用方缓冲区，
//! 再以 [`ByobRequest::respond`] 或 [`ByobRequest::respond_with_new_view`] 交付。
//!
//! ## 契约要点（What）
//! - 没有登记视图且流未标记为字节模式时，`byob_request` 返回 `None`；
//! - 每次访问都会构造新的 [`ByobRequest`] 句柄，但同一读取周期共享一次性应答标记；
//! - 第二次应答返回 [`StreamError::AlreadyResponded`]。

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use parking_lot::Mutex;

use crate::{
    chunk::Chunk,
    error::{Result, StreamError},
    host::{ControllerId, NativeController},
    registry::{PendingView, PendingViews},
    view::ByteView,
};

/// 控制器与原生控制器、字节模式标记之间的桥。
///
/// 原生控制器在宿主第一次调用 `start`/`pull` 时才会出现，因此以 `Option` 保存。
pub(crate) struct ControllerLink {
    id: ControllerId,
    native: Mutex<Option<Arc<dyn NativeController>>>,
    byte_mode: AtomicBool,
}

impl ControllerLink {
    pub(crate) fn new(byte_mode: bool) -> Self {
        Self {
            id: ControllerId::next(),
            native: Mutex::new(None),
            byte_mode: AtomicBool::new(byte_mode),
        }
    }

    pub(crate) fn id(&self) -> ControllerId {
        self.id
    }

    pub(crate) fn attach(&self, native: Arc<dyn NativeController>) {
        *self.native.lock() = Some(native);
    }

    pub(crate) fn mark_byte_mode(&self) {
        self.byte_mode.store(true, Ordering::Release);
    }

    pub(crate) fn is_byte_mode(&self) -> bool {
        self.byte_mode.load(Ordering::Acquire)
    }

    fn native(&self) -> Result<Arc<dyn NativeController>> {
        self.native
            .lock()
            .clone()
            .ok_or_else(|| StreamError::invalid_state("controller is not attached to a stream yet"))
    }
}

/// 生产端控制器。
#[derive(Clone)]
pub struct StreamController {
    link: Arc<ControllerLink>,
    pending: Arc<PendingViews>,
}

impl StreamController {
    pub(crate) fn new(link: Arc<ControllerLink>, pending: Arc<PendingViews>) -> Self {
        Self { link, pending }
    }

    pub fn id(&self) -> ControllerId {
        self.link.id()
    }

    pub fn enqueue(&self, chunk: impl Into<Chunk>) -> Result<()> {
        self.link.native()?.enqueue(chunk.into())
    }

    pub fn close(&self) -> Result<()> {
        self.link.native()?.close()
    }

    pub fn error(&self, reason: impl Into<String>) -> Result<()> {
        self.link.native()?.error(reason.into());
        Ok(())
    }

    pub fn desired_size(&self) -> Option<i64> {
        self.link.native().ok()?.desired_size()
    }

    /// 当前读取周期的 BYOB 请求。
    pub fn byob_request(&self) -> Option<ByobRequest> {
        let cycle = match self.pending.get(self.id()) {
            Some(cycle) => cycle,
            None if self.link.is_byte_mode() => self.pending.get_or_insert_empty(self.id()),
            None => return None,
        };
        Some(ByobRequest {
            controller: self.clone(),
            cycle,
        })
    }
}

/// 对 (控制器, 待填充视图) 的一次性应答句柄。
pub struct ByobRequest {
    controller: StreamController,
    cycle: Arc<PendingView>,
}

impl ByobRequest {
    /// 待填充视图；应答之后为 `None`。
    pub fn view(&self) -> Option<ByteView> {
        if self.cycle.is_responded() {
            return None;
        }
        self.cycle.view().cloned()
    }

    /// 声明已向视图前 `bytes_written` 字节写入数据，并把这段前缀入队。
    pub fn respond(&self, bytes_written: usize) -> Result<()> {
        if self.cycle.is_responded() {
            return Err(StreamError::AlreadyResponded);
        }
        let view = self
            .cycle
            .view()
            .ok_or_else(|| StreamError::invalid_state("no pending view to respond to"))?;
        let filled = view.prefix(bytes_written)?;
        if !self.cycle.claim() {
            return Err(StreamError::AlreadyResponded);
        }
        self.controller.enqueue(filled)
    }

    /// 以另一个视图代替原缓冲区交付。
    pub fn respond_with_new_view(&self, view: ByteView) -> Result<()> {
        if !self.cycle.claim() {
            return Err(StreamError::AlreadyResponded);
        }
        self.controller.enqueue(view)
    }
}
