//! # registry 模块说明
//!
//! 两张以身份为键的侧表：
//! - [`ReaderRegistry`]：流 → 迭代器复用的 Reader；
//! - [`PendingViews`]：控制器 → 当前读取周期的待填充视图。
//!
//! ## 生命周期约束
//! - 表项只在流或控制器被销毁时移除（见 `stream::StreamInner` 的 `Drop`），
//!   因此表的规模受存活流数量约束，与块数量无关；
//! - Reader 不持有流本身，所以表内的强引用不会形成环。

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use dashmap::DashMap;

use crate::{
    host::{ControllerId, StreamId},
    reader::Reader,
    view::ByteView,
};

/// 流到 Reader 的缓存。
#[derive(Default)]
pub struct ReaderRegistry {
    readers: DashMap<StreamId, Reader>,
}

impl ReaderRegistry {
    /// 返回仍持有锁的缓存 Reader；已释放的 Reader 视为不存在。
    pub fn active(&self, id: StreamId) -> Option<Reader> {
        self.readers
            .get(&id)
            .map(|entry| entry.value().clone())
            .filter(Reader::is_active)
    }

    pub fn insert(&self, id: StreamId, reader: Reader) {
        self.readers.insert(id, reader);
    }

    pub fn remove(&self, id: StreamId) {
        self.readers.remove(&id);
    }

    pub fn len(&self) -> usize {
        self.readers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readers.is_empty()
    }
}

/// 单个读取周期的待填充状态。
///
/// `responded` 是一次性标记：同一周期内第二次应答必然失败。
#[derive(Debug)]
pub struct PendingView {
    view: Option<ByteView>,
    responded: AtomicBool,
}

impl PendingView {
    fn new(view: Option<ByteView>) -> Self {
        Self {
            view,
            responded: AtomicBool::new(false),
        }
    }

    pub fn view(&self) -> Option<&ByteView> {
        self.view.as_ref()
    }

    pub fn is_responded(&self) -> bool {
        self.responded.load(Ordering::Acquire)
    }

    /// 原子地占用应答权；已被占用时返回 `false`。
    pub(crate) fn claim(&self) -> bool {
        self.responded
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// 控制器到待填充视图的侧表。
#[derive(Default)]
pub struct PendingViews {
    cycles: DashMap<ControllerId, Arc<PendingView>>,
}

impl PendingViews {
    /// 为新的读取周期登记视图，覆盖上一周期的状态。
    pub fn stash(&self, id: ControllerId, view: ByteView) -> Arc<PendingView> {
        let cycle = Arc::new(PendingView::new(Some(view)));
        self.cycles.insert(id, Arc::clone(&cycle));
        cycle
    }

    pub fn get(&self, id: ControllerId) -> Option<Arc<PendingView>> {
        self.cycles.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    /// 字节模式下没有登记视图时，建立一个空周期供多次访问共享应答标记。
    pub fn get_or_insert_empty(&self, id: ControllerId) -> Arc<PendingView> {
        Arc::clone(
            self.cycles
                .entry(id)
                .or_insert_with(|| Arc::new(PendingView::new(None)))
                .value(),
        )
    }

    pub fn clear(&self, id: ControllerId) {
        self.cycles.remove(&id);
    }

    pub fn len(&self) -> usize {
        self.cycles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cycles.is_empty()
    }
}

/// 在作用域结束时清除控制器的待填充视图，读取 future 被提前丢弃时同样生效。
pub(crate) struct StashGuard<'a> {
    table: &'a PendingViews,
    id: ControllerId,
}

impl<'a> StashGuard<'a> {
    pub(crate) fn new(table: &'a PendingViews, id: ControllerId, view: ByteView) -> Self {
        table.stash(id, view);
        Self { table, id }
    }
}

impl Drop for StashGuard<'_> {
    fn drop(&mut self) {
        self.table.clear(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stash_replaces_previous_cycle() {
        let table = PendingViews::default();
        let id = ControllerId::next();
        let first = table.stash(id, ByteView::with_capacity(4));
        assert!(first.claim());
        let second = table.stash(id, ByteView::with_capacity(8));
        assert!(!second.is_responded());
        assert_eq!(table.get(id).and_then(|c| c.view().map(ByteView::byte_length)), Some(8));
    }

    #[test]
    fn claim_is_one_shot() {
        let table = PendingViews::default();
        let cycle = table.get_or_insert_empty(ControllerId::next());
        assert!(cycle.view().is_none());
        assert!(cycle.claim());
        assert!(!cycle.claim());
    }

    #[test]
    fn guard_clears_on_drop() {
        let table = PendingViews::default();
        let id = ControllerId::next();
        {
            let _guard = StashGuard::new(&table, id, ByteView::with_capacity(2));
            assert_eq!(table.len(), 1);
        }
        assert!(table.is_empty());
    }
}
