use std::sync::Arc;

use parking_lot::lock_api::{ArcRwLockReadGuard, ArcRwLockWriteGuard};
use parking_lot::{RawRwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::storage::PageId;

use super::bufferpool::BufferPoolManager;
use super::page::{Page, PageData};

type ReadLatch = ArcRwLockReadGuard<RawRwLock, PageData>;
type WriteLatch = ArcRwLockWriteGuard<RawRwLock, PageData>;

/// A scoped pin on a buffer pool page. Dropping the guard unpins the page,
/// reporting whether this guard wrote to it. Guards are move-only; two
/// guards never own the same pin, and a guard disarmed by an upgrade drops
/// without unpinning.
pub struct PageGuard {
    bpm: Option<BufferPoolManager>,
    page: Option<Arc<Page>>,
    is_dirty: bool,
}

impl PageGuard {
    pub(crate) fn new(bpm: BufferPoolManager, page: Arc<Page>) -> PageGuard {
        PageGuard { bpm: Some(bpm), page: Some(page), is_dirty: false }
    }

    /// Id of the guarded page.
    pub fn page_id(&self) -> PageId {
        self.page().id()
    }

    /// Lock the page content for reading.
    pub fn read(&self) -> RwLockReadGuard<'_, PageData> {
        self.page().read()
    }

    /// Lock the page content for writing and mark the guard dirty.
    pub fn write(&mut self) -> RwLockWriteGuard<'_, PageData> {
        self.is_dirty = true;
        self.page().write()
    }

    /// Trade the pin into a guard holding the frame's shared latch. The pin
    /// transfers, this guard becomes inert without unpinning.
    pub fn upgrade_read(mut self) -> ReadPageGuard {
        let is_dirty = self.is_dirty;
        let (bpm, page) = self.disarm();
        let latch = page.data().read_arc();
        let guard = PageGuard { bpm: Some(bpm), page: Some(page), is_dirty };
        ReadPageGuard { guard, latch: Some(latch) }
    }

    /// Trade the pin into a guard holding the frame's exclusive latch. The
    /// pin transfers, this guard becomes inert without unpinning.
    pub fn upgrade_write(mut self) -> WritePageGuard {
        let is_dirty = self.is_dirty;
        let (bpm, page) = self.disarm();
        let latch = page.data().write_arc();
        let guard = PageGuard { bpm: Some(bpm), page: Some(page), is_dirty };
        WritePageGuard { guard, latch: Some(latch) }
    }

    fn page(&self) -> &Arc<Page> {
        // present from construction until drop or upgrade
        self.page.as_ref().expect("page guard is inert")
    }

    fn disarm(&mut self) -> (BufferPoolManager, Arc<Page>) {
        let bpm = self.bpm.take().expect("page guard is inert");
        let page = self.page.take().expect("page guard is inert");
        (bpm, page)
    }
}

impl Drop for PageGuard {
    fn drop(&mut self) {
        if let (Some(bpm), Some(page)) = (self.bpm.take(), self.page.take()) {
            bpm.unpin_page(page.id(), self.is_dirty);
        }
    }
}

/// A pinned page whose frame shared latch is held for the guard lifetime.
/// Dropping releases the latch, then unpins.
pub struct ReadPageGuard {
    guard: PageGuard,
    latch: Option<ReadLatch>,
}

impl ReadPageGuard {
    pub fn page_id(&self) -> PageId {
        self.guard.page_id()
    }

    /// The page content. No locking, the latch is already held.
    pub fn data(&self) -> &PageData {
        // held from construction until drop
        self.latch.as_ref().expect("read guard is inert")
    }
}

impl Drop for ReadPageGuard {
    fn drop(&mut self) {
        // release the shared latch before the inner guard unpins
        self.latch.take();
    }
}

/// A pinned page whose frame exclusive latch is held for the guard
/// lifetime. Dropping marks the page dirty, releases the latch, then
/// unpins.
pub struct WritePageGuard {
    guard: PageGuard,
    latch: Option<WriteLatch>,
}

impl WritePageGuard {
    pub fn page_id(&self) -> PageId {
        self.guard.page_id()
    }

    /// The page content. No locking, the latch is already held.
    pub fn data(&self) -> &PageData {
        self.latch.as_ref().expect("write guard is inert")
    }

    /// Mutable page content. No locking, the latch is already held.
    pub fn data_mut(&mut self) -> &mut PageData {
        self.latch.as_mut().expect("write guard is inert")
    }
}

impl Drop for WritePageGuard {
    fn drop(&mut self) {
        // holding the exclusive latch means the content must be assumed
        // modified
        self.guard.is_dirty = true;
        self.latch.take();
    }
}
