use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex};

use log::debug;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::storage::scheduler::{DiskData, DiskRequest, DiskScheduler};
use crate::storage::{new_disk_manager, DiskManager, PageId, INVALID_PAGE_ID};

use super::guard::{PageGuard, ReadPageGuard, WritePageGuard};
use super::page::{FrameId, Page};
use super::replacer::{Replacer, SyncLRUKReplacer};

/// The buffer pool is responsible for moving physical pages back and forth
/// from main memory to disk. It allows a DBMS to support databases that are
/// larger than the amount of memory available to the system.
///
/// The buffer pool's operations are transparent to other parts in the
/// system. For example, the system asks the buffer pool for a page using
/// its unique identifier (page_id) and it does not know whether that page
/// is already in memory or whether the system has to retrieve it from disk.
///
/// All disk traffic goes through the disk scheduler; every scheduled
/// request is awaited before the pool releases its references to the
/// frame's memory.
struct BufferPool {
    /// Disk scheduler owning the disk manager.
    scheduler: DiskScheduler,
    /// Array of buffer pool frames. The array index is the FrameId, i.e.,
    /// the FrameId is in range [0, pool_size).
    pages: Vec<Arc<Page>>,
    /// Page table for keeping track of buffer pool pages.
    page_table: HashMap<PageId, FrameId>,
    /// Frames that don't have any page on them, drained from the front.
    free_list: VecDeque<FrameId>,
    /// Replacer to find unpinned frames for replacement.
    replacer: Arc<dyn Replacer>,
    /// The next page id to be allocated.
    next_page_id: PageId,
}

impl BufferPool {
    fn new(disk: Box<dyn DiskManager>, pool_size: usize, replacer_k: usize) -> Self {
        let mut pages = Vec::with_capacity(pool_size);
        let mut free_list = VecDeque::with_capacity(pool_size);
        let page_table = HashMap::new();
        let replacer: Arc<dyn Replacer> = Arc::new(SyncLRUKReplacer::new(replacer_k, pool_size));
        for i in 0..pool_size {
            pages.push(Arc::new(Page::new()));
            // initially, every frame is in the free list
            free_list.push_back(i);
        }
        let scheduler = DiskScheduler::new(disk);
        BufferPool { scheduler, pages, page_table, free_list, replacer, next_page_id: 0 }
    }

    /// Pick a replacement frame, from the free list first and from the
    /// replacer otherwise. An evicted page is unlinked from the page table
    /// and written back if dirty; the frame's buffer is zeroed before it is
    /// handed out, so a new tenant always starts from zeroes.
    fn acquire_frame(&mut self) -> Result<FrameId> {
        if let Some(frame_id) = self.free_list.pop_front() {
            return Ok(frame_id);
        }

        let frame_id = match self.replacer.evict() {
            Some(frame_id) => frame_id,
            // every frame is in use and pinned
            None => return Err(Error::BufferPoolNoAvailableFrame),
        };

        let page = Arc::clone(&self.pages[frame_id]);
        let mut meta = page.meta();
        if meta.id != INVALID_PAGE_ID {
            debug!("evicting frame {} holding page {}", frame_id, meta.id);
            self.page_table.remove(&meta.id);
            if meta.is_dirty {
                // write the evicted page back before the frame is reused
                let (promise, completion) = self.scheduler.create_promise();
                let image = page.read().to_vec();
                self.scheduler.schedule(DiskRequest {
                    page_id: meta.id,
                    data: DiskData::Write(image),
                    callback: promise,
                })?;
                completion.recv()??;
            }
            meta.clear();
            page.write().reset();
        }
        Ok(frame_id)
    }

    /// Create a new page in the buffer pool, or fail with
    /// BufferPoolNoAvailableFrame if all frames are currently in use and
    /// not evictable (in other words, pinned).
    ///
    /// The new page starts out pinned once, clean, and zero-filled.
    fn new_page(&mut self) -> Result<Arc<Page>> {
        let frame_id = self.acquire_frame()?;
        let page_id = self.allocate_page();

        let page = Arc::clone(&self.pages[frame_id]);
        let mut meta = page.meta();
        meta.id = page_id;
        meta.pin_count = 1;
        meta.is_dirty = false;
        drop(meta);

        self.page_table.insert(page_id, frame_id);
        // pin the frame so the replacer wouldn't evict it before unpin
        self.replacer.record_access(frame_id);
        self.replacer.set_evictable(frame_id, false);

        Ok(page)
    }

    /// Fetch the requested page from the buffer pool, reading it from disk
    /// on a miss. Fails with BufferPoolNoAvailableFrame if the page is not
    /// resident and all frames are pinned.
    ///
    /// Every successful fetch pins the page once and must be paired with an
    /// unpin_page call.
    fn fetch_page(&mut self, page_id: PageId) -> Result<Arc<Page>> {
        if let Some(&frame_id) = self.page_table.get(&page_id) {
            let page = Arc::clone(&self.pages[frame_id]);
            page.meta().pin_count += 1;
            self.replacer.record_access(frame_id);
            self.replacer.set_evictable(frame_id, false);
            return Ok(page);
        }

        let frame_id = self.acquire_frame()?;
        let page = Arc::clone(&self.pages[frame_id]);

        // read the requested page into the frame. The frame is either fresh
        // from the free list or just evicted, no guard can hold its latch.
        let (promise, completion) = self.scheduler.create_promise();
        self.scheduler.schedule(DiskRequest {
            page_id,
            data: DiskData::Read(Arc::clone(page.data())),
            callback: promise,
        })?;
        completion.recv()??;

        let mut meta = page.meta();
        meta.id = page_id;
        meta.pin_count = 1;
        meta.is_dirty = false;
        drop(meta);

        self.page_table.insert(page_id, frame_id);
        self.replacer.record_access(frame_id);
        self.replacer.set_evictable(frame_id, false);

        Ok(page)
    }

    /// Unpin the target page. Returns false if the page is not resident or
    /// its pin count is already 0.
    ///
    /// The dirty flag is merged in and sticks until a flush or eviction
    /// clears it. When the pin count reaches 0 the frame becomes evictable.
    fn unpin_page(&mut self, page_id: PageId, is_dirty: bool) -> bool {
        let frame_id = self.page_table.get(&page_id);
        if frame_id.is_none() {
            return false;
        }
        let &frame_id = frame_id.unwrap();
        let page = &self.pages[frame_id];
        let mut meta = page.meta();
        if meta.pin_count == 0 {
            return false;
        }
        meta.is_dirty |= is_dirty;
        meta.pin_count -= 1;
        if meta.pin_count == 0 {
            self.replacer.set_evictable(frame_id, true);
        }
        true
    }

    /// Flush the target page to storage regardless of the dirty flag, then
    /// reset the in-memory buffer and unset the dirty flag. The page stays
    /// resident.
    ///
    /// Returns false if the page cannot be found in the page table, true
    /// otherwise.
    fn flush_page(&mut self, page_id: PageId) -> Result<bool> {
        let frame_id = self.page_table.get(&page_id);
        if frame_id.is_none() {
            return Ok(false);
        }
        let &frame_id = frame_id.unwrap();
        let page = &self.pages[frame_id];

        let (promise, completion) = self.scheduler.create_promise();
        let image = page.read().to_vec();
        self.scheduler.schedule(DiskRequest {
            page_id,
            data: DiskData::Write(image),
            callback: promise,
        })?;
        completion.recv()??;

        page.write().reset();
        page.meta().is_dirty = false;
        Ok(true)
    }

    /// Flush all resident pages to storage. All writes are submitted before
    /// any completion is awaited, so the disk scheduler is free to overlap
    /// them.
    fn flush_all_pages(&mut self) -> Result<()> {
        let mut pending = Vec::with_capacity(self.page_table.len());
        for (&page_id, &frame_id) in self.page_table.iter() {
            let page = &self.pages[frame_id];
            let (promise, completion) = self.scheduler.create_promise();
            let image = page.read().to_vec();
            self.scheduler.schedule(DiskRequest {
                page_id,
                data: DiskData::Write(image),
                callback: promise,
            })?;
            pending.push((frame_id, completion));
        }
        for (frame_id, completion) in pending {
            completion.recv()??;
            let page = &self.pages[frame_id];
            page.write().reset();
            page.meta().is_dirty = false;
        }
        Ok(())
    }

    /// Delete a page from the buffer pool. If the page is not resident, do
    /// nothing and return true. If the page is pinned, return false.
    ///
    /// The page is written back if dirty, unlinked from the page table and
    /// the replacer, and its frame is reset and returned to the free list.
    fn delete_page(&mut self, page_id: PageId) -> Result<bool> {
        let frame_id = self.page_table.get(&page_id);
        if frame_id.is_none() {
            return Ok(true);
        }
        let &frame_id = frame_id.unwrap();
        let page = Arc::clone(&self.pages[frame_id]);
        let mut meta = page.meta();
        if meta.pin_count > 0 {
            debug_assert!(!self.replacer.is_evictable(frame_id));
            return Ok(false);
        }
        debug!("deleting page {} from frame {}", page_id, frame_id);
        if meta.is_dirty {
            let (promise, completion) = self.scheduler.create_promise();
            let image = page.read().to_vec();
            self.scheduler.schedule(DiskRequest {
                page_id,
                data: DiskData::Write(image),
                callback: promise,
            })?;
            completion.recv()??;
        }

        self.page_table.remove(&page_id);
        self.replacer.remove(frame_id);
        meta.clear();
        page.write().reset();
        drop(meta);
        self.free_list.push_back(frame_id);
        self.deallocate_page(page_id);

        Ok(true)
    }

    fn allocate_page(&mut self) -> PageId {
        let page_id = self.next_page_id;
        self.next_page_id += 1;
        page_id
    }

    /// Deallocation is a no-op: there is no on-disk allocator to return the
    /// page to, and freed page ids are not reused within a process lifetime.
    fn deallocate_page(&mut self, _page_id: PageId) {}
}

/// Buffer pool manager wraps the buffer pool with a mutex for concurrent
/// access, basically all the heavy lifting happens in the buffer pool. The
/// manager is cheap to clone; page guards hold a clone to unpin on drop.
#[derive(Clone)]
pub struct BufferPoolManager {
    /// The actual buffer pool protected by a mutex latch.
    inner: Arc<Mutex<BufferPool>>,
}

impl BufferPoolManager {
    pub fn new(disk: Box<dyn DiskManager>, pool_size: usize, replacer_k: usize) -> Self {
        let inner = BufferPool::new(disk, pool_size, replacer_k);
        BufferPoolManager { inner: Arc::new(Mutex::new(inner)) }
    }

    /// Build a pool from configuration: storage engine, pool size, and
    /// replacer k.
    pub fn try_new(cfg: &Config) -> Result<Self> {
        let path = cfg.path.as_deref().map(Path::new);
        let disk = new_disk_manager(cfg.storage_type, path)?;
        Ok(BufferPoolManager::new(disk, cfg.pool_size, cfg.replacer_k))
    }

    /// Create a new pinned page in the buffer pool.
    pub fn new_page(&self) -> Result<Arc<Page>> {
        let mut inner = self.inner.lock()?;
        inner.new_page()
    }

    /// Fetch the requested page from the buffer pool, pinning it.
    pub fn fetch_page(&self, page_id: PageId) -> Result<Arc<Page>> {
        let mut inner = self.inner.lock()?;
        inner.fetch_page(page_id)
    }

    /// Unpin the target page, merging in the dirty flag. Returns false if
    /// the page is not resident or not pinned.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        // guards unpin from drop; a poisoned pool must not panic the unwind
        let mut inner = match self.inner.lock() {
            Ok(inner) => inner,
            Err(_) => return false,
        };
        inner.unpin_page(page_id, is_dirty)
    }

    /// Flush the target page to storage regardless of the dirty flag.
    pub fn flush_page(&self, page_id: PageId) -> Result<bool> {
        let mut inner = self.inner.lock()?;
        inner.flush_page(page_id)
    }

    /// Flush all resident pages to storage.
    pub fn flush_all_pages(&self) -> Result<()> {
        let mut inner = self.inner.lock()?;
        inner.flush_all_pages()
    }

    /// Delete an unpinned page from the buffer pool, returning its frame to
    /// the free list.
    pub fn delete_page(&self, page_id: PageId) -> Result<bool> {
        let mut inner = self.inner.lock()?;
        inner.delete_page(page_id)
    }

    /// Create a new page wrapped in a guard that unpins it on drop.
    pub fn new_page_guarded(&self) -> Result<PageGuard> {
        let page = self.new_page()?;
        Ok(PageGuard::new(self.clone(), page))
    }

    /// Fetch a page wrapped in a guard that unpins it on drop.
    pub fn fetch_page_basic(&self, page_id: PageId) -> Result<PageGuard> {
        let page = self.fetch_page(page_id)?;
        Ok(PageGuard::new(self.clone(), page))
    }

    /// Fetch a page and hold its frame's shared latch for the guard
    /// lifetime.
    pub fn fetch_page_read(&self, page_id: PageId) -> Result<ReadPageGuard> {
        Ok(self.fetch_page_basic(page_id)?.upgrade_read())
    }

    /// Fetch a page and hold its frame's exclusive latch for the guard
    /// lifetime.
    pub fn fetch_page_write(&self, page_id: PageId) -> Result<WritePageGuard> {
        Ok(self.fetch_page_basic(page_id)?.upgrade_write())
    }
}
