use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::storage::{PageId, INVALID_PAGE_ID, PAGE_SIZE};

/// Index of a frame slot in the buffer pool, in `[0, pool_size)`.
pub type FrameId = usize;

/// In-memory bookkeeping of a frame: which page is resident, how many
/// clients pinned it, and whether its content diverged from storage.
/// Only mutated by pool code that holds the pool latch.
#[derive(Debug)]
pub struct FrameMeta {
    pub id: PageId,
    pub pin_count: u32,
    pub is_dirty: bool,
}

impl FrameMeta {
    fn new() -> FrameMeta {
        FrameMeta { id: INVALID_PAGE_ID, pin_count: 0, is_dirty: false }
    }

    pub(crate) fn clear(&mut self) {
        self.id = INVALID_PAGE_ID;
        self.pin_count = 0;
        self.is_dirty = false;
    }
}

/// The fixed-size byte buffer of a frame. The buffer is reused across many
/// page residencies; `reset` zeroes it before a new tenant moves in.
pub struct PageData {
    bytes: Vec<u8>,
}

impl PageData {
    pub fn new() -> PageData {
        PageData { bytes: vec![0; PAGE_SIZE] }
    }

    pub fn reset(&mut self) {
        self.bytes.fill(0);
    }
}

impl Default for PageData {
    fn default() -> PageData {
        PageData::new()
    }
}

impl Deref for PageData {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.bytes
    }
}

impl DerefMut for PageData {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }
}

/// A buffer pool frame: metadata plus the page buffer. The buffer's RwLock
/// doubles as the per-frame reader-writer latch that read and write guards
/// hold; the pool itself only takes it for the duration of a copy or reset,
/// never across a public call.
pub struct Page {
    meta: Mutex<FrameMeta>,
    data: Arc<RwLock<PageData>>,
}

impl Page {
    pub fn new() -> Page {
        Page { meta: Mutex::new(FrameMeta::new()), data: Arc::new(RwLock::new(PageData::new())) }
    }

    /// Id of the resident page, INVALID_PAGE_ID when the frame is empty.
    pub fn id(&self) -> PageId {
        self.meta.lock().id
    }

    pub fn pin_count(&self) -> u32 {
        self.meta.lock().pin_count
    }

    pub fn is_dirty(&self) -> bool {
        self.meta.lock().is_dirty
    }

    pub(crate) fn meta(&self) -> MutexGuard<'_, FrameMeta> {
        self.meta.lock()
    }

    /// Shared handle to the frame buffer, for guards and scheduled reads.
    pub(crate) fn data(&self) -> &Arc<RwLock<PageData>> {
        &self.data
    }

    /// Lock the page content for reading.
    pub fn read(&self) -> RwLockReadGuard<'_, PageData> {
        self.data.read()
    }

    /// Lock the page content for writing. The caller is responsible for
    /// reporting the modification through `unpin_page` or a guard.
    pub fn write(&self) -> RwLockWriteGuard<'_, PageData> {
        self.data.write()
    }
}

impl Default for Page {
    fn default() -> Page {
        Page::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_frame_is_empty_and_zeroed() {
        let page = Page::new();
        assert_eq!(INVALID_PAGE_ID, page.id());
        assert_eq!(0, page.pin_count());
        assert!(!page.is_dirty());
        assert_eq!(PAGE_SIZE, page.read().len());
        assert!(page.read().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_reset_zeroes_buffer() {
        let page = Page::new();
        page.write()[..4].copy_from_slice(b"junk");
        page.write().reset();
        assert!(page.read().iter().all(|&b| b == 0));
    }
}
