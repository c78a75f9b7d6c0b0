use std::collections::HashMap;

use super::{DiskManager, PageId};
use crate::error::Result;

/// An in-memory disk manager, for tests and ephemeral pools. Page images
/// live in a map keyed by page id.
#[derive(Debug, Default)]
pub struct Memory {
    pages: HashMap<PageId, Vec<u8>>,
}

impl Memory {
    pub fn new() -> Memory {
        Memory { pages: HashMap::new() }
    }
}

impl DiskManager for Memory {
    fn read_page(&mut self, page_id: PageId, buf: &mut [u8]) -> Result<()> {
        super::check_page_buffer(buf)?;
        match self.pages.get(&page_id) {
            Some(image) => buf.copy_from_slice(image),
            // never written, the page reads as zeroes
            None => buf.fill(0),
        }
        Ok(())
    }

    fn write_page(&mut self, page_id: PageId, buf: &[u8]) -> Result<()> {
        super::check_page_buffer(buf)?;
        self.pages.insert(page_id, buf.to_vec());
        Ok(())
    }
}
