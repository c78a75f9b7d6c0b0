use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::RwLock;

use crate::buffer::page::PageData;
use crate::error::{Error, Result};

use super::{DiskManager, PageId};

/// Fulfilled by the scheduler's worker once the request's I/O completes.
pub type Promise = Sender<Result<()>>;

/// Awaited by the request issuer; yields the outcome of the I/O.
pub type Completion = Receiver<Result<()>>;

/// Payload of a disk request. Writes carry an owned copy of the frame
/// content; reads carry the shared frame buffer the worker fills in. The
/// issuer must await the completion before touching a read buffer.
pub enum DiskData {
    Write(Vec<u8>),
    Read(Arc<RwLock<PageData>>),
}

pub struct DiskRequest {
    pub page_id: PageId,
    pub data: DiskData,
    pub callback: Promise,
}

/// Accepts read and write requests against page ids and executes them on a
/// background worker that owns the disk manager. Each request completes
/// through a one-shot promise/completion pair created by `create_promise`.
pub struct DiskScheduler {
    queue: Option<Sender<DiskRequest>>,
    worker: Option<JoinHandle<()>>,
}

impl DiskScheduler {
    pub fn new(disk: Box<dyn DiskManager>) -> DiskScheduler {
        let (tx, rx) = mpsc::channel();
        let worker = thread::spawn(move || DiskScheduler::run(disk, rx));
        DiskScheduler { queue: Some(tx), worker: Some(worker) }
    }

    /// Create a one-shot promise/completion pair for a request.
    pub fn create_promise(&self) -> (Promise, Completion) {
        mpsc::channel()
    }

    /// Submit a request and return immediately. The completion associated
    /// with the request's promise yields once the worker performed the I/O.
    pub fn schedule(&self, request: DiskRequest) -> Result<()> {
        match &self.queue {
            Some(queue) => Ok(queue.send(request)?),
            None => Err(Error::internal("disk scheduler is shut down")),
        }
    }

    fn run(mut disk: Box<dyn DiskManager>, queue: Receiver<DiskRequest>) {
        while let Ok(request) = queue.recv() {
            let result = match request.data {
                DiskData::Write(image) => disk.write_page(request.page_id, &image),
                DiskData::Read(frame) => {
                    let mut guard = frame.write();
                    disk.read_page(request.page_id, &mut guard)
                }
            };
            // the issuer may have given up on the request, drop the outcome then
            let _ = request.callback.send(result);
        }
    }
}

impl Drop for DiskScheduler {
    fn drop(&mut self) {
        // closing the queue stops the worker loop
        self.queue.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::{memory::Memory, PAGE_SIZE};
    use super::*;

    #[test]
    fn test_schedule_write_then_read() -> Result<()> {
        let scheduler = DiskScheduler::new(Box::new(Memory::new()));

        let mut image = vec![0u8; PAGE_SIZE];
        image[..4].copy_from_slice(b"data");
        let (promise, completion) = scheduler.create_promise();
        scheduler.schedule(DiskRequest {
            page_id: 5,
            data: DiskData::Write(image.clone()),
            callback: promise,
        })?;
        completion.recv()??;

        let frame = Arc::new(RwLock::new(PageData::new()));
        let (promise, completion) = scheduler.create_promise();
        scheduler.schedule(DiskRequest {
            page_id: 5,
            data: DiskData::Read(Arc::clone(&frame)),
            callback: promise,
        })?;
        completion.recv()??;

        assert_eq!(image.as_slice(), &frame.read()[..]);
        Ok(())
    }
}
