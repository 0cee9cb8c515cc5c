use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use log::{error, trace};

use crate::common::{Result, ShaleError, DISK_SCHEDULER_QUEUE_DEPTH, PAGE_SIZE};

use super::DiskManager;

/// A page I/O request for the background worker.
///
/// Buffers are owned: reads come back as a fresh `Bytes` image and writes hand
/// over a frozen copy, so no caller memory is shared with the worker thread.
pub enum DiskRequest {
    Read {
        page_no: u32,
        reply: Sender<Result<Bytes>>,
    },
    Write {
        page_no: u32,
        data: Bytes,
        reply: Sender<Result<()>>,
    },
}

/// DiskScheduler owns a background worker thread that performs all page I/O
/// for one table file. Requests are queued on a bounded channel and executed
/// in arrival order.
pub struct DiskScheduler {
    disk_manager: Arc<DiskManager>,
    request_sender: Sender<DiskRequest>,
    shutdown: Arc<AtomicBool>,
    worker_handle: Option<JoinHandle<()>>,
}

impl DiskScheduler {
    /// Creates a new DiskScheduler with the given DiskManager.
    /// Spawns a background worker thread to process requests.
    pub fn new(disk_manager: Arc<DiskManager>) -> Self {
        let (sender, receiver) = bounded::<DiskRequest>(DISK_SCHEDULER_QUEUE_DEPTH);
        let shutdown = Arc::new(AtomicBool::new(false));

        let dm_clone = Arc::clone(&disk_manager);
        let shutdown_clone = Arc::clone(&shutdown);

        let worker_handle = thread::spawn(move || {
            Self::start_worker_thread(dm_clone, receiver, shutdown_clone);
        });

        Self {
            disk_manager,
            request_sender: sender,
            shutdown,
            worker_handle: Some(worker_handle),
        }
    }

    /// Queues a request for the background worker.
    pub fn schedule(&self, request: DiskRequest) -> Result<()> {
        self.request_sender
            .send(request)
            .map_err(|e| ShaleError::DiskScheduler(format!("Failed to schedule request: {}", e)))
    }

    /// Reads page `page_no` and waits for the image.
    pub fn schedule_read_sync(&self, page_no: u32) -> Result<Bytes> {
        let (tx, rx) = bounded(1);
        self.schedule(DiskRequest::Read { page_no, reply: tx })?;

        rx.recv().map_err(|e| {
            ShaleError::DiskScheduler(format!("Failed to receive completion: {}", e))
        })?
    }

    /// Writes a full page image as page `page_no` and waits for completion.
    pub fn schedule_write_sync(&self, page_no: u32, data: Bytes) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE);

        let (tx, rx) = bounded(1);
        self.schedule(DiskRequest::Write {
            page_no,
            data,
            reply: tx,
        })?;

        rx.recv().map_err(|e| {
            ShaleError::DiskScheduler(format!("Failed to receive completion: {}", e))
        })?
    }

    /// Processes requests from the queue until shutdown is signaled.
    fn start_worker_thread(
        disk_manager: Arc<DiskManager>,
        receiver: Receiver<DiskRequest>,
        shutdown: Arc<AtomicBool>,
    ) {
        loop {
            if shutdown.load(Ordering::Relaxed) {
                // Drain remaining requests before exiting
                while let Ok(request) = receiver.try_recv() {
                    Self::process_request(&disk_manager, request);
                }
                break;
            }

            match receiver.recv_timeout(Duration::from_millis(100)) {
                Ok(request) => Self::process_request(&disk_manager, request),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
    }

    fn process_request(disk_manager: &DiskManager, request: DiskRequest) {
        match request {
            DiskRequest::Read { page_no, reply } => {
                let mut buf = BytesMut::zeroed(PAGE_SIZE);
                let result = disk_manager
                    .read_page(page_no, &mut buf)
                    .map(|_| buf.freeze());
                if let Err(e) = &result {
                    error!("read of page {} in {:?} failed: {}", page_no, disk_manager.path(), e);
                }
                trace!("read page {} from {:?}", page_no, disk_manager.path());
                let _ = reply.send(result);
            }
            DiskRequest::Write {
                page_no,
                data,
                reply,
            } => {
                let result = disk_manager.write_page(page_no, &data);
                if let Err(e) = &result {
                    error!("write of page {} in {:?} failed: {}", page_no, disk_manager.path(), e);
                }
                trace!("wrote page {} to {:?}", page_no, disk_manager.path());
                let _ = reply.send(result);
            }
        }
    }

    pub fn disk_manager(&self) -> &Arc<DiskManager> {
        &self.disk_manager
    }
}

impl Drop for DiskScheduler {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);

        if let Some(handle) = self.worker_handle.take() {
            let _ = handle.join();
        }
    }
}
