use std::collections::VecDeque;

use crate::buffer::BufferPool;
use crate::common::{PageId, Permissions, Result, TransactionId};
use crate::tuple::Tuple;

use super::HeapFile;

/// Cursor over the tuples of one heap file.
///
/// Visits pages `0..num_pages` in order, fetching each read-only through the
/// buffer pool when the cursor reaches it, and yields the occupied slots of
/// that page in slot order. The page count is re-read at every page boundary,
/// so pages appended during the scan are visited too. Each cursor owns its
/// position; any number of cursors may scan the same file at once.
///
/// After an error the cursor yields `None` until it is rewound.
pub struct HeapFileIterator<'a> {
    file: &'a HeapFile,
    pool: &'a BufferPool,
    tid: TransactionId,
    next_page: u32,
    /// Tuples of the current page not yet returned
    pending: VecDeque<Tuple>,
    failed: bool,
}

impl<'a> HeapFileIterator<'a> {
    pub(crate) fn new(file: &'a HeapFile, pool: &'a BufferPool, tid: TransactionId) -> Self {
        Self {
            file,
            pool,
            tid,
            next_page: 0,
            pending: VecDeque::new(),
            failed: false,
        }
    }

    /// Restarts the scan from the first page.
    pub fn rewind(&mut self) {
        self.next_page = 0;
        self.pending.clear();
        self.failed = false;
    }

    fn load_next_page(&mut self) -> Result<bool> {
        if self.next_page >= self.file.num_pages()? {
            return Ok(false);
        }

        let page_id = PageId::new(self.file.table_id(), self.next_page);
        let page = self.pool.get_page(self.tid, page_id, Permissions::ReadOnly)?;
        self.pending.extend(page.read().tuples()?);
        self.next_page += 1;
        Ok(true)
    }
}

impl Iterator for HeapFileIterator<'_> {
    type Item = Result<Tuple>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }

        loop {
            if let Some(tuple) = self.pending.pop_front() {
                return Some(Ok(tuple));
            }
            match self.load_next_page() {
                Ok(true) => continue,
                Ok(false) => return None,
                Err(e) => {
                    self.failed = true;
                    return Some(Err(e));
                }
            }
        }
    }
}
