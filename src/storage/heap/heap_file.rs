use std::path::Path;
use std::sync::Arc;

use log::debug;
use parking_lot::Mutex;

use crate::buffer::{BufferPool, PageRef};
use crate::common::{PageId, Permissions, Result, ShaleError, TableId, TransactionId, PAGE_SIZE};
use crate::storage::disk::{DiskManager, DiskScheduler};
use crate::storage::page::{slots_per_page, HeapPage};
use crate::tuple::{Schema, Tuple};

use super::HeapFileIterator;

/// An unordered collection of fixed-width tuples stored in one file.
///
/// Page `n` of the table occupies bytes `[n * PAGE_SIZE, (n + 1) * PAGE_SIZE)`.
/// The file itself knows nothing about caching or locking: tuple operations
/// take the buffer pool as a parameter and fetch every page they touch
/// through it.
pub struct HeapFile {
    table_id: TableId,
    schema: Arc<Schema>,
    disk_scheduler: DiskScheduler,
    /// Serializes appends so concurrent inserts never claim the same page number
    append_lock: Mutex<()>,
}

impl HeapFile {
    /// Opens the table file at `path`, creating an empty one if needed.
    /// Fails with `TupleTooLarge` if a page cannot hold one tuple of `schema`.
    pub fn open<P: AsRef<Path>>(table_id: TableId, path: P, schema: Arc<Schema>) -> Result<Self> {
        if slots_per_page(schema.tuple_size()) == 0 {
            return Err(ShaleError::TupleTooLarge {
                tuple_size: schema.tuple_size(),
            });
        }

        let disk_manager = Arc::new(DiskManager::new(path)?);
        Ok(Self {
            table_id,
            schema,
            disk_scheduler: DiskScheduler::new(disk_manager),
            append_lock: Mutex::new(()),
        })
    }

    pub fn table_id(&self) -> TableId {
        self.table_id
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Returns the underlying disk manager, whose counters record real I/O.
    pub fn disk_manager(&self) -> &Arc<DiskManager> {
        self.disk_scheduler.disk_manager()
    }

    /// Reads a page straight from disk, bypassing the buffer pool.
    /// A trailing partial page reads zero-padded; a page past the end fails
    /// with an I/O error.
    pub fn read_page(&self, page_id: PageId) -> Result<HeapPage> {
        debug_assert_eq!(page_id.table_id, self.table_id);
        let data = self.disk_scheduler.schedule_read_sync(page_id.page_no)?;
        HeapPage::from_bytes(page_id, Arc::clone(&self.schema), &data)
    }

    /// Writes the full page image to its offset, extending the file if needed.
    pub fn write_page(&self, page: &HeapPage) -> Result<()> {
        debug_assert_eq!(page.page_id().table_id, self.table_id);
        self.disk_scheduler
            .schedule_write_sync(page.page_id().page_no, page.to_bytes())
    }

    pub fn num_pages(&self) -> Result<u32> {
        self.disk_manager().num_pages()
    }

    /// Inserts `tuple` into the first page with a free slot and sets its record id.
    ///
    /// Every page examined is fetched with write permission. When no page has
    /// room, an empty page is appended to the file directly and the tuple is
    /// placed into the pool's copy of it, so an abort leaves nothing but the
    /// empty page on disk. Returns the page that was modified.
    pub fn add_tuple(
        &self,
        pool: &BufferPool,
        tid: TransactionId,
        tuple: &mut Tuple,
    ) -> Result<Vec<PageRef>> {
        if **tuple.schema() != *self.schema {
            return Err(ShaleError::SchemaMismatch(format!(
                "tuple does not match the schema of {}",
                self.table_id
            )));
        }

        for page_no in 0..self.num_pages()? {
            let page_id = PageId::new(self.table_id, page_no);
            let page = pool.get_page(tid, page_id, Permissions::ReadWrite)?;
            if Self::try_insert(&page, tuple)? {
                return Ok(vec![page]);
            }
        }

        loop {
            let page_id = self.append_empty_page()?;
            let page = pool.get_page(tid, page_id, Permissions::ReadWrite)?;
            // Another transaction may have filled the new page before we locked it
            if Self::try_insert(&page, tuple)? {
                return Ok(vec![page]);
            }
        }
    }

    fn try_insert(page: &PageRef, tuple: &mut Tuple) -> Result<bool> {
        let mut page = page.write();
        if page.num_empty_slots() == 0 {
            return Ok(false);
        }
        page.insert_tuple(tuple)?;
        Ok(true)
    }

    fn append_empty_page(&self) -> Result<PageId> {
        let _guard = self.append_lock.lock();
        let page_id = PageId::new(self.table_id, self.num_pages()?);
        let page = HeapPage::new_empty(page_id, Arc::clone(&self.schema))?;
        self.write_page(&page)?;
        debug!("appended {} to table file {:?}", page_id, self.disk_manager().path());
        Ok(page_id)
    }

    /// Clears the slot addressed by the tuple's record id. Returns the page that was modified.
    pub fn delete_tuple(
        &self,
        pool: &BufferPool,
        tid: TransactionId,
        tuple: &Tuple,
    ) -> Result<PageRef> {
        let record_id = tuple.record_id().ok_or(ShaleError::MissingRecordId)?;
        if record_id.page_id.table_id != self.table_id {
            return Err(ShaleError::TableMismatch {
                record_id,
                table_id: self.table_id,
            });
        }

        let num_pages = self.num_pages()?;
        if record_id.page_id.page_no >= num_pages {
            return Err(ShaleError::PageOutOfRange {
                page_id: record_id.page_id,
                num_pages,
            });
        }

        let page = pool.get_page(tid, record_id.page_id, Permissions::ReadWrite)?;
        page.write().delete_tuple(tuple)?;
        Ok(page)
    }

    /// Returns a cursor over every tuple of the table in page then slot order.
    /// Pages are fetched read-only through `pool` as the cursor reaches them.
    pub fn iter<'a>(&'a self, pool: &'a BufferPool, tid: TransactionId) -> HeapFileIterator<'a> {
        HeapFileIterator::new(self, pool, tid)
    }
}

impl std::fmt::Debug for HeapFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeapFile")
            .field("table_id", &self.table_id)
            .field("path", &self.disk_manager().path())
            .field("tuple_size", &self.schema.tuple_size())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tuple::{DataType, TupleBuilder};
    use tempfile::NamedTempFile;

    fn schema() -> Arc<Schema> {
        Schema::builder()
            .column("id", DataType::Integer)
            .column("name", DataType::Char(12))
            .build_arc()
    }

    #[test]
    fn test_open_rejects_oversized_tuples() {
        let temp_file = NamedTempFile::new().unwrap();
        let wide = Schema::builder()
            .column("blob", DataType::Char(5000))
            .build_arc();

        assert!(matches!(
            HeapFile::open(TableId::new(0), temp_file.path(), wide),
            Err(ShaleError::TupleTooLarge { .. })
        ));
    }

    #[test]
    fn test_page_io_bypasses_cache() {
        let temp_file = NamedTempFile::new().unwrap();
        let file = HeapFile::open(TableId::new(0), temp_file.path(), schema()).unwrap();
        assert_eq!(file.num_pages().unwrap(), 0);

        let page_id = PageId::new(TableId::new(0), 0);
        let mut page = HeapPage::new_empty(page_id, schema()).unwrap();
        let mut tuple = TupleBuilder::new(schema()).value(1).value("one").build();
        page.insert_tuple(&mut tuple).unwrap();
        file.write_page(&page).unwrap();

        assert_eq!(file.num_pages().unwrap(), 1);
        assert_eq!(
            std::fs::metadata(temp_file.path()).unwrap().len(),
            PAGE_SIZE as u64
        );

        let read = file.read_page(page_id).unwrap();
        assert_eq!(read.tuples().unwrap(), vec![tuple]);
    }

    #[test]
    fn test_read_past_end_is_io_error() {
        let temp_file = NamedTempFile::new().unwrap();
        let file = HeapFile::open(TableId::new(0), temp_file.path(), schema()).unwrap();

        assert!(matches!(
            file.read_page(PageId::new(TableId::new(0), 3)),
            Err(ShaleError::Io(_))
        ));
    }
}
