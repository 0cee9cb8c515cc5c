use std::fs::{File, OpenOptions};
use std::io::{self, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;

use crate::common::{Result, PAGE_SIZE};

/// DiskManager reads and writes whole pages of one table file.
///
/// Page `n` lives at byte offset `n * PAGE_SIZE`. The file is the only source
/// of truth for the page count; there is no allocation map.
pub struct DiskManager {
    file: Mutex<File>,
    path: PathBuf,
    /// Number of page reads performed
    num_reads: AtomicU32,
    /// Number of page writes performed
    num_writes: AtomicU32,
}

impl DiskManager {
    /// Opens the table file at `path`, creating it if it doesn't exist.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.as_ref())?;

        Ok(Self {
            file: Mutex::new(file),
            path: path.as_ref().to_path_buf(),
            num_reads: AtomicU32::new(0),
            num_writes: AtomicU32::new(0),
        })
    }

    /// Reads page `page_no` into `data`, which must be exactly PAGE_SIZE bytes.
    ///
    /// Fails with `UnexpectedEof` only when the page starts at or past the
    /// end of the file. A trailing partial page reads what exists and the
    /// rest of `data` is zero-filled.
    pub fn read_page(&self, page_no: u32, data: &mut [u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE, "Buffer must be PAGE_SIZE bytes");

        let offset = page_offset(page_no);
        let mut file = self.file.lock();
        let file_len = file.metadata()?.len();
        if offset >= file_len {
            return Err(io::Error::new(
                ErrorKind::UnexpectedEof,
                format!("page {} is past the end of {:?}", page_no, self.path),
            )
            .into());
        }

        file.seek(SeekFrom::Start(offset))?;
        let mut filled = 0;
        while filled < data.len() {
            match file.read(&mut data[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
        data[filled..].fill(0);

        self.num_reads.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Writes `data` as page `page_no`, extending the file if the page is new.
    pub fn write_page(&self, page_no: u32, data: &[u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE, "Buffer must be PAGE_SIZE bytes");

        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(page_offset(page_no)))?;
        file.write_all(data)?;
        file.flush()?;

        self.num_writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Returns the number of pages in the file, counting a trailing partial page.
    pub fn num_pages(&self) -> Result<u32> {
        let len = self.file.lock().metadata()?.len();
        Ok(len.div_ceil(PAGE_SIZE as u64) as u32)
    }

    pub fn get_num_reads(&self) -> u32 {
        self.num_reads.load(Ordering::Relaxed)
    }

    pub fn get_num_writes(&self) -> u32 {
        self.num_writes.load(Ordering::Relaxed)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Forces written pages to stable storage.
    pub fn sync(&self) -> Result<()> {
        self.file.lock().sync_all()?;
        Ok(())
    }
}

impl Drop for DiskManager {
    fn drop(&mut self) {
        let _ = self.file.get_mut().sync_all();
    }
}

fn page_offset(page_no: u32) -> u64 {
    page_no as u64 * PAGE_SIZE as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_new_file_is_empty() {
        let temp_file = NamedTempFile::new().unwrap();
        let dm = DiskManager::new(temp_file.path()).unwrap();
        assert_eq!(dm.num_pages().unwrap(), 0);
    }

    #[test]
    fn test_read_write() {
        let temp_file = NamedTempFile::new().unwrap();
        let dm = DiskManager::new(temp_file.path()).unwrap();

        let mut write_data = [0u8; PAGE_SIZE];
        write_data[0] = 42;
        write_data[PAGE_SIZE - 1] = 128;
        dm.write_page(2, &write_data).unwrap();
        assert_eq!(dm.num_pages().unwrap(), 3);

        let mut read_data = [0u8; PAGE_SIZE];
        dm.read_page(2, &mut read_data).unwrap();
        assert_eq!(read_data[0], 42);
        assert_eq!(read_data[PAGE_SIZE - 1], 128);

        assert_eq!(dm.get_num_reads(), 1);
        assert_eq!(dm.get_num_writes(), 1);
    }

    #[test]
    fn test_read_past_end_fails() {
        let temp_file = NamedTempFile::new().unwrap();
        let dm = DiskManager::new(temp_file.path()).unwrap();
        dm.write_page(0, &[1u8; PAGE_SIZE]).unwrap();

        let mut data = [0u8; PAGE_SIZE];
        let err = dm.read_page(1, &mut data).unwrap_err();
        match err {
            crate::common::ShaleError::Io(e) => {
                assert_eq!(e.kind(), std::io::ErrorKind::UnexpectedEof)
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_partial_trailing_page_reads_zero_padded() {
        let temp_file = NamedTempFile::new().unwrap();
        std::fs::write(temp_file.path(), vec![5u8; PAGE_SIZE + 10]).unwrap();

        let dm = DiskManager::new(temp_file.path()).unwrap();
        assert_eq!(dm.num_pages().unwrap(), 2);

        let mut data = [0xffu8; PAGE_SIZE];
        dm.read_page(1, &mut data).unwrap();
        assert!(data[..10].iter().all(|b| *b == 5));
        assert!(data[10..].iter().all(|b| *b == 0));
        assert_eq!(dm.get_num_reads(), 1);

        // Page 2 starts exactly at the end of the file
        assert!(dm.read_page(2, &mut data).is_err());
    }

    #[test]
    fn test_persistence() {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path().to_path_buf();

        {
            let dm = DiskManager::new(&path).unwrap();
            let mut data = [0u8; PAGE_SIZE];
            data[0] = 123;
            dm.write_page(0, &data).unwrap();
        }

        let dm = DiskManager::new(&path).unwrap();
        assert_eq!(dm.num_pages().unwrap(), 1);
        let mut data = [0u8; PAGE_SIZE];
        dm.read_page(0, &mut data).unwrap();
        assert_eq!(data[0], 123);
    }
}
