use thiserror::Error;

use super::types::{PageId, RecordId, TableId, TransactionId};

/// Storage engine error types
#[derive(Error, Debug)]
pub enum ShaleError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Transaction {0} aborted while waiting for a page lock")]
    TransactionAborted(TransactionId),

    #[error("Buffer pool is full ({capacity} pages), no evictable page available")]
    BufferPoolFull { capacity: usize },

    #[error("Page {page_id} is beyond the end of the table ({num_pages} pages)")]
    PageOutOfRange { page_id: PageId, num_pages: u32 },

    #[error("Disk scheduler error: {0}")]
    DiskScheduler(String),

    #[error("Tuple width {tuple_size} does not fit a single slot in a page")]
    TupleTooLarge { tuple_size: usize },

    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("Page {0} has no empty slot")]
    PageFull(PageId),

    #[error("Invalid slot ID: {0}")]
    InvalidSlotId(u16),

    #[error("Slot {0} is empty")]
    EmptySlot(u16),

    #[error("Tuple has no record ID")]
    MissingRecordId,

    #[error("Record {record_id} does not belong to page {page_id}")]
    RecordNotOnPage { record_id: RecordId, page_id: PageId },

    #[error("Record {record_id} does not belong to table {table_id}")]
    TableMismatch {
        record_id: RecordId,
        table_id: TableId,
    },

    #[error("Table {0} already exists")]
    TableAlreadyExists(String),

    #[error("Table {0} not found")]
    TableNotFound(TableId),

    #[error("Table named {0} not found")]
    TableNameNotFound(String),
}

impl ShaleError {
    /// Returns true when the caller must roll the transaction back.
    pub fn is_abort(&self) -> bool {
        matches!(self, ShaleError::TransactionAborted(_))
    }
}

pub type Result<T> = std::result::Result<T, ShaleError>;
