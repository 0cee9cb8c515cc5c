//! Shale - page cache, page locking and heap file storage for a relational engine
//!
//! This crate provides the storage core that query operators sit on: a bounded
//! buffer pool, a page-granularity two-phase lock manager, and a heap file
//! format with fixed-width tuple slots.
//!
//! # Architecture
//!
//! The system is organized into several layers:
//!
//! - **Storage Layer** (`storage`): Durable, page-addressed tuple storage
//!   - `DiskManager`: Reads and writes whole pages of one table file
//!   - `DiskScheduler`: Background I/O worker per table file
//!   - `HeapPage`: Slot bitmap plus fixed-width tuple slots
//!   - `HeapFile`/`HeapFileIterator`: A table's pages and a restartable scan over them
//!
//! - **Concurrency** (`concurrency`): Strict two-phase locking at page granularity
//!   - `LockManager`: Shared/exclusive page locks with upgrade, wait-for-graph
//!     deadlock detection and a wait timeout
//!
//! - **Buffer Pool** (`buffer`): The only path from a transaction to a page
//!   - `BufferPool`: Locks, caches, evicts, and writes back or restores pages at
//!     transaction end
//!   - `LruReplacer`: Least-recently-used ordering of resident pages
//!
//! - **Catalog** (`catalog`): Table id and name to heap file registry
//!
//! - **Tuples** (`tuple`): Fixed-width typed rows and their schemas
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use shale::buffer::BufferPool;
//! use shale::catalog::Catalog;
//! use shale::common::TransactionId;
//! use shale::tuple::{DataType, Schema, TupleBuilder};
//!
//! let catalog = Arc::new(Catalog::new());
//! let schema = Schema::builder()
//!     .column("id", DataType::Integer)
//!     .column("name", DataType::Char(16))
//!     .build_arc();
//! let users = catalog.create_table("users", "users.dat", schema.clone()).unwrap();
//!
//! // A pool of 50 pages with the default 100ms lock timeout
//! let pool = BufferPool::new(50, catalog);
//!
//! let tid = TransactionId::new();
//! let mut tuple = TupleBuilder::new(schema).value(1).value("alice").build();
//! pool.insert_tuple(tid, users.table_id(), &mut tuple).unwrap();
//!
//! for tuple in users.iter(&pool, tid) {
//!     println!("{:?}", tuple.unwrap().values());
//! }
//!
//! pool.transaction_complete(tid, true).unwrap();
//! ```

pub mod buffer;
pub mod catalog;
pub mod common;
pub mod concurrency;
pub mod storage;
pub mod tuple;

// Re-export commonly used types at the crate root
pub use common::{PageId, Permissions, RecordId, Result, ShaleError, TableId, TransactionId};
