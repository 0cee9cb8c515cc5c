//! Integration tests for commit and abort through the buffer pool

use std::collections::HashSet;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use shale::buffer::BufferPool;
use shale::catalog::Catalog;
use shale::common::{
    CommitFlush, LockConfig, PageId, Permissions, PoolConfig, ShaleError, TransactionId,
};
use shale::storage::heap::HeapFile;
use shale::tuple::{DataType, Schema, Tuple, TupleBuilder, Value};
use tempfile::TempDir;

fn schema() -> Arc<Schema> {
    Schema::builder()
        .column("id", DataType::Integer)
        .nullable_column("note", DataType::Char(16))
        .build_arc()
}

fn create_db(config: PoolConfig, tables: &[&str]) -> (BufferPool, Vec<Arc<HeapFile>>, TempDir) {
    let _ = env_logger::builder().is_test(true).try_init();

    let dir = TempDir::new().unwrap();
    let catalog = Arc::new(Catalog::new());
    let files = tables
        .iter()
        .map(|name| {
            catalog
                .create_table(name, dir.path().join(format!("{}.dat", name)), schema())
                .unwrap()
        })
        .collect();
    (BufferPool::with_config(config, catalog), files, dir)
}

fn insert(pool: &BufferPool, file: &HeapFile, tid: TransactionId, id: i32) -> shale::Result<Tuple> {
    let mut tuple = TupleBuilder::new(file.schema().clone())
        .value(id)
        .value("note")
        .build();
    pool.insert_tuple(tid, file.table_id(), &mut tuple)?;
    Ok(tuple)
}

/// Ids stored on disk, read without going through the pool.
fn ids_on_disk(file: &HeapFile) -> Vec<i32> {
    (0..file.num_pages().unwrap())
        .flat_map(|n| {
            file.read_page(PageId::new(file.table_id(), n))
                .unwrap()
                .tuples()
                .unwrap()
        })
        .map(|t| match t.value(0) {
            Some(Value::Integer(id)) => *id,
            other => panic!("unexpected id {:?}", other),
        })
        .collect()
}

/// Ids visible to `tid` through the pool.
fn ids_in_pool_as(pool: &BufferPool, file: &HeapFile, tid: TransactionId) -> Vec<i32> {
    file.iter(pool, tid)
        .map(|t| match t.unwrap().value(0) {
            Some(Value::Integer(id)) => *id,
            other => panic!("unexpected id {:?}", other),
        })
        .collect()
}

/// Ids visible to a fresh transaction, which commits right after the scan.
fn ids_in_pool(pool: &BufferPool, file: &HeapFile) -> Vec<i32> {
    let tid = TransactionId::new();
    let ids = ids_in_pool_as(pool, file, tid);
    pool.commit(tid).unwrap();
    ids
}

#[test]
fn test_commit_writes_back_and_releases_locks() {
    let (pool, files, _dir) = create_db(PoolConfig::new(8), &["t"]);
    let file = &files[0];
    let tid = TransactionId::new();

    for id in 0..10 {
        insert(&pool, file, tid, id).unwrap();
    }
    // Nothing reaches the file before commit
    assert!(ids_on_disk(file).is_empty());
    assert!(pool.holds_lock(tid, PageId::new(file.table_id(), 0)));

    pool.transaction_complete(tid, true).unwrap();

    assert_eq!(ids_on_disk(file), (0..10).collect::<Vec<_>>());
    assert!(pool.lock_manager().locked_pages(tid).is_empty());
}

#[test]
fn test_abort_restores_cached_pages() {
    let (pool, files, _dir) = create_db(PoolConfig::new(8), &["t"]);
    let file = &files[0];

    let setup = TransactionId::new();
    let committed: Vec<_> = (0..3)
        .map(|id| insert(&pool, file, setup, id).unwrap())
        .collect();
    pool.commit(setup).unwrap();

    let tid = TransactionId::new();
    insert(&pool, file, tid, 100).unwrap();
    pool.delete_tuple(tid, &committed[1]).unwrap();
    assert_eq!(ids_in_pool_as(&pool, file, tid), vec![0, 2, 100]);

    pool.transaction_complete(tid, false).unwrap();

    let page = pool
        .get_page(TransactionId::new(), PageId::new(file.table_id(), 0), Permissions::ReadOnly)
        .unwrap();
    assert!(!page.read().is_dirty());
    assert_eq!(ids_in_pool(&pool, file), vec![0, 1, 2]);
    assert_eq!(ids_on_disk(file), vec![0, 1, 2]);
}

#[test]
fn test_abort_leaves_appended_page_empty() {
    let (pool, files, _dir) = create_db(PoolConfig::new(8), &["t"]);
    let file = &files[0];
    let tid = TransactionId::new();

    insert(&pool, file, tid, 1).unwrap();
    assert_eq!(file.num_pages().unwrap(), 1);

    pool.abort(tid).unwrap();

    // The page stays allocated, but holds nothing
    assert_eq!(file.num_pages().unwrap(), 1);
    assert!(ids_on_disk(file).is_empty());
    assert!(ids_in_pool(&pool, file).is_empty());
}

#[test]
fn test_commit_flush_scope() {
    // Flush only the committing transaction's pages
    let config = PoolConfig::new(8).with_commit_flush(CommitFlush::Transaction);
    let (pool, files, _dir) = create_db(config, &["a", "b"]);
    let (t1, t2) = (TransactionId::new(), TransactionId::new());

    insert(&pool, &files[0], t1, 1).unwrap();
    insert(&pool, &files[1], t2, 2).unwrap();
    pool.commit(t2).unwrap();

    assert_eq!(ids_on_disk(&files[1]), vec![2]);
    assert!(ids_on_disk(&files[0]).is_empty());

    pool.abort(t1).unwrap();
    assert!(ids_on_disk(&files[0]).is_empty());

    // Default: any commit writes back every dirty page
    let (pool, files, _dir) = create_db(PoolConfig::new(8), &["a", "b"]);
    let (t1, t2) = (TransactionId::new(), TransactionId::new());

    insert(&pool, &files[0], t1, 1).unwrap();
    insert(&pool, &files[1], t2, 2).unwrap();
    pool.commit(t2).unwrap();

    assert_eq!(ids_on_disk(&files[1]), vec![2]);
    assert_eq!(ids_on_disk(&files[0]), vec![1]);
}

#[test]
fn test_writer_aborted_behind_reader() {
    let (pool, files, _dir) = create_db(PoolConfig::new(8), &["t"]);
    let file = &files[0];

    let setup = TransactionId::new();
    insert(&pool, file, setup, 1).unwrap();
    pool.commit(setup).unwrap();

    let reader = TransactionId::new();
    assert_eq!(ids_in_pool_as(&pool, file, reader), vec![1]);

    // The reader keeps its shared lock until it completes
    let writer = TransactionId::new();
    let err = insert(&pool, file, writer, 2).unwrap_err();
    assert!(matches!(err, ShaleError::TransactionAborted(t) if t == writer));
    pool.abort(writer).unwrap();

    pool.commit(reader).unwrap();
    let writer = TransactionId::new();
    insert(&pool, file, writer, 2).unwrap();
    pool.commit(writer).unwrap();

    assert_eq!(ids_on_disk(file), vec![1, 2]);
}

#[test]
fn test_concurrent_inserts_with_retry() {
    let config = PoolConfig::new(16)
        .with_lock_config(LockConfig::default().with_timeout(Some(Duration::from_millis(200))));
    let (pool, files, _dir) = create_db(config, &["t"]);
    let pool = Arc::new(pool);
    let file = Arc::clone(&files[0]);

    let handles: Vec<_> = (0..4)
        .map(|worker| {
            let pool = Arc::clone(&pool);
            let file = Arc::clone(&file);
            thread::spawn(move || {
                let mut aborts = 0;
                for i in 0..25 {
                    let id = worker * 100 + i;
                    loop {
                        let tid = TransactionId::new();
                        match insert(&pool, &file, tid, id) {
                            Ok(_) => {
                                pool.commit(tid).unwrap();
                                break;
                            }
                            Err(e) if e.is_abort() => {
                                pool.abort(tid).unwrap();
                                aborts += 1;
                                thread::sleep(Duration::from_millis(1 + aborts % 5));
                            }
                            Err(e) => panic!("insert failed: {}", e),
                        }
                    }
                }
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }

    let on_disk = ids_on_disk(&file);
    assert_eq!(on_disk.len(), 100);
    let unique: HashSet<_> = on_disk.iter().copied().collect();
    assert_eq!(unique.len(), 100);
    assert_eq!(ids_in_pool(&pool, &file).len(), 100);
}
