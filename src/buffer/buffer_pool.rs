use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, trace, warn};
use parking_lot::{Mutex, RwLock};

use crate::catalog::Catalog;
use crate::common::{
    CommitFlush, PageId, Permissions, PoolConfig, RecordId, Result, ShaleError, TableId,
    TransactionId,
};
use crate::concurrency::LockManager;
use crate::storage::page::HeapPage;
use crate::tuple::Tuple;

use super::LruReplacer;

/// Shared handle to a cached page. The page lock taken by `get_page` decides
/// who may write through it; the `RwLock` only guards the bytes in memory.
pub type PageRef = Arc<RwLock<HeapPage>>;

/// Cache counters since the pool was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

/// Cache membership and recency, always mutated together under one lock
struct PoolState {
    pages: HashMap<PageId, PageRef>,
    replacer: LruReplacer,
    stats: PoolStats,
}

/// BufferPool caches up to `capacity` heap pages in memory and is the only
/// path through which transactions reach them.
///
/// Every access first takes the page lock for the requested permission, so a
/// transaction that gets a page back is entitled to use it until it commits
/// or aborts. Dirty pages are written back at commit, on explicit flush, or
/// when evicting a dirty page whose dirtier no longer holds its lock. A page
/// that is dirty and still locked by its dirtier is never evicted.
pub struct BufferPool {
    capacity: usize,
    commit_flush: CommitFlush,
    catalog: Arc<Catalog>,
    lock_manager: LockManager,
    state: Mutex<PoolState>,
}

impl BufferPool {
    /// Creates a pool of `capacity` pages with default lock settings.
    pub fn new(capacity: usize, catalog: Arc<Catalog>) -> Self {
        Self::with_config(PoolConfig::new(capacity), catalog)
    }

    pub fn with_config(config: PoolConfig, catalog: Arc<Catalog>) -> Self {
        Self {
            capacity: config.capacity,
            commit_flush: config.commit_flush,
            catalog,
            lock_manager: LockManager::with_config(config.lock),
            state: Mutex::new(PoolState {
                pages: HashMap::with_capacity(config.capacity),
                replacer: LruReplacer::new(),
                stats: PoolStats::default(),
            }),
        }
    }

    /// Fetches a page on behalf of `tid`.
    ///
    /// Blocks until the page lock for `perm` is granted, then serves the page
    /// from the cache or reads it from its heap file, evicting a page if the
    /// pool is full. Fails with `TransactionAborted` if the lock wait was
    /// aborted and with `BufferPoolFull` if no page can be evicted.
    pub fn get_page(
        &self,
        tid: TransactionId,
        page_id: PageId,
        perm: Permissions,
    ) -> Result<PageRef> {
        self.lock_manager.acquire_lock(page_id, tid, perm.into())?;

        let mut state = self.state.lock();
        if let Some(page) = state.pages.get(&page_id).cloned() {
            state.replacer.record_access(page_id);
            state.stats.hits += 1;
            return Ok(page);
        }

        state.stats.misses += 1;
        if state.pages.len() >= self.capacity {
            self.evict_page(&mut state)?;
        }

        let file = self.catalog.table(page_id.table_id)?;
        let page: PageRef = Arc::new(RwLock::new(file.read_page(page_id)?));
        trace!("{} read {} from disk", tid, page_id);
        self.admit(&mut state, page_id, Arc::clone(&page));
        Ok(page)
    }

    fn admit(&self, state: &mut PoolState, page_id: PageId, page: PageRef) {
        state.pages.insert(page_id, page);
        state.replacer.record_access(page_id);
        assert!(
            state.pages.len() <= self.capacity,
            "buffer pool holds {} pages, capacity is {}",
            state.pages.len(),
            self.capacity
        );
    }

    /// Removes the least recently used page that may leave the cache.
    ///
    /// Pages that are dirty and still locked by their dirtier are skipped.
    /// Other dirty pages are written back before they go.
    fn evict_page(&self, state: &mut PoolState) -> Result<()> {
        let victim = state.replacer.victims().find(|page_id| {
            state.pages.get(page_id).is_some_and(|page| match page.read().dirtier() {
                Some(dirtier) => !self.lock_manager.holds_lock(*page_id, dirtier),
                None => true,
            })
        });

        let Some(victim) = victim else {
            warn!(
                "no evictable page among {} resident pages",
                state.pages.len()
            );
            return Err(ShaleError::BufferPoolFull {
                capacity: self.capacity,
            });
        };

        if let Some(page) = state.pages.get(&victim) {
            self.flush_ref(page)?;
        }
        state.pages.remove(&victim);
        state.replacer.remove(victim);
        state.stats.evictions += 1;
        debug!("evicted {}", victim);
        Ok(())
    }

    /// Inserts `tuple` into table `table_id` on behalf of `tid` and returns
    /// its new record id. The modified page is marked dirty by `tid`.
    ///
    /// On error the tuple has no record id. An error after the slot was
    /// written (`BufferPoolFull` while re-admitting the page) leaves the
    /// transaction in an unknown state, and the caller should abort it.
    pub fn insert_tuple(
        &self,
        tid: TransactionId,
        table_id: TableId,
        tuple: &mut Tuple,
    ) -> Result<RecordId> {
        let file = self.catalog.table(table_id)?;
        let pages = file.add_tuple(self, tid, tuple)?;
        self.finish_insert(tid, &pages, tuple)
    }

    fn finish_insert(
        &self,
        tid: TransactionId,
        pages: &[PageRef],
        tuple: &mut Tuple,
    ) -> Result<RecordId> {
        if let Err(e) = self.mark_dirty(tid, pages) {
            // The slot only exists in a copy the pool no longer holds
            tuple.set_record_id(None);
            return Err(e);
        }
        tuple.record_id().ok_or(ShaleError::MissingRecordId)
    }

    /// Deletes `tuple` from its table on behalf of `tid`.
    /// The modified page is marked dirty by `tid`.
    pub fn delete_tuple(&self, tid: TransactionId, tuple: &Tuple) -> Result<()> {
        let record_id = tuple.record_id().ok_or(ShaleError::MissingRecordId)?;
        let file = self.catalog.table(record_id.page_id.table_id)?;
        let page = file.delete_tuple(self, tid, tuple)?;
        self.mark_dirty(tid, &[page])
    }

    /// Marks pages dirty by `tid` and makes sure the cache holds exactly these copies.
    fn mark_dirty(&self, tid: TransactionId, pages: &[PageRef]) -> Result<()> {
        for page in pages {
            let page_id = {
                let mut guard = page.write();
                guard.mark_dirty(Some(tid));
                guard.page_id()
            };

            let mut state = self.state.lock();
            let cached = state
                .pages
                .get(&page_id)
                .map(|cached| Arc::ptr_eq(cached, page));
            match cached {
                Some(true) => state.replacer.record_access(page_id),
                // The page was evicted and read back while we were modifying our copy
                Some(false) => self.admit(&mut state, page_id, Arc::clone(page)),
                None => {
                    if state.pages.len() >= self.capacity {
                        self.evict_page(&mut state)?;
                    }
                    self.admit(&mut state, page_id, Arc::clone(page));
                }
            }
        }
        Ok(())
    }

    /// Ends a transaction.
    ///
    /// On commit, dirty pages are written back (every dirty page in the pool,
    /// or only `tid`'s under `CommitFlush::Transaction`). On abort, every page
    /// `tid` dirtied is reloaded from disk in place. Either way `tid`'s locks
    /// are released afterwards. If writing back fails the locks are kept and
    /// the caller should abort.
    pub fn transaction_complete(&self, tid: TransactionId, commit: bool) -> Result<()> {
        if commit {
            match self.commit_flush {
                CommitFlush::AllDirty => self.flush_all_pages()?,
                CommitFlush::Transaction => self.flush_pages(tid)?,
            }
            debug!("{} committed", tid);
        } else {
            let restored = self.restore_pages(tid)?;
            debug!("{} aborted, restored {} pages", tid, restored);
        }

        self.lock_manager.release_all_locks(tid);
        Ok(())
    }

    pub fn commit(&self, tid: TransactionId) -> Result<()> {
        self.transaction_complete(tid, true)
    }

    pub fn abort(&self, tid: TransactionId) -> Result<()> {
        self.transaction_complete(tid, false)
    }

    fn restore_pages(&self, tid: TransactionId) -> Result<usize> {
        let dirtied = self.cached_pages(|page| page.dirtier() == Some(tid));

        for page in &dirtied {
            let page_id = page.read().page_id();
            let fresh = self.catalog.table(page_id.table_id)?.read_page(page_id)?;
            *page.write() = fresh;
        }
        Ok(dirtied.len())
    }

    fn cached_pages<F>(&self, filter: F) -> Vec<PageRef>
    where
        F: Fn(&HeapPage) -> bool,
    {
        self.state
            .lock()
            .pages
            .values()
            .filter(|page| filter(&*page.read()))
            .cloned()
            .collect()
    }

    /// Writes `page` to its heap file if it is dirty and clears the dirty marker.
    fn flush_ref(&self, page: &PageRef) -> Result<bool> {
        let mut page = page.write();
        if !page.is_dirty() {
            return Ok(false);
        }

        self.catalog
            .table(page.page_id().table_id)?
            .write_page(&page)?;
        page.mark_dirty(None);
        trace!("flushed {}", page.page_id());
        Ok(true)
    }

    /// Writes one cached page back if it is dirty. Returns whether anything was written.
    pub fn flush_page(&self, page_id: PageId) -> Result<bool> {
        let page = self.state.lock().pages.get(&page_id).cloned();
        match page {
            Some(page) => self.flush_ref(&page),
            None => Ok(false),
        }
    }

    /// Writes back every dirty page in the pool.
    pub fn flush_all_pages(&self) -> Result<()> {
        for page in self.cached_pages(|page| page.is_dirty()) {
            self.flush_ref(&page)?;
        }
        Ok(())
    }

    /// Writes back the pages dirtied by `tid`.
    pub fn flush_pages(&self, tid: TransactionId) -> Result<()> {
        for page in self.cached_pages(|page| page.dirtier() == Some(tid)) {
            self.flush_ref(&page)?;
        }
        Ok(())
    }

    /// Drops a page from the cache without writing it back.
    pub fn discard_page(&self, page_id: PageId) -> bool {
        let mut state = self.state.lock();
        state.replacer.remove(page_id);
        state.pages.remove(&page_id).is_some()
    }

    /// Releases `tid`'s lock on one page before the transaction ends.
    /// Only safe for pages the transaction did not modify.
    pub fn release_page(&self, tid: TransactionId, page_id: PageId) -> bool {
        self.lock_manager.release_lock(page_id, tid)
    }

    pub fn holds_lock(&self, tid: TransactionId, page_id: PageId) -> bool {
        self.lock_manager.holds_lock(page_id, tid)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of resident pages.
    pub fn len(&self) -> usize {
        self.state.lock().pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_cached(&self, page_id: PageId) -> bool {
        self.state.lock().pages.contains_key(&page_id)
    }

    pub fn stats(&self) -> PoolStats {
        self.state.lock().stats
    }

    pub fn lock_manager(&self) -> &LockManager {
        &self.lock_manager
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }
}
