use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use log::{debug, trace, warn};
use parking_lot::{Condvar, Mutex};

use crate::common::{LockConfig, PageId, Permissions, Result, ShaleError, TransactionId};

use super::wait_for::WaitForGraph;

/// Page lock modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockMode {
    /// Read access. Any number of transactions may share it.
    Shared,
    /// Write access. Excludes every other holder.
    Exclusive,
}

impl LockMode {
    /// Returns true if holding `self` satisfies a request for `requested`.
    pub fn covers(&self, requested: LockMode) -> bool {
        matches!(
            (self, requested),
            (LockMode::Exclusive, _) | (LockMode::Shared, LockMode::Shared)
        )
    }
}

impl From<Permissions> for LockMode {
    fn from(perm: Permissions) -> Self {
        match perm {
            Permissions::ReadOnly => LockMode::Shared,
            Permissions::ReadWrite => LockMode::Exclusive,
        }
    }
}

/// Holders of one page. `exclusive` and `shared` are never both non-empty.
#[derive(Debug, Default)]
struct LockState {
    exclusive: Option<TransactionId>,
    shared: HashSet<TransactionId>,
}

impl LockState {
    fn mode_of(&self, tid: TransactionId) -> Option<LockMode> {
        if self.exclusive == Some(tid) {
            Some(LockMode::Exclusive)
        } else if self.shared.contains(&tid) {
            Some(LockMode::Shared)
        } else {
            None
        }
    }

    /// Grants `mode` to `tid` if compatible with the other holders.
    /// An exclusive request from the sole shared holder is an upgrade.
    fn try_grant(&mut self, tid: TransactionId, mode: LockMode) -> bool {
        match mode {
            LockMode::Shared => {
                if self.exclusive.is_some() {
                    return false;
                }
                self.shared.insert(tid);
                true
            }
            LockMode::Exclusive => {
                if self.exclusive.is_some() {
                    return false;
                }
                let sole_or_none =
                    self.shared.is_empty() || (self.shared.len() == 1 && self.shared.contains(&tid));
                if !sole_or_none {
                    return false;
                }
                self.shared.clear();
                self.exclusive = Some(tid);
                true
            }
        }
    }

    /// Transactions other than `tid` currently holding the page.
    fn blockers(&self, tid: TransactionId) -> Vec<TransactionId> {
        self.exclusive
            .iter()
            .chain(self.shared.iter())
            .copied()
            .filter(|h| *h != tid)
            .collect()
    }

    fn release(&mut self, tid: TransactionId) -> bool {
        if self.exclusive == Some(tid) {
            self.exclusive = None;
            true
        } else {
            self.shared.remove(&tid)
        }
    }
}

/// One entry of the lock table: the holders plus the condition their waiters sleep on.
#[derive(Debug, Default)]
struct PageLock {
    state: Mutex<LockState>,
    released: Condvar,
}

/// Page-granularity strict two-phase lock manager.
///
/// The table is sharded per page: the map mutex is only held to look up or
/// create a page's entry, and waiters block on that page's condition variable.
/// A blocked request aborts when it closes a cycle in the wait-for graph or
/// when it has waited longer than the configured timeout.
///
/// Lock order is page state, then the held-page index or the wait-for graph.
/// Neither of the latter is held while a page state is acquired.
pub struct LockManager {
    config: LockConfig,
    table: Mutex<HashMap<PageId, Arc<PageLock>>>,
    held: Mutex<HashMap<TransactionId, HashSet<PageId>>>,
    wait_for: Mutex<WaitForGraph>,
}

impl LockManager {
    /// Creates a lock manager with the default 100 ms timeout and cycle detection.
    pub fn new() -> Self {
        Self::with_config(LockConfig::default())
    }

    pub fn with_config(config: LockConfig) -> Self {
        Self {
            config,
            table: Mutex::new(HashMap::new()),
            held: Mutex::new(HashMap::new()),
            wait_for: Mutex::new(WaitForGraph::new()),
        }
    }

    pub fn config(&self) -> &LockConfig {
        &self.config
    }

    fn page_lock(&self, page_id: PageId) -> Arc<PageLock> {
        Arc::clone(self.table.lock().entry(page_id).or_default())
    }

    fn existing_page_lock(&self, page_id: PageId) -> Option<Arc<PageLock>> {
        self.table.lock().get(&page_id).cloned()
    }

    /// Blocks until `tid` holds `page_id` in at least `mode`.
    ///
    /// Returns immediately when the held lock already covers `mode`.
    /// Returns `TransactionAborted` if waiting would deadlock or the wait
    /// outlives the timeout; the caller must then abort the transaction.
    pub fn acquire_lock(&self, page_id: PageId, tid: TransactionId, mode: LockMode) -> Result<()> {
        let page = self.page_lock(page_id);
        let deadline = self.config.timeout.map(|t| Instant::now() + t);
        let mut state = page.state.lock();
        let mut waited = false;

        loop {
            let current = state.mode_of(tid);
            if current.is_some_and(|held| held.covers(mode)) {
                break;
            }

            if state.try_grant(tid, mode) {
                if current == Some(LockMode::Shared) {
                    debug!("{} upgraded lock on {} to exclusive", tid, page_id);
                } else {
                    trace!("{} granted {:?} lock on {}", tid, mode, page_id);
                }
                self.held.lock().entry(tid).or_default().insert(page_id);
                break;
            }

            if self.config.detect_deadlocks {
                let mut graph = self.wait_for.lock();
                graph.set_waits(tid, page_id, state.blockers(tid));
                if graph.has_cycle_through(tid) {
                    graph.clear_waits(tid);
                    warn!(
                        "deadlock detected: {} waiting for {:?} lock on {}, aborting",
                        tid, mode, page_id
                    );
                    return Err(ShaleError::TransactionAborted(tid));
                }
            }

            if !waited {
                debug!(
                    "{} waiting for {:?} lock on {} held by {:?}",
                    tid,
                    mode,
                    page_id,
                    state.blockers(tid)
                );
                waited = true;
            }

            match deadline {
                Some(deadline) => {
                    if Instant::now() >= deadline {
                        self.stop_waiting(tid);
                        debug!(
                            "{} timed out waiting for {:?} lock on {}, aborting",
                            tid, mode, page_id
                        );
                        return Err(ShaleError::TransactionAborted(tid));
                    }
                    page.released.wait_until(&mut state, deadline);
                }
                None => page.released.wait(&mut state),
            }
        }

        if waited {
            self.stop_waiting(tid);
        }
        Ok(())
    }

    fn stop_waiting(&self, tid: TransactionId) {
        if self.config.detect_deadlocks {
            self.wait_for.lock().clear_waits(tid);
        }
    }

    /// Releases whatever lock `tid` holds on `page_id`. Returns false if it held none.
    pub fn release_lock(&self, page_id: PageId, tid: TransactionId) -> bool {
        let Some(page) = self.existing_page_lock(page_id) else {
            return false;
        };

        let released = {
            let mut state = page.state.lock();
            let released = state.release(tid);
            if released {
                let mut held = self.held.lock();
                if let Some(pages) = held.get_mut(&tid) {
                    pages.remove(&page_id);
                    if pages.is_empty() {
                        held.remove(&tid);
                    }
                }
                drop(held);
                // Waiters on this page recompute their edges when they wake
                if self.config.detect_deadlocks {
                    self.wait_for.lock().release_page(page_id, tid);
                }
            }
            released
        };

        if released {
            trace!("{} released lock on {}", tid, page_id);
            page.released.notify_all();
        }
        released
    }

    /// Releases every lock `tid` holds. Used when a transaction commits or aborts.
    pub fn release_all_locks(&self, tid: TransactionId) {
        let pages = self.held.lock().remove(&tid).unwrap_or_default();

        for page_id in &pages {
            if let Some(page) = self.existing_page_lock(*page_id) {
                page.state.lock().release(tid);
                page.released.notify_all();
            }
        }

        if self.config.detect_deadlocks {
            self.wait_for.lock().remove_transaction(tid);
        }
        debug!("{} released {} page locks", tid, pages.len());
    }

    /// Returns true if `tid` holds any lock on `page_id`.
    pub fn holds_lock(&self, page_id: PageId, tid: TransactionId) -> bool {
        self.lock_mode(page_id, tid).is_some()
    }

    /// Returns the mode in which `tid` holds `page_id`, if any.
    pub fn lock_mode(&self, page_id: PageId, tid: TransactionId) -> Option<LockMode> {
        self.existing_page_lock(page_id)
            .and_then(|page| page.state.lock().mode_of(tid))
    }

    /// Returns the pages `tid` holds locks on, in page order.
    pub fn locked_pages(&self, tid: TransactionId) -> Vec<PageId> {
        let mut pages: Vec<_> = self
            .held
            .lock()
            .get(&tid)
            .map(|p| p.iter().copied().collect())
            .unwrap_or_default();
        pages.sort();
        pages
    }
}

impl Default for LockManager {
    fn default() -> Self {
        Self::new()
    }
}
