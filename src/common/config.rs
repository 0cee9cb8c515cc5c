use std::time::Duration;

/// Size of a page in bytes (4 KB)
pub const PAGE_SIZE: usize = 4096;

/// Default buffer pool size (number of cached pages)
pub const DEFAULT_BUFFER_POOL_SIZE: usize = 50;

/// Default time a transaction may wait for a contested page lock before it is aborted
pub const DEFAULT_LOCK_TIMEOUT_MS: u64 = 100;

/// Depth of the request queue feeding each disk scheduler worker
pub const DISK_SCHEDULER_QUEUE_DEPTH: usize = 128;

/// Which dirty pages are written back when a transaction commits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommitFlush {
    /// Flush every dirty page in the pool, whoever dirtied it.
    #[default]
    AllDirty,
    /// Flush only the pages dirtied by the committing transaction.
    Transaction,
}

/// Lock manager settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockConfig {
    /// How long a single `acquire_lock` call may block before the waiter is
    /// aborted. `None` waits forever (only cycle detection can abort).
    pub timeout: Option<Duration>,
    /// Abort a waiter as soon as it closes a cycle in the wait-for graph.
    pub detect_deadlocks: bool,
}

impl LockConfig {
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_deadlock_detection(mut self, enabled: bool) -> Self {
        self.detect_deadlocks = enabled;
        self
    }
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            timeout: Some(Duration::from_millis(DEFAULT_LOCK_TIMEOUT_MS)),
            detect_deadlocks: true,
        }
    }
}

/// Buffer pool settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    /// Maximum number of resident pages
    pub capacity: usize,
    /// Settings for the pool's lock manager
    pub lock: LockConfig,
    /// Write-back scope at commit
    pub commit_flush: CommitFlush,
}

impl PoolConfig {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            ..Self::default()
        }
    }

    pub fn with_lock_config(mut self, lock: LockConfig) -> Self {
        self.lock = lock;
        self
    }

    pub fn with_commit_flush(mut self, commit_flush: CommitFlush) -> Self {
        self.commit_flush = commit_flush;
        self
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_BUFFER_POOL_SIZE,
            lock: LockConfig::default(),
            commit_flush: CommitFlush::default(),
        }
    }
}
