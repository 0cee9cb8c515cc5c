use std::collections::{BTreeMap, HashMap};

use crate::common::PageId;

/// Least-recently-used ordering over the resident pages of the buffer pool.
///
/// Every access stamps the page with a fresh logical timestamp; the page with
/// the smallest stamp is the least recently used. The replacer only orders
/// candidates: whether a candidate may actually be evicted is decided by the
/// pool, which walks `victims()` until it finds one.
///
/// Not synchronized on its own; the pool mutates it under the same lock as
/// its page table so both change in one step.
#[derive(Debug, Default)]
pub struct LruReplacer {
    /// Next logical timestamp
    clock: u64,
    /// Last access timestamp of each tracked page
    last_access: HashMap<PageId, u64>,
    /// Tracked pages keyed by last access, oldest first
    order: BTreeMap<u64, PageId>,
}

impl LruReplacer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `page_id` as the most recently used page, tracking it if new.
    pub fn record_access(&mut self, page_id: PageId) {
        let ts = self.clock;
        self.clock += 1;

        if let Some(prev) = self.last_access.insert(page_id, ts) {
            self.order.remove(&prev);
        }
        self.order.insert(ts, page_id);
    }

    /// Stops tracking `page_id`. Returns false if it was not tracked.
    pub fn remove(&mut self, page_id: PageId) -> bool {
        match self.last_access.remove(&page_id) {
            Some(ts) => {
                self.order.remove(&ts);
                true
            }
            None => false,
        }
    }

    /// Tracked pages from least to most recently used.
    pub fn victims(&self) -> impl Iterator<Item = PageId> + '_ {
        self.order.values().copied()
    }

    pub fn contains(&self, page_id: PageId) -> bool {
        self.last_access.contains_key(&page_id)
    }

    pub fn len(&self) -> usize {
        self.last_access.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_access.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::TableId;

    fn pid(n: u32) -> PageId {
        PageId::new(TableId::new(1), n)
    }

    #[test]
    fn test_lru_order() {
        let mut replacer = LruReplacer::new();
        replacer.record_access(pid(1));
        replacer.record_access(pid(2));
        replacer.record_access(pid(3));

        assert_eq!(replacer.victims().collect::<Vec<_>>(), vec![pid(1), pid(2), pid(3)]);

        // Touching page 1 makes page 2 the oldest
        replacer.record_access(pid(1));
        assert_eq!(replacer.victims().collect::<Vec<_>>(), vec![pid(2), pid(3), pid(1)]);
        assert_eq!(replacer.len(), 3);
    }

    #[test]
    fn test_remove() {
        let mut replacer = LruReplacer::new();
        replacer.record_access(pid(1));
        replacer.record_access(pid(2));

        assert!(replacer.remove(pid(1)));
        assert!(!replacer.remove(pid(1)));
        assert!(!replacer.contains(pid(1)));
        assert_eq!(replacer.victims().next(), Some(pid(2)));

        assert!(replacer.remove(pid(2)));
        assert!(replacer.is_empty());
        assert_eq!(replacer.victims().next(), None);
    }
}
