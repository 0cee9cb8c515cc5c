use std::collections::{HashMap, HashSet, VecDeque};

use crate::common::{PageId, TransactionId};

/// What one blocked transaction is waiting for.
#[derive(Debug)]
struct Waiting {
    page_id: PageId,
    holders: HashSet<TransactionId>,
}

/// Wait-for graph between transactions blocked on page locks.
///
/// An edge `waiter -> holder` exists while `waiter` is blocked on a lock that
/// `holder` owns. A transaction blocks on one page at a time, so each waiter
/// records the page its edges belong to. A cycle through a waiter means none
/// of its members can make progress.
#[derive(Debug, Default)]
pub(crate) struct WaitForGraph {
    edges: HashMap<TransactionId, Waiting>,
}

impl WaitForGraph {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Replaces the outgoing edges of `waiter`, blocked on `page_id`, with
    /// one edge per holder.
    pub(crate) fn set_waits<I>(&mut self, waiter: TransactionId, page_id: PageId, holders: I)
    where
        I: IntoIterator<Item = TransactionId>,
    {
        let holders: HashSet<_> = holders.into_iter().filter(|h| *h != waiter).collect();
        if holders.is_empty() {
            self.edges.remove(&waiter);
        } else {
            self.edges.insert(waiter, Waiting { page_id, holders });
        }
    }

    /// Drops the outgoing edges of `waiter` once it stops waiting.
    pub(crate) fn clear_waits(&mut self, waiter: TransactionId) {
        self.edges.remove(&waiter);
    }

    /// Drops the edges into `holder` from transactions blocked on `page_id`,
    /// after `holder` gave that page up.
    pub(crate) fn release_page(&mut self, page_id: PageId, holder: TransactionId) {
        self.edges.retain(|_, waiting| {
            if waiting.page_id == page_id {
                waiting.holders.remove(&holder);
            }
            !waiting.holders.is_empty()
        });
    }

    /// Removes every edge into or out of a finished transaction.
    pub(crate) fn remove_transaction(&mut self, tid: TransactionId) {
        self.edges.remove(&tid);
        self.edges.retain(|_, waiting| {
            waiting.holders.remove(&tid);
            !waiting.holders.is_empty()
        });
    }

    /// Returns true if some transaction `waiter` waits for can reach `waiter` again.
    pub(crate) fn has_cycle_through(&self, waiter: TransactionId) -> bool {
        let Some(start) = self.edges.get(&waiter) else {
            return false;
        };

        let mut visited = HashSet::new();
        let mut queue: VecDeque<TransactionId> = start.holders.iter().copied().collect();

        while let Some(current) = queue.pop_front() {
            if current == waiter {
                return true;
            }
            if visited.insert(current) {
                if let Some(next) = self.edges.get(&current) {
                    queue.extend(next.holders.iter().copied());
                }
            }
        }

        false
    }

    #[cfg(test)]
    pub(crate) fn waits_on(&self, waiter: TransactionId) -> Vec<TransactionId> {
        let mut holders: Vec<_> = self
            .edges
            .get(&waiter)
            .map(|w| w.holders.iter().copied().collect())
            .unwrap_or_default();
        holders.sort();
        holders
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
    fn test_two_party_cycle() {
        let (t1, t2) = (TransactionId::new(), TransactionId::new());
        let mut graph = WaitForGraph::new();

        graph.set_waits(t1, pid(0), [t2]);
        assert!(!graph.has_cycle_through(t1));

        graph.set_waits(t2, pid(0), [t1]);
        assert!(graph.has_cycle_through(t2));
        assert!(graph.has_cycle_through(t1));
    }

    #[test]
    fn test_long_cycle_and_chain() {
        let t: Vec<_> = (0..4).map(|_| TransactionId::new()).collect();
        let mut graph = WaitForGraph::new();

        graph.set_waits(t[0], pid(0), [t[1]]);
        graph.set_waits(t[1], pid(0), [t[2]]);
        graph.set_waits(t[2], pid(0), [t[3]]);
        assert!(!graph.has_cycle_through(t[0]));

        graph.set_waits(t[3], pid(0), [t[0]]);
        assert!(graph.has_cycle_through(t[3]));
    }

    #[test]
    fn test_self_edges_ignored() {
        let t1 = TransactionId::new();
        let mut graph = WaitForGraph::new();
        graph.set_waits(t1, pid(0), [t1]);
        assert!(!graph.has_cycle_through(t1));
        assert!(graph.waits_on(t1).is_empty());
    }

    #[test]
    fn test_remove_transaction_breaks_cycle() {
        let (t1, t2, t3) = (
            TransactionId::new(),
            TransactionId::new(),
            TransactionId::new(),
        );
        let mut graph = WaitForGraph::new();
        graph.set_waits(t1, pid(0), [t2, t3]);
        graph.set_waits(t2, pid(0), [t1]);
        assert!(graph.has_cycle_through(t2));

        graph.remove_transaction(t2);
        assert!(!graph.has_cycle_through(t1));
        assert_eq!(graph.waits_on(t1), vec![t3]);

        graph.clear_waits(t1);
        assert!(graph.waits_on(t1).is_empty());
    }

    #[test]
    fn test_release_page_drops_only_that_pages_edges() {
        let (t1, t2, t3) = (
            TransactionId::new(),
            TransactionId::new(),
            TransactionId::new(),
        );
        let mut graph = WaitForGraph::new();
        graph.set_waits(t2, pid(1), [t1]);
        graph.set_waits(t3, pid(2), [t1]);

        // t1 gave up page 1 early; t2 no longer waits for it
        graph.release_page(pid(1), t1);
        assert!(graph.waits_on(t2).is_empty());
        assert_eq!(graph.waits_on(t3), vec![t1]);

        // So t1 blocking on something t2 holds is not a cycle
        graph.set_waits(t1, pid(3), [t2]);
        assert!(!graph.has_cycle_through(t1));
    }
}
