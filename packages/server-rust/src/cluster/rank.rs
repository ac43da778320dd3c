//! Per-role rank allocation.
//!
//! Each role has a counter that only moves forward. Ranks are handed out once
//! and never reused, even after the owning node unregisters. Explicit ranks
//! (requested by a node or restored from a recovery file) go into the same
//! ledger and push the counter past them.

use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Default)]
struct RoleRanks {
    next: u32,
    issued: BTreeSet<u32>,
}

/// Rank ledger for all roles. Guarded by the registry lock.
#[derive(Debug, Default)]
pub struct RankAllocator {
    roles: HashMap<String, RoleRanks>,
}

impl RankAllocator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Issues the role's next rank. The first call for a role returns 0.
    pub fn allocate(&mut self, role: &str) -> u32 {
        let ranks = self.roles.entry(role.to_string()).or_default();
        let rank = ranks.next;
        ranks.issued.insert(rank);
        ranks.next = rank.saturating_add(1);
        rank
    }

    /// Reserves a specific rank and moves the role's counter to at least
    /// `rank + 1`. Returns `false` if the rank was already issued.
    pub fn reserve(&mut self, role: &str, rank: u32) -> bool {
        let ranks = self.roles.entry(role.to_string()).or_default();
        if !ranks.issued.insert(rank) {
            return false;
        }
        ranks.next = ranks.next.max(rank.saturating_add(1));
        true
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn first_rank_per_role_is_zero() {
        let mut ranks = RankAllocator::new();
        assert_eq!(ranks.allocate("worker"), 0);
        assert_eq!(ranks.allocate("scheduler"), 0);
        assert_eq!(ranks.allocate("worker"), 1);
        assert_eq!(ranks.allocate("worker"), 2);
        assert_eq!(ranks.allocate("scheduler"), 1);
    }

    #[test]
    fn reserve_advances_the_counter() {
        let mut ranks = RankAllocator::new();
        assert!(ranks.reserve("worker", 1));
        assert_eq!(ranks.allocate("worker"), 2);
        assert_eq!(ranks.allocate("worker"), 3);
    }

    #[test]
    fn lower_reservation_keeps_the_counter() {
        let mut ranks = RankAllocator::new();
        assert!(ranks.reserve("worker", 4));
        assert!(ranks.reserve("worker", 0));
        assert_eq!(ranks.allocate("worker"), 5);
    }

    #[test]
    fn reserve_refuses_issued_rank() {
        let mut ranks = RankAllocator::new();
        let rank = ranks.allocate("worker");
        assert!(!ranks.reserve("worker", rank));
        assert!(ranks.reserve("scheduler", rank));
    }

    #[test]
    fn restored_ranks_resume_after_the_maximum() {
        let mut ranks = RankAllocator::new();
        for rank in [2, 1] {
            assert!(ranks.reserve("worker", rank));
        }
        assert!(ranks.reserve("scheduler", 0));
        assert_eq!(ranks.allocate("worker"), 3);
        assert_eq!(ranks.allocate("scheduler"), 1);
    }

    proptest! {
        #[test]
        fn allocations_never_repeat(reserved in proptest::collection::btree_set(0u32..64, 0..16), n in 1usize..64) {
            let mut ranks = RankAllocator::new();
            for &r in &reserved {
                prop_assert!(ranks.reserve("worker", r));
            }
            let mut seen = BTreeSet::new();
            let mut last = None;
            for _ in 0..n {
                let rank = ranks.allocate("worker");
                prop_assert!(!reserved.contains(&rank));
                prop_assert!(seen.insert(rank));
                prop_assert!(last.map_or(true, |prev| rank > prev));
                last = Some(rank);
            }
        }

        #[test]
        fn plain_allocation_is_dense(n in 1u32..128) {
            let mut ranks = RankAllocator::new();
            let got: Vec<u32> = (0..n).map(|_| ranks.allocate("worker")).collect();
            let expected: Vec<u32> = (0..n).collect();
            prop_assert_eq!(got, expected);
        }
    }
}
