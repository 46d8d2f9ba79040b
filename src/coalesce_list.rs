//! The cost-weighted coalesce candidate list.

use cranelift_entity::EntityRef;
use rustc_hash::FxHashMap;

use crate::ir::Partition;

/// One candidate pair: `p1 < p2`, plus the accumulated cost of copies
/// between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate {
    pub p1: Partition,
    pub p2: Partition,
    pub cost: u32,
}

enum Storage {
    /// *Add mode*: per-`p1` sorted-by-`p2` chains, keyed by `p1`'s index so
    /// that `add_coalesce` can merge-or-insert without a full scan.
    Add(FxHashMap<u32, Vec<Candidate>>),
    /// *Sorted mode*: one flat list ordered by cost ascending, so the
    /// highest-cost candidate sits at the end for [`CoalesceList::pop_best`]
    /// to pop in O(1). One-way: `add_coalesce` is forbidden once here.
    Sorted(Vec<Candidate>),
}

/// Cost-weighted priority list of candidate partition pairs, built during
/// the same backward sweep as the [conflict graph](crate::conflict_graph).
pub struct CoalesceList {
    storage: Storage,
}

impl Default for CoalesceList {
    fn default() -> Self {
        Self::new()
    }
}

impl CoalesceList {
    pub fn new() -> Self {
        Self {
            storage: Storage::Add(FxHashMap::default()),
        }
    }

    /// `true` once [`CoalesceList::sort`] has been called; `add_coalesce` is
    /// a programmer-contract violation past this point.
    pub fn is_sorted(&self) -> bool {
        matches!(self.storage, Storage::Sorted(_))
    }

    /// Records a candidate coalesce between `p1` and `p2` with weight `v`,
    /// merging into an existing candidate's cost if one is already present
    /// for this pair.
    ///
    /// # Panics
    /// If the list has already been [sorted](Self::sort): further adds are
    /// forbidden until the list is rebuilt from scratch.
    pub fn add_coalesce(&mut self, p1: Partition, p2: Partition, v: u32) {
        let (p1, p2) = if p1.index() < p2.index() {
            (p1, p2)
        } else if p1 == p2 {
            return;
        } else {
            (p2, p1)
        };
        let Storage::Add(chains) = &mut self.storage else {
            panic!("add_coalesce called on a sorted coalesce list; rebuild it first");
        };
        let chain = chains.entry(p1.as_u32()).or_default();
        match chain.binary_search_by_key(&p2.index(), |c| c.p2.index()) {
            Ok(i) => chain[i].cost += v,
            Err(i) => chain.insert(i, Candidate { p1, p2, cost: v }),
        }
    }

    /// Flattens every per-`p1` chain into one list, ordered by cost
    /// ascending so that [`Self::pop_best`] can pop the highest-cost
    /// candidate off the end in O(1) (stable order not required). One-way:
    /// transitions this list into *sorted mode*.
    pub fn sort(&mut self) {
        let flat: Vec<Candidate> = match &mut self.storage {
            Storage::Add(chains) => chains.drain().flat_map(|(_, v)| v).collect(),
            Storage::Sorted(list) => std::mem::take(list),
        };
        let mut flat = flat;
        match flat.len() {
            0 | 1 => {}
            // Hand-swapped two-element case, avoiding a full sort call.
            2 => {
                if flat[0].cost > flat[1].cost {
                    flat.swap(0, 1);
                }
            }
            _ => flat.sort_unstable_by(|a, b| a.cost.cmp(&b.cost)),
        }
        log::debug!("sorted coalesce list: {} candidates", flat.len());
        self.storage = Storage::Sorted(flat);
    }

    /// Pops the highest-cost remaining candidate, or `None` if empty.
    ///
    /// # Panics
    /// If the list has not yet been [sorted](Self::sort).
    pub fn pop_best(&mut self) -> Option<Candidate> {
        let Storage::Sorted(list) = &mut self.storage else {
            panic!("pop_best called before sort — call CoalesceList::sort first");
        };
        list.pop()
    }

    /// Number of remaining candidates, in either mode.
    pub fn len(&self) -> usize {
        match &self.storage {
            Storage::Add(chains) => chains.values().map(Vec::len).sum(),
            Storage::Sorted(list) => list.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(i: u32) -> Partition {
        Partition::from_u32(i)
    }

    #[test]
    fn add_coalesce_merges_existing_pair() {
        let mut list = CoalesceList::new();
        list.add_coalesce(p(1), p(2), 1);
        list.add_coalesce(p(2), p(1), 3);
        assert_eq!(list.len(), 1);
        list.sort();
        assert_eq!(
            list.pop_best(),
            Some(Candidate {
                p1: p(1),
                p2: p(2),
                cost: 4
            })
        );
    }

    #[test]
    fn pop_best_is_non_increasing() {
        let mut list = CoalesceList::new();
        list.add_coalesce(p(0), p(1), 1);
        list.add_coalesce(p(0), p(2), 5);
        list.add_coalesce(p(1), p(3), 3);
        list.sort();
        let mut last = u32::MAX;
        let mut n = 0;
        while let Some(c) = list.pop_best() {
            assert!(c.cost <= last);
            last = c.cost;
            n += 1;
        }
        assert_eq!(n, 3);
        assert_eq!(list.pop_best(), None);
    }

    #[test]
    #[should_panic(expected = "rebuild it first")]
    fn add_after_sort_panics() {
        let mut list = CoalesceList::new();
        list.add_coalesce(p(0), p(1), 1);
        list.sort();
        list.add_coalesce(p(0), p(2), 1);
    }
}
