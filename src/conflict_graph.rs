//! The conflict (interference) graph, plus the single backward sweep that
//! builds it and (optionally) [`CoalesceList`].

use bitvec::prelude::*;
use cranelift_entity::EntityRef;
use rustc_hash::FxHashSet;

use crate::{
    coalesce_list::CoalesceList,
    ir::{Block, OperandMask, Partition, Program},
    live_info::LiveInfo,
    partition_map::PartitionMap,
    tpa::Tpa,
};

/// Symmetric, sparse adjacency of partitions simultaneously live at some
/// program point.
#[derive(Default)]
pub struct ConflictGraph {
    adjacency: Vec<FxHashSet<Partition>>,
}

impl ConflictGraph {
    fn empty(num_partitions: usize) -> Self {
        Self {
            adjacency: vec![FxHashSet::default(); num_partitions],
        }
    }

    /// Records that `a` and `b` conflict (symmetric). A no-op if `a == b`.
    pub fn add(&mut self, a: Partition, b: Partition) {
        if a == b {
            return;
        }
        self.adjacency[a.index()].insert(b);
        self.adjacency[b.index()].insert(a);
    }

    pub fn conflicts(&self, a: Partition, b: Partition) -> bool {
        a != b && self.adjacency[a.index()].contains(&b)
    }

    pub fn neighbors(&self, p: Partition) -> impl Iterator<Item = Partition> + '_ {
        self.adjacency[p.index()].iter().copied()
    }

    /// Unions `drop`'s neighborhood into `keep`'s and removes `drop` from the
    /// graph entirely, after a successful coalesce of the two partitions.
    pub fn merge(&mut self, keep: Partition, drop: Partition) {
        if keep == drop {
            return;
        }
        let neighbors: Vec<Partition> = self.adjacency[drop.index()].drain().collect();
        for n in neighbors {
            self.adjacency[n.index()].remove(&drop);
            if n != keep {
                self.add(keep, n);
            }
        }
    }
}

/// Per-class "currently live" scratch lists for efficient same-class
/// conflict insertion: a singly-linked history list per class
/// (`class_live_head`/`class_live_next`), with a bitvec as the source of
/// truth for whether a listed partition is *still* live — lazily removing an
/// entry is then O(1) (just flip the bit) instead of O(|class|) (unlinking
/// it). At block end, only the classes and partitions actually touched need
/// resetting.
struct ClassLiveScratch {
    class_live_head: Vec<Option<Partition>>,
    class_live_next: Vec<Option<Partition>>,
    in_class_live: BitVec,
    touched_classes: Vec<usize>,
    touched_partitions: Vec<Partition>,
}

impl ClassLiveScratch {
    fn new(num_partitions: usize, num_classes: usize) -> Self {
        Self {
            class_live_head: vec![None; num_classes],
            class_live_next: vec![None; num_partitions],
            in_class_live: bitvec![0; num_partitions],
            touched_classes: Vec::new(),
            touched_partitions: Vec::new(),
        }
    }

    fn mark_live(&mut self, p: Partition, class: usize) {
        if self.in_class_live[p.index()] {
            return;
        }
        self.in_class_live.set(p.index(), true);
        self.class_live_next[p.index()] = self.class_live_head[class];
        self.class_live_head[class] = Some(p);
        self.touched_classes.push(class);
        self.touched_partitions.push(p);
    }

    fn mark_dead(&mut self, p: Partition) {
        self.in_class_live.set(p.index(), false);
    }

    /// Adds a conflict between `p` (a def) and every partition still marked
    /// live in `class` other than `p` itself.
    fn conflict_with_class(&self, p: Partition, class: usize, graph: &mut ConflictGraph) {
        let mut cur = self.class_live_head[class];
        while let Some(c) = cur {
            if c != p && self.in_class_live[c.index()] {
                graph.add(p, c);
            }
            cur = self.class_live_next[c.index()];
        }
    }

    fn reset_block(&mut self) {
        for class in self.touched_classes.drain(..) {
            self.class_live_head[class] = None;
        }
        for p in self.touched_partitions.drain(..) {
            self.in_class_live.set(p.index(), false);
        }
    }
}

/// Builds the conflict graph and (if `want_coalesce_list`) the coalesce list
/// in a single backward sweep over every block.
///
/// For each block, `live` starts as [`LiveInfo::live_out`] and is walked
/// backward statement-by-statement: a copy statement records a coalesce
/// candidate and is specially suppressed from self-conflicting (a copy
/// between variables slated for coalescing must not interfere with itself);
/// any other statement's defs conflict with every same-TPA-class partition
/// currently live, then its uses become live. After the sweep, every
/// φ-result in the block — whether or not it ended up live — still gets
/// conflicts recorded against same-class live partitions: an unused
/// φ-result must not be silently coalesced with something it aliases on
/// exit.
pub fn build(
    program: &impl Program,
    map: &mut PartitionMap,
    tpa: &Tpa,
    live_info: &LiveInfo,
    want_coalesce_list: bool,
) -> (ConflictGraph, Option<CoalesceList>) {
    let num_partitions = map.num_partitions();
    let mut graph = ConflictGraph::empty(num_partitions);
    let mut coalesce_list = want_coalesce_list.then(CoalesceList::new);
    let mut scratch = ClassLiveScratch::new(num_partitions, tpa.num_trees().max(1));

    for block in program.blocks() {
        run_block(program, map, tpa, live_info, block, &mut graph, coalesce_list.as_mut(), &mut scratch);
    }

    (graph, coalesce_list)
}

#[allow(clippy::too_many_arguments)]
fn run_block(
    program: &impl Program,
    map: &mut PartitionMap,
    tpa: &Tpa,
    live_info: &LiveInfo,
    block: Block,
    graph: &mut ConflictGraph,
    mut coalesce_list: Option<&mut CoalesceList>,
    scratch: &mut ClassLiveScratch,
) {
    let mut live = live_info.live_out(block).clone();
    for p_idx in live.iter_ones() {
        let p = Partition::from_u32(p_idx as u32);
        if let Some(class) = tpa.class_of(p) {
            scratch.mark_live(p, class);
        }
    }

    for &stmt in program.statements(block).iter().rev() {
        if let Some((lhs, rhs)) = program.as_copy(stmt) {
            let p1 = map.partition_of(lhs);
            let p2 = map.partition_of(rhs);
            if let (Some(p1), Some(p2)) = (p1, p2) {
                if let Some(list) = coalesce_list.as_deref_mut() {
                    list.add_coalesce(p1, p2, 1);
                }
                // Temporarily clear p2 (the rhs) from live so that the def
                // conflicts added for p1 don't self-interfere with the very
                // value it's being copied from; p2 becomes live again right
                // below, as this statement's use.
                let p2_was_live = live[p2.index()];
                if p2_was_live {
                    live.set(p2.index(), false);
                    scratch.mark_dead(p2);
                }
                if let Some(class) = tpa.class_of(p1) {
                    scratch.conflict_with_class(p1, class, graph);
                }
                live.set(p1.index(), false);
                scratch.mark_dead(p1);
                live.set(p2.index(), true);
                if let Some(class) = tpa.class_of(p2) {
                    scratch.mark_live(p2, class);
                }
                continue;
            }
        }

        for op in program.operands(stmt, OperandMask::ALL_DEFS) {
            let Some(pd) = map.partition_of(op) else { continue };
            if let Some(class) = tpa.class_of(pd) {
                scratch.conflict_with_class(pd, class, graph);
            }
            live.set(pd.index(), false);
            scratch.mark_dead(pd);
        }
        for op in program.operands(stmt, OperandMask::ALL_USES) {
            let Some(pu) = map.partition_of(op) else { continue };
            live.set(pu.index(), true);
            if let Some(class) = tpa.class_of(pu) {
                scratch.mark_live(pu, class);
            }
        }
    }

    for phi in program.phis(block) {
        let Some(p) = map.partition_of(phi.result) else { continue };
        if let Some(class) = tpa.class_of(p) {
            scratch.conflict_with_class(p, class, graph);
        }
        live.set(p.index(), false);
        scratch.mark_dead(p);
    }

    scratch.reset_block();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(i: u32) -> Partition {
        Partition::from_u32(i)
    }

    #[test]
    fn merge_unions_neighborhoods() {
        let mut g = ConflictGraph::empty(4);
        g.add(p(0), p(1));
        g.add(p(2), p(1));
        g.add(p(2), p(3));
        g.merge(p(0), p(2));
        assert!(g.conflicts(p(0), p(1)));
        assert!(g.conflicts(p(0), p(3)));
        assert!(!g.conflicts(p(0), p(2)));
    }

    #[test]
    fn add_is_symmetric_and_irreflexive() {
        let mut g = ConflictGraph::empty(2);
        g.add(p(0), p(0));
        assert!(!g.conflicts(p(0), p(0)));
        g.add(p(0), p(1));
        assert!(g.conflicts(p(0), p(1)));
        assert!(g.conflicts(p(1), p(0)));
    }
}
