//! The coalescer driver: turns candidate pairs into actual partition unions.

use crate::{
    coalesce_list::CoalesceList,
    conflict_graph::ConflictGraph,
    ir::{DeclarationInfo, Partition},
    partition_map::PartitionMap,
    tpa::Tpa,
};

/// Result of one coalescing pass: how many partition pairs were actually
/// unioned (also how many fewer partitions exist afterward), and why the
/// rest were rejected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoalesceStats {
    pub unions: u32,
    pub rejected_interference: u32,
    pub rejected_class_mismatch: u32,
}

/// Re-resolves `p` through `map`'s union–find in case an earlier union in
/// this same pass already changed its representative. Goes by way of `p`'s
/// representative variable since `partition_of` resolves operands, not
/// partition ids directly.
fn resolve(map: &mut PartitionMap, p: Partition) -> Partition {
    let var = map
        .var_of(p)
        .expect("a partition produced by a prior successful union must still have a representative");
    map.partition_of(var).expect(
        "a partition produced by a prior successful union must still resolve to a live partition",
    )
}

/// Attempts to coalesce `x` and `y` (already-resolved partitions in the same
/// TPA class): skip if a prior union in this call already merged them or if
/// they interfere, otherwise union them and merge their conflict-graph
/// neighborhoods and TPA class membership. Returns the merged partition's
/// new representative, and which of `x`/`y` was dropped, on success.
fn try_coalesce(
    map: &mut PartitionMap,
    graph: &mut ConflictGraph,
    decls: &impl DeclarationInfo,
    x: Partition,
    y: Partition,
) -> Option<(Partition, Partition)> {
    if x == y {
        return None;
    }
    if graph.conflicts(x, y) {
        return None;
    }
    let var_x = map.var_of(x)?;
    let var_y = map.var_of(y)?;
    let z = map.union(var_x, var_y, decls)?;
    let dropped = if z == x { y } else { x };
    graph.merge(z, dropped);
    Some((z, dropped))
}

/// Drives coalescing from a pre-populated [`CoalesceList`]: repeatedly pops
/// the highest-cost candidate,
/// rejects pairs whose TPA classes differ (or either is classless),
/// re-resolves both sides through the partition map, skips if already
/// unified or interfering, otherwise unions them and removes the losing
/// partition from its TPA class.
///
/// `list` must already be [sorted](CoalesceList::sort).
pub fn coalesce_with_list(
    map: &mut PartitionMap,
    tpa: &mut Tpa,
    graph: &mut ConflictGraph,
    decls: &impl DeclarationInfo,
    list: &mut CoalesceList,
) -> CoalesceStats {
    assert!(
        list.is_sorted(),
        "coalesce_with_list requires a sorted coalesce list"
    );
    let mut stats = CoalesceStats::default();
    while let Some(candidate) = list.pop_best() {
        let (Some(class1), Some(class2)) = (tpa.class_of(candidate.p1), tpa.class_of(candidate.p2))
        else {
            stats.rejected_class_mismatch += 1;
            continue;
        };
        if class1 != class2 {
            stats.rejected_class_mismatch += 1;
            continue;
        }
        let x = resolve(map, candidate.p1);
        let y = resolve(map, candidate.p2);
        match try_coalesce(map, graph, decls, x, y) {
            Some((_, dropped)) => {
                tpa.remove_partition(class1, dropped);
                stats.unions += 1;
                log::trace!(
                    "coalesced partition {dropped:?} into its pair (cost {})",
                    candidate.cost
                );
            }
            None => {
                if x != y {
                    stats.rejected_interference += 1;
                }
            }
        }
    }
    stats
}

/// Drives coalescing by walking each TPA class directly, without a
/// precomputed candidate list: for each class, repeatedly takes its current
/// first partition `y`, then walks the remaining members `z`; unifies
/// non-interfering pairs and removes `z` once it is redundant.
///
/// Re-checks that `y` is still a member of `class` on every outer iteration:
/// a union earlier in the *same* inner loop can already have removed `y`
/// from its class (e.g. if `z` turned out to already share `y`'s
/// representative, unioning leaves `y`'s slot pointing at a partition that
/// was itself already unlinked). Without re-reading `y`'s class membership
/// on every iteration, a stale `y` could be coalesced a second time against
/// a partition it no longer shares a class with.
pub fn coalesce_by_class(
    map: &mut PartitionMap,
    tpa: &mut Tpa,
    graph: &mut ConflictGraph,
    decls: &impl DeclarationInfo,
) -> CoalesceStats {
    let mut stats = CoalesceStats::default();
    for class in 0..tpa.num_trees() {
        loop {
            let Some(mut y) = tpa.members(class).next() else {
                break;
            };
            // Confirm `y` is still in `class` before using it as this
            // round's anchor — a prior successful union in this very loop
            // may have unlinked it already.
            if tpa.class_of(y) != Some(class) {
                break;
            }

            let rest: Vec<Partition> = tpa.members(class).skip(1).collect();
            let mut progressed = false;
            for z in rest {
                if tpa.class_of(z) != Some(class) {
                    // Already coalesced away earlier in this same inner walk.
                    continue;
                }
                let ry = resolve(map, y);
                let rz = resolve(map, z);
                if ry == rz {
                    tpa.remove_partition(class, z);
                    continue;
                }
                match try_coalesce(map, graph, decls, ry, rz) {
                    Some((kept, dropped)) => {
                        tpa.remove_partition(class, dropped);
                        stats.unions += 1;
                        progressed = true;
                        // y's representative may have changed; re-read it.
                        y = if kept == ry { y } else { z };
                    }
                    None => stats.rejected_interference += 1,
                }
            }
            if !progressed {
                // No more progress is possible starting from this `y`; it's
                // done being a candidate anchor for this class.
                break;
            }
        }
    }
    stats
}
