//! Live-on-entry/live-on-exit sets and the backward worklist solver that
//! computes them.

use bitvec::prelude::*;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::{
    error::IntegrityError,
    ir::{Block, EntityRef, OperandMask, Partition, Program},
    partition_map::PartitionMap,
};

type PartitionSet = BitVec;

/// Live-on-entry/live-on-exit partition sets for every block, plus the set of
/// "global" partitions live across more than one block, needed by the
/// conflict graph's copy/φ special-casing.
pub struct LiveInfo {
    num_partitions: usize,
    live_in: Vec<PartitionSet>,
    live_out: Vec<PartitionSet>,
    global: PartitionSet,
}

impl LiveInfo {
    fn empty(num_blocks: usize, num_partitions: usize) -> Self {
        Self {
            num_partitions,
            live_in: vec![bitvec![0; num_partitions]; num_blocks],
            live_out: vec![bitvec![0; num_partitions]; num_blocks],
            global: bitvec![0; num_partitions],
        }
    }

    #[inline(always)]
    pub const fn num_partitions(&self) -> usize {
        self.num_partitions
    }

    /// Partitions live on entry to `block`.
    pub fn live_in(&self, block: Block) -> &PartitionSet {
        &self.live_in[block.index()]
    }

    /// Partitions live on exit from `block` — the union of live-in of every
    /// successor, plus φ-arguments consumed on that particular edge.
    pub fn live_out(&self, block: Block) -> &PartitionSet {
        &self.live_out[block.index()]
    }

    /// `true` if `p` is live across a block boundary anywhere in the
    /// procedure, i.e. it is live-in or live-out of at least one block.
    pub fn is_global(&self, p: Partition) -> bool {
        self.global[p.index()]
    }

    pub fn is_live_in(&self, block: Block, p: Partition) -> bool {
        self.live_in[block.index()][p.index()]
    }

    pub fn is_live_out(&self, block: Block, p: Partition) -> bool {
        self.live_out[block.index()][p.index()]
    }
}

/// Computes live-on-entry sets for every block of `program` via a backward
/// worklist data-flow solve over `map`'s current partitions, then fills in
/// live-on-exit sets from them.
///
/// Two passes over each block's φ-nodes are required: first every
/// φ-argument is treated as a use of its partition *as if it were
/// live-out of the block it's evaluated in*, against the block's pre-φ
/// `saw_def` state; only once all φ-arguments have been processed are the
/// block's φ-results marked as definitions. Interleaving the two passes would
/// let a φ-argument that is also a φ-result elsewhere in the same block be
/// incorrectly treated as already defined before its own use is recorded.
///
/// When [`CoalesceConfig::checks_integrity`](crate::config::CoalesceConfig::checks_integrity)
/// is set on `map`'s config, [`LiveInfo::check_integrity`] runs before this
/// returns, surfacing the first anomaly found rather than handing back a
/// `LiveInfo` built over an already-inconsistent program.
pub fn calculate_live_on_entry(
    program: &impl Program,
    map: &mut PartitionMap,
) -> Result<LiveInfo, IntegrityError> {
    let num_blocks = program.num_blocks();
    let num_partitions = map.num_partitions();
    let mut info = LiveInfo::empty(num_blocks, num_partitions);

    // `saw_def[b]` records, per block, which partitions have a definition
    // reached by the point currently being processed within that block —
    // reused across the worklist but always rebuilt in full before use below.
    let mut worklist: Vec<Block> = program.blocks().collect();
    let mut queued: FxHashSet<Block> = worklist.iter().copied().collect();

    while let Some(block) = worklist.pop() {
        queued.remove(&block);

        let mut live = info.live_in[block.index()].clone();
        live.fill(false);

        // Seed with the union of live-in of every successor.
        for succ in program.successors(block) {
            live |= &info.live_in[succ.index()];
        }

        // A successor's own phi results are defined by the phi itself, not
        // carried in from this block, so they never count as live-out; what
        // does cross the edge is whichever argument that phi takes for it.
        for succ in program.successors(block) {
            for phi in program.phis(succ) {
                if let Some(p) = map.partition_of(phi.result) {
                    live.set(p.index(), false);
                }
            }
        }
        for succ in program.successors(block) {
            for phi in program.phis(succ) {
                for arg in &phi.args {
                    if arg.edge == block {
                        if let Some(p) = map.partition_of(arg.version) {
                            live.set(p.index(), true);
                        }
                    }
                }
            }
        }

        info.live_out[block.index()] = live.clone();

        // Backward statement sweep: uses before defs within each statement.
        for &stmt in program.statements(block).iter().rev() {
            for op in program.operands(stmt, OperandMask::ALL_DEFS) {
                if let Some(p) = map.partition_of(op) {
                    live.set(p.index(), false);
                }
            }
            for op in program.operands(stmt, OperandMask::ALL_USES) {
                if let Some(p) = map.partition_of(op) {
                    live.set(p.index(), true);
                }
            }
        }

        // This block's own phi results are defs reached only at the very
        // top of the block, after every statement above has run backward
        // through them — never a use within this block's own body.
        for phi in program.phis(block) {
            if let Some(p) = map.partition_of(phi.result) {
                live.set(p.index(), false);
            }
        }

        if live != info.live_in[block.index()] {
            info.live_in[block.index()] = live;
            for pred in program.predecessors(block) {
                if queued.insert(pred) {
                    worklist.push(pred);
                }
            }
        }
    }

    for block in program.blocks() {
        for p in 0..num_partitions {
            if info.live_in[block.index()][p] || info.live_out[block.index()][p] {
                info.global.set(p, true);
            }
        }
    }

    if map.config().checks_integrity() {
        info.check_integrity(program, map)?;
    }

    Ok(info)
}

/// Returns `info`'s live-on-exit set for `block`.
///
/// The external interface this crate exposes names this as a distinct step
/// from [`calculate_live_on_entry`] (live-on-exit is "built lazily, on
/// demand" from live-on-entry). In practice [`calculate_live_on_entry`]'s
/// single backward sweep already produces every block's live-out as the
/// `live` bitset it starts walking statements backward from, so this is a
/// zero-cost accessor rather than a second data-flow pass.
pub fn calculate_live_on_exit(info: &LiveInfo, block: Block) -> &PartitionSet {
    info.live_out(block)
}

impl LiveInfo {
    /// For every successor `e` of the entry block, every partition live-on-
    /// entry to `e` must either be the default definition of its underlying
    /// declaration, or be a φ-argument arriving on the entry→e edge.
    /// Anything else indicates an earlier pass created a use-before-def:
    /// this would only be true if some definition of that partition's
    /// representative reaches `e` without having gone through the
    /// procedure's own entry, which default definitions and φ-arguments are
    /// the only sanctioned ways to do.
    ///
    /// `O(partitions × entry successors)`; meant for debug builds of the
    /// host compiler
    /// ([`CoalesceConfig::checks_integrity`](crate::config::CoalesceConfig::checks_integrity)).
    pub fn check_integrity(
        &self,
        program: &impl Program,
        map: &mut PartitionMap,
    ) -> Result<(), IntegrityError> {
        let entry = program.entry_block();
        for succ in program.successors(entry) {
            let mut phi_args_on_edge: FxHashSet<Partition> = FxHashSet::default();
            for phi in program.phis(succ) {
                for arg in &phi.args {
                    if arg.edge == entry {
                        if let Some(p) = map.partition_of(arg.version) {
                            phi_args_on_edge.insert(p);
                        }
                    }
                }
            }

            for p_idx in self.live_in[succ.index()].iter_ones() {
                let p = Partition::from_u32(p_idx as u32);
                if phi_args_on_edge.contains(&p) {
                    continue;
                }
                let Some(op) = map.var_of(p) else { continue };
                let version = match op {
                    crate::ir::Operand::Version(v) => v,
                    crate::ir::Operand::Declaration(_) => continue,
                };
                let decl = program.underlying_declaration(version);
                if program.default_def(decl) == Some(version) {
                    continue;
                }
                if let Some(def_block) = program.defining_block(version) {
                    return Err(IntegrityError::LiveWithExistingDef {
                        partition: p_idx as u32,
                        version,
                        block: succ,
                        def_block,
                    });
                }
                return Err(IntegrityError::LiveWithoutDefaultDef {
                    partition: p_idx as u32,
                    version,
                    block: succ,
                    declaration: decl,
                });
            }
        }
        Ok(())
    }

    /// Sanity check for the one piece of memory/virtual-operand handling this
    /// crate performs (see the crate's Non-goals): no underlying declaration
    /// may be used as a real operand (`USE`/`DEF`) anywhere in the procedure
    /// and also as a virtual operand (`VIRTUAL_USE`/`VMUSTDEF`) anywhere
    /// else in it. A declaration used both ways cannot be partitioned
    /// soundly, since real-operand liveness and virtual-operand liveness are
    /// tracked identically by this crate but mean different things to the
    /// host compiler. Scoped to the whole procedure rather than a single
    /// statement, matching `create_ssa_var_map`'s own whole-function
    /// `used_in_real_ops`/`used_in_virtual_ops` bitmap comparison.
    pub fn check_no_virtual_real_overlap(program: &impl Program) -> Result<(), IntegrityError> {
        let mut used_real = FxHashMap::default();
        let mut used_virtual = FxHashMap::default();
        for block in program.blocks() {
            for &stmt in program.statements(block) {
                for op in program.operands(stmt, OperandMask::USE | OperandMask::DEF) {
                    if let crate::ir::Operand::Version(v) = op {
                        used_real.entry(program.underlying_declaration(v)).or_insert((v, block));
                    }
                }
                for op in program.operands(stmt, OperandMask::VIRTUAL_USE | OperandMask::VMUSTDEF) {
                    if let crate::ir::Operand::Version(v) = op {
                        used_virtual.entry(program.underlying_declaration(v)).or_insert((v, block));
                    }
                }
            }
        }
        for (decl, &(version, block)) in &used_virtual {
            if used_real.contains_key(decl) {
                return Err(IntegrityError::VirtualOperandOverlap { version, block });
            }
        }
        Ok(())
    }
}
