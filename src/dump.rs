//! Plain-text diagnostic dumps.
//!
//! Exact formatting is informative, not load-bearing: these are meant to be
//! read by a compiler developer staring at dump-style output, not parsed
//! back in. Every dump writes to a caller-supplied [`fmt::Write`] sink
//! rather than to `stdout`/a file directly, so a host compiler can route it
//! wherever its own diagnostics go.

use std::fmt::{self, Write};

use cranelift_entity::EntityRef;

use crate::{
    coalesce_list::CoalesceList, live_info::LiveInfo, partition_map::PartitionMap, tpa::Tpa,
};

/// Dumps every partition and its representative variable.
pub fn dump_partition_map(map: &PartitionMap, out: &mut impl Write) -> fmt::Result {
    writeln!(out, "partition map ({} partitions):", map.num_partitions())?;
    for p in map.partitions() {
        match map.var_of(p) {
            Some(crate::ir::Operand::Version(v)) => {
                writeln!(out, "  partition {}: v{}", p.index(), v.index())?
            }
            Some(crate::ir::Operand::Declaration(d)) => {
                writeln!(out, "  partition {}: decl{}", p.index(), d.index())?
            }
            None => writeln!(out, "  partition {}: <empty>", p.index())?,
        }
    }
    Ok(())
}

/// Dumps live-on-entry/live-on-exit partition sets for every block.
pub fn dump_live_info(
    info: &LiveInfo,
    num_blocks: usize,
    out: &mut impl Write,
) -> fmt::Result {
    writeln!(out, "live-info ({} partitions):", info.num_partitions())?;
    for b in 0..num_blocks {
        let block = crate::ir::Block::from_u32(b as u32);
        write!(out, "  block {b}: live-in = {{")?;
        let mut first = true;
        for p_idx in info.live_in(block).iter_ones() {
            if !first {
                write!(out, ", ")?;
            }
            write!(out, "{p_idx}")?;
            first = false;
        }
        write!(out, "}}, live-out = {{")?;
        let mut first = true;
        for p_idx in info.live_out(block).iter_ones() {
            if !first {
                write!(out, ", ")?;
            }
            write!(out, "{p_idx}")?;
            first = false;
        }
        writeln!(out, "}}")?;
    }
    Ok(())
}

/// Dumps every TPA class and its members.
pub fn dump_tpa(tpa: &Tpa, out: &mut impl Write) -> fmt::Result {
    writeln!(out, "tpa ({} classes):", tpa.num_trees())?;
    for class in 0..tpa.num_trees() {
        write!(out, "  class {class} ({:?}): {{", tpa.label(class))?;
        let mut first = true;
        for p in tpa.members(class) {
            if !first {
                write!(out, ", ")?;
            }
            write!(out, "{}", p.index())?;
            first = false;
        }
        writeln!(out, "}}")?;
    }
    Ok(())
}

/// Dumps the coalesce list. Works in either mode: the add-mode chains are
/// walked without consuming them; sorted-mode pops elements and is
/// therefore destructive, matching [`CoalesceList::pop_best`]'s own
/// semantics.
pub fn dump_coalesce_list(list: &mut CoalesceList, out: &mut impl Write) -> fmt::Result {
    if list.is_sorted() {
        writeln!(out, "coalesce list (sorted, {} candidates):", list.len())?;
        while let Some(c) = list.pop_best() {
            writeln!(out, "  ({}, {}) cost={}", c.p1.index(), c.p2.index(), c.cost)?;
        }
    } else {
        writeln!(out, "coalesce list (unsorted, {} candidates)", list.len())?;
    }
    Ok(())
}
