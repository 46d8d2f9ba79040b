//! Out-of-SSA live-range analysis and coalescing.
//!
//! Given a procedure already in SSA form — a CFG of basic blocks whose
//! definitions and φ-functions carry version-numbered virtual registers —
//! this crate answers two tightly coupled questions:
//!
//! 1. Where is each SSA version live ([`live_info::calculate_live_on_entry`])?
//! 2. Which SSA versions can share a single backing storage location once
//!    SSA is destroyed, so that the copies introduced by φ-resolution can be
//!    elided ([`coalescer`])?
//!
//! # Pipeline
//!
//! ```text
//! PartitionMap::init       — one partition per SSA version
//!   -> register every version seen while scanning statements
//!   -> calculate_live_on_entry   (needs the partition map)
//!   -> Tpa::root_var_init / type_var_init   (needs the partition map)
//!   -> conflict_graph::build     (needs live-info and the TPA)
//!   -> coalescer::coalesce_with_list / coalesce_by_class
//!   -> PartitionMap::compact     (finalizes dense partition ids)
//! ```
//!
//! Every component but [`partition_map::PartitionMap`] itself borrows the
//! partition map rather than owning a copy of it; [`coalescer`] is the only
//! mutator. Any derivative
//! built before a [`partition_map::PartitionMap::compact`] call, or before a
//! coalesce pass changes membership, must be rebuilt afterward — nothing in
//! this crate reuses a stale [`tpa::Tpa`], [`conflict_graph::ConflictGraph`],
//! or [`coalesce_list::CoalesceList`] across a recompaction.
//!
//! This crate never constructs SSA itself, never walks a CFG directly, and
//! has no opinion on diagnostics destinations: see [`ir`] for the traits a
//! host compiler implements to drive it.

pub mod coalesce_list;
pub mod coalescer;
pub mod config;
pub mod conflict_graph;
pub mod dump;
pub mod error;
#[cfg(any(test, feature = "testing"))]
pub mod fixture;
pub mod ir;
pub mod live_info;
pub mod partition_map;
pub mod tpa;

pub use self::{
    coalesce_list::{Candidate, CoalesceList},
    coalescer::{coalesce_by_class, coalesce_with_list, CoalesceStats},
    config::CoalesceConfig,
    conflict_graph::ConflictGraph,
    error::IntegrityError,
    ir::{Block, Declaration, Operand, Partition, SsaVersion},
    live_info::{calculate_live_on_entry, calculate_live_on_exit, LiveInfo},
    partition_map::PartitionMap,
    tpa::{Tpa, TreeLabel},
};
