//! The tree-partition associator.
//!
//! Groups partitions into equivalence classes — either by underlying
//! declaration ("root variable") or by type — that confine coalescing: two
//! partitions can only ever be unioned by [`crate::coalescer`] if they share
//! a TPA class.

use cranelift_entity::EntityRef;
use rustc_hash::FxHashMap;

use crate::{
    ir::{Declaration, DeclarationInfo, Partition, Program, TypeKey},
    partition_map::PartitionMap,
};

/// What a TPA class is keyed by. Informational only — used by [`Tpa::label`]
/// for diagnostic dumps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TreeLabel {
    /// All partitions sharing the same underlying declaration, stripped of
    /// SSA versioning ([`Tpa::root_var_init`]).
    RootVar(Declaration),
    /// All partitions whose representative declaration shares a type
    /// ([`Tpa::type_var_init`]).
    Type(TypeKey),
}

/// Groups partitions into classes confining coalescing. Each class is a
/// singly-linked list of partition ids threaded through
/// [`Tpa::next_partition`], so that removing a partition from its class, or
/// walking a class's membership, never needs to allocate.
///
/// Built fresh from a [`PartitionMap`]'s *current* partitions; must be
/// rebuilt after any [`PartitionMap::compact`] or any successful coalescing
/// pass.
pub struct Tpa {
    labels: Vec<TreeLabel>,
    /// `first_partition[class]`.
    first_partition: Vec<Option<Partition>>,
    /// `next_partition[p]`, keyed by partition id; `None` terminates a class.
    next_partition: Vec<Option<Partition>>,
    /// `partition_to_tree_map[p]`, `None` is `TPA_NONE` (classless).
    partition_to_tree: Vec<Option<usize>>,
    /// Number of classes retained after the last [`Tpa::compact`], or
    /// `labels.len()` if never compacted.
    num_trees: usize,
}

impl Tpa {
    fn empty(num_partitions: usize) -> Self {
        Self {
            labels: Vec::new(),
            first_partition: Vec::new(),
            next_partition: vec![None; num_partitions],
            partition_to_tree: vec![None; num_partitions],
            num_trees: 0,
        }
    }

    /// Number of classes currently live (post-compaction, if compacted).
    #[inline(always)]
    pub const fn num_trees(&self) -> usize {
        self.num_trees
    }

    /// The class a partition belongs to, or `None` (`TPA_NONE`) if it is
    /// classless (excluded by [`Tpa::type_var_init`], or never registered).
    #[inline]
    pub fn class_of(&self, p: Partition) -> Option<usize> {
        self.partition_to_tree.get(p.index()).copied().flatten()
    }

    /// The label a class was built from — informational, used by dumps.
    pub fn label(&self, class: usize) -> TreeLabel {
        self.labels[class]
    }

    /// Iterates the partitions in `class`, in ascending order (guaranteed by
    /// the high-to-low construction order of [`Tpa::root_var_init`] /
    /// [`Tpa::type_var_init`]).
    pub fn members(&self, class: usize) -> impl Iterator<Item = Partition> + '_ {
        let mut cur = self.first_partition.get(class).copied().flatten();
        std::iter::from_fn(move || {
            let p = cur?;
            cur = self.next_partition[p.index()];
            Some(p)
        })
    }

    fn push_member(&mut self, class: usize, p: Partition) {
        self.next_partition[p.index()] = self.first_partition[class];
        self.first_partition[class] = Some(p);
        self.partition_to_tree[p.index()] = Some(class);
    }

    /// Groups every registered partition of `map` with every other partition
    /// sharing the same underlying declaration, stripping away SSA
    /// versioning.
    ///
    /// Iterates raw partition ids from highest to lowest so that each
    /// resulting class's member list ends up sorted in ascending order: each
    /// new member is pushed to the front of its class's list, so visiting
    /// ids in descending order leaves the list itself in ascending order.
    pub fn root_var_init(map: &mut PartitionMap, program: &impl Program) -> Self {
        let n = map.num_partitions();
        let mut tpa = Self::empty(n);
        // One-shot "first encounter" flag per declaration, owned by this
        // construction rather than the declaration itself.
        let mut class_of_decl: FxHashMap<Declaration, usize> = FxHashMap::default();

        for raw in (0..n as u32).rev() {
            let p = Partition::from_u32(raw);
            let Some(op) = map.var_of(p) else { continue };
            let decl = match op {
                crate::ir::Operand::Version(v) => program.underlying_declaration(v),
                crate::ir::Operand::Declaration(d) => d,
            };
            let class = *class_of_decl.entry(decl).or_insert_with(|| {
                tpa.labels.push(TreeLabel::RootVar(decl));
                tpa.first_partition.push(None);
                tpa.labels.len() - 1
            });
            tpa.push_member(class, p);
        }

        tpa.num_trees = tpa.labels.len();
        log::debug!("built root-var TPA with {} classes", tpa.num_trees);
        tpa
    }

    /// Like [`Tpa::root_var_init`], but classes are keyed by
    /// [`DeclarationInfo::type_key`] rather than by declaration identity, and
    /// partitions backing volatiles, parameters, return values, registers,
    /// user-visible (non-compiler-generated) declarations, or declarations
    /// with assigned storage are excluded entirely — coalescing any of those
    /// could change observable behavior.
    pub fn type_var_init(map: &mut PartitionMap, program: &impl Program) -> Self {
        let n = map.num_partitions();
        let mut tpa = Self::empty(n);
        let mut class_of_type: FxHashMap<TypeKey, usize> = FxHashMap::default();

        for raw in (0..n as u32).rev() {
            let p = Partition::from_u32(raw);
            let Some(op) = map.var_of(p) else { continue };
            let decl = match op {
                crate::ir::Operand::Version(v) => program.underlying_declaration(v),
                crate::ir::Operand::Declaration(d) => d,
            };
            if program.is_volatile(decl)
                || program.is_parameter(decl)
                || program.is_return_value(decl)
                || program.is_register(decl)
                || program.is_user_visible(decl)
                || program.has_assigned_storage(decl)
            {
                continue;
            }
            let ty = program.type_key(decl);
            let class = *class_of_type.entry(ty).or_insert_with(|| {
                tpa.labels.push(TreeLabel::Type(ty));
                tpa.first_partition.push(None);
                tpa.labels.len() - 1
            });
            tpa.push_member(class, p);
        }

        tpa.num_trees = tpa.labels.len();
        log::debug!("built type-var TPA with {} classes", tpa.num_trees);
        tpa
    }

    /// Unlinks `p` from `class`'s member list. `O(|class|)`.
    pub fn remove_partition(&mut self, class: usize, p: Partition) {
        let mut cur = self.first_partition[class];
        let mut prev: Option<Partition> = None;
        while let Some(c) = cur {
            if c == p {
                let next = self.next_partition[c.index()];
                match prev {
                    Some(pr) => self.next_partition[pr.index()] = next,
                    None => self.first_partition[class] = next,
                }
                self.partition_to_tree[p.index()] = None;
                return;
            }
            prev = Some(c);
            cur = self.next_partition[c.index()];
        }
    }

    /// Swaps singleton classes (those with exactly one member) to the tail
    /// of the class list and drops them from the live range
    /// `[0, num_trees)`, without losing the classes themselves: the
    /// uncompressed count is retained, so a caller that wants the full set
    /// back can still walk past `num_trees`.
    pub fn compact(&mut self) {
        let total = self.labels.len();
        let mut live = 0usize;
        let mut i = 0usize;
        let mut last = total;
        while i < last {
            let singleton = match self.first_partition[i] {
                None => true,
                Some(p) => self.next_partition[p.index()].is_none(),
            };
            if singleton {
                last -= 1;
                self.swap_classes(i, last);
                // Re-examine the class now at `i` (it was `last`).
            } else {
                live += 1;
                i += 1;
            }
        }
        self.num_trees = live;
        log::debug!(
            "compacted TPA: {total} classes -> {} live (dropped {} singletons)",
            self.num_trees,
            total - self.num_trees
        );
    }

    fn swap_classes(&mut self, a: usize, b: usize) {
        if a == b {
            return;
        }
        self.labels.swap(a, b);
        self.first_partition.swap(a, b);
        if let Some(p) = self.first_partition[a] {
            self.partition_to_tree[p.index()] = Some(a);
            let mut cur = self.next_partition[p.index()];
            while let Some(c) = cur {
                self.partition_to_tree[c.index()] = Some(a);
                cur = self.next_partition[c.index()];
            }
        }
        if let Some(p) = self.first_partition[b] {
            self.partition_to_tree[p.index()] = Some(b);
            let mut cur = self.next_partition[p.index()];
            while let Some(c) = cur {
                self.partition_to_tree[c.index()] = Some(b);
                cur = self.next_partition[c.index()];
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::CoalesceConfig, fixture::ToyBuilder};

    #[test]
    fn root_var_groups_by_declaration() {
        let mut b = ToyBuilder::new();
        let entry = b.block();
        let decl0 = b.decl();
        let decl1 = b.decl();
        let v0 = b.def(entry, decl0);
        let v1 = b.assign(entry, decl0, &[v0]);
        let v2 = b.def(entry, decl1);
        let program = b.build(entry);

        let mut map = PartitionMap::build(&program, CoalesceConfig::new());
        let tpa = Tpa::root_var_init(&mut map, &program);
        // v0, v1 share decl0; v2 has decl1 -> two classes.
        assert_eq!(tpa.num_trees(), 2);
        let p0 = map.partition_of(v0).unwrap();
        let p1 = map.partition_of(v1).unwrap();
        let p2 = map.partition_of(v2).unwrap();
        assert_eq!(tpa.class_of(p0), tpa.class_of(p1));
        assert_ne!(tpa.class_of(p0), tpa.class_of(p2));
        let class = tpa.class_of(p0).unwrap();
        let members: Vec<_> = tpa.members(class).collect();
        assert_eq!(members, vec![p0, p1]);
    }

    #[test]
    fn compact_drops_singletons() {
        let mut b = ToyBuilder::new();
        let entry = b.block();
        let decl0 = b.decl();
        let decl1 = b.decl();
        let v0 = b.def(entry, decl0);
        let v1 = b.assign(entry, decl0, &[v0]);
        let _v2 = b.def(entry, decl1);
        let program = b.build(entry);

        let mut map = PartitionMap::build(&program, CoalesceConfig::new());
        let mut tpa = Tpa::root_var_init(&mut map, &program);
        assert_eq!(tpa.num_trees(), 2);
        tpa.compact();
        // decl1's class (v2 only) is a singleton and gets dropped.
        assert_eq!(tpa.num_trees(), 1);
    }

    #[test]
    fn remove_partition_unlinks() {
        let mut b = ToyBuilder::new();
        let entry = b.block();
        let decl0 = b.decl();
        let v0 = b.def(entry, decl0);
        let v1 = b.assign(entry, decl0, &[v0]);
        let program = b.build(entry);

        let mut map = PartitionMap::build(&program, CoalesceConfig::new());
        let mut tpa = Tpa::root_var_init(&mut map, &program);
        let p0 = map.partition_of(v0).unwrap();
        let p1 = map.partition_of(v1).unwrap();
        let class = tpa.class_of(p0).unwrap();
        tpa.remove_partition(class, p0);
        assert_eq!(tpa.class_of(p0), None);
        let members: Vec<_> = tpa.members(class).collect();
        assert_eq!(members, vec![p1]);
    }
}
