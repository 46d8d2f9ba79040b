//! The union–find partition map: the core mapping from SSA versions to the
//! equivalence classes that will share storage.

use rustc_hash::FxHashMap;

use crate::{
    config::CoalesceConfig,
    ir::{Declaration, DeclarationInfo, EntityRef, Operand, OperandMask, Partition, Program, SsaVersion},
};

/// Per-declaration scratch state owned by the partition map, not the
/// declaration itself.
#[derive(Debug, Clone, Copy, Default)]
struct DeclScratch {
    /// The partition this declaration is the representative variable of, in
    /// the map's *current* (possibly compacted) numbering.
    partition_id: Option<Partition>,
    /// Set once this declaration becomes a partition's representative via
    /// [`PartitionMap::change_partition_var`] — it has "escaped" SSA.
    out_of_ssa_tag: bool,
}

/// Union–find over SSA version IDs, with bidirectional version↔partition
/// lookup and an optional, repeatable compaction pass.
///
/// Partition ids live in one of two numbering spaces: *raw* (the union–find's
/// native `[0, size)` range, fixed for the map's lifetime) and *public* (what
/// every method other than the internals of [`PartitionMap::compact`]
/// returns — identical to raw until the map has been compacted at least
/// once, after which it is the dense `[0, num_partitions)` range). Two
/// translation arrays (`raw_to_compact`/`compact_to_raw`) carry the mapping
/// between the spaces: compaction never perturbs the underlying union–find,
/// it only builds a translation layer on top of it, so previously taken raw
/// ids remain valid and recompaction is always possible from scratch.
pub struct PartitionMap {
    parent: Vec<Partition>,
    rank: Vec<u8>,
    /// Raw-indexed: the representative variable of the partition rooted at
    /// this raw id, if any has been registered.
    partition_to_var: Vec<Option<Operand>>,
    decl_scratch: FxHashMap<Declaration, DeclScratch>,
    ref_count: Option<Vec<u32>>,
    /// `raw -> public`, present only once compaction has dropped partitions.
    raw_to_compact: Option<Vec<Option<Partition>>>,
    /// `public -> raw`, present only once compaction has dropped partitions.
    compact_to_raw: Option<Vec<Partition>>,
    /// Total number of versions this map was initialized with — the size of
    /// the raw union–find, fixed for the map's lifetime.
    size: usize,
    /// Current number of live partitions: `size` until compacted.
    num_partitions: usize,
    config: CoalesceConfig,
}

impl PartitionMap {
    /// Allocates `size` singleton partitions, one per SSA version `[0, size)`.
    pub fn init(size: usize, config: CoalesceConfig) -> Self {
        let ref_count = config.tracks_ref_counts().then(|| vec![0u32; size]);
        Self {
            parent: (0..size as u32).map(Partition::from_u32).collect(),
            rank: vec![0; size],
            partition_to_var: vec![None; size],
            decl_scratch: FxHashMap::default(),
            ref_count,
            raw_to_compact: None,
            compact_to_raw: None,
            size,
            num_partitions: size,
            config,
        }
    }

    #[inline(always)]
    pub const fn config(&self) -> &CoalesceConfig {
        &self.config
    }

    /// Builds a partition map from SSA by scanning every φ-node and
    /// statement of `program`.
    ///
    /// Every φ-result and statement def is registered as a non-use; every
    /// φ-argument and statement use is registered as a use. This is the
    /// same scan [`crate::conflict_graph::build`] will later repeat
    /// backward; this first pass only needs to establish representative
    /// variables (and, if enabled, reference counts) before any liveness or
    /// coalescing work can begin.
    pub fn build(program: &impl Program, config: CoalesceConfig) -> Self {
        let mut map = Self::init(program.num_versions(), config);
        for block in program.blocks() {
            for phi in program.phis(block) {
                map.register(phi.result, false);
                for arg in &phi.args {
                    map.register(arg.version, true);
                }
            }
            for &stmt in program.statements(block) {
                for op in program.operands(stmt, OperandMask::ALL_DEFS) {
                    if let Operand::Version(v) = op {
                        map.register(v, false);
                    }
                }
                for op in program.operands(stmt, OperandMask::ALL_USES) {
                    if let Operand::Version(v) = op {
                        map.register(v, true);
                    }
                }
            }
        }
        log::debug!(
            "built partition map: {} SSA versions scanned",
            program.num_versions()
        );
        map
    }

    /// The current number of partitions (dense `[0, num_partitions)` once
    /// compacted, `size` otherwise).
    #[inline(always)]
    pub const fn num_partitions(&self) -> usize {
        self.num_partitions
    }

    #[inline(always)]
    pub const fn is_compacted(&self) -> bool {
        self.compact_to_raw.is_some()
    }

    /// Iterates every partition id currently in use (public numbering).
    pub fn partitions(&self) -> impl Iterator<Item = Partition> + '_ {
        (0..self.num_partitions as u32).map(Partition::from_u32)
    }

    fn find_raw(&mut self, mut p: Partition) -> Partition {
        let mut root = p;
        while self.parent[root.index()] != root {
            root = self.parent[root.index()];
        }
        // Path compression.
        while self.parent[p.index()] != root {
            let next = self.parent[p.index()];
            self.parent[p.index()] = root;
            p = next;
        }
        root
    }

    fn union_raw(&mut self, a: Partition, b: Partition) -> Partition {
        let (a, b) = (self.find_raw(a), self.find_raw(b));
        if a == b {
            return a;
        }
        let (ra, rb) = (self.rank[a.index()], self.rank[b.index()]);
        let (keep, drop) = if ra < rb {
            (b, a)
        } else if ra > rb {
            (a, b)
        } else {
            self.rank[a.index()] += 1;
            (a, b)
        };
        self.parent[drop.index()] = keep;
        if self.partition_to_var[keep.index()].is_none() {
            self.partition_to_var[keep.index()] = self.partition_to_var[drop.index()].take();
        }
        keep
    }

    fn to_raw(&self, p: Partition) -> Partition {
        match &self.compact_to_raw {
            Some(c2r) => c2r[p.index()],
            None => p,
        }
    }

    fn to_public(&self, raw: Partition) -> Partition {
        match &self.raw_to_compact {
            Some(r2c) => r2c[raw.index()].expect(
                "raw partition has no public id — it was dropped by the last compaction; \
                 derivatives built before that compaction must be rebuilt",
            ),
            None => raw,
        }
    }

    fn raw_of_version(&self, v: SsaVersion) -> Partition {
        assert!(
            (v.index()) < self.size,
            "SSA version {v:?} is out of range for a partition map of size {}",
            self.size
        );
        Partition::from_u32(v.as_u32())
    }

    /// Resolves an operand (SSA version or already-partitioned declaration)
    /// to its current public partition id, or `None` (`NO_PARTITION`) if a
    /// declaration has not yet been given one.
    pub fn partition_of(&mut self, op: impl Into<Operand>) -> Option<Partition> {
        match op.into() {
            Operand::Version(v) => {
                let raw = self.raw_of_version(v);
                let raw = self.find_raw(raw);
                Some(self.to_public(raw))
            }
            Operand::Declaration(d) => self.decl_scratch.get(&d).and_then(|s| s.partition_id),
        }
    }

    /// The representative variable of partition `p`, if registered.
    pub fn var_of(&self, p: Partition) -> Option<Operand> {
        let raw = self.to_raw(p);
        self.partition_to_var[raw.index()]
    }

    /// `true` if `decl` has been made the representative of a partition via
    /// [`change_partition_var`](Self::change_partition_var) (i.e. it has
    /// "escaped" SSA).
    pub fn has_escaped_ssa(&self, decl: Declaration) -> bool {
        self.decl_scratch.get(&decl).is_some_and(|s| s.out_of_ssa_tag)
    }

    /// Per-version use-reference count, if [`CoalesceConfig::tracks_ref_counts`]
    /// was enabled at construction.
    pub fn ref_count(&self, v: SsaVersion) -> Option<u32> {
        self.ref_count.as_ref().map(|rc| rc[v.index()])
    }

    /// Ensures `partition_to_var[partition_of(version)] = version` if no
    /// representative has been recorded yet, and bumps the use-reference
    /// counter for `version` when `is_use` and ref-counting is enabled.
    pub fn register(&mut self, version: SsaVersion, is_use: bool) {
        let raw = self.raw_of_version(version);
        let raw = self.find_raw(raw);
        if self.partition_to_var[raw.index()].is_none() {
            self.partition_to_var[raw.index()] = Some(Operand::Version(version));
        }
        if is_use {
            if let Some(rc) = &mut self.ref_count {
                rc[version.index()] += 1;
            }
        }
    }

    /// Installs `decl` — a real, non-SSA declaration — as the representative
    /// variable of partition `p`.
    pub fn change_partition_var(&mut self, decl: Declaration, p: Partition) {
        let raw = self.to_raw(p);
        self.partition_to_var[raw.index()] = Some(Operand::Declaration(decl));
        let scratch = self.decl_scratch.entry(decl).or_default();
        scratch.out_of_ssa_tag = true;
        scratch.partition_id = Some(p);
    }

    /// Unions the partitions of `op1` and `op2`, returning the representative
    /// partition of the merged set, or `None` if either operand is a
    /// declaration with no partition yet (`NO_PARTITION`).
    ///
    /// If either operand is a real declaration, it becomes a candidate
    /// representative variable for the merged partition; if both are real,
    /// the one for which `decls.is_user_visible` is true is preferred.
    pub fn union(
        &mut self,
        op1: impl Into<Operand>,
        op2: impl Into<Operand>,
        decls: &impl DeclarationInfo,
    ) -> Option<Partition> {
        let op1 = op1.into();
        let op2 = op2.into();

        let raw1 = match op1 {
            Operand::Version(v) => self.find_raw(self.raw_of_version(v)),
            Operand::Declaration(d) => {
                self.to_raw(self.decl_scratch.get(&d)?.partition_id?)
            }
        };
        let mut root_decl = match op1 {
            Operand::Declaration(d) => Some(d),
            Operand::Version(_) => None,
        };
        let mut other_decl = None;

        let raw2 = match op2 {
            Operand::Version(v) => self.find_raw(self.raw_of_version(v)),
            Operand::Declaration(d) => {
                self.to_raw(self.decl_scratch.get(&d)?.partition_id?)
            }
        };
        if let Operand::Declaration(d2) = op2 {
            match root_decl {
                None => root_decl = Some(d2),
                Some(existing) if !decls.is_user_visible(existing) => {
                    other_decl = root_decl;
                    root_decl = Some(d2);
                }
                Some(_) => other_decl = Some(d2),
            }
        }

        let raw3 = if raw1 == raw2 {
            raw1
        } else {
            self.union_raw(raw1, raw2)
        };
        let public3 = self.to_public(raw3);

        if let Some(d) = root_decl {
            self.change_partition_var(d, public3);
        }
        if let Some(d) = other_decl {
            self.change_partition_var(d, public3);
        }

        Some(public3)
    }

    fn declaration_of(&self, op: Operand, program: &impl Program) -> Declaration {
        match op {
            Operand::Version(v) => program.underlying_declaration(v),
            Operand::Declaration(d) => d,
        }
    }

    /// The number of *distinct* raw partitions sharing each underlying
    /// declaration, used by [`Self::compact`] to implement
    /// [`CoalesceConfig::excludes_single_def_classes`] without needing a
    /// fully built [`crate::tpa::Tpa`].
    fn root_var_class_sizes(&mut self, program: &impl Program) -> FxHashMap<Declaration, u32> {
        let mut sizes = FxHashMap::default();
        let mut seen = vec![false; self.size];
        for x in 0..self.size {
            let raw = self.find_raw(Partition::from_u32(x as u32));
            if seen[raw.index()] {
                continue;
            }
            seen[raw.index()] = true;
            let Some(op) = self.partition_to_var[raw.index()] else {
                continue;
            };
            let decl = self.declaration_of(op, program);
            *sizes.entry(decl).or_insert(0) += 1;
        }
        sizes
    }

    /// Rebuilds dense partition ids in `[0, num_partitions)`. Never changes
    /// membership, only ids; idempotent and repeatable (calling this again
    /// after further unions recomputes the mapping from the current state
    /// of the union-find). Every derivative (TPA, conflict graph, coalesce
    /// list) built before a call to `compact` must be rebuilt afterward, as
    /// their partition ids are no longer valid.
    pub fn compact(&mut self, program: &impl Program) -> usize {
        let root_sizes = self
            .config
            .excludes_single_def_classes()
            .then(|| self.root_var_class_sizes(program));

        let limit = self.size;
        let mut raw_to_compact = vec![None; limit];
        let mut compact_to_raw = Vec::new();
        let mut seen = vec![false; limit];

        for x in 0..limit {
            let raw = self.find_raw(Partition::from_u32(x as u32));
            if seen[raw.index()] {
                continue;
            }
            seen[raw.index()] = true;
            let Some(op) = self.partition_to_var[raw.index()] else {
                continue;
            };
            if let Some(sizes) = &root_sizes {
                let decl = self.declaration_of(op, program);
                if sizes.get(&decl).copied().unwrap_or(0) <= 1 {
                    continue;
                }
            }
            let compact = Partition::from_u32(compact_to_raw.len() as u32);
            raw_to_compact[raw.index()] = Some(compact);
            compact_to_raw.push(raw);
            if let Operand::Declaration(d) = op {
                if let Some(scratch) = self.decl_scratch.get_mut(&d) {
                    scratch.partition_id = Some(compact);
                }
            }
        }

        let count = compact_to_raw.len();
        if count != limit {
            self.raw_to_compact = Some(raw_to_compact);
            self.compact_to_raw = Some(compact_to_raw);
        } else {
            self.raw_to_compact = None;
            self.compact_to_raw = None;
        }
        self.num_partitions = count;
        log::debug!(
            "compacted partition map: {} raw partitions -> {} live partitions",
            limit,
            count
        );
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Declaration;

    struct NoDecls;
    impl DeclarationInfo for NoDecls {
        fn default_def(&self, _decl: Declaration) -> Option<SsaVersion> {
            None
        }
        fn is_user_visible(&self, _decl: Declaration) -> bool {
            true
        }
        fn is_volatile(&self, _decl: Declaration) -> bool {
            false
        }
        fn is_parameter(&self, _decl: Declaration) -> bool {
            false
        }
        fn is_return_value(&self, _decl: Declaration) -> bool {
            false
        }
        fn is_register(&self, _decl: Declaration) -> bool {
            false
        }
        fn has_assigned_storage(&self, _decl: Declaration) -> bool {
            false
        }
        fn type_key(&self, _decl: Declaration) -> crate::ir::TypeKey {
            crate::ir::TypeKey::from_u32(0)
        }
    }

    fn v(i: u32) -> SsaVersion {
        SsaVersion::from_u32(i)
    }

    #[test]
    fn union_find_soundness() {
        let mut map = PartitionMap::init(4, CoalesceConfig::new());
        assert_ne!(map.partition_of(v(0)), map.partition_of(v(1)));
        map.union(v(0), v(1), &NoDecls);
        assert_eq!(map.partition_of(v(0)), map.partition_of(v(1)));
        assert_ne!(map.partition_of(v(0)), map.partition_of(v(2)));
        map.union(v(1), v(2), &NoDecls);
        assert_eq!(map.partition_of(v(0)), map.partition_of(v(2)));
        assert_ne!(map.partition_of(v(0)), map.partition_of(v(3)));
    }

    #[test]
    fn union_is_monotone() {
        let mut map = PartitionMap::init(3, CoalesceConfig::new());
        map.union(v(0), v(1), &NoDecls);
        let p_before = map.partition_of(v(0));
        // Unioning the same pair again doesn't change anything, and there is
        // no operation that un-joins two versions once merged.
        map.union(v(0), v(1), &NoDecls);
        assert_eq!(map.partition_of(v(0)), p_before);
        assert_eq!(map.partition_of(v(1)), p_before);
    }

    #[test]
    fn register_sets_representative_once() {
        let mut map = PartitionMap::init(2, CoalesceConfig::new());
        map.register(v(0), false);
        let p = map.partition_of(v(0)).unwrap();
        assert_eq!(map.var_of(p), Some(Operand::Version(v(0))));
        // Re-registering a different version into the same partition must not
        // overwrite the existing representative.
        map.union(v(0), v(1), &NoDecls);
        map.register(v(1), false);
        assert_eq!(map.var_of(p), Some(Operand::Version(v(0))));
    }

    #[test]
    fn ref_counting_when_enabled() {
        let mut cfg = CoalesceConfig::new();
        cfg.set_track_ref_counts(true);
        let mut map = PartitionMap::init(2, cfg);
        assert_eq!(map.ref_count(v(0)), Some(0));
        map.register(v(0), true);
        map.register(v(0), true);
        map.register(v(0), false);
        assert_eq!(map.ref_count(v(0)), Some(2));
    }
}
