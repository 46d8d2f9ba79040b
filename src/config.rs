/// Configuration controlling optional behavior of [`crate::partition_map::PartitionMap`]
/// construction, compaction, and liveness.
///
/// Threaded through a single small config struct rather than as loose
/// boolean parameters to every constructor that needs one.
#[derive(Debug, Default, Clone, Copy)]
pub struct CoalesceConfig {
    track_ref_counts: bool,
    exclude_single_def_classes: bool,
    check_integrity: bool,
}

impl CoalesceConfig {
    /// A new, default configuration: no ref-counting, no single-def exclusion
    /// on compaction, and no integrity checking.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline(always)]
    pub const fn tracks_ref_counts(&self) -> bool {
        self.track_ref_counts
    }

    /// When set, [`PartitionMap::register`](crate::partition_map::PartitionMap::register)
    /// increments a per-version use counter every time a version is registered
    /// as a use. Disabled by default since most callers don't need it.
    pub fn set_track_ref_counts(&mut self, yes: bool) -> &mut Self {
        self.track_ref_counts = yes;
        self
    }

    #[inline(always)]
    pub const fn excludes_single_def_classes(&self) -> bool {
        self.exclude_single_def_classes
    }

    /// When set, [`PartitionMap::compact`](crate::partition_map::PartitionMap::compact)
    /// drops partitions whose root-variable class has only one member —
    /// these will never be a coalescing candidate, so there is no reason to
    /// keep them in the dense set.
    pub fn set_exclude_single_def_classes(&mut self, yes: bool) -> &mut Self {
        self.exclude_single_def_classes = yes;
        self
    }

    #[inline(always)]
    pub const fn checks_integrity(&self) -> bool {
        self.check_integrity
    }

    /// When set, [`calculate_live_on_entry`](crate::live_info::calculate_live_on_entry)
    /// runs its optional integrity check, returning an
    /// [`IntegrityError`](crate::error::IntegrityError) on the first
    /// violation found. Meant to be enabled only in debug/checked builds of
    /// the host compiler, as it is O(partitions × CFG edges).
    pub fn set_check_integrity(&mut self, yes: bool) -> &mut Self {
        self.check_integrity = yes;
        self
    }
}
