//! External collaborator interfaces.
//!
//! This crate never constructs SSA, never represents a CFG directly, and
//! never parses or prints a host IR's statements. Everything it needs from
//! those is expressed as a handful of traits below, generalized from the
//! shapes of `midenc-hir`'s own [`cfg::Graph`] trait and operand-mask
//! bitflags, but independent of `midenc-hir` (or any other concrete IR).
//!
//! Blocks, SSA versions, partitions, and declarations are all represented as
//! dense, dense-index-backed entity references (`cranelift_entity`), the way
//! a frontend hands `cranelift_entity::EntityRef` ids to `cranelift-codegen`
//! rather than exposing its own AST node types. Hosts are expected to assign
//! `Block` and `SsaVersion` ids densely, starting at zero.

pub use cranelift_entity::EntityRef;
use cranelift_entity::entity_impl;
use smallvec::SmallVec;

/// A basic block, identified by its dense position in the containing CFG.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Block(u32);
entity_impl!(Block, "block");

/// An SSA version: one definition of one variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SsaVersion(u32);
entity_impl!(SsaVersion, "v");

/// A real, non-SSA declaration — the "underlying variable" an SSA version is
/// a version of. Opaque to this crate beyond what [`DeclarationInfo`] exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Declaration(u32);
entity_impl!(Declaration, "decl");

/// A partition: the equivalence class of SSA versions (and possibly one real
/// declaration) that will share a single backing storage location.
///
/// The same numeric space is reused before and after compaction: whether a
/// given `Partition` value is a raw or compact id is a property of which
/// [`PartitionMap`](crate::partition_map::PartitionMap) method produced it,
/// not of the type itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Partition(u32);
entity_impl!(Partition, "part");

/// Either an SSA version or a real declaration that has already been given a
/// partition (e.g. via [`change_partition_var`](crate::partition_map::PartitionMap::change_partition_var)).
///
/// `union`'s operands, and copy-statement operands, may be either.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operand {
    Version(SsaVersion),
    Declaration(Declaration),
}

impl From<SsaVersion> for Operand {
    fn from(v: SsaVersion) -> Self {
        Operand::Version(v)
    }
}

impl From<Declaration> for Operand {
    fn from(d: Declaration) -> Self {
        Operand::Declaration(d)
    }
}

bitflags::bitflags! {
    /// Which operands of a statement to visit.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct OperandMask: u8 {
        const USE = 0b0001;
        const DEF = 0b0010;
        const VIRTUAL_USE = 0b0100;
        const VMUSTDEF = 0b1000;
        const ALL_USES = Self::USE.bits() | Self::VIRTUAL_USE.bits();
        const ALL_DEFS = Self::DEF.bits() | Self::VMUSTDEF.bits();
    }
}

/// One argument of a φ-node: the incoming version and the predecessor edge
/// (identified by its source block) it arrives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhiArg {
    pub version: SsaVersion,
    /// The predecessor block this argument's value arrives from.
    pub edge: Block,
}

/// A φ-node: a result version and its incoming arguments, one per predecessor
/// edge of the owning block.
#[derive(Debug, Clone)]
pub struct Phi {
    pub result: SsaVersion,
    pub args: SmallVec<[PhiArg; 4]>,
}

impl Phi {
    pub fn new(result: SsaVersion, args: impl IntoIterator<Item = PhiArg>) -> Self {
        Self {
            result,
            args: args.into_iter().collect(),
        }
    }
}

/// The CFG of the procedure being analyzed.
///
/// Blocks are assumed to be indexed densely in `[0, num_blocks())`; `Block`'s
/// own `u32` value *is* that dense index (see module docs).
pub trait Cfg {
    type Blocks: Iterator<Item = Block>;

    fn num_blocks(&self) -> usize;
    fn entry_block(&self) -> Block;
    fn exit_block(&self) -> Option<Block>;
    fn blocks(&self) -> Self::Blocks;
    fn predecessors(&self, block: Block) -> Self::Blocks;
    fn successors(&self, block: Block) -> Self::Blocks;
}

/// The φ-nodes and statements of each block.
///
/// Statements are exposed as a slice so that callers in this crate can
/// iterate forward (`.iter()`) or in reverse program order (`.iter().rev()`),
/// which the conflict-graph sweep requires within a block.
pub trait BlockBody {
    type Stmt: Copy;

    fn phis(&self, block: Block) -> &[Phi];
    fn statements(&self, block: Block) -> &[Self::Stmt];
    /// Visits the operands of `stmt` matching `mask`.
    fn operands(&self, stmt: Self::Stmt, mask: OperandMask) -> SmallVec<[Operand; 4]>;
    /// If `stmt` is a copy between two partitionable operands, its `(lhs, rhs)`.
    fn as_copy(&self, stmt: Self::Stmt) -> Option<(Operand, Operand)>;
}

/// Per-SSA-version facts. This crate only ever needs to know *which block* a
/// version is defined in, never the statement itself.
pub trait SsaVersionInfo {
    /// The total number of SSA versions in the procedure — the size to
    /// allocate a [`crate::partition_map::PartitionMap`] with
    /// ([`crate::partition_map::PartitionMap::build`]). Versions are assumed
    /// dense in `[0, num_versions())`.
    fn num_versions(&self) -> usize;
    /// The block containing `version`'s defining statement or φ-node, if any.
    /// `None` for a version with no explicit definition (e.g. an undefined
    /// default use).
    fn defining_block(&self, version: SsaVersion) -> Option<Block>;
    fn underlying_declaration(&self, version: SsaVersion) -> Declaration;
}

/// An opaque key identifying a declaration's type, for the `type_var_init`
/// TPA grouping. Two declarations with the same `TypeKey` are
/// coalescing-compatible as far as type is concerned; this crate never
/// inspects the type system itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeKey(u32);
entity_impl!(TypeKey, "ty");

/// Per-declaration facts used to decide coalescing eligibility and
/// representative-variable preference.
pub trait DeclarationInfo {
    fn default_def(&self, decl: Declaration) -> Option<SsaVersion>;
    /// `true` for a user-visible (non-compiler-generated) declaration.
    /// Preferred as a partition's representative variable over a
    /// compiler-ignored one.
    fn is_user_visible(&self, decl: Declaration) -> bool;
    fn is_volatile(&self, decl: Declaration) -> bool;
    fn is_parameter(&self, decl: Declaration) -> bool;
    fn is_return_value(&self, decl: Declaration) -> bool;
    fn is_register(&self, decl: Declaration) -> bool;
    fn has_assigned_storage(&self, decl: Declaration) -> bool;
    /// The type of `decl`, used to key `type_var_init`'s TPA classes.
    fn type_key(&self, decl: Declaration) -> TypeKey;
}

/// Convenience supertrait bundling everything this crate needs from a host
/// compiler's representation of one procedure in SSA form.
pub trait Program: Cfg + BlockBody + SsaVersionInfo + DeclarationInfo {}

impl<T: Cfg + BlockBody + SsaVersionInfo + DeclarationInfo> Program for T {}
