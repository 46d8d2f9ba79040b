use crate::ir::{Block, Declaration, SsaVersion};

/// SSA-integrity anomalies detected by the optional live-on-entry check
/// (see [`crate::live_info::LiveInfo::check_integrity`]).
///
/// These are distinct from programmer-contract violations (misuse of this
/// crate's API), which are fatal assertions rather than recoverable errors —
/// see the crate-level docs for the rationale. An `IntegrityError` means an
/// earlier optimization pass produced a program this crate cannot safely
/// finish compiling; it is expected to be surfaced to the user as an
/// internal-compiler-error, not silently swallowed.
#[derive(Debug, Clone, thiserror::Error)]
pub enum IntegrityError {
    /// A partition live-on-entry to a successor of the entry block has a
    /// non-empty defining statement, i.e. it appears to have more than one
    /// definition reaching that point.
    #[error(
        "partition {partition} (version {version:?}) is live-on-entry to block {block:?} but \
         also has a defining statement in block {def_block:?}; it appears to have multiple defs"
    )]
    LiveWithExistingDef {
        partition: u32,
        version: SsaVersion,
        block: Block,
        def_block: Block,
    },
    /// A partition live-on-entry to a successor of the entry block is not the
    /// default definition of its underlying declaration, and no default
    /// definition exists either.
    #[error(
        "partition {partition} (version {version:?}) is live-on-entry to block {block:?} but is \
         not a default definition, and declaration {declaration:?} has no default definition"
    )]
    LiveWithoutDefaultDef {
        partition: u32,
        version: SsaVersion,
        block: Block,
        declaration: Declaration,
    },
    /// A statement's operand was visited as both a virtual operand
    /// (`VIRTUAL_USE`/`VMUSTDEF`) and a real one (`USE`/`DEF`). This crate
    /// does not model memory/virtual operands beyond this sanity check: a
    /// version that is simultaneously virtual and real cannot be partitioned
    /// soundly.
    #[error(
        "version {version:?} in block {block:?} is used as both a virtual operand and a real \
         operand — memory/virtual operands are not otherwise handled by this analysis"
    )]
    VirtualOperandOverlap { version: SsaVersion, block: Block },
}
