//! A tiny in-memory CFG/SSA builder, for this crate's own tests and the
//! `tests/scenarios.rs` integration suite only.
//!
//! Gated behind the `testing` feature so it never ships as part of a normal
//! build of this crate, the way the host repository's analysis crates
//! depend on small dialect crates purely to build test fixtures rather than
//! baking fixture code into their main build.

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::ir::{
    Block, BlockBody, Cfg, Declaration, DeclarationInfo, EntityRef, Operand, OperandMask, Phi,
    PhiArg, SsaVersion, TypeKey,
};

/// One non-φ statement: some uses, some defs, and whether it is a copy
/// (exactly one use and one def, flagged explicitly by the builder rather
/// than inferred — a real IR's `is_copy` is a property of the opcode, not
/// of its operand shape).
#[derive(Debug, Clone)]
pub struct ToyStmt {
    uses: SmallVec<[SsaVersion; 2]>,
    defs: SmallVec<[SsaVersion; 1]>,
    virtual_uses: SmallVec<[SsaVersion; 1]>,
    is_copy: bool,
}

#[derive(Debug, Clone, Copy, Default)]
struct DeclFlags {
    user_visible: bool,
    volatile: bool,
    parameter: bool,
    return_value: bool,
    register: bool,
    assigned_storage: bool,
    type_key: u32,
}

/// A built toy procedure: a CFG of [`Block`]s, each with φ-nodes and
/// statements, plus per-version/per-declaration bookkeeping. Implements
/// every trait in [`crate::ir`] that a host compiler would.
pub struct Toy {
    entry: Block,
    preds: Vec<Vec<Block>>,
    succs: Vec<Vec<Block>>,
    phis: Vec<Vec<Phi>>,
    stmts: Vec<Vec<ToyStmt>>,
    /// `(block, index)` pairs for each block's statements, mirroring `stmts`
    /// so that [`BlockBody::Stmt`] (required to be `Copy`) can carry enough
    /// information for `operands`/`as_copy` to look the real statement back
    /// up without needing the block passed in separately.
    stmt_keys: Vec<Vec<(Block, usize)>>,
    version_decl: FxHashMap<SsaVersion, Declaration>,
    version_def_block: FxHashMap<SsaVersion, Block>,
    decl_default_def: FxHashMap<Declaration, SsaVersion>,
    decl_flags: FxHashMap<Declaration, DeclFlags>,
    num_versions: u32,
}

impl Toy {
    pub fn num_versions(&self) -> usize {
        self.num_versions as usize
    }
}

impl Cfg for Toy {
    type Blocks = std::vec::IntoIter<Block>;

    fn num_blocks(&self) -> usize {
        self.preds.len()
    }
    fn entry_block(&self) -> Block {
        self.entry
    }
    fn exit_block(&self) -> Option<Block> {
        None
    }
    fn blocks(&self) -> Self::Blocks {
        (0..self.preds.len() as u32)
            .map(Block::from_u32)
            .collect::<Vec<_>>()
            .into_iter()
    }
    fn predecessors(&self, block: Block) -> Self::Blocks {
        self.preds[block.index()].clone().into_iter()
    }
    fn successors(&self, block: Block) -> Self::Blocks {
        self.succs[block.index()].clone().into_iter()
    }
}

impl BlockBody for Toy {
    type Stmt = (Block, usize);

    fn phis(&self, block: Block) -> &[Phi] {
        &self.phis[block.index()]
    }
    fn statements(&self, block: Block) -> &[Self::Stmt] {
        &self.stmt_keys[block.index()]
    }
    fn operands(&self, stmt: Self::Stmt, mask: OperandMask) -> SmallVec<[Operand; 4]> {
        let (block, idx) = stmt;
        let s = &self.stmts[block.index()][idx];
        let mut out = SmallVec::new();
        if mask.contains(OperandMask::USE) {
            out.extend(s.uses.iter().copied().map(Operand::Version));
        }
        if mask.contains(OperandMask::DEF) {
            out.extend(s.defs.iter().copied().map(Operand::Version));
        }
        if mask.contains(OperandMask::VIRTUAL_USE) {
            out.extend(s.virtual_uses.iter().copied().map(Operand::Version));
        }
        out
    }
    fn as_copy(&self, stmt: Self::Stmt) -> Option<(Operand, Operand)> {
        let (block, idx) = stmt;
        let s = &self.stmts[block.index()][idx];
        if s.is_copy {
            Some((
                Operand::Version(s.defs[0]),
                Operand::Version(s.uses[0]),
            ))
        } else {
            None
        }
    }
}

impl crate::ir::SsaVersionInfo for Toy {
    fn num_versions(&self) -> usize {
        self.num_versions as usize
    }
    fn defining_block(&self, version: SsaVersion) -> Option<Block> {
        self.version_def_block.get(&version).copied()
    }
    fn underlying_declaration(&self, version: SsaVersion) -> Declaration {
        self.version_decl[&version]
    }
}

impl DeclarationInfo for Toy {
    fn default_def(&self, decl: Declaration) -> Option<SsaVersion> {
        self.decl_default_def.get(&decl).copied()
    }
    fn is_user_visible(&self, decl: Declaration) -> bool {
        self.flags(decl).user_visible
    }
    fn is_volatile(&self, decl: Declaration) -> bool {
        self.flags(decl).volatile
    }
    fn is_parameter(&self, decl: Declaration) -> bool {
        self.flags(decl).parameter
    }
    fn is_return_value(&self, decl: Declaration) -> bool {
        self.flags(decl).return_value
    }
    fn is_register(&self, decl: Declaration) -> bool {
        self.flags(decl).register
    }
    fn has_assigned_storage(&self, decl: Declaration) -> bool {
        self.flags(decl).assigned_storage
    }
    fn type_key(&self, decl: Declaration) -> TypeKey {
        TypeKey::from_u32(self.flags(decl).type_key)
    }
}

impl Toy {
    fn flags(&self, decl: Declaration) -> DeclFlags {
        self.decl_flags.get(&decl).copied().unwrap_or_default()
    }
}

/// Builds a [`Toy`] procedure incrementally. Blocks, declarations, and SSA
/// versions are all allocated densely starting at zero as they are created.
#[derive(Default)]
pub struct ToyBuilder {
    preds: Vec<Vec<Block>>,
    succs: Vec<Vec<Block>>,
    phis: Vec<Vec<Phi>>,
    stmts: Vec<Vec<ToyStmt>>,
    version_decl: FxHashMap<SsaVersion, Declaration>,
    version_def_block: FxHashMap<SsaVersion, Block>,
    decl_default_def: FxHashMap<Declaration, SsaVersion>,
    decl_flags: FxHashMap<Declaration, DeclFlags>,
    next_version: u32,
    next_decl: u32,
}

impl ToyBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn block(&mut self) -> Block {
        let b = Block::from_u32(self.preds.len() as u32);
        self.preds.push(Vec::new());
        self.succs.push(Vec::new());
        self.phis.push(Vec::new());
        self.stmts.push(Vec::new());
        b
    }

    pub fn edge(&mut self, from: Block, to: Block) {
        self.succs[from.index()].push(to);
        self.preds[to.index()].push(from);
    }

    /// A fresh, compiler-generated (not user-visible) declaration.
    pub fn decl(&mut self) -> Declaration {
        let d = Declaration::from_u32(self.next_decl);
        self.next_decl += 1;
        self.decl_flags.insert(
            d,
            DeclFlags {
                user_visible: false,
                ..Default::default()
            },
        );
        d
    }

    /// A user-named source-level declaration.
    pub fn named_var(&mut self) -> Declaration {
        let d = self.decl();
        self.decl_flags.get_mut(&d).unwrap().user_visible = true;
        d
    }

    pub fn param_decl(&mut self) -> Declaration {
        let d = self.decl();
        self.decl_flags.get_mut(&d).unwrap().parameter = true;
        d
    }

    pub fn volatile_decl(&mut self) -> Declaration {
        let d = self.decl();
        self.decl_flags.get_mut(&d).unwrap().volatile = true;
        d
    }

    pub fn register_decl(&mut self) -> Declaration {
        let d = self.decl();
        self.decl_flags.get_mut(&d).unwrap().register = true;
        d
    }

    /// Assigns `decl` a type-var class key distinct from the default (`0`),
    /// for tests exercising `type_var_init` grouping.
    pub fn set_type(&mut self, decl: Declaration, ty: u32) {
        self.decl_flags.get_mut(&decl).unwrap().type_key = ty;
    }

    fn fresh_version(&mut self, decl: Declaration) -> SsaVersion {
        let v = SsaVersion::from_u32(self.next_version);
        self.next_version += 1;
        self.version_decl.insert(v, decl);
        v
    }

    /// A plain definition of `decl` in `block`, with no uses
    /// (e.g. `decl_i := <const>`).
    pub fn def(&mut self, block: Block, decl: Declaration) -> SsaVersion {
        self.assign(block, decl, &[])
    }

    /// `decl_i := op(uses...)`, a generic (non-copy) statement.
    pub fn assign(&mut self, block: Block, decl: Declaration, uses: &[SsaVersion]) -> SsaVersion {
        let result = self.fresh_version(decl);
        self.version_def_block.insert(result, block);
        self.stmts[block.index()].push(ToyStmt {
            uses: uses.iter().copied().collect(),
            defs: SmallVec::from_slice(&[result]),
            virtual_uses: SmallVec::new(),
            is_copy: false,
        });
        result
    }

    /// `decl_i := rhs`, a copy statement.
    pub fn copy(&mut self, block: Block, decl: Declaration, rhs: SsaVersion) -> SsaVersion {
        let result = self.fresh_version(decl);
        self.version_def_block.insert(result, block);
        self.stmts[block.index()].push(ToyStmt {
            uses: SmallVec::from_slice(&[rhs]),
            defs: SmallVec::from_slice(&[result]),
            virtual_uses: SmallVec::new(),
            is_copy: true,
        });
        result
    }

    /// A bare use of `version` with no def of its own (e.g. a return or a
    /// conditional branch operand).
    pub fn use_only(&mut self, block: Block, version: SsaVersion) {
        self.stmts[block.index()].push(ToyStmt {
            uses: SmallVec::from_slice(&[version]),
            defs: SmallVec::new(),
            virtual_uses: SmallVec::new(),
            is_copy: false,
        });
    }

    /// A bare virtual use of `version` (e.g. a memory-operand dependency on
    /// a prior store), used by tests exercising the real/virtual-operand
    /// sanity check.
    pub fn virtual_use_only(&mut self, block: Block, version: SsaVersion) {
        self.stmts[block.index()].push(ToyStmt {
            uses: SmallVec::new(),
            defs: SmallVec::new(),
            virtual_uses: SmallVec::from_slice(&[version]),
            is_copy: false,
        });
    }

    /// `decl_i := phi(args...)`, one argument per incoming edge.
    pub fn phi(
        &mut self,
        block: Block,
        decl: Declaration,
        args: &[(SsaVersion, Block)],
    ) -> SsaVersion {
        let result = self.fresh_version(decl);
        self.version_def_block.insert(result, block);
        self.phis[block.index()].push(Phi::new(
            result,
            args.iter().map(|&(version, edge)| PhiArg { version, edge }),
        ));
        result
    }

    /// Registers `version` as `decl`'s default definition (no defining
    /// statement of its own — e.g. a parameter's incoming value).
    pub fn default_def(&mut self, decl: Declaration) -> SsaVersion {
        let v = self.fresh_version(decl);
        self.decl_default_def.insert(decl, v);
        v
    }

    pub fn build(self, entry: Block) -> Toy {
        let stmt_keys = self
            .stmts
            .iter()
            .enumerate()
            .map(|(b, stmts)| {
                (0..stmts.len())
                    .map(|i| (Block::from_u32(b as u32), i))
                    .collect()
            })
            .collect();
        Toy {
            entry,
            preds: self.preds,
            succs: self.succs,
            phis: self.phis,
            stmts: self.stmts,
            stmt_keys,
            version_decl: self.version_decl,
            version_def_block: self.version_def_block,
            decl_default_def: self.decl_default_def,
            decl_flags: self.decl_flags,
            num_versions: self.next_version,
        }
    }
}
