use crate::instr::Instr;
use crate::stage::ShaderStage;
use crate::types::Type;
use crate::value::{Operand, ValueId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u32);

impl BlockId {
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Function-local mutable slot (used for per-stream GS emit counters).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LocalId(pub u32);

#[derive(Debug, Clone, PartialEq)]
pub enum Terminator {
    Return,
    Branch(BlockId),
    CondBranch {
        cond: Operand,
        if_true: BlockId,
        if_false: BlockId,
    },
    Switch {
        value: Operand,
        default: BlockId,
        cases: Vec<(u64, BlockId)>,
    },
    Unreachable,
}

impl Terminator {
    pub fn successors(&self) -> Vec<BlockId> {
        match self {
            Terminator::Return | Terminator::Unreachable => Vec::new(),
            Terminator::Branch(target) => vec![*target],
            Terminator::CondBranch {
                if_true, if_false, ..
            } => vec![*if_true, *if_false],
            Terminator::Switch { default, cases, .. } => {
                let mut out = vec![*default];
                for (_, target) in cases {
                    if !out.contains(target) {
                        out.push(*target);
                    }
                }
                out
            }
        }
    }

    fn for_each_operand_mut(&mut self, mut f: impl FnMut(&mut Operand)) {
        match self {
            Terminator::CondBranch { cond, .. } => f(cond),
            Terminator::Switch { value, .. } => f(value),
            _ => {}
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub id: BlockId,
    pub instrs: Vec<Instr>,
    pub term: Terminator,
}

/// One shader function in SSA form.
///
/// Invariants:
/// - `blocks[i].id == BlockId(i)`.
/// - Every [`ValueId`] is defined exactly once and has an entry in the value type table.
#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: String,
    pub stage: Option<ShaderStage>,
    pub is_entry: bool,
    pub blocks: Vec<Block>,
    pub entry: BlockId,
    value_types: Vec<Type>,
    locals: Vec<Type>,
}

impl Function {
    /// Creates an entry point with a single returning block.
    pub fn new(name: impl Into<String>, stage: ShaderStage) -> Self {
        Self {
            name: name.into(),
            stage: Some(stage),
            is_entry: true,
            blocks: vec![Block {
                id: BlockId(0),
                instrs: Vec::new(),
                term: Terminator::Return,
            }],
            entry: BlockId(0),
            value_types: Vec::new(),
            locals: Vec::new(),
        }
    }

    pub fn add_block(&mut self) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(Block {
            id,
            instrs: Vec::new(),
            term: Terminator::Return,
        });
        id
    }

    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id.index()]
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut Block {
        &mut self.blocks[id.index()]
    }

    pub fn set_terminator(&mut self, block: BlockId, term: Terminator) {
        self.block_mut(block).term = term;
    }

    pub fn new_value(&mut self, ty: Type) -> ValueId {
        let id = ValueId(self.value_types.len() as u32);
        self.value_types.push(ty);
        id
    }

    pub fn value_count(&self) -> usize {
        self.value_types.len()
    }

    pub fn value_type(&self, value: ValueId) -> Type {
        self.value_types[value.index()]
    }

    pub fn operand_type(&self, operand: &Operand) -> Type {
        match operand {
            Operand::Value(v) => self.value_type(*v),
            Operand::Const(c) => Type::Scalar(c.ty),
            Operand::Undef(ty) | Operand::Zero(ty) => *ty,
            Operand::Entry(e) => e.ty(),
        }
    }

    pub fn new_local(&mut self, ty: Type) -> LocalId {
        let id = LocalId(self.locals.len() as u32);
        self.locals.push(ty);
        id
    }

    pub fn local_type(&self, local: LocalId) -> Type {
        self.locals[local.0 as usize]
    }

    pub fn local_count(&self) -> usize {
        self.locals.len()
    }

    pub fn successors(&self, block: BlockId) -> Vec<BlockId> {
        self.block(block).term.successors()
    }

    pub fn predecessors(&self) -> Vec<Vec<BlockId>> {
        let mut preds = vec![Vec::new(); self.blocks.len()];
        for block in &self.blocks {
            for succ in block.term.successors() {
                preds[succ.index()].push(block.id);
            }
        }
        preds
    }

    pub fn return_blocks(&self) -> Vec<BlockId> {
        self.blocks
            .iter()
            .filter(|b| b.term == Terminator::Return)
            .map(|b| b.id)
            .collect()
    }

    /// Rewrites every use of `from` (instruction operands and terminators) to `to`.
    pub fn replace_all_uses(&mut self, from: ValueId, to: Operand) {
        let target = Operand::Value(from);
        let mut rewrite = |op: &mut Operand| {
            if *op == target {
                *op = to;
            }
        };
        for block in &mut self.blocks {
            for instr in &mut block.instrs {
                instr.for_each_operand_mut(&mut rewrite);
            }
            block.term.for_each_operand_mut(&mut rewrite);
        }
    }

    pub fn instrs(&self) -> impl Iterator<Item = (BlockId, usize, &Instr)> {
        self.blocks
            .iter()
            .flat_map(|b| b.instrs.iter().enumerate().map(move |(i, instr)| (b.id, i, instr)))
    }

    pub fn has_io_markers(&self) -> bool {
        self.instrs().any(|(_, _, i)| i.is_io_marker())
    }
}

/// Ordered collection of shader functions of one pipeline.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Module {
    pub functions: Vec<Function>,
}

impl Module {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, func: Function) {
        self.functions.push(func);
    }

    pub fn entry_point(&self, stage: ShaderStage) -> Option<&Function> {
        self.functions
            .iter()
            .find(|f| f.is_entry && f.stage == Some(stage))
    }

    pub fn entry_point_mut(&mut self, stage: ShaderStage) -> Option<&mut Function> {
        self.functions
            .iter_mut()
            .find(|f| f.is_entry && f.stage == Some(stage))
    }
}
