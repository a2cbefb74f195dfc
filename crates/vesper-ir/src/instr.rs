use bitflags::bitflags;

use crate::function::LocalId;
use crate::marker::{InputImport, OutputExport, OutputImport};
use crate::types::Type;
use crate::value::{Operand, ValueId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    UDiv,
    URem,
    SRem,
    Shl,
    LShr,
    AShr,
    And,
    Or,
    Xor,
    FAdd,
    FSub,
    FMul,
    FDiv,
}

impl BinOp {
    pub const fn is_float(self) -> bool {
        matches!(self, BinOp::FAdd | BinOp::FSub | BinOp::FMul | BinOp::FDiv)
    }

    pub const fn mnemonic(self) -> &'static str {
        match self {
            BinOp::Add => "add",
            BinOp::Sub => "sub",
            BinOp::Mul => "mul",
            BinOp::UDiv => "udiv",
            BinOp::URem => "urem",
            BinOp::SRem => "srem",
            BinOp::Shl => "shl",
            BinOp::LShr => "lshr",
            BinOp::AShr => "ashr",
            BinOp::And => "and",
            BinOp::Or => "or",
            BinOp::Xor => "xor",
            BinOp::FAdd => "fadd",
            BinOp::FSub => "fsub",
            BinOp::FMul => "fmul",
            BinOp::FDiv => "fdiv",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CmpPred {
    Eq,
    Ne,
    Ult,
    Ule,
    Ugt,
    Uge,
    Slt,
    Sle,
    Sgt,
    Sge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CastOp {
    Bitcast,
    ZExt,
    SExt,
    Trunc,
    FpExt,
    FpTrunc,
}

impl CastOp {
    pub const fn mnemonic(self) -> &'static str {
        match self {
            CastOp::Bitcast => "bitcast",
            CastOp::ZExt => "zext",
            CastOp::SExt => "sext",
            CastOp::Trunc => "trunc",
            CastOp::FpExt => "fpext",
            CastOp::FpTrunc => "fptrunc",
        }
    }
}

/// Lane and bit-manipulation intrinsics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntrinsicOp {
    /// `mbcnt_lo(mask, acc)`: bits of `mask` below the lane (lanes 0..32).
    MbcntLo,
    /// `mbcnt_hi(mask, acc)`: same for lanes 32..64.
    MbcntHi,
    /// `ubfe(value, offset, width)`.
    Ubfe,
    DerivFineX,
    DerivFineY,
    /// Reciprocal of an `f32`.
    Rcp,
    /// `i1`: the lane is not a helper invocation.
    PsLive,
}

/// Interpolation parameter selector of `interp.mov`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InterpParam {
    P10 = 0,
    P20 = 1,
    P0 = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InterpOp {
    P1 { i: Operand },
    P2 { p1: Operand, j: Operand },
    P1F16 { i: Operand, high: bool },
    /// Produces `half`.
    P2F16 { p1: Operand, j: Operand, high: bool },
    Mov { param: InterpParam },
}

bitflags! {
    /// Cache-coherence bits of a buffer access.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct CachePolicy: u8 {
        const GLC = 1 << 0;
        const SLC = 1 << 1;
        const DLC = 1 << 2;
        const SWZ = 1 << 3;
    }
}

/// Hardware buffer format code (numeric/data format pair before GFX10, unified enum from GFX10).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferFormat(pub u32);

/// Addressing of one buffer access.
///
/// The byte address is `vindex * stride + voffset + soffset + offset`, where `stride` comes from the
/// descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct BufferAccess {
    pub desc: Operand,
    pub vindex: Option<Operand>,
    pub voffset: Operand,
    pub soffset: Operand,
    pub offset: u32,
    /// Typed access when set.
    pub format: Option<BufferFormat>,
    pub cache: CachePolicy,
}

/// Export targets of the `exp` instruction.
pub mod exp_target {
    pub const MRT_0: u8 = 0;
    pub const MRTZ: u8 = 8;
    pub const NULL: u8 = 9;
    pub const POS_0: u8 = 12;
    pub const POS_1: u8 = 13;
    pub const POS_2: u8 = 14;
    pub const POS_3: u8 = 15;
    pub const PARAM_0: u8 = 32;
    pub const PARAM_31: u8 = 63;

    pub const fn is_position(target: u8) -> bool {
        target >= POS_0 && target <= POS_3
    }
}

/// `s_sendmsg` payloads.
pub mod msg {
    pub const GS_DONE: u32 = 0x03;
    pub const GS_CUT: u32 = 0x12;
    pub const GS_EMIT: u32 = 0x22;
    pub const GS_EMIT_STREAM0: u32 = 0x22;
    pub const GS_EMIT_STREAM1: u32 = 0x122;
    pub const GS_EMIT_STREAM2: u32 = 0x222;
    pub const GS_EMIT_STREAM3: u32 = 0x322;
    pub const GS_CUT_STREAM0: u32 = 0x12;
    pub const STREAM_ID_MASK: u32 = 0x300;
    pub const STREAM_ID_SHIFT: u32 = 8;

    /// Stream of a GS emit message, if `message` is one.
    pub const fn emit_stream(message: u32) -> Option<u32> {
        match message {
            GS_EMIT_STREAM0 | GS_EMIT_STREAM1 | GS_EMIT_STREAM2 | GS_EMIT_STREAM3 => {
                Some((message & STREAM_ID_MASK) >> STREAM_ID_SHIFT)
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Instr {
    Binary {
        dst: ValueId,
        op: BinOp,
        lhs: Operand,
        rhs: Operand,
    },
    ICmp {
        dst: ValueId,
        pred: CmpPred,
        lhs: Operand,
        rhs: Operand,
    },
    Select {
        dst: ValueId,
        cond: Operand,
        if_true: Operand,
        if_false: Operand,
    },
    Cast {
        dst: ValueId,
        op: CastOp,
        value: Operand,
        ty: Type,
    },
    ExtractElement {
        dst: ValueId,
        vector: Operand,
        index: Operand,
    },
    InsertElement {
        dst: ValueId,
        vector: Operand,
        value: Operand,
        index: Operand,
    },
    /// Elements `0..n` index `lhs`, `n..2n` index `rhs`.
    ShuffleVector {
        dst: ValueId,
        lhs: Operand,
        rhs: Operand,
        mask: Vec<u32>,
    },
    ExtractValue {
        dst: ValueId,
        aggregate: Operand,
        index: u32,
    },
    InsertValue {
        dst: ValueId,
        aggregate: Operand,
        value: Operand,
        index: u32,
    },
    LoadLocal {
        dst: ValueId,
        local: LocalId,
    },
    StoreLocal {
        local: LocalId,
        value: Operand,
    },
    ImportInput {
        dst: ValueId,
        import: InputImport,
    },
    ImportOutput {
        dst: ValueId,
        import: OutputImport,
    },
    ExportOutput(OutputExport),
    /// Loads one dword of LDS at a dword offset.
    LdsLoad {
        dst: ValueId,
        offset: Operand,
    },
    LdsStore {
        offset: Operand,
        value: Operand,
    },
    BufferLoad {
        dst: ValueId,
        access: BufferAccess,
    },
    /// Skipped at run time when `predicate` is false.
    BufferStore {
        value: Operand,
        access: BufferAccess,
        predicate: Option<Operand>,
    },
    Exp {
        target: u8,
        enable: u8,
        sources: [Operand; 4],
        done: bool,
        valid_mask: bool,
    },
    Interp {
        dst: ValueId,
        op: InterpOp,
        channel: u32,
        attr: Operand,
        prim_mask: Operand,
    },
    SendMsg {
        msg: u32,
        wave_id: Operand,
    },
    /// Release fence at workgroup scope.
    Fence,
    Intrinsic {
        dst: ValueId,
        op: IntrinsicOp,
        args: Vec<Operand>,
    },
    /// Left for the NGG primitive-shader generator.
    NggGsOutputExport {
        location: u32,
        component: u32,
        stream: u32,
        value: Operand,
    },
    /// Placeholder for the swizzled local invocation id of a compute shader.
    ReconfigureLocalInvocationId {
        dst: ValueId,
        value: Operand,
    },
}

impl Instr {
    pub fn dst(&self) -> Option<ValueId> {
        match self {
            Instr::Binary { dst, .. }
            | Instr::ICmp { dst, .. }
            | Instr::Select { dst, .. }
            | Instr::Cast { dst, .. }
            | Instr::ExtractElement { dst, .. }
            | Instr::InsertElement { dst, .. }
            | Instr::ShuffleVector { dst, .. }
            | Instr::ExtractValue { dst, .. }
            | Instr::InsertValue { dst, .. }
            | Instr::LoadLocal { dst, .. }
            | Instr::ImportInput { dst, .. }
            | Instr::ImportOutput { dst, .. }
            | Instr::LdsLoad { dst, .. }
            | Instr::BufferLoad { dst, .. }
            | Instr::Interp { dst, .. }
            | Instr::Intrinsic { dst, .. }
            | Instr::ReconfigureLocalInvocationId { dst, .. } => Some(*dst),
            Instr::StoreLocal { .. }
            | Instr::ExportOutput(_)
            | Instr::LdsStore { .. }
            | Instr::BufferStore { .. }
            | Instr::Exp { .. }
            | Instr::SendMsg { .. }
            | Instr::Fence
            | Instr::NggGsOutputExport { .. } => None,
        }
    }

    /// Abstract I/O markers that the patch pass must resolve.
    pub fn is_io_marker(&self) -> bool {
        matches!(
            self,
            Instr::ImportInput { .. } | Instr::ImportOutput { .. } | Instr::ExportOutput(_)
        )
    }

    pub fn for_each_operand(&self, mut f: impl FnMut(&Operand)) {
        let mut copy = self.clone();
        copy.for_each_operand_mut(|op| f(op));
    }

    pub fn for_each_operand_mut(&mut self, mut f: impl FnMut(&mut Operand)) {
        fn opt(o: &mut Option<Operand>, f: &mut impl FnMut(&mut Operand)) {
            if let Some(o) = o {
                f(o);
            }
        }
        fn access(a: &mut BufferAccess, f: &mut impl FnMut(&mut Operand)) {
            f(&mut a.desc);
            opt(&mut a.vindex, f);
            f(&mut a.voffset);
            f(&mut a.soffset);
        }

        match self {
            Instr::Binary { lhs, rhs, .. } | Instr::ICmp { lhs, rhs, .. } => {
                f(lhs);
                f(rhs);
            }
            Instr::Select {
                cond,
                if_true,
                if_false,
                ..
            } => {
                f(cond);
                f(if_true);
                f(if_false);
            }
            Instr::Cast { value, .. } => f(value),
            Instr::ExtractElement { vector, index, .. } => {
                f(vector);
                f(index);
            }
            Instr::InsertElement {
                vector,
                value,
                index,
                ..
            } => {
                f(vector);
                f(value);
                f(index);
            }
            Instr::ShuffleVector { lhs, rhs, .. } => {
                f(lhs);
                f(rhs);
            }
            Instr::ExtractValue { aggregate, .. } => f(aggregate),
            Instr::InsertValue {
                aggregate, value, ..
            } => {
                f(aggregate);
                f(value);
            }
            Instr::LoadLocal { .. } | Instr::Fence => {}
            Instr::StoreLocal { value, .. } => f(value),
            Instr::ImportInput { import, .. } => match import {
                InputImport::Vertex { .. } => {}
                InputImport::Generic {
                    loc_offset,
                    elem_idx,
                    vertex_idx,
                    ..
                } => {
                    f(loc_offset);
                    f(elem_idx);
                    opt(vertex_idx, &mut f);
                }
                InputImport::Interpolant {
                    loc_offset,
                    elem_idx,
                    aux,
                    ..
                } => {
                    f(loc_offset);
                    f(elem_idx);
                    f(aux);
                }
                InputImport::BuiltIn {
                    elem_idx,
                    vertex_idx,
                    sample_id,
                    ..
                } => {
                    opt(elem_idx, &mut f);
                    opt(vertex_idx, &mut f);
                    opt(sample_id, &mut f);
                }
            },
            Instr::ImportOutput { import, .. } => match import {
                OutputImport::Generic {
                    loc_offset,
                    elem_idx,
                    vertex_idx,
                    ..
                } => {
                    f(loc_offset);
                    f(elem_idx);
                    opt(vertex_idx, &mut f);
                }
                OutputImport::BuiltIn {
                    elem_idx,
                    vertex_idx,
                    ..
                } => {
                    opt(elem_idx, &mut f);
                    opt(vertex_idx, &mut f);
                }
            },
            Instr::ExportOutput(export) => match export {
                OutputExport::Generic {
                    loc_offset,
                    elem_idx,
                    vertex_idx,
                    value,
                    ..
                } => {
                    f(loc_offset);
                    f(elem_idx);
                    opt(vertex_idx, &mut f);
                    f(value);
                }
                OutputExport::BuiltIn {
                    elem_idx,
                    vertex_idx,
                    value,
                    ..
                } => {
                    opt(elem_idx, &mut f);
                    opt(vertex_idx, &mut f);
                    f(value);
                }
                OutputExport::Xfb { value, .. } => f(value),
            },
            Instr::LdsLoad { offset, .. } => f(offset),
            Instr::LdsStore { offset, value } => {
                f(offset);
                f(value);
            }
            Instr::BufferLoad { access: a, .. } => access(a, &mut f),
            Instr::BufferStore {
                value,
                access: a,
                predicate,
            } => {
                f(value);
                access(a, &mut f);
                opt(predicate, &mut f);
            }
            Instr::Exp { sources, .. } => sources.iter_mut().for_each(&mut f),
            Instr::Interp {
                op,
                attr,
                prim_mask,
                ..
            } => {
                match op {
                    InterpOp::P1 { i } | InterpOp::P1F16 { i, .. } => f(i),
                    InterpOp::P2 { p1, j } | InterpOp::P2F16 { p1, j, .. } => {
                        f(p1);
                        f(j);
                    }
                    InterpOp::Mov { .. } => {}
                }
                f(attr);
                f(prim_mask);
            }
            Instr::SendMsg { wave_id, .. } => f(wave_id),
            Instr::Intrinsic { args, .. } => args.iter_mut().for_each(&mut f),
            Instr::NggGsOutputExport { value, .. } => f(value),
            Instr::ReconfigureLocalInvocationId { value, .. } => f(value),
        }
    }
}
