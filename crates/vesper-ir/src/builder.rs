use crate::function::{BlockId, Function, LocalId};
use crate::instr::{BinOp, BufferAccess, CastOp, CmpPred, Instr, InterpOp, IntrinsicOp};
use crate::marker::{InputImport, OutputExport, OutputImport};
use crate::types::{ScalarType, Type};
use crate::value::{Const, Operand, ValueId};

/// Inserts instructions into a [`Function`] at a fixed position, advancing past each insertion.
///
/// Integer arithmetic, comparisons and casts on constant operands are folded instead of emitted, so
/// lowering code can build offset expressions without caring whether the inputs are known.
pub struct Builder<'f> {
    func: &'f mut Function,
    block: BlockId,
    pos: usize,
}

impl<'f> Builder<'f> {
    pub fn at(func: &'f mut Function, block: BlockId, pos: usize) -> Self {
        Self { func, block, pos }
    }

    pub fn at_end(func: &'f mut Function, block: BlockId) -> Self {
        let pos = func.block(block).instrs.len();
        Self { func, block, pos }
    }

    pub fn at_start(func: &'f mut Function, block: BlockId) -> Self {
        Self { func, block, pos: 0 }
    }

    pub fn func(&self) -> &Function {
        self.func
    }

    pub fn func_mut(&mut self) -> &mut Function {
        self.func
    }

    pub fn block(&self) -> BlockId {
        self.block
    }

    /// Index the next instruction will be inserted at.
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn set_position(&mut self, block: BlockId, pos: usize) {
        self.block = block;
        self.pos = pos;
    }

    pub fn ty(&self, op: &Operand) -> Type {
        self.func.operand_type(op)
    }

    pub fn push(&mut self, instr: Instr) {
        let pos = self.pos;
        self.func.block_mut(self.block).instrs.insert(pos, instr);
        self.pos += 1;
    }

    fn define(&mut self, ty: Type, make: impl FnOnce(ValueId) -> Instr) -> Operand {
        let dst = self.func.new_value(ty);
        self.push(make(dst));
        Operand::Value(dst)
    }

    pub fn binary(&mut self, op: BinOp, lhs: Operand, rhs: Operand) -> Operand {
        if let (Some(a), Some(b)) = (lhs.as_const(), rhs.as_const()) {
            if let Some(c) = fold_binary(op, a, b) {
                return Operand::Const(c);
            }
        }
        match (op, rhs.as_const()) {
            (BinOp::Add | BinOp::Sub | BinOp::Shl | BinOp::LShr | BinOp::Or, Some(c))
                if c.ty.is_int() && c.bits == 0 =>
            {
                return lhs;
            }
            (BinOp::Mul, Some(c)) if c.ty.is_int() && c.bits == 1 => return lhs,
            _ => {}
        }
        if op == BinOp::Add {
            if let Some(c) = lhs.as_const() {
                if c.ty.is_int() && c.bits == 0 {
                    return rhs;
                }
            }
        }
        let ty = self.ty(&lhs);
        self.define(ty, |dst| Instr::Binary { dst, op, lhs, rhs })
    }

    pub fn add(&mut self, lhs: Operand, rhs: Operand) -> Operand {
        self.binary(BinOp::Add, lhs, rhs)
    }

    pub fn sub(&mut self, lhs: Operand, rhs: Operand) -> Operand {
        self.binary(BinOp::Sub, lhs, rhs)
    }

    pub fn mul(&mut self, lhs: Operand, rhs: Operand) -> Operand {
        self.binary(BinOp::Mul, lhs, rhs)
    }

    pub fn udiv(&mut self, lhs: Operand, rhs: Operand) -> Operand {
        self.binary(BinOp::UDiv, lhs, rhs)
    }

    pub fn urem(&mut self, lhs: Operand, rhs: Operand) -> Operand {
        self.binary(BinOp::URem, lhs, rhs)
    }

    pub fn srem(&mut self, lhs: Operand, rhs: Operand) -> Operand {
        self.binary(BinOp::SRem, lhs, rhs)
    }

    pub fn shl(&mut self, lhs: Operand, rhs: Operand) -> Operand {
        self.binary(BinOp::Shl, lhs, rhs)
    }

    pub fn lshr(&mut self, lhs: Operand, rhs: Operand) -> Operand {
        self.binary(BinOp::LShr, lhs, rhs)
    }

    pub fn and(&mut self, lhs: Operand, rhs: Operand) -> Operand {
        self.binary(BinOp::And, lhs, rhs)
    }

    pub fn or(&mut self, lhs: Operand, rhs: Operand) -> Operand {
        self.binary(BinOp::Or, lhs, rhs)
    }

    pub fn xor(&mut self, lhs: Operand, rhs: Operand) -> Operand {
        self.binary(BinOp::Xor, lhs, rhs)
    }

    pub fn fadd(&mut self, lhs: Operand, rhs: Operand) -> Operand {
        self.binary(BinOp::FAdd, lhs, rhs)
    }

    pub fn fsub(&mut self, lhs: Operand, rhs: Operand) -> Operand {
        self.binary(BinOp::FSub, lhs, rhs)
    }

    pub fn fmul(&mut self, lhs: Operand, rhs: Operand) -> Operand {
        self.binary(BinOp::FMul, lhs, rhs)
    }

    pub fn fdiv(&mut self, lhs: Operand, rhs: Operand) -> Operand {
        self.binary(BinOp::FDiv, lhs, rhs)
    }

    pub fn icmp(&mut self, pred: CmpPred, lhs: Operand, rhs: Operand) -> Operand {
        if let (Some(a), Some(b)) = (lhs.as_const(), rhs.as_const()) {
            if a.ty.is_int() && b.ty.is_int() {
                return Operand::bool(fold_cmp(pred, a, b));
            }
        }
        self.define(Type::BOOL, |dst| Instr::ICmp {
            dst,
            pred,
            lhs,
            rhs,
        })
    }

    pub fn select(&mut self, cond: Operand, if_true: Operand, if_false: Operand) -> Operand {
        if let Some(c) = cond.as_const() {
            return if c.bits != 0 { if_true } else { if_false };
        }
        let ty = self.ty(&if_true);
        self.define(ty, |dst| Instr::Select {
            dst,
            cond,
            if_true,
            if_false,
        })
    }

    pub fn cast(&mut self, op: CastOp, value: Operand, ty: Type) -> Operand {
        if self.ty(&value) == ty {
            return value;
        }
        if let Some(c) = value.as_const() {
            if let Some(folded) = fold_cast(op, c, ty) {
                return Operand::Const(folded);
            }
        }
        self.define(ty, |dst| Instr::Cast {
            dst,
            op,
            value,
            ty,
        })
    }

    pub fn bitcast(&mut self, value: Operand, ty: Type) -> Operand {
        self.cast(CastOp::Bitcast, value, ty)
    }

    pub fn zext(&mut self, value: Operand, ty: Type) -> Operand {
        self.cast(CastOp::ZExt, value, ty)
    }

    pub fn sext(&mut self, value: Operand, ty: Type) -> Operand {
        self.cast(CastOp::SExt, value, ty)
    }

    pub fn trunc(&mut self, value: Operand, ty: Type) -> Operand {
        self.cast(CastOp::Trunc, value, ty)
    }

    /// Integer resize: zero-extends or truncates to `ty` as needed.
    pub fn zext_or_trunc(&mut self, value: Operand, ty: Type) -> Operand {
        let from = self.ty(&value).scalar_bits();
        if from < ty.scalar_bits() {
            self.zext(value, ty)
        } else {
            self.trunc(value, ty)
        }
    }

    pub fn extract_element(&mut self, vector: Operand, index: Operand) -> Operand {
        let ty = self.ty(&vector);
        if !ty.is_vector() {
            return vector;
        }
        let elem = Type::Scalar(ty.scalar_type().unwrap_or(ScalarType::I32));
        self.define(elem, |dst| Instr::ExtractElement { dst, vector, index })
    }

    pub fn extract_lane(&mut self, vector: Operand, lane: u32) -> Operand {
        self.extract_element(vector, Operand::i32(lane))
    }

    pub fn insert_element(&mut self, vector: Operand, value: Operand, index: Operand) -> Operand {
        let ty = self.ty(&vector);
        self.define(ty, |dst| Instr::InsertElement {
            dst,
            vector,
            value,
            index,
        })
    }

    pub fn insert_lane(&mut self, vector: Operand, value: Operand, lane: u32) -> Operand {
        self.insert_element(vector, value, Operand::i32(lane))
    }

    /// Builds a vector (or returns the scalar when there is one element) from `elems`.
    pub fn build_vector(&mut self, elem: ScalarType, elems: &[Operand]) -> Operand {
        if elems.len() == 1 {
            return elems[0];
        }
        let mut vector = Operand::Undef(Type::vec(elem, elems.len() as u32));
        for (i, value) in elems.iter().enumerate() {
            vector = self.insert_lane(vector, *value, i as u32);
        }
        vector
    }

    pub fn shuffle(&mut self, lhs: Operand, rhs: Operand, mask: &[u32]) -> Operand {
        let elem = self.ty(&lhs).scalar_type().unwrap_or(ScalarType::I32);
        let ty = Type::scalar_or_vec(elem, mask.len() as u32);
        if mask.len() == 1 {
            return self.extract_lane(lhs, mask[0]);
        }
        let mask = mask.to_vec();
        self.define(ty, |dst| Instr::ShuffleVector {
            dst,
            lhs,
            rhs,
            mask,
        })
    }

    pub fn extract_value(&mut self, aggregate: Operand, index: u32) -> Operand {
        let ty = self.ty(&aggregate);
        let elem = Type::Scalar(ty.scalar_type().unwrap_or(ScalarType::I32));
        self.define(elem, |dst| Instr::ExtractValue {
            dst,
            aggregate,
            index,
        })
    }

    pub fn insert_value(&mut self, aggregate: Operand, value: Operand, index: u32) -> Operand {
        let ty = self.ty(&aggregate);
        self.define(ty, |dst| Instr::InsertValue {
            dst,
            aggregate,
            value,
            index,
        })
    }

    pub fn load_local(&mut self, local: LocalId) -> Operand {
        let ty = self.func.local_type(local);
        self.define(ty, |dst| Instr::LoadLocal { dst, local })
    }

    pub fn store_local(&mut self, local: LocalId, value: Operand) {
        self.push(Instr::StoreLocal { local, value });
    }

    pub fn lds_load(&mut self, offset: Operand) -> Operand {
        self.define(Type::I32, |dst| Instr::LdsLoad { dst, offset })
    }

    pub fn lds_store(&mut self, offset: Operand, value: Operand) {
        self.push(Instr::LdsStore { offset, value });
    }

    pub fn buffer_load(&mut self, ty: Type, access: BufferAccess) -> Operand {
        self.define(ty, |dst| Instr::BufferLoad { dst, access })
    }

    pub fn buffer_store(&mut self, value: Operand, access: BufferAccess, predicate: Option<Operand>) {
        self.push(Instr::BufferStore {
            value,
            access,
            predicate,
        });
    }

    pub fn exp(&mut self, target: u8, enable: u8, sources: [Operand; 4], done: bool) {
        self.push(Instr::Exp {
            target,
            enable,
            sources,
            done,
            valid_mask: false,
        });
    }

    pub fn interp(
        &mut self,
        op: InterpOp,
        channel: u32,
        attr: Operand,
        prim_mask: Operand,
    ) -> Operand {
        let ty = match op {
            InterpOp::P2F16 { .. } => Type::F16,
            _ => Type::F32,
        };
        self.define(ty, |dst| Instr::Interp {
            dst,
            op,
            channel,
            attr,
            prim_mask,
        })
    }

    pub fn send_msg(&mut self, msg: u32, wave_id: Operand) {
        self.push(Instr::SendMsg { msg, wave_id });
    }

    pub fn fence(&mut self) {
        self.push(Instr::Fence);
    }

    pub fn intrinsic(&mut self, op: IntrinsicOp, ty: Type, args: Vec<Operand>) -> Operand {
        self.define(ty, |dst| Instr::Intrinsic { dst, op, args })
    }

    /// `ubfe(value, offset, width)`.
    pub fn ubfe(&mut self, value: Operand, offset: u32, width: u32) -> Operand {
        self.intrinsic(
            IntrinsicOp::Ubfe,
            Type::I32,
            vec![value, Operand::i32(offset), Operand::i32(width)],
        )
    }

    pub fn import_input(&mut self, ty: Type, import: InputImport) -> Operand {
        self.define(ty, |dst| Instr::ImportInput { dst, import })
    }

    pub fn import_output(&mut self, ty: Type, import: OutputImport) -> Operand {
        self.define(ty, |dst| Instr::ImportOutput { dst, import })
    }

    pub fn export_output(&mut self, export: OutputExport) {
        self.push(Instr::ExportOutput(export));
    }

    pub fn ngg_gs_output_export(&mut self, location: u32, component: u32, stream: u32, value: Operand) {
        self.push(Instr::NggGsOutputExport {
            location,
            component,
            stream,
            value,
        });
    }

    pub fn reconfigure_local_invocation_id(&mut self, value: Operand) -> Operand {
        let ty = self.ty(&value);
        self.define(ty, |dst| Instr::ReconfigureLocalInvocationId { dst, value })
    }
}

fn fold_binary(op: BinOp, a: Const, b: Const) -> Option<Const> {
    if !a.ty.is_int() || a.ty != b.ty || op.is_float() {
        return None;
    }
    let (x, y) = (a.bits, b.bits);
    let bits = match op {
        BinOp::Add => x.wrapping_add(y),
        BinOp::Sub => x.wrapping_sub(y),
        BinOp::Mul => x.wrapping_mul(y),
        BinOp::UDiv => x.checked_div(y)?,
        BinOp::URem => x.checked_rem(y)?,
        BinOp::SRem => {
            let r = a.as_i64().checked_rem(b.as_i64())?;
            r as u64
        }
        BinOp::Shl => x.checked_shl(y as u32).unwrap_or(0),
        BinOp::LShr => x.checked_shr(y as u32).unwrap_or(0),
        BinOp::AShr => (a.as_i64() >> y.min(63)) as u64,
        BinOp::And => x & y,
        BinOp::Or => x | y,
        BinOp::Xor => x ^ y,
        BinOp::FAdd | BinOp::FSub | BinOp::FMul | BinOp::FDiv => return None,
    };
    Some(Const::int(a.ty, bits))
}

fn fold_cmp(pred: CmpPred, a: Const, b: Const) -> bool {
    let (x, y) = (a.bits, b.bits);
    let (sx, sy) = (a.as_i64(), b.as_i64());
    match pred {
        CmpPred::Eq => x == y,
        CmpPred::Ne => x != y,
        CmpPred::Ult => x < y,
        CmpPred::Ule => x <= y,
        CmpPred::Ugt => x > y,
        CmpPred::Uge => x >= y,
        CmpPred::Slt => sx < sy,
        CmpPred::Sle => sx <= sy,
        CmpPred::Sgt => sx > sy,
        CmpPred::Sge => sx >= sy,
    }
}

fn fold_cast(op: CastOp, c: Const, ty: Type) -> Option<Const> {
    let Type::Scalar(to) = ty else {
        return None;
    };
    match op {
        CastOp::ZExt | CastOp::Trunc if c.ty.is_int() && to.is_int() => {
            Some(Const::int(to, c.bits))
        }
        CastOp::SExt if c.ty.is_int() && to.is_int() => Some(Const::int(to, c.as_i64() as u64)),
        CastOp::Bitcast if c.ty.bits() == to.bits() => Some(Const { ty: to, bits: c.bits }),
        _ => None,
    }
}
