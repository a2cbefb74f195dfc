//! Reference interpreter.
//!
//! Executes one invocation of a lowered function against an explicit [`Machine`]: entry values,
//! LDS dwords, byte-addressed buffers per descriptor and FS attribute parameters. Exports,
//! messages and NGG output markers are recorded for inspection. Used by tests to check that what
//! one stage writes is exactly what the next stage reads.

use half::f16;
use hashbrown::HashMap;

use crate::error::IrError;
use crate::function::{Function, LocalId, Terminator};
use crate::instr::{
    BinOp, BufferAccess, CastOp, CmpPred, Instr, InterpOp, InterpParam, IntrinsicOp,
};
use crate::types::{ScalarType, Type};
use crate::value::{Descriptor, EntryValue, Operand};

const STEP_LIMIT: usize = 1 << 20;

/// Runtime value: one zero-extended bit pattern per element.
#[derive(Debug, Clone, PartialEq)]
pub struct Value {
    pub ty: Type,
    pub elems: Vec<u64>,
}

impl Value {
    pub fn zero(ty: Type) -> Self {
        Self {
            ty,
            elems: vec![0; ty.element_count() as usize],
        }
    }

    pub fn scalar(ty: ScalarType, bits: u64) -> Self {
        Self {
            ty: Type::Scalar(ty),
            elems: vec![bits & ty.mask()],
        }
    }

    pub fn i32(v: u32) -> Self {
        Self::scalar(ScalarType::I32, v as u64)
    }

    pub fn f32(v: f32) -> Self {
        Self::scalar(ScalarType::F32, v.to_bits() as u64)
    }

    pub fn vector(elem: ScalarType, bits: &[u64]) -> Self {
        Self {
            ty: Type::scalar_or_vec(elem, bits.len() as u32),
            elems: bits.iter().map(|b| b & elem.mask()).collect(),
        }
    }

    pub fn f32s(values: &[f32]) -> Self {
        let bits: Vec<u64> = values.iter().map(|v| v.to_bits() as u64).collect();
        Self::vector(ScalarType::F32, &bits)
    }

    pub fn u32s(values: &[u32]) -> Self {
        let bits: Vec<u64> = values.iter().map(|v| *v as u64).collect();
        Self::vector(ScalarType::I32, &bits)
    }

    fn elem_type(&self) -> ScalarType {
        self.ty.scalar_type().unwrap_or(ScalarType::I32)
    }

    pub fn as_u32(&self) -> u32 {
        self.elems.first().copied().unwrap_or(0) as u32
    }

    pub fn as_f32s(&self) -> Vec<f32> {
        self.elems.iter().map(|b| f32::from_bits(*b as u32)).collect()
    }

    /// Little-endian byte image; `i1` elements take one byte.
    pub fn to_bytes(&self) -> Vec<u8> {
        let width = byte_width(self.elem_type());
        let mut out = Vec::with_capacity(width * self.elems.len());
        for e in &self.elems {
            out.extend_from_slice(&e.to_le_bytes()[..width]);
        }
        out
    }

    pub fn from_bytes(ty: Type, bytes: &[u8]) -> Self {
        let elem = ty.scalar_type().unwrap_or(ScalarType::I32);
        let width = byte_width(elem);
        let elems = (0..ty.element_count() as usize)
            .map(|i| {
                let mut raw = [0u8; 8];
                if let Some(chunk) = bytes.get(i * width..(i + 1) * width) {
                    raw[..width].copy_from_slice(chunk);
                }
                u64::from_le_bytes(raw) & elem.mask()
            })
            .collect();
        Self { ty, elems }
    }
}

fn byte_width(ty: ScalarType) -> usize {
    (ty.bits() as usize).div_ceil(8)
}

/// One recorded `exp`.
#[derive(Debug, Clone, PartialEq)]
pub struct Export {
    pub target: u8,
    pub enable: u8,
    /// `None` for undefined sources.
    pub sources: [Option<u64>; 4],
    pub done: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NggOutput {
    pub location: u32,
    pub component: u32,
    pub stream: u32,
    pub value: Value,
}

/// Hardware state seen by one invocation.
#[derive(Debug, Default)]
pub struct Machine {
    pub entry: HashMap<EntryValue, Value>,
    pub lds: Vec<u32>,
    pub buffers: HashMap<Descriptor, Vec<u8>>,
    /// Record stride of structured buffers, in bytes.
    pub strides: HashMap<Descriptor, u32>,
    /// `(attr, channel)` -> P0, P10, P20 parameter bits.
    pub attributes: HashMap<(u32, u32), [u32; 3]>,
    /// Lane index inside the wave, for `mbcnt`.
    pub lane: u32,
    pub exports: Vec<Export>,
    pub messages: Vec<u32>,
    pub ngg_outputs: Vec<NggOutput>,
}

impl Machine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_lds(dwords: usize) -> Self {
        Self {
            lds: vec![0; dwords],
            ..Self::default()
        }
    }

    pub fn set_entry(&mut self, entry: EntryValue, value: Value) -> &mut Self {
        self.entry.insert(entry, value);
        self
    }

    pub fn bind_buffer(&mut self, desc: Descriptor, bytes: usize, stride: u32) -> &mut Self {
        self.buffers.insert(desc, vec![0; bytes]);
        self.strides.insert(desc, stride);
        self
    }

    pub fn read_buffer_u32(&self, desc: Descriptor, byte_offset: usize) -> Option<u32> {
        let buf = self.buffers.get(&desc)?;
        let bytes = buf.get(byte_offset..byte_offset + 4)?;
        Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Runs `func` from its entry block until it returns.
    pub fn run(&mut self, func: &Function) -> Result<(), IrError> {
        let mut frame = Frame {
            values: vec![None; func.value_count()],
            locals: (0..func.local_count())
                .map(|i| Value::zero(func.local_type(LocalId(i as u32))))
                .collect(),
        };

        let mut block = func.entry;
        let mut steps = 0usize;
        loop {
            tracing::trace!(function = %func.name, block = block.0, "enter block");
            for instr in &func.block(block).instrs {
                steps += 1;
                if steps > STEP_LIMIT {
                    return Err(IrError::StepLimit(STEP_LIMIT));
                }
                self.step(func, &mut frame, instr)?;
            }
            block = match &func.block(block).term {
                Terminator::Return => return Ok(()),
                Terminator::Branch(target) => *target,
                Terminator::CondBranch {
                    cond,
                    if_true,
                    if_false,
                } => {
                    if self.eval(&frame, cond)?.as_u32() != 0 {
                        *if_true
                    } else {
                        *if_false
                    }
                }
                Terminator::Switch {
                    value,
                    default,
                    cases,
                } => {
                    let v = self.eval(&frame, value)?.elems[0];
                    cases
                        .iter()
                        .find(|(case, _)| *case == v)
                        .map(|(_, target)| *target)
                        .unwrap_or(*default)
                }
                Terminator::Unreachable => {
                    return Err(IrError::Unsupported(format!(
                        "reached unreachable in bb{}",
                        block.0
                    )))
                }
            };
        }
    }

    fn eval(&self, frame: &Frame, op: &Operand) -> Result<Value, IrError> {
        match op {
            Operand::Value(v) => frame
                .values
                .get(v.index())
                .and_then(|slot| slot.clone())
                .ok_or(IrError::UndefinedValue(*v)),
            Operand::Const(c) => Ok(Value::scalar(c.ty, c.bits)),
            Operand::Undef(ty) | Operand::Zero(ty) => Ok(Value::zero(*ty)),
            Operand::Entry(EntryValue::Descriptor(_)) => Ok(Value::zero(Type::vec(ScalarType::I32, 4))),
            Operand::Entry(e) => self
                .entry
                .get(e)
                .cloned()
                .ok_or(IrError::MissingEntryValue(*e)),
        }
    }

    fn step(&mut self, func: &Function, frame: &mut Frame, instr: &Instr) -> Result<(), IrError> {
        let result = match instr {
            Instr::Binary { op, lhs, rhs, .. } => {
                let a = self.eval(frame, lhs)?;
                let b = self.eval(frame, rhs)?;
                Some(binary(*op, &a, &b)?)
            }
            Instr::ICmp { pred, lhs, rhs, .. } => {
                let a = self.eval(frame, lhs)?;
                let b = self.eval(frame, rhs)?;
                let elem = a.elem_type();
                let bits: Vec<u64> = a
                    .elems
                    .iter()
                    .zip(&b.elems)
                    .map(|(x, y)| compare(*pred, elem, *x, *y) as u64)
                    .collect();
                Some(Value::vector(ScalarType::I1, &bits))
            }
            Instr::Select {
                cond,
                if_true,
                if_false,
                ..
            } => {
                if self.eval(frame, cond)?.as_u32() != 0 {
                    Some(self.eval(frame, if_true)?)
                } else {
                    Some(self.eval(frame, if_false)?)
                }
            }
            Instr::Cast { op, value, ty, .. } => {
                let v = self.eval(frame, value)?;
                Some(cast(*op, &v, *ty)?)
            }
            Instr::ExtractElement { vector, index, .. } => {
                let v = self.eval(frame, vector)?;
                let i = self.eval(frame, index)?.as_u32() as usize;
                let bits = v.elems.get(i).copied().unwrap_or(0);
                Some(Value::scalar(v.elem_type(), bits))
            }
            Instr::InsertElement {
                vector,
                value,
                index,
                ..
            } => {
                let mut v = self.eval(frame, vector)?;
                let x = self.eval(frame, value)?;
                let i = self.eval(frame, index)?.as_u32() as usize;
                if let Some(slot) = v.elems.get_mut(i) {
                    *slot = x.elems[0];
                }
                Some(v)
            }
            Instr::ShuffleVector { lhs, rhs, mask, .. } => {
                let a = self.eval(frame, lhs)?;
                let b = self.eval(frame, rhs)?;
                let all: Vec<u64> = a.elems.iter().chain(&b.elems).copied().collect();
                let bits: Vec<u64> = mask
                    .iter()
                    .map(|m| all.get(*m as usize).copied().unwrap_or(0))
                    .collect();
                Some(Value::vector(a.elem_type(), &bits))
            }
            Instr::ExtractValue {
                aggregate, index, ..
            } => {
                let v = self.eval(frame, aggregate)?;
                let bits = v.elems.get(*index as usize).copied().unwrap_or(0);
                Some(Value::scalar(v.elem_type(), bits))
            }
            Instr::InsertValue {
                aggregate,
                value,
                index,
                ..
            } => {
                let mut v = self.eval(frame, aggregate)?;
                let x = self.eval(frame, value)?;
                if let Some(slot) = v.elems.get_mut(*index as usize) {
                    *slot = x.elems[0];
                }
                Some(v)
            }
            Instr::LoadLocal { local, .. } => Some(frame.locals[local.0 as usize].clone()),
            Instr::StoreLocal { local, value } => {
                frame.locals[local.0 as usize] = self.eval(frame, value)?;
                None
            }
            Instr::ImportInput { import, .. } => {
                return Err(IrError::UnloweredMarker(import.to_string()))
            }
            Instr::ImportOutput { import, .. } => {
                return Err(IrError::UnloweredMarker(import.to_string()))
            }
            Instr::ExportOutput(export) => {
                return Err(IrError::UnloweredMarker(export.to_string()))
            }
            Instr::LdsLoad { offset, .. } => {
                let off = self.eval(frame, offset)?.as_u32() as usize;
                let word = self.lds.get(off).copied().ok_or(IrError::LdsOutOfRange {
                    offset: off as u64,
                    size: self.lds.len(),
                })?;
                Some(Value::i32(word))
            }
            Instr::LdsStore { offset, value } => {
                let off = self.eval(frame, offset)?.as_u32() as usize;
                let v = self.eval(frame, value)?;
                let size = self.lds.len();
                let slot = self.lds.get_mut(off).ok_or(IrError::LdsOutOfRange {
                    offset: off as u64,
                    size,
                })?;
                *slot = v.as_u32();
                None
            }
            Instr::BufferLoad { dst, access } => {
                let (desc, addr) = self.address(frame, access)?;
                let ty = func.value_type(*dst);
                let len = (ty.bit_size() as usize).div_ceil(8);
                let buf = self
                    .buffers
                    .get(&desc)
                    .ok_or_else(|| IrError::MissingBuffer(format!("{desc:?}")))?;
                // Out-of-range loads return zero.
                let bytes = buf
                    .get(addr..addr + len)
                    .map(<[u8]>::to_vec)
                    .unwrap_or_else(|| vec![0; len]);
                Some(Value::from_bytes(ty, &bytes))
            }
            Instr::BufferStore {
                value,
                access,
                predicate,
            } => {
                if let Some(p) = predicate {
                    if self.eval(frame, p)?.as_u32() == 0 {
                        return Ok(());
                    }
                }
                let v = self.eval(frame, value)?;
                let (desc, addr) = self.address(frame, access)?;
                let bytes = v.to_bytes();
                let buf = self
                    .buffers
                    .get_mut(&desc)
                    .ok_or_else(|| IrError::MissingBuffer(format!("{desc:?}")))?;
                // Out-of-range stores are dropped.
                if let Some(dst) = buf.get_mut(addr..addr + bytes.len()) {
                    dst.copy_from_slice(&bytes);
                }
                None
            }
            Instr::Exp {
                target,
                enable,
                sources,
                done,
                ..
            } => {
                let mut out = [None; 4];
                for (slot, src) in out.iter_mut().zip(sources) {
                    if !src.is_undef() {
                        *slot = Some(self.eval(frame, src)?.elems[0]);
                    }
                }
                self.exports.push(Export {
                    target: *target,
                    enable: *enable,
                    sources: out,
                    done: *done,
                });
                None
            }
            Instr::Interp {
                op, channel, attr, ..
            } => {
                let attr = self.eval(frame, attr)?.as_u32();
                let params = self
                    .attributes
                    .get(&(attr, *channel))
                    .copied()
                    .unwrap_or([0; 3]);
                Some(self.interpolate(frame, op, params)?)
            }
            Instr::SendMsg { msg, .. } => {
                self.messages.push(*msg);
                None
            }
            Instr::Fence => None,
            Instr::Intrinsic { op, args, .. } => {
                let vals = args
                    .iter()
                    .map(|a| self.eval(frame, a))
                    .collect::<Result<Vec<_>, _>>()?;
                Some(self.intrinsic(*op, &vals)?)
            }
            Instr::NggGsOutputExport {
                location,
                component,
                stream,
                value,
            } => {
                let value = self.eval(frame, value)?;
                self.ngg_outputs.push(NggOutput {
                    location: *location,
                    component: *component,
                    stream: *stream,
                    value,
                });
                None
            }
            Instr::ReconfigureLocalInvocationId { .. } => {
                return Err(IrError::UnloweredMarker(
                    "reconfigure.local.invocation.id".into(),
                ))
            }
        };

        if let (Some(dst), Some(value)) = (instr.dst(), result) {
            frame.values[dst.index()] = Some(value);
        }
        Ok(())
    }

    fn address(&self, frame: &Frame, access: &BufferAccess) -> Result<(Descriptor, usize), IrError> {
        let Operand::Entry(EntryValue::Descriptor(desc)) = access.desc else {
            return Err(IrError::Unsupported(format!(
                "buffer descriptor {} is not an entry descriptor",
                access.desc
            )));
        };
        let stride = self.strides.get(&desc).copied().unwrap_or(0) as u64;
        let vindex = match &access.vindex {
            Some(v) => self.eval(frame, v)?.as_u32() as u64,
            None => 0,
        };
        let voffset = self.eval(frame, &access.voffset)?.as_u32() as u64;
        let soffset = self.eval(frame, &access.soffset)?.as_u32() as u64;
        let addr = vindex * stride + voffset + soffset + access.offset as u64;
        Ok((desc, addr as usize))
    }

    fn interpolate(&self, frame: &Frame, op: &InterpOp, params: [u32; 3]) -> Result<Value, IrError> {
        let [p0, p10, p20] = params;
        let half_of = |bits: u32, high: bool| -> f32 {
            let h = if high { bits >> 16 } else { bits & 0xffff };
            f16::from_bits(h as u16).to_f32()
        };
        Ok(match op {
            InterpOp::P1 { i } => {
                let i = f32::from_bits(self.eval(frame, i)?.as_u32());
                Value::f32(f32::from_bits(p0) + i * f32::from_bits(p10))
            }
            InterpOp::P2 { p1, j } => {
                let p1 = f32::from_bits(self.eval(frame, p1)?.as_u32());
                let j = f32::from_bits(self.eval(frame, j)?.as_u32());
                Value::f32(p1 + j * f32::from_bits(p20))
            }
            InterpOp::P1F16 { i, high } => {
                let i = f32::from_bits(self.eval(frame, i)?.as_u32());
                Value::f32(half_of(p0, *high) + i * half_of(p10, *high))
            }
            InterpOp::P2F16 { p1, j, high } => {
                let p1 = f32::from_bits(self.eval(frame, p1)?.as_u32());
                let j = f32::from_bits(self.eval(frame, j)?.as_u32());
                let r = f16::from_f32(p1 + j * half_of(p20, *high));
                Value::scalar(ScalarType::F16, r.to_bits() as u64)
            }
            InterpOp::Mov { param } => {
                let bits = match param {
                    InterpParam::P0 => p0,
                    InterpParam::P10 => p10,
                    InterpParam::P20 => p20,
                };
                Value::scalar(ScalarType::F32, bits as u64)
            }
        })
    }

    fn intrinsic(&self, op: IntrinsicOp, args: &[Value]) -> Result<Value, IrError> {
        let arg = |i: usize| args.get(i).map(Value::as_u32).unwrap_or(0);
        Ok(match op {
            IntrinsicOp::MbcntLo => {
                let below = if self.lane >= 32 {
                    u32::MAX
                } else {
                    (1u32 << self.lane) - 1
                };
                Value::i32((arg(0) & below).count_ones() + arg(1))
            }
            IntrinsicOp::MbcntHi => {
                let below = match self.lane {
                    0..=32 => 0,
                    l if l >= 64 => u32::MAX,
                    l => (1u32 << (l - 32)) - 1,
                };
                Value::i32((arg(0) & below).count_ones() + arg(1))
            }
            IntrinsicOp::Ubfe => {
                let (value, offset, width) = (arg(0), arg(1) & 31, arg(2) & 31);
                let mask = if width == 0 { 0 } else { (1u32 << width) - 1 };
                Value::i32((value >> offset) & mask)
            }
            IntrinsicOp::DerivFineX | IntrinsicOp::DerivFineY => {
                // A single invocation has no neighbouring lanes.
                let ty = args.first().map(|v| v.ty).unwrap_or(Type::F32);
                Value::zero(ty)
            }
            IntrinsicOp::Rcp => Value::f32(1.0 / f32::from_bits(arg(0))),
            IntrinsicOp::PsLive => Value::scalar(ScalarType::I1, 1),
        })
    }
}

struct Frame {
    values: Vec<Option<Value>>,
    locals: Vec<Value>,
}

fn binary(op: BinOp, a: &Value, b: &Value) -> Result<Value, IrError> {
    if a.elems.len() != b.elems.len() {
        return Err(IrError::TypeMismatch {
            expected: a.ty,
            found: b.ty,
        });
    }
    let elem = a.elem_type();
    let bits = a
        .elems
        .iter()
        .zip(&b.elems)
        .map(|(x, y)| binary_scalar(op, elem, *x, *y))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Value {
        ty: a.ty,
        elems: bits,
    })
}

fn sign_extend(ty: ScalarType, bits: u64) -> i64 {
    let width = ty.bits();
    if width == 64 {
        return bits as i64;
    }
    let shift = 64 - width;
    ((bits << shift) as i64) >> shift
}

fn binary_scalar(op: BinOp, ty: ScalarType, x: u64, y: u64) -> Result<u64, IrError> {
    if op.is_float() {
        return float_binary(op, ty, x, y);
    }
    let bits = match op {
        BinOp::Add => x.wrapping_add(y),
        BinOp::Sub => x.wrapping_sub(y),
        BinOp::Mul => x.wrapping_mul(y),
        BinOp::UDiv => x
            .checked_div(y)
            .ok_or_else(|| IrError::Unsupported("udiv by zero".into()))?,
        BinOp::URem => x
            .checked_rem(y)
            .ok_or_else(|| IrError::Unsupported("urem by zero".into()))?,
        BinOp::SRem => sign_extend(ty, x)
            .checked_rem(sign_extend(ty, y))
            .ok_or_else(|| IrError::Unsupported("srem by zero".into()))?
            as u64,
        BinOp::Shl => x.checked_shl(y as u32).unwrap_or(0),
        BinOp::LShr => x.checked_shr(y as u32).unwrap_or(0),
        BinOp::AShr => (sign_extend(ty, x) >> y.min(63)) as u64,
        BinOp::And => x & y,
        BinOp::Or => x | y,
        BinOp::Xor => x ^ y,
        BinOp::FAdd | BinOp::FSub | BinOp::FMul | BinOp::FDiv => unreachable!(),
    };
    Ok(bits & ty.mask())
}

fn float_binary(op: BinOp, ty: ScalarType, x: u64, y: u64) -> Result<u64, IrError> {
    fn apply(op: BinOp, a: f64, b: f64) -> f64 {
        match op {
            BinOp::FAdd => a + b,
            BinOp::FSub => a - b,
            BinOp::FMul => a * b,
            _ => a / b,
        }
    }
    Ok(match ty {
        ScalarType::F16 => {
            let a = f16::from_bits(x as u16).to_f32();
            let b = f16::from_bits(y as u16).to_f32();
            f16::from_f32(apply(op, a as f64, b as f64) as f32).to_bits() as u64
        }
        ScalarType::F32 => {
            let a = f32::from_bits(x as u32);
            let b = f32::from_bits(y as u32);
            let r = match op {
                BinOp::FAdd => a + b,
                BinOp::FSub => a - b,
                BinOp::FMul => a * b,
                _ => a / b,
            };
            r.to_bits() as u64
        }
        ScalarType::F64 => apply(op, f64::from_bits(x), f64::from_bits(y)).to_bits(),
        other => {
            return Err(IrError::Unsupported(format!(
                "{} on {other}",
                op.mnemonic()
            )))
        }
    })
}

fn compare(pred: CmpPred, ty: ScalarType, x: u64, y: u64) -> bool {
    let (sx, sy) = (sign_extend(ty, x), sign_extend(ty, y));
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

fn cast(op: CastOp, v: &Value, ty: Type) -> Result<Value, IrError> {
    let to = ty.scalar_type().unwrap_or(ScalarType::I32);
    let from = v.elem_type();
    match op {
        CastOp::Bitcast => {
            if v.ty.bit_size() != ty.bit_size() {
                return Err(IrError::TypeMismatch {
                    expected: ty,
                    found: v.ty,
                });
            }
            Ok(Value::from_bytes(ty, &v.to_bytes()))
        }
        CastOp::ZExt | CastOp::Trunc => Ok(Value {
            ty,
            elems: v.elems.iter().map(|e| e & to.mask()).collect(),
        }),
        CastOp::SExt => Ok(Value {
            ty,
            elems: v
                .elems
                .iter()
                .map(|e| sign_extend(from, *e) as u64 & to.mask())
                .collect(),
        }),
        CastOp::FpExt | CastOp::FpTrunc => {
            let elems = v
                .elems
                .iter()
                .map(|e| {
                    let f = match from {
                        ScalarType::F16 => f16::from_bits(*e as u16).to_f64(),
                        ScalarType::F32 => f32::from_bits(*e as u32) as f64,
                        _ => f64::from_bits(*e),
                    };
                    match to {
                        ScalarType::F16 => f16::from_f64(f).to_bits() as u64,
                        ScalarType::F32 => (f as f32).to_bits() as u64,
                        _ => f.to_bits(),
                    }
                })
                .collect();
            Ok(Value { ty, elems })
        }
    }
}
