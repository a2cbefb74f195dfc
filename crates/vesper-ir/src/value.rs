use std::fmt;

use crate::types::{ScalarType, Type};

/// SSA value produced by an instruction. Numbering is unique per [`crate::Function`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValueId(pub u32);

impl ValueId {
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// Scalar constant, stored as a zero-extended bit pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Const {
    pub ty: ScalarType,
    pub bits: u64,
}

impl Const {
    pub const fn int(ty: ScalarType, value: u64) -> Self {
        Self {
            ty,
            bits: value & ty.mask(),
        }
    }

    pub const fn i32(value: u32) -> Self {
        Self::int(ScalarType::I32, value as u64)
    }

    pub const fn i64(value: u64) -> Self {
        Self::int(ScalarType::I64, value)
    }

    pub const fn bool(value: bool) -> Self {
        Self::int(ScalarType::I1, value as u64)
    }

    pub fn f32(value: f32) -> Self {
        Self {
            ty: ScalarType::F32,
            bits: value.to_bits() as u64,
        }
    }

    pub fn f16(value: half::f16) -> Self {
        Self {
            ty: ScalarType::F16,
            bits: value.to_bits() as u64,
        }
    }

    /// Sign-extended integer value.
    pub fn as_i64(self) -> i64 {
        let bits = self.ty.bits();
        if bits == 64 {
            return self.bits as i64;
        }
        let shift = 64 - bits;
        ((self.bits << shift) as i64) >> shift
    }
}

impl fmt::Display for Const {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.ty {
            ScalarType::I1 => write!(f, "{}", self.bits != 0),
            ScalarType::F32 => write!(f, "{:?}", f32::from_bits(self.bits as u32)),
            ScalarType::F64 => write!(f, "{:?}", f64::from_bits(self.bits)),
            ScalarType::F16 => write!(f, "{}", half::f16::from_bits(self.bits as u16)),
            _ => write!(f, "{}", self.bits),
        }
    }
}

/// Where the interpolation coefficients of an I/J pair are evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IjLocation {
    Sample,
    Center,
    Centroid,
}

/// Buffer descriptors resolved at the entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Descriptor {
    EsGsRing,
    GsVsRing(u8),
    OffChipLds,
    TessFactorBuffer,
    StreamOutBuffer(u8),
    SamplePositionTable,
}

/// Hardware inputs of an entry point: user-data SGPRs, system VGPRs and the ring/buffer
/// descriptors set up in the prologue.
///
/// The ABI position of each value is resolved later from pipeline state; the IR only names it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryValue {
    ViewIndex,
    VertexId,
    InstanceId,
    BaseVertex,
    BaseInstance,
    DrawIndex,
    VsPrimitiveId,
    /// Vertex ID relative to the thread-group (LS/ES).
    RelVertexId,
    TcsRelPatchId,
    TcsInvocationId,
    TcsPatchId,
    OffChipLdsBase,
    TfBufferBase,
    TesRelPatchId,
    TesPatchId,
    TessCoordX,
    TessCoordY,
    EsGsOffset,
    GsVsOffset,
    GsWaveId,
    GsPrimitiveId,
    GsInvocationId,
    /// Per-vertex ES→GS ring offset (0..6).
    EsGsVertexOffset(u8),
    StreamOutInfo,
    StreamOutWriteIndex,
    StreamOutOffset(u8),
    /// Stream selector of the copy shader.
    CopyStreamId,
    /// Dword offset of the copy shader's vertex inside a GS→VS ring stream.
    CopyVertexOffset,
    PrimMask,
    PerspInterp(IjLocation),
    LinearInterp(IjLocation),
    PerspPullMode,
    FragCoord(u8),
    FrontFacing,
    Ancillary,
    SampleCoverage,
    WorkgroupId,
    LocalInvocationId,
    /// `<3 x i32>` loaded through the workgroup-count user-data pointer.
    NumWorkgroups,
    Descriptor(Descriptor),
}

impl EntryValue {
    pub fn ty(self) -> Type {
        match self {
            EntryValue::PerspInterp(_) | EntryValue::LinearInterp(_) => {
                Type::vec(ScalarType::F32, 2)
            }
            EntryValue::PerspPullMode => Type::vec(ScalarType::F32, 3),
            EntryValue::FragCoord(_) | EntryValue::TessCoordX | EntryValue::TessCoordY => Type::F32,
            EntryValue::WorkgroupId
            | EntryValue::LocalInvocationId
            | EntryValue::NumWorkgroups => Type::vec(ScalarType::I32, 3),
            EntryValue::Descriptor(_) => Type::vec(ScalarType::I32, 4),
            _ => Type::I32,
        }
    }
}

impl fmt::Display for EntryValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryValue::EsGsVertexOffset(v) => write!(f, "@EsGsVertexOffset{v}"),
            EntryValue::StreamOutOffset(b) => write!(f, "@StreamOutOffset{b}"),
            EntryValue::FragCoord(c) => write!(f, "@FragCoord{c}"),
            EntryValue::PerspInterp(l) => write!(f, "@PerspInterp{l:?}"),
            EntryValue::LinearInterp(l) => write!(f, "@LinearInterp{l:?}"),
            EntryValue::Descriptor(d) => write!(f, "@{d:?}"),
            other => write!(f, "@{other:?}"),
        }
    }
}

/// Instruction operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operand {
    Value(ValueId),
    Const(Const),
    Undef(Type),
    /// All-zero value of any type (null vector, zero array).
    Zero(Type),
    Entry(EntryValue),
}

impl Operand {
    pub const fn i32(value: u32) -> Self {
        Operand::Const(Const::i32(value))
    }

    pub const fn i64(value: u64) -> Self {
        Operand::Const(Const::i64(value))
    }

    pub const fn bool(value: bool) -> Self {
        Operand::Const(Const::bool(value))
    }

    pub const fn int(ty: ScalarType, value: u64) -> Self {
        Operand::Const(Const::int(ty, value))
    }

    pub fn f32(value: f32) -> Self {
        Operand::Const(Const::f32(value))
    }

    pub const fn undef_f32() -> Self {
        Operand::Undef(Type::F32)
    }

    pub const fn as_const(&self) -> Option<Const> {
        match self {
            Operand::Const(c) => Some(*c),
            _ => None,
        }
    }

    /// Integer constant value truncated to `u32`.
    pub fn as_u32(&self) -> Option<u32> {
        match self {
            Operand::Const(c) if c.ty.is_int() => Some(c.bits as u32),
            _ => None,
        }
    }

    pub const fn is_undef(&self) -> bool {
        matches!(self, Operand::Undef(_))
    }

    pub const fn is_const(&self) -> bool {
        matches!(self, Operand::Const(_))
    }
}

impl From<ValueId> for Operand {
    fn from(value: ValueId) -> Self {
        Operand::Value(value)
    }
}

impl From<EntryValue> for Operand {
    fn from(value: EntryValue) -> Self {
        Operand::Entry(value)
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Value(v) => write!(f, "{v}"),
            Operand::Const(c) => write!(f, "{} {c}", c.ty),
            Operand::Undef(ty) => write!(f, "{ty} undef"),
            Operand::Zero(ty) => write!(f, "{ty} zeroinitializer"),
            Operand::Entry(e) => write!(f, "{e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn int_constants_are_masked_to_their_width() {
        let c = Const::int(ScalarType::I8, 0x1ff);
        assert_eq!(c.bits, 0xff);
        assert_eq!(c.as_i64(), -1);
        assert_eq!(Operand::i32(u32::MAX).as_u32(), Some(u32::MAX));
    }

    #[test]
    fn float_constants_are_not_integers() {
        assert_eq!(Operand::f32(1.0).as_u32(), None);
    }
}
