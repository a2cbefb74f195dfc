use std::fmt;

/// Scalar element types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ScalarType {
    I1,
    I8,
    I16,
    I32,
    I64,
    F16,
    F32,
    F64,
}

impl ScalarType {
    pub const fn bits(self) -> u32 {
        match self {
            ScalarType::I1 => 1,
            ScalarType::I8 => 8,
            ScalarType::I16 | ScalarType::F16 => 16,
            ScalarType::I32 | ScalarType::F32 => 32,
            ScalarType::I64 | ScalarType::F64 => 64,
        }
    }

    pub const fn is_float(self) -> bool {
        matches!(self, ScalarType::F16 | ScalarType::F32 | ScalarType::F64)
    }

    pub const fn is_int(self) -> bool {
        !self.is_float()
    }

    /// Integer type of the given width, if one exists.
    pub const fn int_of_bits(bits: u32) -> Option<ScalarType> {
        match bits {
            1 => Some(ScalarType::I1),
            8 => Some(ScalarType::I8),
            16 => Some(ScalarType::I16),
            32 => Some(ScalarType::I32),
            64 => Some(ScalarType::I64),
            _ => None,
        }
    }

    pub const fn float_of_bits(bits: u32) -> Option<ScalarType> {
        match bits {
            16 => Some(ScalarType::F16),
            32 => Some(ScalarType::F32),
            64 => Some(ScalarType::F64),
            _ => None,
        }
    }

    /// Mask selecting the valid bits of a value of this type.
    pub const fn mask(self) -> u64 {
        match self.bits() {
            64 => u64::MAX,
            b => (1u64 << b) - 1,
        }
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ScalarType::I1 => "i1",
            ScalarType::I8 => "i8",
            ScalarType::I16 => "i16",
            ScalarType::I32 => "i32",
            ScalarType::I64 => "i64",
            ScalarType::F16 => "half",
            ScalarType::F32 => "float",
            ScalarType::F64 => "double",
        };
        f.write_str(s)
    }
}

/// First-class value types.
///
/// Arrays only hold scalars: the stage-boundary values that need them (clip/cull distances, tess
/// levels, sample mask) are all arrays of scalars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Type {
    Void,
    Scalar(ScalarType),
    Vector(ScalarType, u32),
    Array(ScalarType, u32),
}

impl Type {
    pub const BOOL: Type = Type::Scalar(ScalarType::I1);
    pub const I8: Type = Type::Scalar(ScalarType::I8);
    pub const I16: Type = Type::Scalar(ScalarType::I16);
    pub const I32: Type = Type::Scalar(ScalarType::I32);
    pub const I64: Type = Type::Scalar(ScalarType::I64);
    pub const F16: Type = Type::Scalar(ScalarType::F16);
    pub const F32: Type = Type::Scalar(ScalarType::F32);
    pub const F64: Type = Type::Scalar(ScalarType::F64);

    pub const fn vec(elem: ScalarType, len: u32) -> Type {
        Type::Vector(elem, len)
    }

    /// `elem` when `len == 1`, otherwise a vector of `len` elements.
    pub const fn scalar_or_vec(elem: ScalarType, len: u32) -> Type {
        if len == 1 {
            Type::Scalar(elem)
        } else {
            Type::Vector(elem, len)
        }
    }

    pub const fn array(elem: ScalarType, len: u32) -> Type {
        Type::Array(elem, len)
    }

    /// Element type of a scalar, vector or array.
    pub const fn scalar_type(self) -> Option<ScalarType> {
        match self {
            Type::Void => None,
            Type::Scalar(s) | Type::Vector(s, _) | Type::Array(s, _) => Some(s),
        }
    }

    pub const fn scalar_bits(self) -> u32 {
        match self.scalar_type() {
            Some(s) => s.bits(),
            None => 0,
        }
    }

    /// Number of elements; 1 for scalars and 0 for `void`.
    pub const fn element_count(self) -> u32 {
        match self {
            Type::Void => 0,
            Type::Scalar(_) => 1,
            Type::Vector(_, n) | Type::Array(_, n) => n,
        }
    }

    pub const fn bit_size(self) -> u32 {
        self.scalar_bits() * self.element_count()
    }

    pub const fn is_vector(self) -> bool {
        matches!(self, Type::Vector(..))
    }

    pub const fn is_array(self) -> bool {
        matches!(self, Type::Array(..))
    }

    pub const fn is_aggregate(self) -> bool {
        self.is_array()
    }

    pub const fn is_scalar(self) -> bool {
        matches!(self, Type::Scalar(_))
    }

    pub const fn is_float(self) -> bool {
        match self.scalar_type() {
            Some(s) => s.is_float(),
            None => false,
        }
    }

    pub const fn is_int(self) -> bool {
        match self.scalar_type() {
            Some(s) => s.is_int(),
            None => false,
        }
    }

    /// Same shape with a different element type.
    pub const fn with_scalar(self, elem: ScalarType) -> Type {
        match self {
            Type::Void => Type::Void,
            Type::Scalar(_) => Type::Scalar(elem),
            Type::Vector(_, n) => Type::Vector(elem, n),
            Type::Array(_, n) => Type::Array(elem, n),
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Void => f.write_str("void"),
            Type::Scalar(s) => write!(f, "{s}"),
            Type::Vector(s, n) => write!(f, "<{n} x {s}>"),
            Type::Array(s, n) => write!(f, "[{n} x {s}]"),
        }
    }
}
