use std::fmt;

use crate::types::{ScalarType, Type};

macro_rules! builtins {
    ($($(#[$meta:meta])* $name:ident = $text:literal,)*) => {
        /// Built-in (system) values that can cross a shader-stage boundary or come from hardware.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum BuiltIn {
            $($(#[$meta])* $name,)*
        }

        impl BuiltIn {
            pub const ALL: &'static [BuiltIn] = &[$(BuiltIn::$name,)*];

            /// Position in [`BuiltIn::ALL`]; also the location key of a built-in transform
            /// feedback output.
            pub fn index(self) -> u32 {
                self as u32
            }

            pub fn from_index(index: u32) -> Option<BuiltIn> {
                Self::ALL.get(index as usize).copied()
            }

            pub const fn name(self) -> &'static str {
                match self {
                    $(BuiltIn::$name => $text,)*
                }
            }
        }
    };
}

builtins! {
    VertexIndex = "VertexIndex",
    InstanceIndex = "InstanceIndex",
    BaseVertex = "BaseVertex",
    BaseInstance = "BaseInstance",
    DrawIndex = "DrawIndex",
    Position = "Position",
    PointSize = "PointSize",
    ClipDistance = "ClipDistance",
    CullDistance = "CullDistance",
    PrimitiveId = "PrimitiveId",
    InvocationId = "InvocationId",
    Layer = "Layer",
    ViewportIndex = "ViewportIndex",
    ViewIndex = "ViewIndex",
    PatchVertices = "PatchVertices",
    TessLevelOuter = "TessLevelOuter",
    TessLevelInner = "TessLevelInner",
    TessCoord = "TessCoord",
    PrimitiveShadingRate = "PrimitiveShadingRate",
    FragCoord = "FragCoord",
    FrontFacing = "FrontFacing",
    PointCoord = "PointCoord",
    SampleId = "SampleId",
    SamplePosition = "SamplePosition",
    SampleMask = "SampleMask",
    HelperInvocation = "HelperInvocation",
    FragDepth = "FragDepth",
    FragStencilRef = "FragStencilRef",
    ShadingRate = "ShadingRate",
    NumSamples = "NumSamples",
    SamplePatternIdx = "SamplePatternIdx",
    BaryCoordNoPersp = "BaryCoordNoPersp",
    BaryCoordNoPerspCentroid = "BaryCoordNoPerspCentroid",
    BaryCoordNoPerspSample = "BaryCoordNoPerspSample",
    BaryCoordSmooth = "BaryCoordSmooth",
    BaryCoordSmoothCentroid = "BaryCoordSmoothCentroid",
    BaryCoordSmoothSample = "BaryCoordSmoothSample",
    BaryCoordPullModel = "BaryCoordPullModel",
    BaryCoord = "BaryCoord",
    BaryCoordNoPerspKhr = "BaryCoordNoPerspKHR",
    NumWorkgroups = "NumWorkgroups",
    WorkgroupSize = "WorkgroupSize",
    WorkgroupId = "WorkgroupId",
    LocalInvocationId = "LocalInvocationId",
    GlobalInvocationId = "GlobalInvocationId",
    LocalInvocationIndex = "LocalInvocationIndex",
    NumSubgroups = "NumSubgroups",
    SubgroupId = "SubgroupId",
    SubgroupSize = "SubgroupSize",
    SubgroupLocalInvocationId = "SubgroupLocalInvocationId",
    SubgroupEqMask = "SubgroupEqMask",
    SubgroupGeMask = "SubgroupGeMask",
    SubgroupGtMask = "SubgroupGtMask",
    SubgroupLeMask = "SubgroupLeMask",
    SubgroupLtMask = "SubgroupLtMask",
    DeviceIndex = "DeviceIndex",
    /// Internal: sample position offset for a given sample number.
    SamplePosOffset = "SamplePosOffset",
    /// Internal: linear I/J at pixel center.
    InterpLinearCenter = "InterpLinearCenter",
    /// Internal: perspective pull-model `<I/W, J/W, 1/W>`.
    InterpPullMode = "InterpPullMode",
    /// Internal: perspective I/J at centroid.
    InterpPerspCentroid = "InterpPerspCentroid",
    /// Internal: linear I/J at centroid.
    InterpLinearCentroid = "InterpLinearCentroid",
    /// Internal: GS wave ID.
    GsWaveId = "GsWaveId",
}

impl BuiltIn {
    /// Fixed type of the built-in. `array_size` only matters for clip/cull distances.
    pub fn ty(self, array_size: u32) -> Type {
        use BuiltIn::*;
        match self {
            Position | FragCoord => Type::vec(ScalarType::F32, 4),
            PointSize | FragDepth => Type::F32,
            ClipDistance | CullDistance => Type::array(ScalarType::F32, array_size.max(1)),
            TessLevelOuter => Type::array(ScalarType::F32, 4),
            TessLevelInner => Type::array(ScalarType::F32, 2),
            TessCoord | BaryCoordPullModel | BaryCoord | BaryCoordNoPerspKhr | InterpPullMode => {
                Type::vec(ScalarType::F32, 3)
            }
            PointCoord | SamplePosition | BaryCoordNoPersp | BaryCoordNoPerspCentroid
            | BaryCoordNoPerspSample | BaryCoordSmooth | BaryCoordSmoothCentroid
            | BaryCoordSmoothSample | SamplePosOffset | InterpLinearCenter | InterpPerspCentroid
            | InterpLinearCentroid => Type::vec(ScalarType::F32, 2),
            FrontFacing | HelperInvocation => Type::BOOL,
            SampleMask => Type::array(ScalarType::I32, 1),
            NumWorkgroups | WorkgroupSize | WorkgroupId | LocalInvocationId
            | GlobalInvocationId => Type::vec(ScalarType::I32, 3),
            SubgroupEqMask | SubgroupGeMask | SubgroupGtMask | SubgroupLeMask | SubgroupLtMask => {
                Type::vec(ScalarType::I32, 4)
            }
            VertexIndex | InstanceIndex | BaseVertex | BaseInstance | DrawIndex | PrimitiveId
            | InvocationId | Layer | ViewportIndex | ViewIndex | PatchVertices
            | PrimitiveShadingRate | SampleId | FragStencilRef | ShadingRate | NumSamples
            | SamplePatternIdx | LocalInvocationIndex | NumSubgroups | SubgroupId
            | SubgroupSize | SubgroupLocalInvocationId | DeviceIndex | GsWaveId => Type::I32,
        }
    }

    pub const fn is_array(self) -> bool {
        matches!(
            self,
            BuiltIn::ClipDistance
                | BuiltIn::CullDistance
                | BuiltIn::TessLevelOuter
                | BuiltIn::TessLevelInner
                | BuiltIn::SampleMask
        )
    }
}

impl fmt::Display for BuiltIn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_round_trips_through_all() {
        for builtin in BuiltIn::ALL {
            assert_eq!(BuiltIn::from_index(builtin.index()), Some(*builtin));
        }
        assert_eq!(BuiltIn::from_index(BuiltIn::ALL.len() as u32), None);
    }

    #[test]
    fn distance_arrays_take_the_declared_size() {
        assert_eq!(BuiltIn::ClipDistance.ty(6), Type::array(ScalarType::F32, 6));
        assert_eq!(BuiltIn::CullDistance.ty(0), Type::array(ScalarType::F32, 1));
        assert!(BuiltIn::TessLevelInner.is_array());
    }
}
