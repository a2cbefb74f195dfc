//! Which stages may read or write each built-in.

use vesper_ir::{BuiltIn, ShaderStage};

use crate::error::{Direction, IoError};
use crate::pipeline::StageMask;

const V: StageMask = StageMask::VERTEX;
const H: StageMask = StageMask::TESS_CONTROL;
const D: StageMask = StageMask::TESS_EVAL;
const G: StageMask = StageMask::GEOMETRY;
const P: StageMask = StageMask::FRAGMENT;
const C: StageMask = StageMask::COMPUTE;
const X: StageMask = StageMask::COPY_SHADER;
const NONE: StageMask = StageMask::empty();
const ALL: StageMask = StageMask::all();

const fn or(a: StageMask, b: StageMask) -> StageMask {
    a.union(b)
}

/// Valid stages of one built-in, as input and as output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuiltInDef {
    pub builtin: BuiltIn,
    pub input: StageMask,
    pub output: StageMask,
}

const fn def(builtin: BuiltIn, input: StageMask, output: StageMask) -> BuiltInDef {
    BuiltInDef {
        builtin,
        input,
        output,
    }
}

const VERTEX_OUT: StageMask = or(or(V, H), or(D, or(G, X)));
const VTG_IN: StageMask = or(H, or(D, G));

pub const BUILTIN_DEFS: &[BuiltInDef] = &[
    def(BuiltIn::VertexIndex, V, NONE),
    def(BuiltIn::InstanceIndex, V, NONE),
    def(BuiltIn::BaseVertex, V, NONE),
    def(BuiltIn::BaseInstance, V, NONE),
    def(BuiltIn::DrawIndex, V, NONE),
    def(BuiltIn::Position, VTG_IN, VERTEX_OUT),
    def(BuiltIn::PointSize, VTG_IN, VERTEX_OUT),
    def(BuiltIn::ClipDistance, or(VTG_IN, P), VERTEX_OUT),
    def(BuiltIn::CullDistance, or(VTG_IN, P), VERTEX_OUT),
    def(BuiltIn::PrimitiveId, or(VTG_IN, P), or(G, X)),
    def(BuiltIn::InvocationId, or(H, G), NONE),
    def(BuiltIn::Layer, P, or(or(V, D), or(G, X))),
    def(BuiltIn::ViewportIndex, P, or(or(V, D), or(G, X))),
    def(BuiltIn::ViewIndex, or(or(V, VTG_IN), P), NONE),
    def(BuiltIn::PatchVertices, or(H, D), NONE),
    def(BuiltIn::TessLevelOuter, D, H),
    def(BuiltIn::TessLevelInner, D, H),
    def(BuiltIn::TessCoord, D, NONE),
    def(BuiltIn::PrimitiveShadingRate, NONE, or(V, or(G, X))),
    def(BuiltIn::FragCoord, P, NONE),
    def(BuiltIn::FrontFacing, P, NONE),
    def(BuiltIn::PointCoord, P, NONE),
    def(BuiltIn::SampleId, P, NONE),
    def(BuiltIn::SamplePosition, P, NONE),
    def(BuiltIn::SampleMask, P, P),
    def(BuiltIn::HelperInvocation, P, NONE),
    def(BuiltIn::FragDepth, NONE, P),
    def(BuiltIn::FragStencilRef, NONE, P),
    def(BuiltIn::ShadingRate, P, NONE),
    def(BuiltIn::NumSamples, P, NONE),
    def(BuiltIn::SamplePatternIdx, P, NONE),
    def(BuiltIn::BaryCoordNoPersp, P, NONE),
    def(BuiltIn::BaryCoordNoPerspCentroid, P, NONE),
    def(BuiltIn::BaryCoordNoPerspSample, P, NONE),
    def(BuiltIn::BaryCoordSmooth, P, NONE),
    def(BuiltIn::BaryCoordSmoothCentroid, P, NONE),
    def(BuiltIn::BaryCoordSmoothSample, P, NONE),
    def(BuiltIn::BaryCoordPullModel, P, NONE),
    def(BuiltIn::BaryCoord, P, NONE),
    def(BuiltIn::BaryCoordNoPerspKhr, P, NONE),
    def(BuiltIn::NumWorkgroups, C, NONE),
    def(BuiltIn::WorkgroupSize, C, NONE),
    def(BuiltIn::WorkgroupId, C, NONE),
    def(BuiltIn::LocalInvocationId, C, NONE),
    def(BuiltIn::GlobalInvocationId, C, NONE),
    def(BuiltIn::LocalInvocationIndex, C, NONE),
    def(BuiltIn::NumSubgroups, C, NONE),
    def(BuiltIn::SubgroupId, C, NONE),
    def(BuiltIn::SubgroupSize, ALL, NONE),
    def(BuiltIn::SubgroupLocalInvocationId, ALL, NONE),
    def(BuiltIn::SubgroupEqMask, ALL, NONE),
    def(BuiltIn::SubgroupGeMask, ALL, NONE),
    def(BuiltIn::SubgroupGtMask, ALL, NONE),
    def(BuiltIn::SubgroupLeMask, ALL, NONE),
    def(BuiltIn::SubgroupLtMask, ALL, NONE),
    def(BuiltIn::DeviceIndex, ALL, NONE),
    def(BuiltIn::SamplePosOffset, P, NONE),
    def(BuiltIn::InterpLinearCenter, P, NONE),
    def(BuiltIn::InterpPullMode, P, NONE),
    def(BuiltIn::InterpPerspCentroid, P, NONE),
    def(BuiltIn::InterpLinearCentroid, P, NONE),
    def(BuiltIn::GsWaveId, G, NONE),
];

pub fn lookup(builtin: BuiltIn) -> Option<&'static BuiltInDef> {
    BUILTIN_DEFS.iter().find(|d| d.builtin == builtin)
}

pub fn valid_stages(builtin: BuiltIn, direction: Direction) -> StageMask {
    match (lookup(builtin), direction) {
        (Some(d), Direction::Input) => d.input,
        (Some(d), Direction::Output) => d.output,
        (None, _) => StageMask::empty(),
    }
}

pub fn check_stage(builtin: BuiltIn, stage: ShaderStage, direction: Direction) -> Result<(), IoError> {
    if valid_stages(builtin, direction).has(stage) {
        Ok(())
    } else {
        Err(IoError::InvalidBuiltInStage {
            builtin,
            stage,
            direction,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_builtin_has_a_row() {
        for builtin in BuiltIn::ALL {
            assert!(lookup(*builtin).is_some(), "{builtin} has no stage row");
        }
    }

    #[test]
    fn fragment_outputs_are_fragment_only() {
        assert!(check_stage(BuiltIn::FragDepth, ShaderStage::Fragment, Direction::Output).is_ok());
        assert_eq!(
            check_stage(BuiltIn::FragDepth, ShaderStage::Vertex, Direction::Output),
            Err(IoError::InvalidBuiltInStage {
                builtin: BuiltIn::FragDepth,
                stage: ShaderStage::Vertex,
                direction: Direction::Output,
            })
        );
    }

    #[test]
    fn tess_levels_flow_from_tcs_to_tes() {
        assert!(check_stage(BuiltIn::TessLevelOuter, ShaderStage::TessControl, Direction::Output).is_ok());
        assert!(check_stage(BuiltIn::TessLevelOuter, ShaderStage::TessEval, Direction::Input).is_ok());
        assert!(check_stage(BuiltIn::TessLevelOuter, ShaderStage::TessControl, Direction::Input).is_err());
    }
}
